//! The disposable resource abstraction.

use std::fmt;

/// A resource whose release must be triggered explicitly.
///
/// Implementations should treat a second `dispose` call as a no-op; the
/// containers in this crate never call it twice, but user code might.
pub trait Disposable: Send {
    /// Releases the resource.
    fn dispose(&mut self);
}

impl Disposable for () {
    fn dispose(&mut self) {}
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&mut self) {
        (**self).dispose();
    }
}

impl<D: Disposable> Disposable for Option<D> {
    fn dispose(&mut self) {
        if let Some(mut resource) = self.take() {
            resource.dispose();
        }
    }
}

/// Disposing a spawned task aborts it.
impl<T: Send + 'static> Disposable for tokio::task::JoinHandle<T> {
    fn dispose(&mut self) {
        self.abort();
    }
}

/// A disposable that runs a closure the first time it is disposed.
pub struct AnonymousDisposable {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl AnonymousDisposable {
    /// Creates a disposable from a release closure.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Returns whether the release closure has already run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.action.is_none()
    }
}

impl Disposable for AnonymousDisposable {
    fn dispose(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl fmt::Debug for AnonymousDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymousDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting(counter: &Arc<AtomicUsize>) -> AnonymousDisposable {
        let counter = Arc::clone(counter);
        AnonymousDisposable::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_anonymous_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut disposable = counting(&counter);

        assert!(!disposable.is_disposed());
        disposable.dispose();
        disposable.dispose();

        assert!(disposable.is_disposed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_option_and_box_forward() {
        let counter = Arc::new(AtomicUsize::new(0));

        let mut boxed: Box<dyn Disposable> = Box::new(counting(&counter));
        boxed.dispose();

        let mut optional = Some(counting(&counter));
        optional.dispose();
        optional.dispose();
        assert!(optional.is_none());

        let mut nothing: Option<AnonymousDisposable> = None;
        nothing.dispose();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_join_handle_dispose_aborts_task() {
        let mut task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        task.dispose();

        let err = (&mut task).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
