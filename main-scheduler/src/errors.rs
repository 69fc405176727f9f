//! Error types for main-thread scheduling.
//!
//! Runtime conditions (a closed main context, a full run queue, a missing
//! process-wide installation) are reported as [`SchedulerError`] values.
//! Contract violations on a [`CancellationCell`](crate::cancellation::CancellationCell)
//! have their own [`AlreadyAssignedError`] so the rejected resource can be
//! handed back to the caller.

use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// The main error type for scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The main context has shut down and no longer accepts work.
    #[error("main context is closed")]
    ContextClosed,

    /// The main context run queue reached its configured bound.
    #[error("main context queue is full ({capacity} pending jobs)")]
    QueueFull {
        /// The configured queue bound.
        capacity: usize,
    },

    /// A process-wide main context was installed twice.
    #[error("a main context is already installed for this process")]
    ContextAlreadyInstalled,

    /// A process-wide scheduler was installed twice.
    #[error("a main-thread scheduler is already installed for this process")]
    SchedulerAlreadyInstalled,

    /// No process-wide main context has been installed yet.
    #[error("no main context has been installed")]
    ContextNotInstalled,

    /// No process-wide scheduler has been installed yet.
    #[error("no main-thread scheduler has been installed")]
    SchedulerNotInstalled,

    /// A scheduled action returned an error while producing its resource.
    #[error("scheduled action failed: {0}")]
    ActionFailed(String),

    /// Work panicked while running on the main context.
    #[error("work panicked on the main context: {0}")]
    Panicked(String),

    /// No async runtime was available to drive the delay wait.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error, e.g. while spawning the main loop thread.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    /// Creates an action failure error.
    #[must_use]
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed(message.into())
    }

    /// Creates a runtime error.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Builds a [`SchedulerError::Panicked`] from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::Panicked(panic_message(payload))
    }

    /// Returns true if the error means the main context can no longer run work.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ContextClosed)
    }
}

/// Raised when a resource is assigned into a cell that already holds one.
///
/// The rejected resource is returned untouched in [`resource`](Self::resource).
#[derive(Error)]
#[error("cancellation cell already holds a resource")]
pub struct AlreadyAssignedError<D> {
    /// The resource that was not stored.
    pub resource: D,
}

impl<D> AlreadyAssignedError<D> {
    /// Takes back the rejected resource.
    pub fn into_resource(self) -> D {
        self.resource
    }
}

impl<D> fmt::Debug for AlreadyAssignedError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlreadyAssignedError").finish_non_exhaustive()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(SchedulerError::ContextClosed.to_string(), "main context is closed");
        assert_eq!(
            SchedulerError::QueueFull { capacity: 4 }.to_string(),
            "main context queue is full (4 pending jobs)"
        );
        assert_eq!(
            SchedulerError::action_failed("boom").to_string(),
            "scheduled action failed: boom"
        );
    }

    #[test]
    fn test_panic_message_variants() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static message");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 42");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(7_u32)).unwrap_err();
        assert_eq!(panic_message(&*payload), "<non-string panic payload>");
    }

    #[test]
    fn test_from_panic() {
        let payload = std::panic::catch_unwind(|| panic!("kaput")).unwrap_err();
        let err = SchedulerError::from_panic(&*payload);
        assert!(matches!(err, SchedulerError::Panicked(ref m) if m == "kaput"));
        assert!(!err.is_closed());
        assert!(SchedulerError::ContextClosed.is_closed());
    }

    #[test]
    fn test_already_assigned_returns_resource() {
        let err = AlreadyAssignedError { resource: 5_u8 };
        assert_eq!(err.to_string(), "cancellation cell already holds a resource");
        assert_eq!(err.into_resource(), 5);
    }

    #[test]
    fn test_config_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SchedulerError = parse.into();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
