//! Marshalling work onto the main context.

use super::{MainContext, MainLoop};
use crate::errors::{Result, SchedulerError};
use futures::channel::oneshot;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::trace;

static GLOBAL_GATE: OnceLock<MainThreadGate> = OnceLock::new();

type Reply<T> = oneshot::Receiver<thread::Result<T>>;

/// Entry point for running work on the process main context.
///
/// Every entry point first checks whether the caller already runs on the
/// main context and, if so, executes the work inline. Nested calls can
/// therefore never deadlock against the context they are running on.
#[derive(Clone)]
pub struct MainThreadGate {
    context: Arc<dyn MainContext>,
}

impl MainThreadGate {
    /// Creates a gate over an arbitrary main context.
    pub fn new(context: Arc<dyn MainContext>) -> Self {
        Self { context }
    }

    /// Creates a gate over a [`MainLoop`].
    #[must_use]
    pub fn from_main_loop(main_loop: Arc<MainLoop>) -> Self {
        Self { context: main_loop }
    }

    /// Installs the process-wide gate. Succeeds at most once per process.
    pub fn install(gate: Self) -> Result<&'static Self> {
        GLOBAL_GATE
            .set(gate)
            .map_err(|_| SchedulerError::ContextAlreadyInstalled)?;
        Self::global()
    }

    /// Returns the process-wide gate.
    pub fn global() -> Result<&'static Self> {
        GLOBAL_GATE.get().ok_or(SchedulerError::ContextNotInstalled)
    }

    /// Returns true iff the caller is already executing on the main context.
    #[must_use]
    pub fn is_current_context(&self) -> bool {
        self.context.is_current()
    }

    /// Runs `work` on the main context and blocks until it has finished.
    ///
    /// Executes inline when already on the main context. If `work` panics,
    /// the panic is resumed on the calling thread.
    pub fn run_on_main<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current_context() {
            return Ok(work());
        }

        let reply = self.dispatch(work)?;
        match futures::executor::block_on(reply) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(oneshot::Canceled) => Err(SchedulerError::ContextClosed),
        }
    }

    /// Runs `work` on the main context without blocking the calling task.
    ///
    /// A panic inside `work` is reported as [`SchedulerError::Panicked`].
    pub async fn run_on_main_async<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current_context() {
            return Ok(work());
        }

        let reply = self.dispatch(work)?;
        match reply.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(SchedulerError::from_panic(&*payload)),
            Err(oneshot::Canceled) => Err(SchedulerError::ContextClosed),
        }
    }

    /// Queues `work` on the main context without waiting for it.
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.context.post(Box::new(work))
    }

    fn dispatch<T, F>(&self, work: F) -> Result<Reply<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.context.post(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            if tx.send(outcome).is_err() {
                trace!("main context reply dropped, caller stopped waiting");
            }
        }))?;
        Ok(rx)
    }
}

impl std::fmt::Debug for MainThreadGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadGate")
            .field("on_main", &self.is_current_context())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MainLoopConfig;
    use crate::gate::MockMainContext;
    use std::time::Duration;

    fn loop_gate(name: &str) -> (Arc<MainLoop>, MainThreadGate) {
        let main_loop =
            Arc::new(MainLoop::spawn(&MainLoopConfig::new().with_thread_name(name)).unwrap());
        let gate = MainThreadGate::from_main_loop(Arc::clone(&main_loop));
        (main_loop, gate)
    }

    #[test]
    fn test_inline_when_current_without_posting() {
        let mut context = MockMainContext::new();
        context.expect_is_current().return_const(true);
        context.expect_post().never();

        let gate = MainThreadGate::new(Arc::new(context));
        assert_eq!(gate.run_on_main(|| 21 * 2).unwrap(), 42);
    }

    #[test]
    fn test_posts_when_not_current() {
        let mut context = MockMainContext::new();
        context.expect_is_current().return_const(false);
        context.expect_post().times(1).returning(|job| {
            job();
            Ok(())
        });

        let gate = MainThreadGate::new(Arc::new(context));
        assert_eq!(gate.run_on_main(|| "posted").unwrap(), "posted");
    }

    #[test]
    fn test_post_failure_is_returned() {
        let mut context = MockMainContext::new();
        context.expect_is_current().return_const(false);
        context
            .expect_post()
            .returning(|_| Err(SchedulerError::ContextClosed));

        let gate = MainThreadGate::new(Arc::new(context));
        assert!(gate.run_on_main(|| ()).unwrap_err().is_closed());
    }

    #[test]
    fn test_dropped_job_reports_closed() {
        let mut context = MockMainContext::new();
        context.expect_is_current().return_const(false);
        // Accepts the job but never runs it.
        context.expect_post().returning(|job| {
            drop(job);
            Ok(())
        });

        let gate = MainThreadGate::new(Arc::new(context));
        assert!(gate.run_on_main(|| 1).unwrap_err().is_closed());
    }

    #[test]
    fn test_run_on_main_executes_on_loop_thread() {
        let (main_loop, gate) = loop_gate("gate-identity");
        let main_id = main_loop.thread_id();

        let ran_on = gate.run_on_main(|| thread::current().id()).unwrap();
        assert_eq!(ran_on, main_id);
        assert_ne!(thread::current().id(), main_id);
    }

    #[test]
    fn test_nested_run_on_main_is_inline() {
        let (_main_loop, gate) = loop_gate("gate-nested");
        let inner_gate = gate.clone();

        let value = gate
            .run_on_main(move || {
                assert!(inner_gate.is_current_context());
                inner_gate.run_on_main(|| 7).unwrap()
            })
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_panic_resumes_on_caller() {
        let (main_loop, gate) = loop_gate("gate-panic");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            gate.run_on_main(|| -> u8 { panic!("release failed") })
        }));
        let payload = result.unwrap_err();
        assert_eq!(crate::errors::panic_message(&*payload), "release failed");

        // The loop survives and the panic was not counted as an unhandled job.
        assert_eq!(gate.run_on_main(|| 1).unwrap(), 1);
        assert_eq!(main_loop.panicked_jobs(), 0);
    }

    #[tokio::test]
    async fn test_run_on_main_async() {
        let (main_loop, gate) = loop_gate("gate-async");
        let main_id = main_loop.thread_id();

        let ran_on = gate
            .run_on_main_async(|| thread::current().id())
            .await
            .unwrap();
        assert_eq!(ran_on, main_id);

        let err = gate
            .run_on_main_async(|| -> u8 { panic!("async boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Panicked(ref m) if m == "async boom"));
    }

    #[test]
    fn test_closed_loop_rejects_work() {
        let (main_loop, gate) = loop_gate("gate-closed");
        main_loop.shutdown();

        assert!(gate.run_on_main(|| ()).unwrap_err().is_closed());
        assert!(gate.post(|| ()).unwrap_err().is_closed());
    }

    #[test]
    fn test_post_does_not_wait() {
        let (_main_loop, gate) = loop_gate("gate-post");
        let (tx, rx) = std::sync::mpsc::channel();

        gate.post(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(()).unwrap();
        })
        .unwrap();

        assert!(rx.try_recv().is_err());
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }
}
