//! The execution-context seam behind [`MainThreadGate`](super::MainThreadGate).

use crate::errors::Result;

/// A unit of work queued onto a main context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial execution context that work can be posted to.
///
/// Implementations run posted jobs one at a time, in posting order, on a
/// single thread. [`MainLoop`](super::MainLoop) is the bundled one; UI
/// integrations can implement this over their own event loop.
#[cfg_attr(test, mockall::automock)]
pub trait MainContext: Send + Sync {
    /// Returns true iff the calling thread is this context's thread.
    fn is_current(&self) -> bool;

    /// Enqueues a job without waiting for it to run.
    fn post(&self, job: Job) -> Result<()>;
}
