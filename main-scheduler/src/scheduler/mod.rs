//! Main-thread scheduling.
//!
//! [`MainThreadScheduler::schedule`] waits off the main context, runs the
//! action on it, and returns a [`ScheduledHandle`] whose disposal releases
//! the produced resource on the main context too.

mod handle;
mod main_disposable;
mod main_scheduler;

pub use handle::{ScheduleState, ScheduledHandle};
pub use main_disposable::MainThreadDisposable;
pub use main_scheduler::{MainThreadScheduler, ScheduleFailure};
