//! # main-scheduler
//!
//! Delayed one-shot scheduling onto a single designated main thread.
//!
//! Any thread can schedule a callback to run on the main context after a
//! delay and get back a handle that cancels it. The handle is safe to
//! dispose from any thread, any number of times:
//!
//! - **Before the delay elapses**: the callback never runs
//! - **After the callback ran**: the resource it produced is released
//!   exactly once, on the main context
//! - **While the callback runs**: disposal waits for it, then releases
//!   its resource
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use main_scheduler::prelude::*;
//!
//! let main_loop = Arc::new(MainLoop::spawn(&MainLoopConfig::default())?);
//! let gate = MainThreadGate::install(MainThreadGate::from_main_loop(main_loop))?;
//! let scheduler = MainThreadScheduler::new(gate.clone())?;
//!
//! let handle = scheduler.schedule(42, Duration::from_millis(100), |_, answer| {
//!     Ok(AnonymousDisposable::new(move || println!("released {answer}")))
//! });
//! handle.dispose();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod gate;
pub mod observability;
pub mod scheduler;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{
        AnonymousDisposable, AssignOutcome, CancellationCell, CellStatus, Disposable,
    };
    pub use crate::config::{LoggingConfig, MainLoopConfig, SchedulerConfig};
    pub use crate::errors::{AlreadyAssignedError, Result, SchedulerError};
    pub use crate::gate::{MainContext, MainLoop, MainThreadGate};
    pub use crate::observability::init_tracing;
    pub use crate::scheduler::{
        MainThreadDisposable, MainThreadScheduler, ScheduleFailure, ScheduleState,
        ScheduledHandle,
    };
}
