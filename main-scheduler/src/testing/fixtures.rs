//! Test fixtures wiring a main loop to a scheduler.

use crate::config::MainLoopConfig;
use crate::errors::Result;
use crate::gate::{MainLoop, MainThreadGate};
use crate::scheduler::MainThreadScheduler;
use std::sync::Arc;
use std::thread::ThreadId;

/// A private main loop, its gate, and a scheduler on the ambient runtime.
///
/// Unlike the process-wide installation, each harness owns its own main
/// loop, so tests can run in parallel.
#[derive(Debug)]
pub struct TestHarness {
    /// The main loop backing the gate.
    pub main_loop: Arc<MainLoop>,
    /// Gate over [`main_loop`](Self::main_loop).
    pub gate: MainThreadGate,
    /// Scheduler dispatching through [`gate`](Self::gate).
    pub scheduler: MainThreadScheduler,
}

impl TestHarness {
    /// Builds a harness. Must be called from within a tokio runtime.
    pub fn new(thread_name: &str) -> Result<Self> {
        let main_loop = Arc::new(MainLoop::spawn(
            &MainLoopConfig::new().with_thread_name(thread_name),
        )?);
        let gate = MainThreadGate::from_main_loop(Arc::clone(&main_loop));
        let scheduler = MainThreadScheduler::new(gate.clone())?;
        Ok(Self {
            main_loop,
            gate,
            scheduler,
        })
    }

    /// Id of the main loop thread.
    #[must_use]
    pub fn main_thread_id(&self) -> ThreadId {
        self.main_loop.thread_id()
    }
}
