//! The main execution context and the gate that marshals work onto it.
//!
//! This module provides:
//! - [`MainContext`], the seam over "the one designated thread"
//! - [`MainLoop`], a dedicated-thread implementation of it
//! - [`MainThreadGate`], the process-wide entry point with inline
//!   execution when the caller is already on the main context

mod context;
mod main_gate;
mod main_loop;

#[cfg(test)]
pub(crate) use context::MockMainContext;
pub use context::{Job, MainContext};
pub use main_gate::MainThreadGate;
pub use main_loop::MainLoop;
