//! Testing utilities for code that schedules onto the main context.
//!
//! This module provides:
//! - A disposal probe recording how often, and on which thread, resources
//!   were released
//! - A harness wiring a main loop, gate and scheduler together

mod fixtures;
mod probe;

pub use fixtures::TestHarness;
pub use probe::{DisposalProbe, ProbeResource};
