//! Cancellation primitives.
//!
//! This module provides:
//! - [`Disposable`], the resource-release abstraction
//! - [`CancellationCell`], a single-assignment disposal-safe container
//! - [`CancellationToken`], an awaitable one-shot cancel signal

mod cell;
mod disposable;
mod token;

pub use cell::{AssignOutcome, CancellationCell, CellStatus};
pub use disposable::{AnonymousDisposable, Disposable};
pub use token::CancellationToken;
