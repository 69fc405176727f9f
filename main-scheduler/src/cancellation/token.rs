//! Cancellation signal for abandoning a pending delay.
//!
//! Disposing a handle cancels its token; the background job races the token
//! against the delay and never dispatches once it has been cancelled.

pub use tokio_util::sync::CancellationToken;
