//! Logging setup and timing helpers.

mod subscriber;
mod timing;

pub use subscriber::init_tracing;
pub use timing::SpanTimer;
