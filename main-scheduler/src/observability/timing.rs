//! Timing helper for logging how long main-context work takes.

use std::time::Instant;

/// Measures one named piece of main-context work.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts timing `name`.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Stops the timer, logs the span at trace level and returns the
    /// elapsed milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::trace!(span_name = self.name, duration_ms = elapsed, "span finished");
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reports_elapsed_time() {
        let timer = SpanTimer::start("main_work");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.finish() >= 10.0);
    }
}
