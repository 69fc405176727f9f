//! Configuration types for the main loop, the scheduler and logging.

use crate::errors::Result;
use serde::{Deserialize, Serialize};

/// Configuration for a dedicated [`MainLoop`](crate::gate::MainLoop) thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainLoopConfig {
    /// Name given to the main loop's OS thread.
    #[serde(default = "default_main_thread_name")]
    pub thread_name: String,
    /// Soft bound on queued jobs. Zero means unbounded.
    #[serde(default)]
    pub max_pending: usize,
}

fn default_main_thread_name() -> String {
    "main-loop".to_string()
}

impl Default for MainLoopConfig {
    fn default() -> Self {
        Self {
            thread_name: default_main_thread_name(),
            max_pending: 0,
        }
    }
}

impl MainLoopConfig {
    /// Creates a new main loop configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the queue bound.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Configuration for a scheduler that owns its own timer runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker threads driving delay waits.
    #[serde(default = "default_timer_worker_threads")]
    pub timer_worker_threads: usize,
    /// Name prefix for timer worker threads.
    #[serde(default = "default_timer_thread_name")]
    pub timer_thread_name: String,
}

fn default_timer_worker_threads() -> usize {
    1
}

fn default_timer_thread_name() -> String {
    "main-scheduler-timer".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timer_worker_threads: default_timer_worker_threads(),
            timer_thread_name: default_timer_thread_name(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new scheduler configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of timer worker threads (at least one).
    #[must_use]
    pub fn with_timer_worker_threads(mut self, threads: usize) -> Self {
        self.timer_worker_threads = threads.max(1);
        self
    }

    /// Sets the timer thread name.
    #[must_use]
    pub fn with_timer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.timer_thread_name = name.into();
        self
    }

    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Configuration for the `tracing` subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "main_scheduler=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a new logging configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enables or disables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
