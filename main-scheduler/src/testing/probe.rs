//! Disposal probe.

use crate::cancellation::Disposable;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

#[derive(Debug, Default)]
struct ProbeLog {
    disposals: AtomicUsize,
    threads: Mutex<Vec<ThreadId>>,
}

/// Records every disposal of the resources it hands out.
#[derive(Debug, Clone, Default)]
pub struct DisposalProbe {
    log: Arc<ProbeLog>,
}

impl DisposalProbe {
    /// Creates an empty probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a resource that reports its disposal to this probe.
    #[must_use]
    pub fn resource(&self) -> ProbeResource {
        ProbeResource {
            log: Arc::clone(&self.log),
            delay: None,
        }
    }

    /// Returns a resource whose disposal blocks for `delay` first.
    #[must_use]
    pub fn slow_resource(&self, delay: Duration) -> ProbeResource {
        ProbeResource {
            log: Arc::clone(&self.log),
            delay: Some(delay),
        }
    }

    /// Number of disposals observed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.log.disposals.load(Ordering::SeqCst)
    }

    /// Threads on which disposals ran, in order.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        self.log.threads.lock().clone()
    }
}

/// A resource handed out by [`DisposalProbe`].
#[derive(Debug)]
pub struct ProbeResource {
    log: Arc<ProbeLog>,
    delay: Option<Duration>,
}

impl Disposable for ProbeResource {
    fn dispose(&mut self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.log.threads.lock().push(thread::current().id());
        self.log.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_records_disposal_thread() {
        let probe = DisposalProbe::new();
        let mut resource = probe.resource();

        resource.dispose();

        assert_eq!(probe.count(), 1);
        assert_eq!(probe.threads(), vec![thread::current().id()]);
    }
}
