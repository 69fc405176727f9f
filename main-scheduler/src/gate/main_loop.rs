//! A dedicated OS thread acting as the process main context.

use super::{Job, MainContext};
use crate::config::MainLoopConfig;
use crate::errors::{panic_message, Result, SchedulerError};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error};

enum Message {
    Run(Job),
    Shutdown,
}

#[derive(Debug, Default)]
struct LoopCounters {
    pending: AtomicUsize,
    panicked: AtomicUsize,
}

/// A serial run loop on its own named thread.
///
/// Jobs run in FIFO order. A job that panics is logged and counted; the loop
/// keeps running. Dropping the loop shuts it down after draining queued jobs.
pub struct MainLoop {
    sender: mpsc::UnboundedSender<Message>,
    thread_id: ThreadId,
    thread_name: String,
    max_pending: usize,
    accepting: AtomicBool,
    counters: Arc<LoopCounters>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MainLoop {
    /// Spawns the loop thread.
    pub fn spawn(config: &MainLoopConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(LoopCounters::default());

        let thread = {
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || run_loop(receiver, &counters))?
        };

        debug!(thread = %config.thread_name, "main loop started");

        Ok(Self {
            sender,
            thread_id: thread.thread().id(),
            thread_name: config.thread_name.clone(),
            max_pending: config.max_pending,
            accepting: AtomicBool::new(true),
            counters,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Returns the id of the loop thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns the loop thread's name.
    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Returns whether the loop still accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    /// Returns the number of queued jobs that have not started yet.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.counters.pending.load(Ordering::SeqCst)
    }

    /// Returns how many posted jobs have panicked so far.
    #[must_use]
    pub fn panicked_jobs(&self) -> usize {
        self.counters.panicked.load(Ordering::SeqCst)
    }

    /// Stops accepting work, lets queued jobs finish, then joins the thread.
    ///
    /// Called from the loop thread itself, this only requests the stop.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        // The receiver may already be gone if the thread died.
        let _ = self.sender.send(Message::Shutdown);

        if self.is_current() {
            return;
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(thread = %self.thread_name, "main loop thread panicked");
            }
        }
    }
}

impl MainContext for MainLoop {
    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn post(&self, job: Job) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::ContextClosed);
        }
        if self.max_pending > 0 && self.pending_jobs() >= self.max_pending {
            return Err(SchedulerError::QueueFull {
                capacity: self.max_pending,
            });
        }

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Message::Run(job)).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::ContextClosed);
        }
        Ok(())
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoop")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

fn run_loop(mut receiver: mpsc::UnboundedReceiver<Message>, counters: &LoopCounters) {
    while let Some(message) = receiver.blocking_recv() {
        match message {
            Message::Run(job) => {
                counters.pending.fetch_sub(1, Ordering::SeqCst);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    counters.panicked.fetch_add(1, Ordering::SeqCst);
                    error!(panic = %panic_message(&*payload), "main loop job panicked");
                }
            }
            Message::Shutdown => break,
        }
    }
    debug!("main loop stopped");
}
