//! Delayed one-shot scheduling onto the main context.

use super::handle::{JobShared, ScheduleState, ScheduledHandle};
use super::main_disposable::MainThreadDisposable;
use crate::cancellation::Disposable;
use crate::config::SchedulerConfig;
use crate::errors::{panic_message, Result, SchedulerError};
use crate::gate::MainThreadGate;
use crate::observability::SpanTimer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

static GLOBAL_SCHEDULER: OnceLock<MainThreadScheduler> = OnceLock::new();

/// A scheduled action that failed instead of producing its resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleFailure {
    /// Id of the failed job (see [`ScheduledHandle::id`]).
    pub job_id: Uuid,
    /// Rendered error chain or panic message.
    pub message: String,
}

struct SchedulerInner {
    gate: MainThreadGate,
    timers: Handle,
    owned_runtime: Option<Runtime>,
    failures: Mutex<Option<mpsc::UnboundedSender<ScheduleFailure>>>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned_runtime.take() {
            // The last clone may be dropped on one of the runtime's own workers,
            // so the runtime is shut down from a thread outside it.
            let spawned = std::thread::Builder::new()
                .name("main-scheduler-shutdown".to_string())
                .spawn(move || runtime.shutdown_background());
            if let Err(err) = spawned {
                error!(error = %err, "could not spawn timer runtime shutdown thread");
            }
        }
    }
}

/// Schedules delayed work to run on the main context.
///
/// The delay is awaited on a tokio runtime, never on the main context.
/// When it elapses the action runs on the main context through the
/// [`MainThreadGate`], and the resource it returns is released on the main
/// context whenever the returned [`ScheduledHandle`] is disposed.
///
/// ```rust,ignore
/// let handle = scheduler.schedule(state, Duration::from_millis(250), |_, state| {
///     Ok(refresh_view(state))
/// });
/// // later, from any thread
/// handle.dispose();
/// ```
#[derive(Clone)]
pub struct MainThreadScheduler {
    inner: Arc<SchedulerInner>,
}

impl MainThreadScheduler {
    /// Creates a scheduler that waits on the ambient tokio runtime.
    pub fn new(gate: MainThreadGate) -> Result<Self> {
        let timers = Handle::try_current().map_err(|e| SchedulerError::runtime(e.to_string()))?;
        Ok(Self::with_runtime(gate, timers))
    }

    /// Creates a scheduler that waits on the given runtime.
    #[must_use]
    pub fn with_runtime(gate: MainThreadGate, timers: Handle) -> Self {
        Self::from_parts(gate, timers, None)
    }

    /// Creates a scheduler with its own timer runtime.
    pub fn with_config(gate: MainThreadGate, config: &SchedulerConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.timer_worker_threads.max(1))
            .thread_name(config.timer_thread_name.clone())
            .enable_time()
            .build()?;
        let timers = runtime.handle().clone();
        Ok(Self::from_parts(gate, timers, Some(runtime)))
    }

    fn from_parts(gate: MainThreadGate, timers: Handle, owned_runtime: Option<Runtime>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                gate,
                timers,
                owned_runtime,
                failures: Mutex::new(None),
            }),
        }
    }

    /// Installs the process-wide scheduler. Succeeds at most once per process.
    pub fn install(scheduler: Self) -> Result<&'static Self> {
        GLOBAL_SCHEDULER
            .set(scheduler)
            .map_err(|_| SchedulerError::SchedulerAlreadyInstalled)?;
        Self::instance()
    }

    /// Returns the process-wide scheduler.
    pub fn instance() -> Result<&'static Self> {
        GLOBAL_SCHEDULER
            .get()
            .ok_or(SchedulerError::SchedulerNotInstalled)
    }

    /// Returns the gate this scheduler dispatches through.
    #[must_use]
    pub fn gate(&self) -> &MainThreadGate {
        &self.inner.gate
    }

    /// Returns the scheduler's notion of the current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Clamps a signed delay to a non-negative one.
    #[must_use]
    pub fn normalize(due: chrono::Duration) -> Duration {
        due.to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns a channel that receives every future failure: failed or
    /// panicking actions, a closed main context, or a timer runtime that shut
    /// down before the job was due.
    ///
    /// Only the most recent subscriber receives failures.
    pub fn subscribe_failures(&self) -> mpsc::UnboundedReceiver<ScheduleFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.failures.lock() = Some(tx);
        rx
    }

    /// Runs `action(scheduler, state)` on the main context after `due_time`.
    ///
    /// Returns immediately. The action never runs inline, even for a zero
    /// delay. A failing action leaves the handle unassigned, and the failure
    /// is logged, recorded as [`ScheduleState::Faulted`] and sent to the
    /// failure channel.
    pub fn schedule<S, D, F>(&self, state: S, due_time: Duration, action: F) -> ScheduledHandle
    where
        S: Send + 'static,
        D: Disposable + 'static,
        F: FnOnce(&Self, S) -> anyhow::Result<D> + Send + 'static,
    {
        let handle = ScheduledHandle::new(self.inner.gate.clone());
        debug!(
            job_id = %handle.id(),
            due_ms = u64::try_from(due_time.as_millis()).unwrap_or(u64::MAX),
            "scheduling main-thread work"
        );

        let job = handle.shared();
        let scheduler = self.clone();
        self.inner.timers.spawn(async move {
            scheduler.run_job(job, state, due_time, action).await;
        });

        handle
    }

    /// Runs `action` on the main context as soon as possible.
    pub fn schedule_now<S, D, F>(&self, state: S, action: F) -> ScheduledHandle
    where
        S: Send + 'static,
        D: Disposable + 'static,
        F: FnOnce(&Self, S) -> anyhow::Result<D> + Send + 'static,
    {
        self.schedule(state, Duration::ZERO, action)
    }

    /// Runs `action` on the main context at `due_at`; past instants run as
    /// soon as possible.
    pub fn schedule_at<S, D, F>(&self, state: S, due_at: DateTime<Utc>, action: F) -> ScheduledHandle
    where
        S: Send + 'static,
        D: Disposable + 'static,
        F: FnOnce(&Self, S) -> anyhow::Result<D> + Send + 'static,
    {
        let due_time = Self::normalize(due_at - self.now());
        self.schedule(state, due_time, action)
    }

    async fn run_job<S, D, F>(self, job: Arc<JobShared>, state: S, due_time: Duration, action: F)
    where
        S: Send + 'static,
        D: Disposable + 'static,
        F: FnOnce(&Self, S) -> anyhow::Result<D> + Send + 'static,
    {
        let _waiting = PendingGuard {
            scheduler: self.clone(),
            job: Arc::clone(&job),
        };

        tokio::select! {
            biased;
            () = job.token.cancelled() => {
                job.cancel_pending();
                debug!(job_id = %job.id, "delay abandoned, handle disposed");
                return;
            }
            () = tokio::time::sleep(due_time) => {}
        }

        if !job.begin_dispatch() {
            return;
        }

        let scheduler = self.clone();
        let on_main = Arc::clone(&job);
        let outcome = self
            .inner
            .gate
            .run_on_main_async(move || scheduler.run_action(&on_main, state, action))
            .await;

        // The main context refused or discarded the job.
        if let Err(err) = outcome {
            self.report_failure(&job, &err);
        }
    }

    /// Runs on the main context and always settles the job.
    fn run_action<S, D, F>(&self, job: &JobShared, state: S, action: F)
    where
        D: Disposable + 'static,
        F: FnOnce(&Self, S) -> anyhow::Result<D>,
    {
        if job.cell.is_disposed() {
            debug!(job_id = %job.id, "handle disposed before action started");
            job.settle(ScheduleState::Cancelled);
            return;
        }

        let timer = SpanTimer::start("scheduled_action");
        let resource = match panic::catch_unwind(AssertUnwindSafe(|| action(self, state))) {
            Ok(Ok(resource)) => resource,
            Ok(Err(err)) => {
                self.report_failure(job, &SchedulerError::action_failed(format!("{err:#}")));
                return;
            }
            Err(payload) => {
                self.report_failure(job, &SchedulerError::from_panic(&*payload));
                return;
            }
        };
        debug!(job_id = %job.id, duration_ms = timer.finish(), "scheduled action ran");

        // A handle disposed during the action releases the resource right here.
        let wrapped = MainThreadDisposable::new(resource, self.inner.gate.clone());
        let assigned = panic::catch_unwind(AssertUnwindSafe(|| job.cell.assign(Box::new(wrapped))));
        if let Err(payload) = assigned {
            error!(
                job_id = %job.id,
                error = %panic_message(&*payload),
                "releasing resource disposed during its action failed"
            );
            job.hold_release_panic(payload);
        }
        job.settle(ScheduleState::Completed);
    }

    fn report_failure(&self, job: &JobShared, err: &SchedulerError) {
        if job.settle(ScheduleState::Faulted(err.to_string())) {
            self.publish_failure(job, err);
        }
    }

    fn publish_failure(&self, job: &JobShared, err: &SchedulerError) {
        error!(job_id = %job.id, error = %err, "scheduled work failed");

        let sender = self.inner.failures.lock().clone();
        if let Some(sender) = sender {
            let failure = ScheduleFailure {
                job_id: job.id,
                message: err.to_string(),
            };
            if sender.send(failure).is_err() {
                debug!(job_id = %job.id, "failure subscriber went away");
            }
        }
    }
}

/// Faults a job whose timer task is dropped before it was due, so its
/// handle does not wait forever on a runtime that went away.
struct PendingGuard {
    scheduler: MainThreadScheduler,
    job: Arc<JobShared>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let reason = SchedulerError::runtime("timer runtime shut down before the job was due");
        if self.job.fault_pending(reason.to_string()) {
            self.scheduler.publish_failure(&self.job, &reason);
        }
    }
}

impl std::fmt::Debug for MainThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadScheduler")
            .field("gate", &self.inner.gate)
            .field("owns_runtime", &self.inner.owned_runtime.is_some())
            .finish()
    }
}
