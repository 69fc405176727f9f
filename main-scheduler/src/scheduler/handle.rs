//! The cancellation handle returned by scheduling.

use crate::cancellation::{CancellationCell, CancellationToken, Disposable};
use crate::gate::MainThreadGate;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleState {
    /// Waiting for the due time.
    Pending,
    /// Handed to the main context; the action may be running.
    Dispatched,
    /// The action ran and its resource was stored (or released, if the
    /// handle was disposed meanwhile).
    Completed,
    /// Disposed before the action ran; the action will never run.
    Cancelled,
    /// The action failed or the main context was unavailable.
    Faulted(String),
}

impl ScheduleState {
    /// Returns true once the job can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Faulted(_))
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Faulted(message) => write!(f, "faulted: {message}"),
        }
    }
}

/// State shared between a handle and its background job.
pub(crate) struct JobShared {
    pub(crate) id: Uuid,
    pub(crate) cell: CancellationCell<Box<dyn Disposable>>,
    pub(crate) token: CancellationToken,
    state: watch::Sender<ScheduleState>,
    gate: MainThreadGate,
    /// Panic from releasing a resource that was disposed while its action ran.
    release_panic: Mutex<Option<Box<dyn Any + Send>>>,
}

impl JobShared {
    pub(crate) fn new(gate: MainThreadGate) -> Self {
        let (state, _) = watch::channel(ScheduleState::Pending);
        Self {
            id: Uuid::new_v4(),
            cell: CancellationCell::new(),
            token: CancellationToken::new(),
            state,
            gate,
            release_panic: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ScheduleState {
        self.state.borrow().clone()
    }

    /// `Pending → Dispatched`. Returns false if the job was cancelled first.
    pub(crate) fn begin_dispatch(&self) -> bool {
        self.transition_from_pending(ScheduleState::Dispatched)
    }

    /// `Pending → Cancelled`. Returns false if the job had left `Pending`.
    pub(crate) fn cancel_pending(&self) -> bool {
        self.transition_from_pending(ScheduleState::Cancelled)
    }

    /// Records a terminal state unless one is already recorded. Returns true
    /// if this call settled the job.
    pub(crate) fn settle(&self, terminal: ScheduleState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = terminal;
                true
            }
        })
    }

    /// `Pending → Faulted`. Returns false if the job had left `Pending`.
    pub(crate) fn fault_pending(&self, message: String) -> bool {
        self.transition_from_pending(ScheduleState::Faulted(message))
    }

    /// Keeps a release panic for the disposer waiting on the in-flight action.
    /// Must be called before the job settles.
    pub(crate) fn hold_release_panic(&self, payload: Box<dyn Any + Send>) {
        *self.release_panic.lock() = Some(payload);
    }

    fn transition_from_pending(&self, next: ScheduleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ScheduleState::Pending {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn dispose(&self) {
        if !self.cell.dispose() {
            return;
        }
        self.token.cancel();

        if self.cancel_pending() {
            debug!(job_id = %self.id, "scheduled work cancelled before dispatch");
            return;
        }

        let in_flight = self.state() == ScheduleState::Dispatched;
        if in_flight && !self.gate.is_current_context() {
            // The main context is serial: once this barrier runs, the in-flight
            // action has returned and its resource has been released.
            if let Err(err) = self.gate.run_on_main(|| ()) {
                debug!(job_id = %self.id, error = %err, "could not wait for in-flight action");
            }
        }

        let release_panic = self.release_panic.lock().take();
        if let Some(payload) = release_panic {
            panic::resume_unwind(payload);
        }
    }
}

/// Caller-facing cancellation handle for one scheduled job.
///
/// Cloning yields another handle to the same job. Dropping a handle does not
/// cancel anything; call [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct ScheduledHandle {
    shared: Arc<JobShared>,
}

impl ScheduledHandle {
    pub(crate) fn new(gate: MainThreadGate) -> Self {
        Self {
            shared: Arc::new(JobShared::new(gate)),
        }
    }

    pub(crate) fn shared(&self) -> Arc<JobShared> {
        Arc::clone(&self.shared)
    }

    /// Returns the job id used in logs and failure reports.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Cancels the job or releases the resource it produced.
    ///
    /// Safe from any thread and idempotent. Before the due time this
    /// guarantees the action never runs. If the action is running on the main
    /// context, this waits for it to return and releases its resource. A
    /// produced resource is always released on the main context. A panic from
    /// the resource's own release logic propagates to the caller.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// Returns whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.cell.is_disposed()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScheduleState {
        self.shared.state()
    }

    /// Waits until the job reaches a terminal state and returns it.
    pub async fn completion(&self) -> ScheduleState {
        let mut receiver = self.shared.state.subscribe();
        let settled = match receiver.wait_for(ScheduleState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }
}

impl Disposable for ScheduledHandle {
    fn dispose(&mut self) {
        self.shared.dispose();
    }
}

impl fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("cell", &self.shared.cell)
            .finish()
    }
}
