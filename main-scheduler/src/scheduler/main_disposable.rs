//! Routing resource disposal onto the main context.

use crate::cancellation::Disposable;
use crate::gate::MainThreadGate;
use tracing::error;

/// Wraps a resource so that disposing it always runs on the main context.
///
/// Disposal requested from another thread blocks for one main-context round
/// trip. A panic raised by the inner disposal propagates to the caller.
pub struct MainThreadDisposable<D: Disposable + 'static> {
    resource: Option<D>,
    gate: MainThreadGate,
}

impl<D: Disposable + 'static> MainThreadDisposable<D> {
    /// Wraps `resource`, routing its disposal through `gate`.
    pub fn new(resource: D, gate: MainThreadGate) -> Self {
        Self {
            resource: Some(resource),
            gate,
        }
    }

    /// Returns whether disposal has been requested.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.resource.is_none()
    }
}

impl<D: Disposable + 'static> Disposable for MainThreadDisposable<D> {
    fn dispose(&mut self) {
        let Some(mut resource) = self.resource.take() else {
            return;
        };

        if self.gate.is_current_context() {
            resource.dispose();
            return;
        }

        if let Err(err) = self.gate.run_on_main(move || resource.dispose()) {
            error!(error = %err, "main context unavailable; resource dropped without disposal");
        }
    }
}

impl<D: Disposable + 'static> std::fmt::Debug for MainThreadDisposable<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
