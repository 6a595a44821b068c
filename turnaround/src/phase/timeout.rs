//! Phase-scoped timeouts.
//!
//! A timeout is registered against the phase that is current at registration
//! time and the state machine's transition epoch. Any committed transition
//! (or snapshot restore) bumps the epoch and cancels every pending
//! registration, so a callback only ever fires while the machine is still in
//! the exact phase visit it was armed for.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::types::OperationalPhase;

/// Callback invoked with the phase the timeout was armed in.
pub type TimeoutCallback = Box<dyn FnOnce(OperationalPhase) + Send + 'static>;

/// Handle returned by `set_timeout`; cancels the registration when asked.
///
/// Dropping the handle does NOT cancel the timeout.
#[derive(Debug, Clone)]
pub struct TimeoutHandle {
    id: u64,
    phase: OperationalPhase,
    token: CancellationToken,
}

impl TimeoutHandle {
    pub(crate) fn new(id: u64, phase: OperationalPhase, token: CancellationToken) -> Self {
        Self { id, phase, token }
    }

    /// Handle for a registration that will never fire (no async runtime).
    pub(crate) fn inert(phase: OperationalPhase) -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { id: 0, phase, token }
    }

    /// Cancel the timeout. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the timeout was cancelled explicitly or voided by a phase change.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Phase the timeout is scoped to.
    pub fn phase(&self) -> OperationalPhase {
        self.phase
    }

    /// Registration id (0 for inert handles).
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Registration owned by the state machine.
#[derive(Debug)]
pub(crate) struct PendingTimeout {
    pub phase: OperationalPhase,
    pub epoch: u64,
    pub duration: Duration,
    pub token: CancellationToken,
}

impl PendingTimeout {
    /// Whether this registration is still valid for the given phase visit.
    pub fn is_live(&self, phase: OperationalPhase, epoch: u64) -> bool {
        !self.token.is_cancelled() && self.phase == phase && self.epoch == epoch
    }
}
