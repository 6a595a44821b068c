//! Domain notifications.

use serde::Serialize;

use super::state::{Domain, OperationKind};
use crate::error::ErrorKind;

/// Notification published by a coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DomainEvent {
    /// An entity's observed (or planned) value changed.
    StateChanged {
        domain: Domain,
        entity: &'static str,
        planned: f64,
        current: f64,
    },
    /// An operation claimed the in-progress flag.
    OperationStarted { domain: Domain, kind: OperationKind },
    /// Rate-limited progress of the active operation.
    Progress {
        domain: Domain,
        kind: OperationKind,
        percent: f64,
    },
    /// Target reached; in-progress flag cleared.
    OperationCompleted { domain: Domain, kind: OperationKind },
    /// Stopped or cancelled part-way; in-progress flag cleared.
    OperationStopped {
        domain: Domain,
        kind: OperationKind,
        percent: f64,
    },
    /// Failed; in-progress flag cleared.
    OperationFailed {
        domain: Domain,
        kind: OperationKind,
        error: ErrorKind,
        message: String,
    },
    /// Domain returned to defaults for a new turnaround.
    Reset { domain: Domain },
}

impl DomainEvent {
    pub fn domain(&self) -> Domain {
        match self {
            DomainEvent::StateChanged { domain, .. }
            | DomainEvent::OperationStarted { domain, .. }
            | DomainEvent::Progress { domain, .. }
            | DomainEvent::OperationCompleted { domain, .. }
            | DomainEvent::OperationStopped { domain, .. }
            | DomainEvent::OperationFailed { domain, .. }
            | DomainEvent::Reset { domain } => *domain,
        }
    }

    /// Whether this event ends an operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DomainEvent::OperationCompleted { .. }
                | DomainEvent::OperationStopped { .. }
                | DomainEvent::OperationFailed { .. }
        )
    }
}

/// How an operation ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperationOutcome {
    /// Target reached (or was already satisfied).
    Completed,
    /// Stopped or cancelled at `percent`.
    Stopped { percent: f64 },
}

impl OperationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, OperationOutcome::Completed)
    }
}
