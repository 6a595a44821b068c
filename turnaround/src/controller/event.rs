//! The controller's unified notification stream.

use std::time::Duration;

use serde::Serialize;

use crate::coordinator::DomainEvent;
use crate::orchestrator::OperationStatus;
use crate::phase::{OperationalPhase, PhaseTransitionRecord};

/// Every notification the controller republishes, in one ordered stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControllerEvent {
    /// A phase transition was committed.
    PhaseChanged(PhaseTransitionRecord),
    /// A coordinator's state or operation changed.
    DomainStateChanged(DomainEvent),
    /// The orchestrator finished dispatching one domain.
    ServiceStatusChanged(OperationStatus),
    /// A phase timeout expired.
    OperationTimedOut {
        phase: OperationalPhase,
        after: Duration,
    },
}

impl ControllerEvent {
    /// Short tag for log lines and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            ControllerEvent::PhaseChanged(_) => "phase",
            ControllerEvent::DomainStateChanged(_) => "domain",
            ControllerEvent::ServiceStatusChanged(_) => "service",
            ControllerEvent::OperationTimedOut { .. } => "timeout",
        }
    }
}
