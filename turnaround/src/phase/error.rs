//! Error types for the phase state machine.

use std::io;
use thiserror::Error;

use super::types::OperationalPhase;
use crate::error::ErrorKind;

/// Errors returned by phase transitions and snapshot persistence.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// The requested edge is not part of the fixed cycle and no conditional
    /// transition authorizes it.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: OperationalPhase,
        to: OperationalPhase,
    },

    /// The edge is legal but telemetry blocks it.
    #[error("Cannot transition from {from} to {to}: {reason}")]
    PreconditionNotMet {
        from: OperationalPhase,
        to: OperationalPhase,
        reason: String,
    },

    /// Another transition is being committed (or hooks are still running).
    #[error("A phase transition is already in progress")]
    TransitionInProgress,

    /// Snapshot could not be encoded or decoded.
    #[error("Phase snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Snapshot sink or source failed.
    #[error("Phase snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl PhaseError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::PreconditionNotMet { .. } => ErrorKind::PreconditionNotMet,
            Self::TransitionInProgress => ErrorKind::OperationAlreadyInProgress,
            Self::Snapshot(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Short diagnostic suitable for the `(ok, reason)` style of reporting.
    ///
    /// For precondition failures this is just the unmet condition, e.g.
    /// `"flight plan not loaded"`.
    pub fn reason(&self) -> String {
        match self {
            Self::PreconditionNotMet { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let e = PhaseError::InvalidTransition {
            from: OperationalPhase::Flight,
            to: OperationalPhase::Departure,
        };
        assert_eq!(e.kind(), ErrorKind::InvalidTransition);
        assert_eq!(
            PhaseError::TransitionInProgress.kind(),
            ErrorKind::OperationAlreadyInProgress
        );
    }

    #[test]
    fn test_reason_is_bare_condition() {
        let e = PhaseError::PreconditionNotMet {
            from: OperationalPhase::Preflight,
            to: OperationalPhase::Departure,
            reason: "flight plan not loaded".to_string(),
        };
        assert_eq!(e.reason(), "flight plan not loaded");
        assert!(e.to_string().contains("Preflight"));
    }
}
