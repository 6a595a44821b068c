//! Crate-wide error taxonomy.
//!
//! Each module owns its own error enum; [`ErrorKind`] is the shared,
//! caller-facing classification every one of them maps onto. Service status
//! notifications carry an `ErrorKind` so that consumers (GUI, logging, ACARS)
//! can react without depending on module-specific error types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every failure the controller can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The requested phase edge is not part of the allowed cycle.
    ///
    /// Always rejected, never worth retrying.
    InvalidTransition,
    /// A phase transition was blocked by the current telemetry.
    ///
    /// Retry once conditions change.
    PreconditionNotMet,
    /// A re-entrancy guard tripped (operation or transition already running).
    OperationAlreadyInProgress,
    /// A read or write against an external engine failed.
    ///
    /// Domain state is left unchanged and the call is safe to retry.
    AdapterCommunicationFailure,
    /// A phase or coordinator timeout fired.
    OperationTimedOut,
    /// The operation was cancelled before it could finish.
    Cancelled,
    /// Anything else (persistence, configuration, wiring).
    Internal,
}

impl ErrorKind {
    /// Whether a caller may reasonably retry after this kind of failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::InvalidTransition | ErrorKind::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidTransition => "invalid transition",
            ErrorKind::PreconditionNotMet => "precondition not met",
            ErrorKind::OperationAlreadyInProgress => "operation already in progress",
            ErrorKind::AdapterCommunicationFailure => "adapter communication failure",
            ErrorKind::OperationTimedOut => "operation timed out",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_is_not_retryable() {
        assert!(!ErrorKind::InvalidTransition.is_retryable());
        assert!(ErrorKind::PreconditionNotMet.is_retryable());
        assert!(ErrorKind::AdapterCommunicationFailure.is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorKind::OperationAlreadyInProgress.to_string(),
            "operation already in progress"
        );
    }
}
