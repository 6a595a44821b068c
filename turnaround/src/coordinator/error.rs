//! Error types for domain coordinators.

use thiserror::Error;

use super::state::{Domain, OperationKind};
use crate::adapter::AdapterError;
use crate::error::ErrorKind;

/// Errors returned by coordinator operations.
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    /// The domain's in-progress flag is already held.
    #[error("{domain} is busy with {active}")]
    AlreadyInProgress {
        domain: Domain,
        active: OperationKind,
    },

    /// An adapter write or read failed; domain state was left unchanged.
    #[error("Adapter failure: {0}")]
    Adapter(#[from] AdapterError),

    /// Progress sampling failed too many times in a row.
    #[error("{kind} abandoned after {failures} consecutive sample failures: {last}")]
    SampleFailures {
        kind: OperationKind,
        failures: u32,
        last: AdapterError,
    },

    /// The operation was cancelled before it could start.
    #[error("Operation cancelled")]
    Cancelled,

    /// A peer coordinator has not been wired in.
    #[error("{0} coordinator not available")]
    PeerUnavailable(Domain),

    /// A coordinator call exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl CoordinatorError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInProgress { .. } => ErrorKind::OperationAlreadyInProgress,
            Self::Adapter(_) | Self::SampleFailures { .. } => ErrorKind::AdapterCommunicationFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::PeerUnavailable(_) => ErrorKind::Internal,
            Self::Timeout(_) => ErrorKind::OperationTimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let busy = CoordinatorError::AlreadyInProgress {
            domain: Domain::Passenger,
            active: OperationKind::Boarding,
        };
        assert_eq!(busy.kind(), ErrorKind::OperationAlreadyInProgress);
        assert_eq!(busy.to_string(), "Passenger is busy with boarding");

        let adapter: CoordinatorError = AdapterError::Disconnected.into();
        assert_eq!(adapter.kind(), ErrorKind::AdapterCommunicationFailure);
    }
}
