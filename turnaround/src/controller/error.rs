//! Controller error types.

use thiserror::Error;

use super::command::ServiceCommand;
use crate::adapter::AdapterError;
use crate::coordinator::CoordinatorError;
use crate::error::ErrorKind;
use crate::phase::PhaseError;

/// Errors returned by the controller facade.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A phase transition or snapshot operation failed.
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// A domain operation failed.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Telemetry could not be read.
    #[error("Telemetry read failed: {0}")]
    Telemetry(#[from] AdapterError),

    /// A stop command found nothing to stop.
    #[error("Nothing to stop for '{0}'")]
    NotRunning(ServiceCommand),

    /// `start` was called outside a tokio runtime.
    #[error("The controller needs a running tokio runtime")]
    NoRuntime,
}

impl ControllerError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Phase(e) => e.kind(),
            Self::Coordinator(e) => e.kind(),
            Self::Telemetry(_) => ErrorKind::AdapterCommunicationFailure,
            Self::NotRunning(_) => ErrorKind::PreconditionNotMet,
            Self::NoRuntime => ErrorKind::Internal,
        }
    }
}
