//! Error types for external adapters.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur when talking to an external engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// Read or write against a signal failed.
    #[error("Communication failure on '{key}': {reason}")]
    Communication { key: String, reason: String },

    /// The engine does not know the signal.
    #[error("Unknown signal '{0}'")]
    UnknownKey(String),

    /// The engine connection is gone.
    #[error("Adapter disconnected")]
    Disconnected,
}

impl AdapterError {
    /// Convenience constructor for communication failures.
    pub fn communication(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Communication {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Every adapter failure maps to the same caller-facing kind.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::AdapterCommunicationFailure
    }
}
