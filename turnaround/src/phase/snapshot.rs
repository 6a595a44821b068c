//! Persisted phase state for session resume.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::PhaseError;
use super::types::{OperationalPhase, PhaseTransitionRecord};

/// Everything needed to resume the state machine: current phase, when it was
/// entered, and the full transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub phase: OperationalPhase,
    pub entered_at: DateTime<Utc>,
    pub history: Vec<PhaseTransitionRecord>,
}

impl PhaseSnapshot {
    /// Encode as JSON into `writer`.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), PhaseError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Decode a snapshot previously written with [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(reader: R) -> Result<Self, PhaseError> {
        Ok(serde_json::from_reader(reader)?)
    }
}
