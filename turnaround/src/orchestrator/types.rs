//! Orchestration outcome types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordinator::{CoordinatorError, Domain};
use crate::error::ErrorKind;
use crate::phase::OperationalPhase;

/// Why a coordinator call failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CoordinatorError> for ServiceFailure {
    fn from(error: &CoordinatorError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one coordinator's phase policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatus {
    pub domain: Domain,
    pub phase: OperationalPhase,
    pub ok: bool,
    pub error: Option<ServiceFailure>,
    pub at: DateTime<Utc>,
}

impl OperationStatus {
    pub fn from_result(
        domain: Domain,
        phase: OperationalPhase,
        result: &Result<(), CoordinatorError>,
    ) -> Self {
        Self {
            domain,
            phase,
            ok: result.is_ok(),
            error: result.as_ref().err().map(ServiceFailure::from),
            at: Utc::now(),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Everything one orchestration pass did.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub phase: OperationalPhase,
    /// Per-domain outcome, in dispatch order.
    pub statuses: Vec<OperationStatus>,
    pub elapsed: Duration,
}

impl PassReport {
    pub fn all_ok(&self) -> bool {
        self.statuses.iter().all(|s| s.ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationStatus> {
        self.statuses.iter().filter(|s| !s.ok)
    }

    pub fn status(&self, domain: Domain) -> Option<&OperationStatus> {
        self.statuses.iter().find(|s| s.domain == domain)
    }
}
