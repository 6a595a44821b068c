//! Folding simulator ground truth into domain state.

use tokio_util::sync::CancellationToken;

use super::error::CoordinatorError;
use super::operation::DomainCell;
use super::state::Entity;
use crate::adapter::{signals, AircraftSystemsAdapter, SignalChange};

/// How raw engine values map onto entity values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueKind {
    /// Open/closed, connected/disconnected.
    Discrete,
    /// Counts and masses.
    Quantity,
}

impl ValueKind {
    fn normalize(&self, raw: f64) -> f64 {
        match self {
            ValueKind::Discrete => signals::flag(signals::is_set(raw)),
            ValueKind::Quantity => raw.max(0.0),
        }
    }
}

/// Re-read every entity's simulator path and update observed values.
///
/// Idempotent: with no external change in between, a second call changes
/// nothing and publishes nothing. Returns the number of entities updated.
pub(crate) async fn synchronize_from_sim<E: Entity>(
    cell: &DomainCell<E>,
    aircraft: &dyn AircraftSystemsAdapter,
    kind: ValueKind,
    cancel: &CancellationToken,
) -> Result<usize, CoordinatorError> {
    let mut changed = 0;
    for entity in E::all() {
        if cancel.is_cancelled() {
            return Err(CoordinatorError::Cancelled);
        }
        let raw = aircraft.get_value(entity.sim_path()).await?;
        if cell.set_current(*entity, kind.normalize(raw)) {
            tracing::debug!(
                domain = %cell.domain(),
                entity = entity.name(),
                value = raw,
                "Reconciled from simulator"
            );
            changed += 1;
        }
    }
    Ok(changed)
}

/// Apply an unsolicited change if it belongs to this domain.
///
/// Matches both the simulator path and the ground-services signal of each
/// entity. Returns whether the key belonged to this domain.
pub(crate) fn apply_change<E: Entity>(
    cell: &DomainCell<E>,
    change: &SignalChange,
    kind: ValueKind,
) -> bool {
    let Some(entity) = E::all().iter().find(|e| {
        e.sim_path() == change.key || e.ground_signal() == Some(change.key.as_str())
    }) else {
        return false;
    };

    if cell.set_current(*entity, kind.normalize(change.value)) {
        tracing::info!(
            domain = %cell.domain(),
            entity = entity.name(),
            key = %change.key,
            value = change.value,
            "External state change applied"
        );
    }
    true
}
