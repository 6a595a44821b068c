//! Open/close and connect/disconnect runs shared by doors and equipment.

use super::error::CoordinatorError;
use super::event::OperationOutcome;
use super::operation::{DomainCell, OperationTicket};
use super::state::Entity;
use super::CoordinatorContext;
use crate::adapter::{signals, AdapterError};

/// Drive one entity to `on` on both engines: ground services first, then
/// the simulator.
///
/// If the simulator write fails the ground-services write is rolled back
/// (best effort) so the two engines do not disagree.
pub(crate) async fn actuate<E: Entity>(
    ctx: &CoordinatorContext,
    entity: E,
    on: bool,
) -> Result<(), AdapterError> {
    let value = signals::flag(on);

    if let Some(signal) = entity.ground_signal() {
        ctx.ground.write_discrete(signal, value).await?;
    }

    if let Err(e) = ctx.aircraft.set_value(entity.sim_path(), value).await {
        if let Some(signal) = entity.ground_signal() {
            if let Err(rollback) = ctx.ground.write_discrete(signal, signals::flag(!on)).await {
                tracing::warn!(
                    entity = entity.name(),
                    error = %rollback,
                    "Rollback of ground-services write failed"
                );
            }
        }
        return Err(e);
    }
    Ok(())
}

/// Move each of `entities` to `on`, in order, skipping ones already there.
///
/// Cancellation is checked between entities; entities already moved keep
/// their new value.
pub(crate) async fn run_discrete<E: Entity>(
    cell: &DomainCell<E>,
    ctx: &CoordinatorContext,
    ticket: OperationTicket<E>,
    entities: &[E],
    on: bool,
) -> Result<OperationOutcome, CoordinatorError> {
    let target = signals::flag(on);
    let pending: Vec<E> = entities
        .iter()
        .copied()
        .filter(|e| cell.current(*e) != target)
        .collect();
    let total = pending.len();

    for (done, entity) in pending.into_iter().enumerate() {
        if ticket.is_cancelled() {
            let percent = done as f64 / total as f64 * 100.0;
            return Ok(ticket.stopped(percent));
        }
        if let Err(e) = actuate(ctx, entity, on).await {
            return Err(ticket.failed(e.into()));
        }
        cell.set_current(entity, target);
    }

    Ok(ticket.complete())
}
