//! Ground equipment coordinator.
//!
//! Connects ground equipment at the gate and disconnects it before the
//! aircraft moves. Items connect chocks first and disconnect them last.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::discrete::run_discrete;
use super::error::CoordinatorError;
use super::event::{DomainEvent, OperationOutcome};
use super::operation::DomainCell;
use super::reconcile::{apply_change, synchronize_from_sim, ValueKind};
use super::state::{Domain, DomainStatus, Entity, OperationKind};
use super::{spawner, Coordinator, CoordinatorContext, CoordinatorFuture};
use crate::adapter::{signals, SignalChange};
use crate::phase::OperationalPhase;

/// Item of ground equipment, in connection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EquipmentItem {
    Chocks,
    GroundPower,
    PreconditionedAir,
    Jetway,
}

impl Entity for EquipmentItem {
    fn all() -> &'static [Self] {
        &[
            EquipmentItem::Chocks,
            EquipmentItem::GroundPower,
            EquipmentItem::PreconditionedAir,
            EquipmentItem::Jetway,
        ]
    }

    fn name(&self) -> &'static str {
        match self {
            EquipmentItem::Chocks => "chocks",
            EquipmentItem::GroundPower => "ground_power",
            EquipmentItem::PreconditionedAir => "preconditioned_air",
            EquipmentItem::Jetway => "jetway",
        }
    }

    fn ground_signal(&self) -> Option<&'static str> {
        Some(match self {
            EquipmentItem::Chocks => signals::gs::CHOCKS,
            EquipmentItem::GroundPower => signals::gs::GROUND_POWER,
            EquipmentItem::PreconditionedAir => signals::gs::PRECONDITIONED_AIR,
            EquipmentItem::Jetway => signals::gs::JETWAY,
        })
    }

    fn sim_path(&self) -> &'static str {
        match self {
            EquipmentItem::Chocks => signals::sim::CHOCKS,
            EquipmentItem::GroundPower => signals::sim::GROUND_POWER,
            EquipmentItem::PreconditionedAir => signals::sim::PRECONDITIONED_AIR,
            EquipmentItem::Jetway => signals::sim::JETWAY,
        }
    }
}

fn disconnect_order() -> Vec<EquipmentItem> {
    EquipmentItem::all().iter().rev().copied().collect()
}

/// Coordinator for the equipment domain.
pub struct EquipmentCoordinator {
    cell: Arc<DomainCell<EquipmentItem>>,
    ctx: CoordinatorContext,
    this: Weak<EquipmentCoordinator>,
}

impl EquipmentCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Arc<Self> {
        let cell = Arc::new(DomainCell::new(
            Domain::Equipment,
            ctx.settings.operations.event_capacity,
        ));
        Arc::new_cyclic(|this| Self {
            cell,
            ctx,
            this: this.clone(),
        })
    }

    pub fn is_connected(&self, item: EquipmentItem) -> bool {
        signals::is_set(self.cell.current(item))
    }

    /// Whether any item is still attached to the aircraft.
    pub fn any_connected(&self) -> bool {
        EquipmentItem::all().iter().any(|i| self.is_connected(*i))
    }

    pub fn start_connect(&self) -> bool {
        self.start(EquipmentItem::all().to_vec(), true)
    }

    pub fn start_disconnect(&self) -> bool {
        self.start(disconnect_order(), false)
    }

    pub async fn connect_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.set_items_async(EquipmentItem::all(), true, cancel).await
    }

    pub async fn disconnect_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.set_items_async(&disconnect_order(), false, cancel).await
    }

    /// Connect or disconnect a subset of items, in the order given.
    pub async fn set_items_async(
        &self,
        items: &[EquipmentItem],
        connect: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        let ticket = self.cell.try_begin(kind_for(connect), cancel)?;
        run_discrete(&self.cell, &self.ctx, ticket, items, connect).await
    }

    fn start(&self, items: Vec<EquipmentItem>, connect: bool) -> bool {
        let (Some(this), Some(runtime)) = (self.this.upgrade(), spawner(Domain::Equipment)) else {
            return false;
        };
        let Ok(ticket) = self.cell.try_begin(kind_for(connect), &self.ctx.shutdown) else {
            return false;
        };
        runtime.spawn(async move { run_discrete(&this.cell, &this.ctx, ticket, &items, connect).await });
        true
    }
}

fn kind_for(connect: bool) -> OperationKind {
    if connect {
        OperationKind::Connect
    } else {
        OperationKind::Disconnect
    }
}

impl Coordinator for EquipmentCoordinator {
    fn domain(&self) -> Domain {
        Domain::Equipment
    }

    fn synchronize<'a>(&'a self, cancel: &'a CancellationToken) -> CoordinatorFuture<'a, usize> {
        Box::pin(synchronize_from_sim(
            &self.cell,
            self.ctx.aircraft.as_ref(),
            ValueKind::Discrete,
            cancel,
        ))
    }

    fn manage_for_phase<'a>(
        &'a self,
        phase: OperationalPhase,
        cancel: &'a CancellationToken,
    ) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            let outcome = if phase.is_at_gate() {
                self.connect_async(cancel).await?
            } else {
                // Anything still connecting is superseded
                self.cell.cancel_active(&[OperationKind::Connect]);
                self.cell.wait_idle().await;
                self.disconnect_async(cancel).await?
            };
            match outcome {
                OperationOutcome::Completed => Ok(()),
                OperationOutcome::Stopped { .. } => Err(CoordinatorError::Cancelled),
            }
        })
    }

    fn apply_external(&self, change: &SignalChange) -> bool {
        apply_change(&self.cell, change, ValueKind::Discrete)
    }

    fn stop_active<'a>(&'a self) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            self.cell
                .cancel_active(&[OperationKind::Connect, OperationKind::Disconnect]);
            self.cell.wait_idle().await;
            Ok(())
        })
    }

    fn reset(&self) {
        self.cell.reset();
    }

    fn status(&self) -> DomainStatus {
        self.cell.status()
    }

    fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.cell.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::testing::fixture;

    #[tokio::test]
    async fn test_connect_order_and_disconnect_reverse() {
        let f = fixture();
        let equipment = EquipmentCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        equipment.connect_async(&cancel).await.unwrap();
        assert!(EquipmentItem::all()
            .iter()
            .all(|i| equipment.is_connected(*i)));

        equipment.disconnect_async(&cancel).await.unwrap();
        assert!(!equipment.any_connected());

        let ground_keys: Vec<String> = f.ground.writes().into_iter().map(|(k, _)| k).collect();
        assert_eq!(ground_keys.first().map(String::as_str), Some(signals::gs::CHOCKS));
        assert_eq!(ground_keys.last().map(String::as_str), Some(signals::gs::CHOCKS));
        assert_eq!(ground_keys[4], signals::gs::JETWAY);
    }

    #[tokio::test]
    async fn test_phase_policy() {
        let f = fixture();
        let equipment = EquipmentCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        equipment
            .manage_for_phase(OperationalPhase::Arrival, &cancel)
            .await
            .unwrap();
        assert!(equipment.is_connected(EquipmentItem::Jetway));

        equipment
            .manage_for_phase(OperationalPhase::TaxiIn, &cancel)
            .await
            .unwrap();
        assert!(!equipment.any_connected());
    }

    #[tokio::test]
    async fn test_adapter_failure_leaves_item_state() {
        let f = fixture();
        f.ground.fail_key(signals::gs::GROUND_POWER);
        let equipment = EquipmentCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        let err = equipment.connect_async(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AdapterCommunicationFailure);

        // Chocks went in before the failure, GPU did not
        assert!(equipment.is_connected(EquipmentItem::Chocks));
        assert!(!equipment.is_connected(EquipmentItem::GroundPower));
        assert_eq!(equipment.status().active, None);

        // Retry after the engine recovers
        f.ground.heal_key(signals::gs::GROUND_POWER);
        equipment.connect_async(&cancel).await.unwrap();
        assert!(equipment.is_connected(EquipmentItem::Jetway));
    }

    #[tokio::test]
    async fn test_concurrent_start_only_one_wins() {
        let f = fixture();
        let equipment = EquipmentCoordinator::new(f.ctx.clone());

        let first = equipment.start_connect();
        let second = equipment.start_disconnect();
        assert!(first);
        assert!(!second);
    }
}
