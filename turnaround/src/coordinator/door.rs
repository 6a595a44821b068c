//! Door coordinator.
//!
//! Owns the four aircraft doors. Passenger doors follow the phase policy;
//! cargo doors are driven by the cargo coordinator through
//! [`DoorCoordinator::ensure_doors`].

use std::str::FromStr;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
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

/// Aircraft door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Door {
    ForwardLeft,
    AftLeft,
    ForwardCargo,
    AftCargo,
}

impl Door {
    pub const PASSENGER: [Door; 2] = [Door::ForwardLeft, Door::AftLeft];
    pub const CARGO: [Door; 2] = [Door::ForwardCargo, Door::AftCargo];
}

impl FromStr for Door {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Door::all()
            .iter()
            .copied()
            .find(|d| d.name() == normalized)
            .ok_or_else(|| format!("unknown door '{}'", s))
    }
}

impl Entity for Door {
    fn all() -> &'static [Self] {
        &[Door::ForwardLeft, Door::AftLeft, Door::ForwardCargo, Door::AftCargo]
    }

    fn name(&self) -> &'static str {
        match self {
            Door::ForwardLeft => "forward_left",
            Door::AftLeft => "aft_left",
            Door::ForwardCargo => "forward_cargo",
            Door::AftCargo => "aft_cargo",
        }
    }

    fn ground_signal(&self) -> Option<&'static str> {
        Some(match self {
            Door::ForwardLeft => signals::gs::DOOR_FORWARD_LEFT,
            Door::AftLeft => signals::gs::DOOR_AFT_LEFT,
            Door::ForwardCargo => signals::gs::DOOR_FORWARD_CARGO,
            Door::AftCargo => signals::gs::DOOR_AFT_CARGO,
        })
    }

    fn sim_path(&self) -> &'static str {
        match self {
            Door::ForwardLeft => signals::sim::DOOR_FORWARD_LEFT,
            Door::AftLeft => signals::sim::DOOR_AFT_LEFT,
            Door::ForwardCargo => signals::sim::DOOR_FORWARD_CARGO,
            Door::AftCargo => signals::sim::DOOR_AFT_CARGO,
        }
    }
}

/// Coordinator for the door domain.
pub struct DoorCoordinator {
    cell: Arc<DomainCell<Door>>,
    ctx: CoordinatorContext,
    this: Weak<DoorCoordinator>,
}

impl DoorCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Arc<Self> {
        let cell = Arc::new(DomainCell::new(
            Domain::Door,
            ctx.settings.operations.event_capacity,
        ));
        Arc::new_cyclic(|this| Self {
            cell,
            ctx,
            this: this.clone(),
        })
    }

    pub fn is_open(&self, door: Door) -> bool {
        signals::is_set(self.cell.current(door))
    }

    /// Open `door` on a background task. Returns false if the domain is busy.
    pub fn start_open_door(&self, door: Door) -> bool {
        self.start(vec![door], true)
    }

    /// Close `door` on a background task. Returns false if the domain is busy.
    pub fn start_close_door(&self, door: Door) -> bool {
        self.start(vec![door], false)
    }

    pub async fn open_door_async(
        &self,
        door: Door,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.set_doors_async(&[door], true, cancel).await
    }

    pub async fn close_door_async(
        &self,
        door: Door,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.set_doors_async(&[door], false, cancel).await
    }

    /// Open or close several doors as one operation.
    pub async fn set_doors_async(
        &self,
        doors: &[Door],
        open: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        let ticket = self.cell.try_begin(kind_for(open), cancel)?;
        run_discrete(&self.cell, &self.ctx, ticket, doors, open).await
    }

    /// Like [`set_doors_async`](Self::set_doors_async), but waits for the
    /// domain to become idle instead of failing when it is busy.
    pub async fn ensure_doors(
        &self,
        doors: &[Door],
        open: bool,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let attempts = self.ctx.settings.operations.door_retry_attempts.max(1);
        for _ in 0..attempts {
            if doors.iter().all(|d| self.is_open(*d) == open) {
                return Ok(());
            }
            match self.set_doors_async(doors, open, cancel).await {
                Ok(OperationOutcome::Completed) => return Ok(()),
                Ok(OperationOutcome::Stopped { .. }) => return Err(CoordinatorError::Cancelled),
                Err(CoordinatorError::AlreadyInProgress { .. }) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
                        _ = self.cell.wait_idle() => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoordinatorError::AlreadyInProgress {
            domain: Domain::Door,
            active: self.cell.active().unwrap_or(kind_for(open)),
        })
    }

    fn start(&self, doors: Vec<Door>, open: bool) -> bool {
        let (Some(this), Some(runtime)) = (self.this.upgrade(), spawner(Domain::Door)) else {
            return false;
        };
        let Ok(ticket) = self.cell.try_begin(kind_for(open), &self.ctx.shutdown) else {
            return false;
        };
        runtime.spawn(async move { run_discrete(&this.cell, &this.ctx, ticket, &doors, open).await });
        true
    }
}

fn kind_for(open: bool) -> OperationKind {
    if open {
        OperationKind::OpenDoor
    } else {
        OperationKind::CloseDoor
    }
}

impl Coordinator for DoorCoordinator {
    fn domain(&self) -> Domain {
        Domain::Door
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
            match phase {
                OperationalPhase::Departure | OperationalPhase::Arrival => {
                    self.ensure_doors(&[Door::ForwardLeft], true, cancel).await
                }
                OperationalPhase::TaxiOut | OperationalPhase::Flight | OperationalPhase::TaxiIn => {
                    self.ensure_doors(&Door::PASSENGER, false, cancel).await
                }
                OperationalPhase::Preflight | OperationalPhase::Turnaround => Ok(()),
            }
        })
    }

    fn apply_external(&self, change: &SignalChange) -> bool {
        apply_change(&self.cell, change, ValueKind::Discrete)
    }

    fn stop_active<'a>(&'a self) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            self.cell
                .cancel_active(&[OperationKind::OpenDoor, OperationKind::CloseDoor]);
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
    use crate::coordinator::testing::{drain, fixture, wait_until};

    #[tokio::test]
    async fn test_open_writes_ground_then_sim() {
        let f = fixture();
        let doors = DoorCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        let outcome = doors
            .open_door_async(Door::ForwardLeft, &cancel)
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert!(doors.is_open(Door::ForwardLeft));
        assert_eq!(
            f.ground.writes_to(signals::gs::DOOR_FORWARD_LEFT),
            vec![1.0]
        );
        assert_eq!(
            f.aircraft.writes_to(signals::sim::DOOR_FORWARD_LEFT),
            vec![1.0]
        );
        assert_eq!(doors.status().active, None);
    }

    #[tokio::test]
    async fn test_already_open_door_is_not_rewritten() {
        let f = fixture();
        let doors = DoorCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        doors.open_door_async(Door::AftLeft, &cancel).await.unwrap();
        doors.open_door_async(Door::AftLeft, &cancel).await.unwrap();

        assert_eq!(f.ground.writes_to(signals::gs::DOOR_AFT_LEFT).len(), 1);
    }

    #[tokio::test]
    async fn test_sim_failure_rolls_back_ground_write() {
        let f = fixture();
        f.aircraft.fail_key(signals::sim::DOOR_AFT_CARGO);
        let doors = DoorCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        let err = doors
            .open_door_async(Door::AftCargo, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Adapter(_)));
        assert!(!doors.is_open(Door::AftCargo));
        assert_eq!(
            f.ground.writes_to(signals::gs::DOOR_AFT_CARGO),
            vec![1.0, 0.0]
        );
        assert_eq!(doors.status().active, None);
    }

    #[tokio::test]
    async fn test_start_open_door_spawns() {
        let f = fixture();
        let doors = DoorCoordinator::new(f.ctx.clone());

        assert!(doors.start_open_door(Door::ForwardLeft));
        wait_until(|| doors.is_open(Door::ForwardLeft) && doors.status().active.is_none()).await;
    }

    #[tokio::test]
    async fn test_external_change_is_applied() {
        let f = fixture();
        let doors = DoorCoordinator::new(f.ctx.clone());
        let mut rx = doors.subscribe();

        assert!(doors.apply_external(&SignalChange::new(signals::sim::DOOR_AFT_LEFT, 1.0)));
        assert!(!doors.apply_external(&SignalChange::new("sim/unrelated", 1.0)));

        assert!(doors.is_open(Door::AftLeft));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_synchronize_is_idempotent() {
        let f = fixture();
        f.aircraft.set(signals::sim::DOOR_FORWARD_CARGO, 1.0);
        let doors = DoorCoordinator::new(f.ctx.clone());
        let mut rx = doors.subscribe();
        let cancel = CancellationToken::new();

        assert_eq!(doors.synchronize(&cancel).await.unwrap(), 1);
        assert_eq!(doors.synchronize(&cancel).await.unwrap(), 0);
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(doors.is_open(Door::ForwardCargo));
    }

    #[tokio::test]
    async fn test_taxi_out_closes_passenger_doors() {
        let f = fixture();
        let doors = DoorCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();

        doors
            .manage_for_phase(OperationalPhase::Departure, &cancel)
            .await
            .unwrap();
        assert!(doors.is_open(Door::ForwardLeft));

        doors
            .manage_for_phase(OperationalPhase::TaxiOut, &cancel)
            .await
            .unwrap();
        assert!(!doors.is_open(Door::ForwardLeft));
        assert!(!doors.is_open(Door::AftLeft));
    }
}
