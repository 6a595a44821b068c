//! Cargo coordinator.
//!
//! Loads and unloads the forward and aft holds. Cargo doors are never
//! actuated directly: the coordinator asks its late-bound
//! [`DoorCoordinator`] peer to open them before the loaders start and to
//! close them once the run completes.

use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::door::{Door, DoorCoordinator};
use super::error::CoordinatorError;
use super::event::{DomainEvent, OperationOutcome};
use super::operation::{DomainCell, OperationTicket};
use super::progress::{best_effort, Begun, Progress, ProgressSource, TrackedRun};
use super::reconcile::{apply_change, synchronize_from_sim, ValueKind};
use super::settings::OperationSettings;
use super::state::{Domain, DomainStatus, Entity, OperationKind};
use super::{spawner, Coordinator, CoordinatorContext, CoordinatorFuture};
use crate::adapter::{signals, AdapterFuture, FlightPlan, SignalChange};
use crate::phase::OperationalPhase;

/// Cargo hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hold {
    ForwardHold,
    AftHold,
}

impl Entity for Hold {
    fn all() -> &'static [Self] {
        &[Hold::ForwardHold, Hold::AftHold]
    }

    fn name(&self) -> &'static str {
        match self {
            Hold::ForwardHold => "forward_hold",
            Hold::AftHold => "aft_hold",
        }
    }

    fn ground_signal(&self) -> Option<&'static str> {
        None
    }

    fn sim_path(&self) -> &'static str {
        match self {
            Hold::ForwardHold => signals::sim::CARGO_FORWARD_KG,
            Hold::AftHold => signals::sim::CARGO_AFT_KG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HoldPair {
    forward: f64,
    aft: f64,
}

impl HoldPair {
    fn total(&self) -> f64 {
        self.forward + self.aft
    }

    fn lerp(&self, to: HoldPair, percent: f64) -> HoldPair {
        let t = percent / 100.0;
        HoldPair {
            forward: self.forward + (to.forward - self.forward) * t,
            aft: self.aft + (to.aft - self.aft) * t,
        }
    }
}

/// One loading or unloading run.
struct CargoFlow {
    cell: Arc<DomainCell<Hold>>,
    ctx: CoordinatorContext,
    doors: Arc<DoorCoordinator>,
    loading: bool,
    start: HoldPair,
    target: HoldPair,
}

impl CargoFlow {
    fn state_signal(&self) -> &'static str {
        if self.loading {
            signals::gs::CARGO_LOADING_STATE
        } else {
            signals::gs::CARGO_UNLOADING_STATE
        }
    }

    fn percent_signal(&self) -> &'static str {
        if self.loading {
            signals::gs::CARGO_LOADING_PERCENT
        } else {
            signals::gs::CARGO_UNLOADING_PERCENT
        }
    }

    /// Open the cargo doors, then request the loaders.
    async fn launch(
        self,
        ticket: OperationTicket<Hold>,
    ) -> Result<Begun<Hold, CargoFlow>, CoordinatorError> {
        let progress = Progress::new(
            self.start.total(),
            self.target.total(),
            self.ctx.settings.cargo.tolerance_kg,
        );
        if progress.is_complete(self.start.total()) {
            return Ok(Begun::Done(ticket.complete()));
        }

        if let Err(e) = self.doors.ensure_doors(&Door::CARGO, true, ticket.token()).await {
            return Err(ticket.failed(e));
        }

        let state = self.state_signal();
        if let Err(e) = self.ctx.ground.write_discrete(state, 1.0).await {
            return Err(ticket.failed(e.into()));
        }
        if let Err(e) = self
            .ctx
            .aircraft
            .set_value(signals::sim::CARGO_PLANNED_KG, self.target.total())
            .await
        {
            best_effort(self.ctx.ground.write_discrete(state, 0.0), state).await;
            return Err(ticket.failed(e.into()));
        }

        Ok(Begun::Running(TrackedRun {
            ticket,
            source: self,
            progress,
        }))
    }
}

impl ProgressSource for CargoFlow {
    fn sample(&self) -> AdapterFuture<'_, f64> {
        Box::pin(async move {
            let percent = self
                .ctx
                .ground
                .read_discrete(self.percent_signal())
                .await?
                .clamp(0.0, 100.0);
            let holds = self.start.lerp(self.target, percent);

            self.ctx
                .aircraft
                .set_value(signals::sim::CARGO_FORWARD_KG, holds.forward)
                .await?;
            self.ctx
                .aircraft
                .set_value(signals::sim::CARGO_AFT_KG, holds.aft)
                .await?;

            self.cell.set_current(Hold::ForwardHold, holds.forward);
            self.cell.set_current(Hold::AftHold, holds.aft);
            Ok(holds.total())
        })
    }

    fn finish(&self) -> AdapterFuture<'_, ()> {
        self.ctx.ground.write_discrete(self.state_signal(), 0.0)
    }
}

/// Track `run` and close the cargo doors once it ends, whether it reached
/// its target or was stopped part-way. A failed run leaves them as they are.
async fn follow(
    run: TrackedRun<Hold, CargoFlow>,
    settings: &OperationSettings,
    cancel: &CancellationToken,
) -> Result<OperationOutcome, CoordinatorError> {
    let doors = run.source.doors.clone();
    let outcome = run.follow(settings).await?;
    doors.ensure_doors(&Door::CARGO, false, cancel).await?;
    Ok(outcome)
}

/// Coordinator for the cargo domain.
pub struct CargoCoordinator {
    cell: Arc<DomainCell<Hold>>,
    ctx: CoordinatorContext,
    doors: OnceLock<Arc<DoorCoordinator>>,
}

impl CargoCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Arc<Self> {
        let cell = Arc::new(DomainCell::new(
            Domain::Cargo,
            ctx.settings.operations.event_capacity,
        ));
        Arc::new(Self {
            cell,
            ctx,
            doors: OnceLock::new(),
        })
    }

    /// Wire in the door peer. Only the first call has an effect.
    pub fn set_door_coordinator(&self, doors: Arc<DoorCoordinator>) {
        if self.doors.set(doors).is_err() {
            tracing::debug!("Door coordinator already wired into cargo");
        }
    }

    pub fn hold_kg(&self, hold: Hold) -> f64 {
        self.cell.current(hold)
    }

    pub fn total_kg(&self) -> f64 {
        self.cell.read(|s| s.total_current())
    }

    pub fn planned_kg(&self) -> f64 {
        self.cell.read(|s| s.total_planned())
    }

    /// Split `total_kg` across the holds using the configured forward share.
    pub fn set_planned(&self, total_kg: f64) {
        let share = self.ctx.settings.cargo.forward_share.clamp(0.0, 1.0);
        let total = total_kg.max(0.0);
        let forward = total * share;
        self.cell.set_planned(Hold::ForwardHold, forward);
        self.cell.set_planned(Hold::AftHold, total - forward);
    }

    pub fn start_loading(&self) -> bool {
        self.start(true)
    }

    pub fn start_unloading(&self) -> bool {
        self.start(false)
    }

    pub fn stop_loading(&self) -> bool {
        self.cell.cancel_active(&[OperationKind::Loading]).is_some()
    }

    pub fn stop_unloading(&self) -> bool {
        self.cell.cancel_active(&[OperationKind::Unloading]).is_some()
    }

    pub async fn load_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.run_async(true, cancel).await
    }

    pub async fn unload_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.run_async(false, cancel).await
    }

    pub async fn stop_loading_async(&self) -> bool {
        let stopped = self.stop_loading();
        self.cell.wait_idle().await;
        stopped
    }

    pub async fn stop_unloading_async(&self) -> bool {
        let stopped = self.stop_unloading();
        self.cell.wait_idle().await;
        stopped
    }

    fn door_peer(&self) -> Result<Arc<DoorCoordinator>, CoordinatorError> {
        self.doors
            .get()
            .cloned()
            .ok_or(CoordinatorError::PeerUnavailable(Domain::Door))
    }

    fn flow(&self, loading: bool, doors: Arc<DoorCoordinator>) -> CargoFlow {
        let (start, planned) = self.cell.read(|s| {
            (
                HoldPair {
                    forward: s.current(Hold::ForwardHold),
                    aft: s.current(Hold::AftHold),
                },
                HoldPair {
                    forward: s.planned(Hold::ForwardHold),
                    aft: s.planned(Hold::AftHold),
                },
            )
        });
        let target = if loading {
            HoldPair {
                forward: planned.forward.max(start.forward),
                aft: planned.aft.max(start.aft),
            }
        } else {
            HoldPair {
                forward: 0.0,
                aft: 0.0,
            }
        };
        CargoFlow {
            cell: self.cell.clone(),
            ctx: self.ctx.clone(),
            doors,
            loading,
            start,
            target,
        }
    }

    async fn run_async(
        &self,
        loading: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        let doors = self.door_peer()?;
        let ticket = self.cell.try_begin(kind_for(loading), cancel)?;
        match self.flow(loading, doors).launch(ticket).await? {
            Begun::Done(outcome) => Ok(outcome),
            Begun::Running(run) => follow(run, &self.ctx.settings.operations, cancel).await,
        }
    }

    fn start(&self, loading: bool) -> bool {
        let Ok(doors) = self.door_peer() else {
            tracing::warn!("Cargo operation requested before door coordinator was wired");
            return false;
        };
        let Some(runtime) = spawner(Domain::Cargo) else {
            return false;
        };
        let Ok(ticket) = self.cell.try_begin(kind_for(loading), &self.ctx.shutdown) else {
            return false;
        };
        let flow = self.flow(loading, doors);
        let settings = self.ctx.settings.operations.clone();
        let shutdown = self.ctx.shutdown.clone();
        runtime.spawn(async move {
            if let Ok(Begun::Running(run)) = flow.launch(ticket).await {
                if let Err(e) = follow(run, &settings, &shutdown).await {
                    tracing::debug!(error = %e, "Background cargo operation ended with error");
                }
            }
        });
        true
    }

    async fn begin_detached(
        &self,
        loading: bool,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let doors = self.door_peer()?;
        let ticket = self.cell.try_begin(kind_for(loading), cancel)?;
        if let Begun::Running(run) = self.flow(loading, doors).launch(ticket).await? {
            let settings = self.ctx.settings.operations.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = follow(run, &settings, &cancel).await {
                    tracing::debug!(error = %e, "Background cargo operation ended with error");
                }
            });
        }
        Ok(())
    }
}

fn kind_for(loading: bool) -> OperationKind {
    if loading {
        OperationKind::Loading
    } else {
        OperationKind::Unloading
    }
}

impl Coordinator for CargoCoordinator {
    fn domain(&self) -> Domain {
        Domain::Cargo
    }

    fn synchronize<'a>(&'a self, cancel: &'a CancellationToken) -> CoordinatorFuture<'a, usize> {
        Box::pin(synchronize_from_sim(
            &self.cell,
            self.ctx.aircraft.as_ref(),
            ValueKind::Quantity,
            cancel,
        ))
    }

    fn manage_for_phase<'a>(
        &'a self,
        phase: OperationalPhase,
        cancel: &'a CancellationToken,
    ) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            let tolerance = self.ctx.settings.cargo.tolerance_kg;
            match phase {
                OperationalPhase::Departure if self.planned_kg() > self.total_kg() + tolerance => {
                    self.begin_detached(true, cancel).await
                }
                OperationalPhase::Arrival if self.total_kg() > tolerance => {
                    self.begin_detached(false, cancel).await
                }
                OperationalPhase::TaxiOut => {
                    self.stop_active().await?;
                    self.door_peer()?
                        .ensure_doors(&Door::CARGO, false, cancel)
                        .await
                }
                _ => Ok(()),
            }
        })
    }

    fn apply_external(&self, change: &SignalChange) -> bool {
        apply_change(&self.cell, change, ValueKind::Quantity)
    }

    fn apply_flight_plan(&self, plan: &FlightPlan) {
        self.set_planned(plan.cargo_kg);
    }

    fn stop_active<'a>(&'a self) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            if let Some(kind) = self
                .cell
                .cancel_active(&[OperationKind::Loading, OperationKind::Unloading])
            {
                tracing::info!(operation = %kind, "Stopping cargo operation");
            }
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
    use crate::coordinator::testing::{fixture, wait_until, Fixture};

    fn wired(f: &Fixture) -> (Arc<CargoCoordinator>, Arc<DoorCoordinator>) {
        let cargo = CargoCoordinator::new(f.ctx.clone());
        let doors = DoorCoordinator::new(f.ctx.clone());
        cargo.set_door_coordinator(doors.clone());
        (cargo, doors)
    }

    #[tokio::test]
    async fn test_loading_opens_and_closes_cargo_doors() {
        let f = fixture();
        f.ground.ramp_on(
            signals::gs::CARGO_LOADING_STATE,
            signals::gs::CARGO_LOADING_PERCENT,
            25.0,
            100.0,
        );
        let (cargo, doors) = wired(&f);
        cargo.set_planned(1000.0);

        let outcome = cargo.load_async(&CancellationToken::new()).await.unwrap();

        assert!(outcome.is_completed());
        assert!((cargo.hold_kg(Hold::ForwardHold) - 450.0).abs() < 1e-6);
        assert!((cargo.hold_kg(Hold::AftHold) - 550.0).abs() < 1e-6);
        assert_eq!(
            f.ground.writes_to(signals::gs::DOOR_FORWARD_CARGO),
            vec![1.0, 0.0]
        );
        assert_eq!(f.ground.writes_to(signals::gs::DOOR_AFT_CARGO), vec![1.0, 0.0]);
        assert!(!doors.is_open(Door::AftCargo));
        assert_eq!(
            f.ground.writes_to(signals::gs::CARGO_LOADING_STATE),
            vec![1.0, 0.0]
        );
        assert_eq!(
            f.aircraft.writes_to(signals::sim::CARGO_PLANNED_KG),
            vec![1000.0]
        );
        assert_eq!(cargo.status().active, None);
    }

    #[tokio::test]
    async fn test_without_door_peer() {
        let f = fixture();
        let cargo = CargoCoordinator::new(f.ctx.clone());
        cargo.set_planned(500.0);

        assert!(!cargo.start_loading());
        let err = cargo
            .load_async(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::PeerUnavailable(Domain::Door)));
        assert_eq!(cargo.status().active, None);
    }

    #[tokio::test]
    async fn test_loading_rejected_while_unloading() {
        let f = fixture();
        f.aircraft.set(signals::sim::CARGO_AFT_KG, 800.0);
        let (cargo, _doors) = wired(&f);
        cargo.synchronize(&CancellationToken::new()).await.unwrap();
        cargo.set_planned(2000.0);

        assert!(cargo.start_unloading());
        assert!(!cargo.start_loading());
        assert_eq!(cargo.status().active, Some(OperationKind::Unloading));

        assert!(cargo.stop_unloading_async().await);
        assert_eq!(cargo.status().active, None);
    }

    #[tokio::test]
    async fn test_taxi_out_stops_loading_and_closes_doors() {
        let f = fixture();
        let (cargo, doors) = wired(&f);
        cargo.set_planned(3000.0);
        let cancel = CancellationToken::new();

        cargo
            .manage_for_phase(OperationalPhase::Departure, &cancel)
            .await
            .unwrap();
        assert_eq!(cargo.status().active, Some(OperationKind::Loading));
        assert!(doors.is_open(Door::ForwardCargo) && doors.is_open(Door::AftCargo));

        cargo
            .manage_for_phase(OperationalPhase::TaxiOut, &cancel)
            .await
            .unwrap();

        assert_eq!(cargo.status().active, None);
        assert!(!doors.is_open(Door::ForwardCargo));
        assert!(!doors.is_open(Door::AftCargo));
        assert!(cargo.total_kg() < 3000.0);
    }

    #[tokio::test]
    async fn test_stopped_loading_closes_cargo_doors() {
        let f = fixture();
        let (cargo, doors) = wired(&f);
        cargo.set_planned(3000.0);

        cargo
            .manage_for_phase(OperationalPhase::Departure, &CancellationToken::new())
            .await
            .unwrap();
        assert!(doors.is_open(Door::ForwardCargo) && doors.is_open(Door::AftCargo));

        assert!(cargo.stop_loading_async().await);

        wait_until(|| !doors.is_open(Door::ForwardCargo) && !doors.is_open(Door::AftCargo)).await;
        assert_eq!(
            f.ground.writes_to(signals::gs::DOOR_FORWARD_CARGO),
            vec![1.0, 0.0]
        );
        assert!(cargo.total_kg() < 3000.0);
    }

    #[tokio::test]
    async fn test_arrival_unloads_in_background() {
        let f = fixture();
        f.aircraft.set(signals::sim::CARGO_FORWARD_KG, 400.0);
        f.aircraft.set(signals::sim::CARGO_AFT_KG, 600.0);
        f.ground.ramp_on(
            signals::gs::CARGO_UNLOADING_STATE,
            signals::gs::CARGO_UNLOADING_PERCENT,
            50.0,
            100.0,
        );
        let (cargo, doors) = wired(&f);
        let cancel = CancellationToken::new();
        cargo.synchronize(&cancel).await.unwrap();

        cargo
            .manage_for_phase(OperationalPhase::Arrival, &cancel)
            .await
            .unwrap();

        wait_until(|| {
            cargo.total_kg() == 0.0
                && cargo.status().active.is_none()
                && !doors.is_open(Door::AftCargo)
        })
        .await;
        assert_eq!(f.aircraft.value(signals::sim::CARGO_AFT_KG), Some(0.0));
    }

    #[test]
    fn test_flight_plan_split() {
        let f = fixture();
        let cargo = CargoCoordinator::new(f.ctx.clone());
        cargo.apply_flight_plan(&FlightPlan {
            origin: "KSEA".into(),
            destination: "KSFO".into(),
            passengers: 0,
            cargo_kg: 2000.0,
            fuel_kg: 0.0,
        });
        assert!((cargo.planned_kg() - 2000.0).abs() < 1e-6);
        assert!((cargo.cell.planned(Hold::ForwardHold) - 900.0).abs() < 1e-6);
    }
}
