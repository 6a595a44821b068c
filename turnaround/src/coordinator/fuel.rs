//! Fuel coordinator.
//!
//! The simulator's refuel panel is armed with the target quantity first, then
//! the ground-services truck is requested. While the truck is connected the
//! coordinator pumps at the configured rate, reading the simulator's total
//! before every step so panel changes made by hand are respected.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::error::CoordinatorError;
use super::event::{DomainEvent, OperationOutcome};
use super::operation::{DomainCell, OperationTicket};
use super::progress::{best_effort, Begun, Progress, ProgressSource, TrackedRun};
use super::reconcile::{apply_change, synchronize_from_sim, ValueKind};
use super::state::{Domain, DomainStatus, Entity, OperationKind};
use super::{spawner, Coordinator, CoordinatorContext, CoordinatorFuture};
use crate::adapter::{signals, AdapterFuture, FlightPlan, SignalChange};
use crate::phase::OperationalPhase;

/// Fuel on board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FuelTank {
    Total,
}

impl Entity for FuelTank {
    fn all() -> &'static [Self] {
        &[FuelTank::Total]
    }

    fn name(&self) -> &'static str {
        "total"
    }

    fn ground_signal(&self) -> Option<&'static str> {
        None
    }

    fn sim_path(&self) -> &'static str {
        signals::sim::FUEL_TOTAL_KG
    }
}

struct FuelFlow {
    cell: Arc<DomainCell<FuelTank>>,
    ctx: CoordinatorContext,
    refuel: bool,
    start: f64,
    target: f64,
}

impl FuelFlow {
    /// Kilograms moved per sample.
    fn step_kg(&self) -> f64 {
        let fuel = &self.ctx.settings.fuel;
        let rate = if self.refuel {
            fuel.refuel_rate_kg_s
        } else {
            fuel.defuel_rate_kg_s
        };
        rate.max(0.0) * self.ctx.settings.operations.sample_interval.as_secs_f64()
    }

    async fn launch(
        self,
        ticket: OperationTicket<FuelTank>,
    ) -> Result<Begun<FuelTank, FuelFlow>, CoordinatorError> {
        let progress = Progress::new(self.start, self.target, self.ctx.settings.fuel.tolerance_kg);
        if progress.is_complete(self.start) {
            return Ok(Begun::Done(ticket.complete()));
        }

        if let Err(e) = self
            .ctx
            .aircraft
            .set_value(signals::sim::FUEL_TARGET_KG, self.target)
            .await
        {
            return Err(ticket.failed(e.into()));
        }
        let request = if self.refuel { 1.0 } else { -1.0 };
        if let Err(e) = self
            .ctx
            .ground
            .write_discrete(signals::gs::FUEL_STATE, request)
            .await
        {
            best_effort(
                self.ctx.aircraft.set_value(signals::sim::FUEL_TARGET_KG, 0.0),
                signals::sim::FUEL_TARGET_KG,
            )
            .await;
            return Err(ticket.failed(e.into()));
        }

        tracing::info!(
            operation = %ticket.kind(),
            from_kg = self.start,
            to_kg = self.target,
            "Fuel truck requested"
        );
        Ok(Begun::Running(TrackedRun {
            ticket,
            source: self,
            progress,
        }))
    }
}

impl ProgressSource for FuelFlow {
    fn sample(&self) -> AdapterFuture<'_, f64> {
        Box::pin(async move {
            let total = self
                .ctx
                .aircraft
                .get_value(signals::sim::FUEL_TOTAL_KG)
                .await?;
            let next = if self.refuel {
                (total + self.step_kg()).min(self.target)
            } else {
                (total - self.step_kg()).max(self.target)
            };
            self.ctx
                .aircraft
                .set_value(signals::sim::FUEL_TOTAL_KG, next)
                .await?;
            self.cell.set_current(FuelTank::Total, next);
            Ok(next)
        })
    }

    fn finish(&self) -> AdapterFuture<'_, ()> {
        Box::pin(async move {
            let truck = self
                .ctx
                .ground
                .write_discrete(signals::gs::FUEL_STATE, 0.0)
                .await;
            let panel = self
                .ctx
                .aircraft
                .set_value(signals::sim::FUEL_TARGET_KG, 0.0)
                .await;
            truck.and(panel)
        })
    }
}

/// Coordinator for the fuel domain.
pub struct FuelCoordinator {
    cell: Arc<DomainCell<FuelTank>>,
    ctx: CoordinatorContext,
}

impl FuelCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Arc<Self> {
        let cell = Arc::new(DomainCell::new(
            Domain::Fuel,
            ctx.settings.operations.event_capacity,
        ));
        Arc::new(Self { cell, ctx })
    }

    pub fn fuel_kg(&self) -> f64 {
        self.cell.current(FuelTank::Total)
    }

    pub fn planned_kg(&self) -> f64 {
        self.cell.planned(FuelTank::Total)
    }

    pub fn set_planned(&self, kg: f64) {
        self.cell.set_planned(FuelTank::Total, kg.max(0.0));
    }

    pub fn start_refueling(&self) -> bool {
        self.start(true)
    }

    pub fn start_defueling(&self) -> bool {
        self.start(false)
    }

    pub fn stop_refueling(&self) -> bool {
        self.cell.cancel_active(&[OperationKind::Refueling]).is_some()
    }

    pub fn stop_defueling(&self) -> bool {
        self.cell.cancel_active(&[OperationKind::Defueling]).is_some()
    }

    pub async fn refuel_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.run_async(true, cancel).await
    }

    pub async fn defuel_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.run_async(false, cancel).await
    }

    pub async fn stop_refueling_async(&self) -> bool {
        let stopped = self.stop_refueling();
        self.cell.wait_idle().await;
        stopped
    }

    pub async fn stop_defueling_async(&self) -> bool {
        let stopped = self.stop_defueling();
        self.cell.wait_idle().await;
        stopped
    }

    fn flow(&self, refuel: bool) -> FuelFlow {
        let (start, planned) = self.cell.read(|s| {
            (s.current(FuelTank::Total), s.planned(FuelTank::Total))
        });
        let target = if refuel {
            planned.max(start)
        } else {
            planned.min(start)
        };
        FuelFlow {
            cell: self.cell.clone(),
            ctx: self.ctx.clone(),
            refuel,
            start,
            target,
        }
    }

    async fn run_async(
        &self,
        refuel: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        let ticket = self.cell.try_begin(kind_for(refuel), cancel)?;
        match self.flow(refuel).launch(ticket).await? {
            Begun::Done(outcome) => Ok(outcome),
            Begun::Running(run) => run.follow(&self.ctx.settings.operations).await,
        }
    }

    fn start(&self, refuel: bool) -> bool {
        let Some(runtime) = spawner(Domain::Fuel) else {
            return false;
        };
        let Ok(ticket) = self.cell.try_begin(kind_for(refuel), &self.ctx.shutdown) else {
            return false;
        };
        let flow = self.flow(refuel);
        let settings = self.ctx.settings.operations.clone();
        runtime.spawn(async move {
            if let Ok(Begun::Running(run)) = flow.launch(ticket).await {
                let _ = run.follow(&settings).await;
            }
        });
        true
    }

    async fn begin_detached(
        &self,
        refuel: bool,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let ticket = self.cell.try_begin(kind_for(refuel), cancel)?;
        if let Begun::Running(run) = self.flow(refuel).launch(ticket).await? {
            let settings = self.ctx.settings.operations.clone();
            tokio::spawn(async move { run.follow(&settings).await });
        }
        Ok(())
    }
}

fn kind_for(refuel: bool) -> OperationKind {
    if refuel {
        OperationKind::Refueling
    } else {
        OperationKind::Defueling
    }
}

impl Coordinator for FuelCoordinator {
    fn domain(&self) -> Domain {
        Domain::Fuel
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
            let tolerance = self.ctx.settings.fuel.tolerance_kg;
            let (current, planned) = (self.fuel_kg(), self.planned_kg());
            match phase {
                // No plan means nothing to pump toward
                OperationalPhase::Departure if planned <= 0.0 => Ok(()),
                OperationalPhase::Departure if planned > current + tolerance => {
                    self.begin_detached(true, cancel).await
                }
                OperationalPhase::Departure if current > planned + tolerance => {
                    self.begin_detached(false, cancel).await
                }
                OperationalPhase::TaxiOut => self.stop_active().await,
                _ => Ok(()),
            }
        })
    }

    fn apply_external(&self, change: &SignalChange) -> bool {
        apply_change(&self.cell, change, ValueKind::Quantity)
    }

    fn apply_flight_plan(&self, plan: &FlightPlan) {
        self.set_planned(plan.fuel_kg);
    }

    fn stop_active<'a>(&'a self) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            if let Some(kind) = self
                .cell
                .cancel_active(&[OperationKind::Refueling, OperationKind::Defueling])
            {
                tracing::info!(operation = %kind, "Stopping fuel operation");
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
    use crate::coordinator::testing::{drain, fixture, wait_until};

    #[tokio::test]
    async fn test_refueling_reports_progress_and_completes() {
        let f = fixture();
        let fuel = FuelCoordinator::new(f.ctx.clone());
        fuel.set_planned(10_000.0);
        let mut rx = fuel.subscribe();

        assert!(fuel.start_refueling());
        wait_until(|| fuel.status().active.is_none()).await;

        assert!((fuel.fuel_kg() - 10_000.0).abs() <= 5.0);
        let events = drain(&mut rx);
        let percents: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                DomainEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(percents.len() > 2);
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        assert!(events.iter().any(|e| matches!(
            e,
            DomainEvent::OperationCompleted {
                kind: OperationKind::Refueling,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_panel_armed_before_truck() {
        let f = fixture();
        let fuel = FuelCoordinator::new(f.ctx.clone());
        fuel.set_planned(4_000.0);

        fuel.refuel_async(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            f.aircraft.writes().first(),
            Some(&(signals::sim::FUEL_TARGET_KG.to_string(), 4_000.0))
        );
        assert_eq!(f.ground.writes_to(signals::gs::FUEL_STATE), vec![1.0, 0.0]);
        assert_eq!(
            f.aircraft.writes_to(signals::sim::FUEL_TARGET_KG).last(),
            Some(&0.0)
        );
    }

    #[tokio::test]
    async fn test_truck_failure_disarms_panel() {
        let f = fixture();
        f.ground.fail_key(signals::gs::FUEL_STATE);
        let fuel = FuelCoordinator::new(f.ctx.clone());
        fuel.set_planned(4_000.0);

        let err = fuel
            .refuel_async(&CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::AdapterCommunicationFailure);
        assert_eq!(
            f.aircraft.writes_to(signals::sim::FUEL_TARGET_KG),
            vec![4_000.0, 0.0]
        );
        assert_eq!(fuel.fuel_kg(), 0.0);
        assert_eq!(fuel.status().active, None);
    }

    #[tokio::test]
    async fn test_sample_failures_fail_operation() {
        let f = fixture();
        let fuel = FuelCoordinator::new(f.ctx.clone());
        fuel.set_planned(4_000.0);
        let mut rx = fuel.subscribe();
        f.aircraft.fail_key(signals::sim::FUEL_TOTAL_KG);

        assert!(fuel.start_refueling());
        wait_until(|| fuel.status().active.is_none()).await;

        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            DomainEvent::OperationFailed {
                kind: OperationKind::Refueling,
                ..
            }
        )));
        assert!(fuel.fuel_kg() < 4_000.0);
    }

    #[tokio::test]
    async fn test_departure_defuels_when_above_plan() {
        let f = fixture();
        f.aircraft.set(signals::sim::FUEL_TOTAL_KG, 9_000.0);
        let fuel = FuelCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();
        fuel.synchronize(&cancel).await.unwrap();
        fuel.set_planned(6_000.0);

        fuel.manage_for_phase(OperationalPhase::Departure, &cancel)
            .await
            .unwrap();

        wait_until(|| fuel.status().active.is_none()).await;
        assert!((fuel.fuel_kg() - 6_000.0).abs() <= 5.0);
        assert_eq!(f.ground.writes_to(signals::gs::FUEL_STATE), vec![-1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_departure_without_plan_does_nothing() {
        let f = fixture();
        f.aircraft.set(signals::sim::FUEL_TOTAL_KG, 9_000.0);
        let fuel = FuelCoordinator::new(f.ctx.clone());
        let cancel = CancellationToken::new();
        fuel.synchronize(&cancel).await.unwrap();

        fuel.manage_for_phase(OperationalPhase::Departure, &cancel)
            .await
            .unwrap();

        assert_eq!(fuel.status().active, None);
        assert!(f.ground.writes().is_empty());
    }

    #[tokio::test]
    async fn test_taxi_out_stops_refueling() {
        let mut f = fixture();
        f.ctx.settings.fuel.refuel_rate_kg_s = 1.0;
        let fuel = FuelCoordinator::new(f.ctx.clone());
        fuel.set_planned(50_000.0);
        let cancel = CancellationToken::new();

        fuel.manage_for_phase(OperationalPhase::Departure, &cancel)
            .await
            .unwrap();
        assert_eq!(fuel.status().active, Some(OperationKind::Refueling));

        fuel.manage_for_phase(OperationalPhase::TaxiOut, &cancel)
            .await
            .unwrap();
        assert_eq!(fuel.status().active, None);
        assert!(fuel.fuel_kg() < 50_000.0);
        assert!(fuel.start_refueling());
        fuel.stop_refueling_async().await;
    }
}
