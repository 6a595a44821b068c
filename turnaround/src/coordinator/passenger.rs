//! Passenger coordinator.
//!
//! Boarding and deboarding are requested from the ground-services engine,
//! which reports how many passengers have moved so far in the current run.
//! The coordinator folds that count into the on-board figure and mirrors it
//! to the simulator's payload.

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

/// Passenger counts are whole people.
const PASSENGER_TOLERANCE: f64 = 0.5;

/// Passenger payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Passengers {
    Onboard,
}

impl Entity for Passengers {
    fn all() -> &'static [Self] {
        &[Passengers::Onboard]
    }

    fn name(&self) -> &'static str {
        "onboard"
    }

    fn ground_signal(&self) -> Option<&'static str> {
        None
    }

    fn sim_path(&self) -> &'static str {
        signals::sim::PASSENGERS_ONBOARD
    }
}

/// One boarding or deboarding run.
struct PassengerFlow {
    cell: Arc<DomainCell<Passengers>>,
    ctx: CoordinatorContext,
    boarding: bool,
    start: f64,
    target: f64,
}

impl PassengerFlow {
    fn state_signal(&self) -> &'static str {
        if self.boarding {
            signals::gs::BOARDING_STATE
        } else {
            signals::gs::DEBOARDING_STATE
        }
    }

    fn count_signal(&self) -> &'static str {
        if self.boarding {
            signals::gs::BOARDING_COUNT
        } else {
            signals::gs::DEBOARDING_COUNT
        }
    }

    /// Request the run from ground services, then tell the simulator the
    /// payload it is heading for.
    async fn launch(
        self,
        ticket: OperationTicket<Passengers>,
    ) -> Result<Begun<Passengers, PassengerFlow>, CoordinatorError> {
        let progress = Progress::new(self.start, self.target, PASSENGER_TOLERANCE);
        if progress.is_complete(self.start) {
            return Ok(Begun::Done(ticket.complete()));
        }

        let state = self.state_signal();
        if let Err(e) = self.ctx.ground.write_discrete(state, 1.0).await {
            return Err(ticket.failed(e.into()));
        }
        if let Err(e) = self
            .ctx
            .aircraft
            .set_value(signals::sim::PASSENGERS_PLANNED, self.target)
            .await
        {
            best_effort(self.ctx.ground.write_discrete(state, 0.0), state).await;
            return Err(ticket.failed(e.into()));
        }

        tracing::debug!(
            operation = %ticket.kind(),
            start = self.start,
            target = self.target,
            "Passenger flow requested"
        );
        Ok(Begun::Running(TrackedRun {
            ticket,
            source: self,
            progress,
        }))
    }
}

impl ProgressSource for PassengerFlow {
    fn sample(&self) -> AdapterFuture<'_, f64> {
        Box::pin(async move {
            let moved = self
                .ctx
                .ground
                .read_discrete(self.count_signal())
                .await?
                .max(0.0)
                .floor();
            let onboard = if self.boarding {
                (self.start + moved).min(self.target)
            } else {
                (self.start - moved).max(self.target)
            };
            self.ctx
                .aircraft
                .set_value(signals::sim::PASSENGERS_ONBOARD, onboard)
                .await?;
            self.cell.set_current(Passengers::Onboard, onboard);
            Ok(onboard)
        })
    }

    fn finish(&self) -> AdapterFuture<'_, ()> {
        self.ctx.ground.write_discrete(self.state_signal(), 0.0)
    }
}

/// Coordinator for the passenger domain.
pub struct PassengerCoordinator {
    cell: Arc<DomainCell<Passengers>>,
    ctx: CoordinatorContext,
}

impl PassengerCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Arc<Self> {
        let cell = Arc::new(DomainCell::new(
            Domain::Passenger,
            ctx.settings.operations.event_capacity,
        ));
        Arc::new(Self { cell, ctx })
    }

    pub fn onboard(&self) -> u32 {
        self.cell.current(Passengers::Onboard).round() as u32
    }

    pub fn planned(&self) -> u32 {
        self.cell.planned(Passengers::Onboard).round() as u32
    }

    pub fn set_planned(&self, passengers: u32) {
        self.cell.set_planned(Passengers::Onboard, passengers as f64);
    }

    pub fn start_boarding(&self) -> bool {
        self.start(true)
    }

    pub fn start_deboarding(&self) -> bool {
        self.start(false)
    }

    /// Cancel boarding. Returns false if boarding was not running.
    pub fn stop_boarding(&self) -> bool {
        self.cell.cancel_active(&[OperationKind::Boarding]).is_some()
    }

    pub fn stop_deboarding(&self) -> bool {
        self.cell.cancel_active(&[OperationKind::Deboarding]).is_some()
    }

    pub async fn board_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.run_async(true, cancel).await
    }

    pub async fn deboard_async(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        self.run_async(false, cancel).await
    }

    /// Cancel boarding and wait until the slot is free.
    pub async fn stop_boarding_async(&self) -> bool {
        let stopped = self.stop_boarding();
        self.cell.wait_idle().await;
        stopped
    }

    pub async fn stop_deboarding_async(&self) -> bool {
        let stopped = self.stop_deboarding();
        self.cell.wait_idle().await;
        stopped
    }

    fn flow(&self, boarding: bool) -> PassengerFlow {
        let (start, planned) = self.cell.read(|s| {
            (
                s.current(Passengers::Onboard),
                s.planned(Passengers::Onboard),
            )
        });
        let target = if boarding { planned.max(start) } else { 0.0 };
        PassengerFlow {
            cell: self.cell.clone(),
            ctx: self.ctx.clone(),
            boarding,
            start,
            target,
        }
    }

    async fn run_async(
        &self,
        boarding: bool,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, CoordinatorError> {
        let ticket = self.cell.try_begin(kind_for(boarding), cancel)?;
        match self.flow(boarding).launch(ticket).await? {
            Begun::Done(outcome) => Ok(outcome),
            Begun::Running(run) => run.follow(&self.ctx.settings.operations).await,
        }
    }

    fn start(&self, boarding: bool) -> bool {
        let Some(runtime) = spawner(Domain::Passenger) else {
            return false;
        };
        let Ok(ticket) = self.cell.try_begin(kind_for(boarding), &self.ctx.shutdown) else {
            return false;
        };
        let flow = self.flow(boarding);
        let settings = self.ctx.settings.operations.clone();
        runtime.spawn(async move {
            if let Ok(Begun::Running(run)) = flow.launch(ticket).await {
                let _ = run.follow(&settings).await;
            }
        });
        true
    }

    /// Start `boarding` inline so start failures reach the caller, then
    /// leave tracking in the background.
    async fn begin_detached(
        &self,
        boarding: bool,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let ticket = self.cell.try_begin(kind_for(boarding), cancel)?;
        if let Begun::Running(run) = self.flow(boarding).launch(ticket).await? {
            let settings = self.ctx.settings.operations.clone();
            tokio::spawn(async move { run.follow(&settings).await });
        }
        Ok(())
    }
}

fn kind_for(boarding: bool) -> OperationKind {
    if boarding {
        OperationKind::Boarding
    } else {
        OperationKind::Deboarding
    }
}

impl Coordinator for PassengerCoordinator {
    fn domain(&self) -> Domain {
        Domain::Passenger
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
            match phase {
                OperationalPhase::Departure if self.planned() > self.onboard() => {
                    self.begin_detached(true, cancel).await
                }
                OperationalPhase::Arrival if self.onboard() > 0 => {
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
        self.set_planned(plan.passengers);
    }

    fn stop_active<'a>(&'a self) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            if let Some(kind) = self
                .cell
                .cancel_active(&[OperationKind::Boarding, OperationKind::Deboarding])
            {
                tracing::info!(operation = %kind, "Stopping passenger operation");
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
