//! Scripted turnaround against the in-memory engines.
//!
//! Plays the pilot and the simulator through one full cycle
//! (Preflight → Departure → TaxiOut → Flight → TaxiIn → Arrival →
//! Turnaround → Departure) while printing the controller's event stream.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use turnaround::adapter::signals::{gs, sim, telemetry};
use turnaround::adapter::{
    Adapters, FlightPlan, InMemoryAircraftSystems, InMemoryGroundServices, StaticFlightPlan,
};
use turnaround::controller::{
    ControllerConfig, ControllerEvent, ServiceCommand, TurnaroundController,
};
use turnaround::coordinator::{Domain, DomainEvent, Door};
use turnaround::phase::OperationalPhase;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Longest any scripted step may take.
const STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Timers never tick faster than this, whatever the speed-up.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Arguments for `turnaround simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Read settings from this file instead of ~/.turnaround/config.ini
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Passengers to board
    #[arg(long, default_value = "150")]
    pub passengers: u32,

    /// Cargo to load, in kilograms
    #[arg(long, default_value = "2500")]
    pub cargo: f64,

    /// Fuel to carry, in kilograms
    #[arg(long, default_value = "8000")]
    pub fuel: f64,

    /// Run the clock this many times faster than real time
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub speed_up: u32,
}

/// Run the simulation.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("simulate");

    let config = scaled(runner.config().controller_config(), args.speed_up);
    let runtime = runner.runtime()?;
    runtime.block_on(simulate(config, &args))
}

/// Shrink every interval by `speed_up` and raise the pump rates to match.
fn scaled(mut config: ControllerConfig, speed_up: u32) -> ControllerConfig {
    let factor = speed_up.max(1);
    let shrink = |d: Duration| (d / factor).max(MIN_INTERVAL);
    config.evaluation_interval = shrink(config.evaluation_interval);
    config.coordinators.operations.sample_interval =
        shrink(config.coordinators.operations.sample_interval);
    config.coordinators.operations.progress_interval /= factor;
    config.coordinators.fuel.refuel_rate_kg_s *= f64::from(factor);
    config.coordinators.fuel.defuel_rate_kg_s *= f64::from(factor);
    config.auto_advance = true;
    config
}

struct World {
    ground: Arc<InMemoryGroundServices>,
    aircraft: Arc<InMemoryAircraftSystems>,
    plan: Arc<StaticFlightPlan>,
}

impl World {
    fn new(args: &SimulateArgs) -> Self {
        let ground = Arc::new(InMemoryGroundServices::new());
        let aircraft = Arc::new(InMemoryAircraftSystems::new());

        // The ground crew: each request starts a ramp that advances per sample.
        let pax_step = (f64::from(args.passengers) / 20.0).ceil().max(1.0);
        ground.ramp_on(gs::BOARDING_STATE, gs::BOARDING_COUNT, pax_step, 10_000.0);
        ground.ramp_on(gs::DEBOARDING_STATE, gs::DEBOARDING_COUNT, pax_step, 10_000.0);
        ground.ramp_on(gs::CARGO_LOADING_STATE, gs::CARGO_LOADING_PERCENT, 5.0, 100.0);
        ground.ramp_on(
            gs::CARGO_UNLOADING_STATE,
            gs::CARGO_UNLOADING_PERCENT,
            5.0,
            100.0,
        );

        // Cold and dark at the gate.
        aircraft.set(telemetry::ON_GROUND, 1.0);
        aircraft.set(telemetry::PARKING_BRAKE, 1.0);
        aircraft.set(sim::FUEL_TOTAL_KG, (args.fuel * 0.25).round());

        let plan = Arc::new(StaticFlightPlan::new(Some(FlightPlan {
            origin: "EGLL".to_string(),
            destination: "LFPG".to_string(),
            passengers: args.passengers,
            cargo_kg: args.cargo,
            fuel_kg: args.fuel,
        })));

        Self {
            ground,
            aircraft,
            plan,
        }
    }

    fn adapters(&self) -> Adapters {
        Adapters {
            ground_services: self.ground.clone(),
            aircraft: self.aircraft.clone(),
            flight_plan: self.plan.clone(),
        }
    }

    fn set(&self, values: &[(&str, f64)]) {
        for (key, value) in values {
            self.aircraft.set(key, *value);
        }
    }
}

async fn simulate(config: ControllerConfig, args: &SimulateArgs) -> Result<(), CliError> {
    let world = World::new(args);
    let controller = Arc::new(TurnaroundController::start(config, world.adapters()).await?);

    let printer = tokio::spawn(print_events(controller.clone()));

    let result = script(&controller, &world).await;

    let stats = controller.orchestrator_stats();
    controller.shutdown().await;
    printer.abort();

    println!();
    println!(
        "Orchestration: {} passes, {} dispatches, {} failures, {} timeouts",
        stats.passes, stats.dispatches, stats.failures, stats.timeouts
    );
    println!("Phase history:");
    for record in controller.phase_history() {
        println!(
            "  {} -> {} after {:.1}s{}",
            record.from,
            record.to,
            record.time_in_phase.as_secs_f64(),
            if record.forced { " (forced)" } else { "" }
        );
    }

    result
}

/// The pilot's side of the turnaround.
async fn script(controller: &TurnaroundController, world: &World) -> Result<(), CliError> {
    let cancel = CancellationToken::new();

    // Flight plan is loaded, so the controller moves to Departure on its own.
    wait_for_phase(controller, OperationalPhase::Departure).await?;
    wait_for_idle(controller, &[Domain::Passenger, Domain::Cargo, Domain::Fuel]).await?;

    info!("Ready for pushback");
    controller
        .execute_async(ServiceCommand::DisconnectEquipment, &cancel)
        .await?;
    controller
        .execute_async(ServiceCommand::CloseDoor(Door::ForwardLeft), &cancel)
        .await?;
    world.set(&[
        (telemetry::BEACON, 1.0),
        (telemetry::ENGINES_RUNNING, 1.0),
        (telemetry::PARKING_BRAKE, 0.0),
        (telemetry::GROUND_SPEED_KTS, 12.0),
    ]);
    wait_for_phase(controller, OperationalPhase::TaxiOut).await?;

    world.set(&[
        (telemetry::ON_GROUND, 0.0),
        (telemetry::ALTITUDE_AGL_FT, 3_000.0),
        (telemetry::GROUND_SPEED_KTS, 250.0),
    ]);
    wait_for_phase(controller, OperationalPhase::Flight).await?;

    world.set(&[
        (telemetry::ON_GROUND, 1.0),
        (telemetry::ALTITUDE_AGL_FT, 0.0),
        (telemetry::GROUND_SPEED_KTS, 20.0),
    ]);
    wait_for_phase(controller, OperationalPhase::TaxiIn).await?;

    world.set(&[
        (telemetry::GROUND_SPEED_KTS, 0.0),
        (telemetry::PARKING_BRAKE, 1.0),
        (telemetry::ENGINES_RUNNING, 0.0),
    ]);
    wait_for_phase(controller, OperationalPhase::Arrival).await?;
    wait_for_idle(controller, &[Domain::Passenger, Domain::Cargo]).await?;

    // Beacon off alone is not conclusive enough to advance; the crew
    // declares the turnaround once the cabin is empty.
    world.set(&[(telemetry::BEACON, 0.0)]);
    controller
        .request_transition(OperationalPhase::Turnaround, Some("cabin clear"))
        .await?;
    wait_for_phase(controller, OperationalPhase::Turnaround).await?;

    // Next leg: same plan, beacon on when the crew is ready.
    world.set(&[(telemetry::BEACON, 1.0)]);
    wait_for_phase(controller, OperationalPhase::Departure).await?;
    wait_for_idle(controller, &[Domain::Passenger, Domain::Cargo, Domain::Fuel]).await?;

    info!("Simulated turnaround complete");
    Ok(())
}

async fn wait_for_phase(
    controller: &TurnaroundController,
    phase: OperationalPhase,
) -> Result<(), CliError> {
    wait(
        || controller.current_phase() == phase,
        || format!("waiting for {} (still in {})", phase, controller.current_phase()),
    )
    .await
}

/// Wait until this phase visit's services have been dispatched and finished.
async fn wait_for_idle(
    controller: &TurnaroundController,
    domains: &[Domain],
) -> Result<(), CliError> {
    let visit = controller.snapshot();
    wait(
        || {
            domains.iter().all(|d| {
                let dispatched = controller
                    .last_operation_status(*d)
                    .is_some_and(|s| s.phase == visit.phase && s.at >= visit.entered_at);
                dispatched && controller.domain_status(*d).active.is_none()
            })
        },
        || format!("waiting for services to finish in {}", visit.phase),
    )
    .await
}

async fn wait<C, M>(condition: C, stalled: M) -> Result<(), CliError>
where
    C: Fn() -> bool,
    M: Fn() -> String,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(STEP_TIMEOUT, poll)
        .await
        .map_err(|_| CliError::Simulation(stalled()))
}

async fn print_events(controller: Arc<TurnaroundController>) {
    let mut events = controller.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("[{:>7}] {}", event.label(), line);
                }
            }
            Err(RecvError::Lagged(missed)) => println!("[ events] {} events skipped", missed),
            Err(RecvError::Closed) => break,
        }
    }
}

/// One line per event worth showing; per-sample value updates are skipped.
fn describe(event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::PhaseChanged(record) => Some(format!(
            "{} -> {}{}",
            record.from,
            record.to,
            record
                .reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        )),
        ControllerEvent::ServiceStatusChanged(status) => Some(match &status.error {
            None => format!("{} ready for {}", status.domain, status.phase),
            Some(e) => format!("{} failed for {}: {}", status.domain, status.phase, e.message),
        }),
        ControllerEvent::OperationTimedOut { phase, after } => Some(format!(
            "{} exceeded {:.0} min",
            phase,
            after.as_secs_f64() / 60.0
        )),
        ControllerEvent::DomainStateChanged(event) => match event {
            DomainEvent::OperationStarted { domain, kind } => {
                Some(format!("{} {} started", domain, kind))
            }
            DomainEvent::Progress {
                domain,
                kind,
                percent,
            } => Some(format!("{} {} {:.0}%", domain, kind, percent)),
            DomainEvent::OperationCompleted { domain, kind } => {
                Some(format!("{} {} completed", domain, kind))
            }
            DomainEvent::OperationStopped {
                domain,
                kind,
                percent,
            } => Some(format!("{} {} stopped at {:.0}%", domain, kind, percent)),
            DomainEvent::OperationFailed {
                domain,
                kind,
                message,
                ..
            } => Some(format!("{} {} failed: {}", domain, kind, message)),
            DomainEvent::Reset { domain } => Some(format!("{} reset", domain)),
            DomainEvent::StateChanged { .. } => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnaround::coordinator::OperationKind;

    #[test]
    fn test_scaling() {
        let base = ControllerConfig::default().with_auto_advance(false);
        let scaled = scaled(base.clone(), 10);

        assert!(scaled.auto_advance);
        assert_eq!(scaled.evaluation_interval, base.evaluation_interval / 10);
        assert_eq!(
            scaled.coordinators.fuel.refuel_rate_kg_s,
            base.coordinators.fuel.refuel_rate_kg_s * 10.0
        );
    }

    #[test]
    fn test_value_updates_are_not_printed() {
        let quiet = ControllerEvent::DomainStateChanged(DomainEvent::StateChanged {
            domain: Domain::Fuel,
            entity: "total",
            planned: 8000.0,
            current: 4000.0,
        });
        assert!(describe(&quiet).is_none());

        let progress = ControllerEvent::DomainStateChanged(DomainEvent::Progress {
            domain: Domain::Passenger,
            kind: OperationKind::Boarding,
            percent: 42.4,
        });
        assert_eq!(describe(&progress).unwrap(), "Passenger boarding 42%");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_cycle() {
        let args = SimulateArgs {
            config: None,
            passengers: 40,
            cargo: 800.0,
            fuel: 3000.0,
            speed_up: 1000,
        };
        let config = scaled(ControllerConfig::default(), args.speed_up);

        simulate(config, &args).await.unwrap();
    }
}
