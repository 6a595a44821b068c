//! End-to-end tests for the turnaround controller.
//!
//! These tests run the controller against the in-memory engines:
//! - A complete turnaround driven only by telemetry and pilot commands
//! - A new turnaround that interrupts a running deboarding
//! - Failure isolation and per-domain retry
//! - Shutdown while an operation is running

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use turnaround::adapter::signals::{gs, sim, telemetry};
use turnaround::adapter::{
    Adapters, FlightPlan, InMemoryAircraftSystems, InMemoryGroundServices, StaticFlightPlan,
};
use turnaround::controller::{
    ControllerConfig, ControllerError, ControllerEvent, ServiceCommand, TurnaroundController,
};
use turnaround::coordinator::{Domain, DomainEvent, Door, OperationKind};
use turnaround::phase::OperationalPhase;

// =============================================================================
// Test Helpers
// =============================================================================

struct Rig {
    controller: TurnaroundController,
    ground: Arc<InMemoryGroundServices>,
    aircraft: Arc<InMemoryAircraftSystems>,
}

impl Rig {
    async fn start(config: ControllerConfig) -> Self {
        let ground = Arc::new(InMemoryGroundServices::new());
        let aircraft = Arc::new(InMemoryAircraftSystems::new());
        ground.ramp_on(gs::BOARDING_STATE, gs::BOARDING_COUNT, 20.0, 1_000.0);
        ground.ramp_on(gs::DEBOARDING_STATE, gs::DEBOARDING_COUNT, 20.0, 1_000.0);
        ground.ramp_on(gs::CARGO_LOADING_STATE, gs::CARGO_LOADING_PERCENT, 20.0, 100.0);
        ground.ramp_on(
            gs::CARGO_UNLOADING_STATE,
            gs::CARGO_UNLOADING_PERCENT,
            20.0,
            100.0,
        );
        aircraft.set(telemetry::ON_GROUND, 1.0);
        aircraft.set(telemetry::PARKING_BRAKE, 1.0);
        aircraft.set(sim::FUEL_TOTAL_KG, 1_500.0);

        let adapters = Adapters {
            ground_services: ground.clone(),
            aircraft: aircraft.clone(),
            flight_plan: Arc::new(StaticFlightPlan::new(Some(FlightPlan {
                origin: "KSEA".to_string(),
                destination: "KSFO".to_string(),
                passengers: 100,
                cargo_kg: 1_200.0,
                fuel_kg: 6_000.0,
            }))),
        };

        let controller = TurnaroundController::start(config, adapters).await.unwrap();
        Self {
            controller,
            ground,
            aircraft,
        }
    }

    fn fly(&self, values: &[(&str, f64)]) {
        for (key, value) in values {
            self.aircraft.set(key, *value);
        }
    }

    async fn phase(&self, phase: OperationalPhase) {
        let controller = &self.controller;
        wait_until(|| controller.current_phase() == phase).await;
    }

    /// Wait until `domain` was dispatched for the current phase visit and is idle.
    async fn settled(&self, domain: Domain) {
        let controller = &self.controller;
        let visit = controller.snapshot();
        wait_until(|| {
            controller
                .last_operation_status(domain)
                .is_some_and(|s| s.phase == visit.phase && s.at >= visit.entered_at)
                && controller.domain_status(domain).active.is_none()
        })
        .await;
    }

    fn onboard(&self) -> f64 {
        self.controller
            .domain_status(Domain::Passenger)
            .entities
            .iter()
            .find(|e| e.name == "onboard")
            .map(|e| e.current)
            .unwrap_or_default()
    }
}

fn fast_config() -> ControllerConfig {
    let mut config = ControllerConfig::default().with_evaluation_interval(Duration::from_millis(5));
    config.sync_every_ticks = 0;
    config.coordinators.operations.sample_interval = Duration::from_millis(2);
    config.coordinators.operations.progress_interval = Duration::ZERO;
    config.coordinators.fuel.refuel_rate_kg_s = 1_000_000.0;
    config.coordinators.fuel.defuel_rate_kg_s = 1_000_000.0;
    config
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_matching<F>(rx: &mut broadcast::Receiver<ControllerEvent>, matches: F) -> ControllerEvent
where
    F: Fn(&ControllerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("event not published in time")
}

// =============================================================================
// Full cycle
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_complete_turnaround() {
    let rig = Rig::start(fast_config()).await;
    let cancel = CancellationToken::new();

    // Plan loaded at the gate: Departure services run on their own
    rig.phase(OperationalPhase::Departure).await;
    for domain in [Domain::Passenger, Domain::Cargo, Domain::Fuel] {
        rig.settled(domain).await;
    }
    assert_eq!(rig.onboard(), 100.0);

    // Pushback
    let outcome = rig
        .controller
        .execute_async(ServiceCommand::DisconnectEquipment, &cancel)
        .await
        .unwrap();
    assert!(outcome.is_completed());
    rig.controller
        .execute_async(ServiceCommand::CloseDoor(Door::ForwardLeft), &cancel)
        .await
        .unwrap();
    rig.fly(&[
        (telemetry::BEACON, 1.0),
        (telemetry::ENGINES_RUNNING, 1.0),
        (telemetry::PARKING_BRAKE, 0.0),
        (telemetry::GROUND_SPEED_KTS, 15.0),
    ]);
    rig.phase(OperationalPhase::TaxiOut).await;

    rig.fly(&[
        (telemetry::ON_GROUND, 0.0),
        (telemetry::ALTITUDE_AGL_FT, 2_000.0),
        (telemetry::GROUND_SPEED_KTS, 220.0),
    ]);
    rig.phase(OperationalPhase::Flight).await;

    rig.fly(&[
        (telemetry::ON_GROUND, 1.0),
        (telemetry::ALTITUDE_AGL_FT, 0.0),
        (telemetry::GROUND_SPEED_KTS, 18.0),
    ]);
    rig.phase(OperationalPhase::TaxiIn).await;

    rig.fly(&[
        (telemetry::GROUND_SPEED_KTS, 0.0),
        (telemetry::PARKING_BRAKE, 1.0),
        (telemetry::ENGINES_RUNNING, 0.0),
    ]);
    rig.phase(OperationalPhase::Arrival).await;
    rig.settled(Domain::Passenger).await;
    assert_eq!(rig.onboard(), 0.0);

    rig.fly(&[(telemetry::BEACON, 0.0)]);
    rig.controller
        .request_transition(OperationalPhase::Turnaround, Some("cabin clear"))
        .await
        .unwrap();
    rig.phase(OperationalPhase::Turnaround).await;

    // Next leg boards from scratch
    rig.fly(&[(telemetry::BEACON, 1.0)]);
    rig.phase(OperationalPhase::Departure).await;
    rig.settled(Domain::Passenger).await;
    assert_eq!(rig.onboard(), 100.0);

    let history = rig.controller.phase_history();
    assert_eq!(history.len(), 7);
    assert!(history.iter().all(|r| !r.forced));
    assert_eq!(history.last().unwrap().from, OperationalPhase::Turnaround);

    rig.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_turnaround_interrupts_deboarding() {
    let mut config = fast_config();
    config.auto_advance = false;
    config.coordinators.operations.sample_interval = Duration::from_millis(20);
    let rig = Rig::start(config).await;

    rig.controller
        .force_transition(OperationalPhase::Departure, None)
        .unwrap();
    rig.phase(OperationalPhase::Departure).await;
    rig.settled(Domain::Passenger).await;
    assert_eq!(rig.onboard(), 100.0);

    // Trickle deboarding so it is still running when the next leg starts
    rig.ground
        .ramp_on(gs::DEBOARDING_STATE, gs::DEBOARDING_COUNT, 1.0, 1_000.0);
    for phase in [
        OperationalPhase::TaxiOut,
        OperationalPhase::Flight,
        OperationalPhase::TaxiIn,
        OperationalPhase::Arrival,
    ] {
        rig.controller.force_transition(phase, None).unwrap();
    }
    rig.phase(OperationalPhase::Arrival).await;
    wait_until(|| {
        rig.controller.domain_status(Domain::Passenger).active == Some(OperationKind::Deboarding)
            && rig.onboard() < 95.0
    })
    .await;

    rig.controller
        .force_transition(OperationalPhase::Turnaround, None)
        .unwrap();
    rig.controller
        .force_transition(OperationalPhase::Departure, Some("next leg"))
        .unwrap();
    rig.phase(OperationalPhase::Departure).await;
    rig.settled(Domain::Passenger).await;

    let status = rig
        .controller
        .last_operation_status(Domain::Passenger)
        .unwrap();
    assert!(status.ok, "boarding did not start: {:?}", status.error);
    assert_eq!(rig.onboard(), 100.0);

    rig.controller.shutdown().await;
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_domain_does_not_block_pass_and_can_be_retried() {
    let mut config = fast_config();
    config.auto_advance = false;
    let rig = Rig::start(config).await;
    rig.ground.fail_key(gs::DOOR_FORWARD_LEFT);
    let mut events = rig.controller.subscribe();

    rig.controller
        .force_transition(OperationalPhase::Departure, Some("test"))
        .unwrap();

    let failed = next_matching(&mut events, |e| {
        matches!(
            e,
            ControllerEvent::ServiceStatusChanged(s)
                if s.domain == Domain::Door && s.phase == OperationalPhase::Departure
        )
    })
    .await;
    let ControllerEvent::ServiceStatusChanged(status) = failed else {
        unreachable!()
    };
    assert!(!status.ok);
    assert!(status.error.is_some());

    // The rest of the pass still ran
    rig.settled(Domain::Passenger).await;
    assert_eq!(rig.onboard(), 100.0);

    rig.ground.heal_key(gs::DOOR_FORWARD_LEFT);
    let retried = rig.controller.retry_domain(Domain::Door).await;
    assert!(retried.ok);
    assert_eq!(rig.controller.orchestrator_stats().retries, 1);

    rig.controller.shutdown().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_running_boarding() {
    let mut config = fast_config();
    config.auto_advance = false;
    config.coordinators.operations.sample_interval = Duration::from_millis(20);
    let rig = Rig::start(config).await;
    // Trickle boarding so it is still running when shutdown arrives
    rig.ground
        .ramp_on(gs::BOARDING_STATE, gs::BOARDING_COUNT, 1.0, 1_000.0);
    let mut events = rig.controller.subscribe();

    rig.controller
        .force_transition(OperationalPhase::Departure, None)
        .unwrap();
    next_matching(&mut events, |e| {
        matches!(
            e,
            ControllerEvent::DomainStateChanged(DomainEvent::OperationStarted {
                kind: OperationKind::Boarding,
                ..
            })
        )
    })
    .await;

    rig.controller.shutdown().await;

    assert!(!rig.controller.is_running());
    assert!(rig.controller.domain_status(Domain::Passenger).active.is_none());
    assert!(rig.onboard() < 100.0);

    // Nothing left to stop
    let outcome = rig
        .controller
        .execute_async(ServiceCommand::StopBoarding, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, Err(ControllerError::NotRunning(_))));
}
