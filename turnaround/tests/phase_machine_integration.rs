//! Integration tests for the phase state machine.
//!
//! These tests drive the public API the way the controller does:
//! - Telemetry-driven auto-advance through a complete cycle
//! - Hooks, history and broadcast ordering
//! - Conditional transitions outside the cycle
//! - Phase timeouts armed from configuration
//! - Snapshot persistence across machine instances

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use turnaround::phase::{
    AircraftTelemetrySnapshot, OnBlocksCondition, OperationalPhase, PhaseError, PhaseEvent,
    PhaseMachineConfig, PhaseStateMachine,
};

// =============================================================================
// Test Helpers
// =============================================================================

fn parked_with_plan() -> AircraftTelemetrySnapshot {
    AircraftTelemetrySnapshot::parked().with_flight_plan(true)
}

fn taxiing() -> AircraftTelemetrySnapshot {
    AircraftTelemetrySnapshot {
        on_ground: true,
        engines_running: true,
        beacon_on: true,
        ground_speed_kts: 15.0,
        flight_plan_loaded: true,
        ..Default::default()
    }
}

fn climbing() -> AircraftTelemetrySnapshot {
    AircraftTelemetrySnapshot {
        engines_running: true,
        beacon_on: true,
        ground_speed_kts: 250.0,
        altitude_ft: 3_000.0,
        flight_plan_loaded: true,
        ..Default::default()
    }
}

fn rolled_out() -> AircraftTelemetrySnapshot {
    AircraftTelemetrySnapshot {
        ground_speed_kts: 20.0,
        ..taxiing()
    }
}

fn on_blocks_beacon_on() -> AircraftTelemetrySnapshot {
    AircraftTelemetrySnapshot {
        beacon_on: true,
        ..parked_with_plan()
    }
}

// =============================================================================
// Auto-advance
// =============================================================================

#[tokio::test]
async fn test_full_cycle_from_telemetry() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    let mut events = machine.subscribe();

    let script = [
        (parked_with_plan(), OperationalPhase::Departure),
        (taxiing(), OperationalPhase::TaxiOut),
        (climbing(), OperationalPhase::Flight),
        (rolled_out(), OperationalPhase::TaxiIn),
        (AircraftTelemetrySnapshot::parked(), OperationalPhase::Arrival),
    ];

    for (telemetry, expected) in script {
        let record = machine
            .evaluate(&telemetry)
            .unwrap_or_else(|| panic!("no transition towards {}", expected));
        assert_eq!(record.to, expected);
        assert!(!record.forced);
    }

    // Beacon-off alone is not conclusive enough for the default threshold
    assert!(machine.evaluate(&AircraftTelemetrySnapshot::parked()).is_none());
    machine
        .try_transition(
            OperationalPhase::Turnaround,
            &AircraftTelemetrySnapshot::parked(),
            Some("cabin clear"),
        )
        .unwrap();

    let record = machine.evaluate(&on_blocks_beacon_on()).unwrap();
    assert_eq!(record.from, OperationalPhase::Turnaround);
    assert_eq!(record.to, OperationalPhase::Departure);

    let history = machine.history();
    assert_eq!(history.len(), 7);
    for pair in history.windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
    }

    // Broadcast order matches history
    for expected in &history {
        match events.recv().await.unwrap() {
            PhaseEvent::Changed(record) => assert_eq!(&record, expected),
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[test]
fn test_evaluate_is_quiet_when_nothing_changes() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    let parked = AircraftTelemetrySnapshot::parked();

    for _ in 0..10 {
        assert!(machine.evaluate(&parked).is_none());
    }
    assert_eq!(machine.current_phase(), OperationalPhase::Preflight);
    assert!(machine.history().is_empty());
}

#[test]
fn test_rejected_attempt_leaves_state_untouched() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    machine
        .try_transition(OperationalPhase::Departure, &parked_with_plan(), None)
        .unwrap();
    let before = machine.snapshot();

    // Brake still set, beacon off
    let err = machine
        .try_transition(OperationalPhase::TaxiOut, &parked_with_plan(), None)
        .unwrap_err();
    assert!(matches!(err, PhaseError::PreconditionNotMet { .. }));

    let err = machine
        .try_transition(OperationalPhase::Flight, &climbing(), None)
        .unwrap_err();
    assert!(matches!(err, PhaseError::InvalidTransition { .. }));

    assert_eq!(machine.snapshot(), before);
}

// =============================================================================
// Hooks and conditional transitions
// =============================================================================

#[test]
fn test_hooks_fire_exit_transition_entry() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    machine.on_entry(OperationalPhase::Departure, move |p| {
        l.lock().unwrap().push(format!("enter {}", p))
    });
    let l = log.clone();
    machine.on_transition(move |from, to| l.lock().unwrap().push(format!("{} -> {}", from, to)));
    let l = log.clone();
    machine.on_exit(OperationalPhase::Preflight, move |p| {
        l.lock().unwrap().push(format!("exit {}", p))
    });

    machine
        .force_transition(OperationalPhase::Departure, Some("test"))
        .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    assert!(log[0].starts_with("exit"));
    assert!(log[1].contains("->"));
    assert!(log[2].starts_with("enter"));
}

#[test]
fn test_return_to_gate_via_conditional_transition() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    machine
        .force_transition(OperationalPhase::Departure, None)
        .unwrap();
    machine
        .try_transition(OperationalPhase::TaxiOut, &taxiing(), None)
        .unwrap();

    machine.add_conditional_transition(
        OperationalPhase::TaxiOut,
        OperationalPhase::Arrival,
        Box::new(OnBlocksCondition),
    );

    // Still rolling: condition not met, and the edge is off the cycle
    let err = machine
        .try_transition(OperationalPhase::Arrival, &taxiing(), None)
        .unwrap_err();
    assert!(matches!(err, PhaseError::PreconditionNotMet { .. }));

    // Evaluate picks the conditional edge once the aircraft is back on blocks
    let record = machine
        .evaluate(&AircraftTelemetrySnapshot::parked())
        .unwrap();
    assert_eq!(record.to, OperationalPhase::Arrival);
    assert!(record.reason.unwrap().contains("aircraft on blocks"));
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test]
async fn test_configured_timeout_fires_once_per_visit() {
    let mut timeouts = HashMap::new();
    timeouts.insert(OperationalPhase::Departure, Duration::from_millis(30));
    let machine = PhaseStateMachine::new(PhaseMachineConfig {
        phase_timeouts: timeouts,
        ..Default::default()
    });
    let mut events = machine.subscribe();

    machine
        .try_transition(OperationalPhase::Departure, &parked_with_plan(), None)
        .unwrap();
    assert!(matches!(events.recv().await.unwrap(), PhaseEvent::Changed(_)));

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timeout never fired")
        .unwrap();
    assert_eq!(
        event,
        PhaseEvent::TimedOut {
            phase: OperationalPhase::Departure,
            after: Duration::from_millis(30),
        }
    );

    // Expiry reports; it never moves the phase
    assert_eq!(machine.current_phase(), OperationalPhase::Departure);
    assert_eq!(machine.pending_timeouts(), 0);
}

#[tokio::test]
async fn test_timeout_voided_by_transition() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    let fired = Arc::new(Mutex::new(false));

    let f = fired.clone();
    let handle = machine.set_timeout(
        Duration::from_millis(40),
        Box::new(move |_| *f.lock().unwrap() = true),
    );
    assert_eq!(handle.phase(), OperationalPhase::Preflight);

    machine
        .force_transition(OperationalPhase::Departure, None)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(!*fired.lock().unwrap());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_snapshot_resumes_in_new_machine() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("phase.json");

    let first = PhaseStateMachine::new(PhaseMachineConfig::default());
    first
        .try_transition(OperationalPhase::Departure, &parked_with_plan(), Some("plan"))
        .unwrap();
    first
        .try_transition(OperationalPhase::TaxiOut, &taxiing(), None)
        .unwrap();
    first
        .save_snapshot(std::fs::File::create(&path).unwrap())
        .unwrap();

    let second = PhaseStateMachine::new(PhaseMachineConfig::default());
    let restored = second
        .load_snapshot(std::fs::File::open(&path).unwrap())
        .unwrap();

    assert_eq!(restored.phase, OperationalPhase::TaxiOut);
    assert_eq!(second.current_phase(), OperationalPhase::TaxiOut);
    assert_eq!(second.history(), first.history());

    // The resumed machine keeps advancing from where the first stopped
    let record = second.evaluate(&climbing()).unwrap();
    assert_eq!(record.to, OperationalPhase::Flight);
}

#[test]
fn test_corrupt_snapshot_is_rejected() {
    let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
    let err = machine.load_snapshot(&b"{ not json"[..]).unwrap_err();

    assert!(matches!(err, PhaseError::Snapshot(_)));
    assert_eq!(machine.current_phase(), OperationalPhase::Preflight);
}
