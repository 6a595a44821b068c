//! Transition preconditions and next-phase prediction.
//!
//! Both are pure functions of `(current phase, telemetry)`. Nothing here
//! touches state machine internals, so they are safe to call at any rate.

use super::telemetry::AircraftTelemetrySnapshot;
use super::types::OperationalPhase;

/// Ground speed above which the aircraft is considered taxiing (knots).
pub const TAXI_SPEED_KTS: f64 = 5.0;

/// Ground speed below which a landed aircraft is considered to have vacated the runway (knots).
pub const RUNWAY_EXIT_SPEED_KTS: f64 = 40.0;

/// Altitude above which an airborne aircraft is firmly in flight (feet).
pub const CLIMB_OUT_ALTITUDE_FT: f64 = 500.0;

/// Predicted phase together with how strongly telemetry supports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePrediction {
    /// Phase telemetry points to.
    pub phase: OperationalPhase,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl PhasePrediction {
    fn new(phase: OperationalPhase, confidence: f64) -> Self {
        Self {
            phase,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Prediction that the aircraft stays where it is.
    fn stay(phase: OperationalPhase) -> Self {
        Self::new(phase, 1.0)
    }
}

/// Check the phase-specific preconditions for a cycle edge.
///
/// Only called for edges that are already known to be legal cycle edges.
/// Returns the first unmet condition as a diagnostic.
pub fn check_preconditions(
    from: OperationalPhase,
    to: OperationalPhase,
    telemetry: &AircraftTelemetrySnapshot,
) -> Result<(), &'static str> {
    use OperationalPhase::*;

    match (from, to) {
        (Preflight, Departure) | (Turnaround, Departure) => {
            require(telemetry.flight_plan_loaded, "flight plan not loaded")
        }
        (Departure, TaxiOut) => {
            require(
                !telemetry.ground_equipment_connected,
                "ground equipment still connected",
            )?;
            require(telemetry.beacon_on, "beacon is off")?;
            require(!telemetry.parking_brake_set, "parking brake is set")
        }
        (TaxiOut, Flight) => require(!telemetry.on_ground, "aircraft is still on the ground"),
        (Flight, TaxiIn) => require(telemetry.on_ground, "aircraft is airborne"),
        (TaxiIn, Arrival) => {
            require(telemetry.on_ground, "aircraft is airborne")?;
            require(telemetry.parking_brake_set, "parking brake is released")?;
            require(!telemetry.engines_running, "engines are running")
        }
        (Arrival, Turnaround) => {
            require(telemetry.on_ground, "aircraft is airborne")?;
            require(!telemetry.engines_running, "engines are running")
        }
        _ => Ok(()),
    }
}

fn require(condition: bool, reason: &'static str) -> Result<(), &'static str> {
    if condition {
        Ok(())
    } else {
        Err(reason)
    }
}

/// Deterministic decision table mapping telemetry to the phase it indicates.
///
/// The result is either the current phase (confidence 1.0, "stay") or a
/// phase downstream of it. The table never predicts `Preflight`.
pub fn predict(current: OperationalPhase, t: &AircraftTelemetrySnapshot) -> PhasePrediction {
    use OperationalPhase::*;

    match current {
        Preflight => {
            if t.flight_plan_loaded {
                PhasePrediction::new(Departure, 0.9)
            } else {
                PhasePrediction::stay(Preflight)
            }
        }
        Departure => {
            if !t.on_ground {
                // Taxi never observed; still points the right way
                PhasePrediction::new(Flight, 0.6)
            } else if t.is_rolling(TAXI_SPEED_KTS) && t.engines_running {
                PhasePrediction::new(TaxiOut, 0.95)
            } else if t.beacon_on && !t.parking_brake_set && !t.ground_equipment_connected {
                PhasePrediction::new(TaxiOut, 0.8)
            } else {
                PhasePrediction::stay(Departure)
            }
        }
        TaxiOut => {
            if t.on_ground {
                PhasePrediction::stay(TaxiOut)
            } else if t.altitude_ft > CLIMB_OUT_ALTITUDE_FT {
                PhasePrediction::new(Flight, 1.0)
            } else {
                PhasePrediction::new(Flight, 0.8)
            }
        }
        Flight => {
            if !t.on_ground {
                PhasePrediction::stay(Flight)
            } else if t.ground_speed_kts < RUNWAY_EXIT_SPEED_KTS {
                PhasePrediction::new(TaxiIn, 0.95)
            } else {
                PhasePrediction::new(TaxiIn, 0.7)
            }
        }
        TaxiIn => {
            if !t.on_ground || t.is_rolling(TAXI_SPEED_KTS) {
                PhasePrediction::stay(TaxiIn)
            } else if t.parking_brake_set && !t.engines_running {
                PhasePrediction::new(Arrival, 0.95)
            } else if t.parking_brake_set {
                PhasePrediction::new(Arrival, 0.6)
            } else {
                PhasePrediction::stay(TaxiIn)
            }
        }
        Arrival => {
            if t.on_ground && !t.engines_running && !t.beacon_on {
                PhasePrediction::new(Turnaround, 0.85)
            } else {
                PhasePrediction::stay(Arrival)
            }
        }
        Turnaround => {
            if !t.flight_plan_loaded {
                PhasePrediction::stay(Turnaround)
            } else if t.beacon_on {
                PhasePrediction::new(Departure, 0.95)
            } else {
                PhasePrediction::new(Departure, 0.6)
            }
        }
    }
}
