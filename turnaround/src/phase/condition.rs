//! Conditions authorizing edges outside the fixed phase cycle.
//!
//! A conditional transition is registered on the state machine for one
//! `(from, to)` pair together with a [`TransitionCondition`]. While the
//! condition holds for the supplied telemetry, the edge is legal even though
//! the cycle would reject it, and the condition replaces the cycle
//! preconditions for that edge.
//!
//! # Example
//!
//! ```ignore
//! // Aircraft returned to the gate before takeoff
//! machine.add_conditional_transition(
//!     OperationalPhase::TaxiOut,
//!     OperationalPhase::Arrival,
//!     Box::new(OnBlocksCondition),
//! );
//! ```

use super::telemetry::AircraftTelemetrySnapshot;

/// Predicate over telemetry that authorizes a conditional transition.
pub trait TransitionCondition: Send + Sync {
    /// Whether the edge is authorized for this telemetry.
    fn is_satisfied(&self, telemetry: &AircraftTelemetrySnapshot) -> bool;

    /// Human-readable description for logging and diagnostics.
    fn description(&self) -> &str;
}

/// Aircraft is parked on blocks: on ground, brake set, engines stopped.
#[derive(Debug, Clone, Default)]
pub struct OnBlocksCondition;

impl TransitionCondition for OnBlocksCondition {
    fn is_satisfied(&self, t: &AircraftTelemetrySnapshot) -> bool {
        t.on_ground && t.parking_brake_set && !t.engines_running
    }

    fn description(&self) -> &str {
        "aircraft on blocks"
    }
}

/// Condition built from a closure.
pub struct FnCondition<F> {
    predicate: F,
    description: String,
}

impl<F> FnCondition<F>
where
    F: Fn(&AircraftTelemetrySnapshot) -> bool + Send + Sync,
{
    /// Wrap `predicate` with a description used in logs.
    pub fn new(description: impl Into<String>, predicate: F) -> Self {
        Self {
            predicate,
            description: description.into(),
        }
    }
}

impl<F> TransitionCondition for FnCondition<F>
where
    F: Fn(&AircraftTelemetrySnapshot) -> bool + Send + Sync,
{
    fn is_satisfied(&self, telemetry: &AircraftTelemetrySnapshot) -> bool {
        (self.predicate)(telemetry)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Condition that always authorizes its edge.
///
/// Useful for testing or for operator-configured shortcuts.
#[derive(Debug, Clone, Default)]
pub struct AlwaysAuthorized;

impl TransitionCondition for AlwaysAuthorized {
    fn is_satisfied(&self, _telemetry: &AircraftTelemetrySnapshot) -> bool {
        true
    }

    fn description(&self) -> &str {
        "always authorized"
    }
}
