//! Core phase types.
//!
//! - [`OperationalPhase`] - One stage of the turnaround lifecycle
//! - [`PhaseTransitionRecord`] - Immutable log entry for a committed transition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Operational phase of the aircraft.
///
/// Phases follow a fixed directed cycle:
///
/// ```text
/// Preflight → Departure → TaxiOut → Flight → TaxiIn → Arrival → Turnaround
///                 ▲                                                  │
///                 └──────────────────────────────────────────────────┘
/// ```
///
/// `Preflight` is only ever the initial phase; once left it is not re-entered
/// through the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationalPhase {
    /// Cold and dark, waiting for a flight plan.
    Preflight,
    /// At the gate preparing for departure (boarding, loading, refueling).
    Departure,
    /// Pushed back and taxiing to the runway.
    TaxiOut,
    /// Airborne.
    Flight,
    /// Landed and taxiing to the gate.
    TaxiIn,
    /// Parked at the gate after arrival (deboarding, unloading).
    Arrival,
    /// Between arrival and the next departure.
    Turnaround,
}

impl OperationalPhase {
    /// All phases in cycle order.
    pub const ALL: [OperationalPhase; 7] = [
        OperationalPhase::Preflight,
        OperationalPhase::Departure,
        OperationalPhase::TaxiOut,
        OperationalPhase::Flight,
        OperationalPhase::TaxiIn,
        OperationalPhase::Arrival,
        OperationalPhase::Turnaround,
    ];

    /// The single phase the fixed cycle allows after this one.
    pub fn successor(&self) -> OperationalPhase {
        match self {
            OperationalPhase::Preflight => OperationalPhase::Departure,
            OperationalPhase::Departure => OperationalPhase::TaxiOut,
            OperationalPhase::TaxiOut => OperationalPhase::Flight,
            OperationalPhase::Flight => OperationalPhase::TaxiIn,
            OperationalPhase::TaxiIn => OperationalPhase::Arrival,
            OperationalPhase::Arrival => OperationalPhase::Turnaround,
            OperationalPhase::Turnaround => OperationalPhase::Departure,
        }
    }

    /// Whether `target` is the cycle successor of this phase.
    pub fn can_advance_to(&self, target: OperationalPhase) -> bool {
        self.successor() == target
    }

    /// Whether the aircraft sits at a gate in this phase (ground services allowed).
    pub fn is_at_gate(&self) -> bool {
        matches!(
            self,
            OperationalPhase::Preflight
                | OperationalPhase::Departure
                | OperationalPhase::Arrival
                | OperationalPhase::Turnaround
        )
    }

    /// Lowercase identifier used in config keys and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalPhase::Preflight => "preflight",
            OperationalPhase::Departure => "departure",
            OperationalPhase::TaxiOut => "taxi_out",
            OperationalPhase::Flight => "flight",
            OperationalPhase::TaxiIn => "taxi_in",
            OperationalPhase::Arrival => "arrival",
            OperationalPhase::Turnaround => "turnaround",
        }
    }
}

impl fmt::Display for OperationalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationalPhase::Preflight => "Preflight",
            OperationalPhase::Departure => "Departure",
            OperationalPhase::TaxiOut => "TaxiOut",
            OperationalPhase::Flight => "Flight",
            OperationalPhase::TaxiIn => "TaxiIn",
            OperationalPhase::Arrival => "Arrival",
            OperationalPhase::Turnaround => "Turnaround",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OperationalPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        OperationalPhase::ALL
            .into_iter()
            .find(|p| p.as_str().replace('_', "") == normalized)
            .ok_or_else(|| format!("unknown phase '{}'", s))
    }
}

/// Log entry for one committed phase transition.
///
/// Created exactly once per transition and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransitionRecord {
    /// Phase that was left.
    pub from: OperationalPhase,
    /// Phase that was entered.
    pub to: OperationalPhase,
    /// Wall-clock time of the commit.
    pub timestamp: DateTime<Utc>,
    /// Time spent in `from`.
    pub time_in_phase: Duration,
    /// Optional human-readable reason supplied by the caller.
    pub reason: Option<String>,
    /// True when preconditions were bypassed via a manual override.
    #[serde(default)]
    pub forced: bool,
}
