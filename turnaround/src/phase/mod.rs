//! Operational phase state machine.
//!
//! The phase is the single source of truth for which ground operations are
//! valid at any moment. This module provides:
//!
//! - [`OperationalPhase`] and the fixed transition cycle
//! - [`AircraftTelemetrySnapshot`] - read-only input to every evaluation
//! - [`PhaseStateMachine`] - validated transitions, history, hooks,
//!   conditional transitions, phase-scoped timeouts and snapshots
//! - [`predict`] - deterministic telemetry decision table
//!
//! # Architecture
//!
//! ```text
//!   telemetry ──► evaluate() ──► conditionals? ──► try_transition()
//!                     │                                  │
//!                     └──► predict() ≥ min confidence ───┘
//!                                                        │
//!                          exit hooks → transition hooks → entry hooks
//!                                                        │
//!                                          PhaseEvent::Changed (broadcast)
//! ```

mod condition;
mod error;
mod machine;
mod rules;
mod snapshot;
mod telemetry;
mod timeout;
mod types;

pub use condition::{AlwaysAuthorized, FnCondition, OnBlocksCondition, TransitionCondition};
pub use error::PhaseError;
pub use machine::{
    PhaseEvent, PhaseMachineConfig, PhaseStateMachine, DEFAULT_EVENT_CAPACITY,
    DEFAULT_MIN_CONFIDENCE,
};
pub use rules::{check_preconditions, predict, PhasePrediction, TAXI_SPEED_KTS};
pub use snapshot::PhaseSnapshot;
pub use telemetry::AircraftTelemetrySnapshot;
pub use timeout::{TimeoutCallback, TimeoutHandle};
pub use types::{OperationalPhase, PhaseTransitionRecord};
