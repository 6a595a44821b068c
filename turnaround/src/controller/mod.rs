//! Controller facade.
//!
//! [`TurnaroundController`] is the only surface external callers (a GUI, a
//! logger, an ACARS formatter) need. It owns every internal task and
//! republishes every internal notification as one [`ControllerEvent`] stream.
//!
//! # Architecture
//!
//! ```text
//!                       ┌──────────────────────────────┐
//!   telemetry ─────────►│ evaluation loop              │── evaluate() ──┐
//!   (every interval)    └──────────────────────────────┘                │
//!                                                                       ▼
//!                       ┌──────────────────────────────┐      ┌──────────────────┐
//!   PhaseEvent ────────►│ phase listener               │◄─────│ PhaseStateMachine│
//!                       │  seed plan → run_phase()     │      └──────────────────┘
//!                       └──────────────┬───────────────┘
//!                                      ▼
//!                       ┌──────────────────────────────┐
//!                       │ ServiceOrchestrator          │
//!                       │  Equipment → Door →          │
//!                       │  Passenger ∥ Cargo → Fuel    │
//!                       └──────────────┬───────────────┘
//!                                      ▼
//!   engine feeds ──────► feed listeners ──► coordinators ──► DomainEvent
//!                                                               │
//!                         fan-in ◄──────── OperationStatus ◄────┤
//!                           │                                   │
//!                           ▼                                   │
//!                    ControllerEvent stream ◄───────────────────┘
//! ```

mod command;
mod config;
mod error;
mod event;
mod facade;
mod tasks;

pub use command::ServiceCommand;
pub use config::{ControllerConfig, DEFAULT_CONTROLLER_EVENT_CAPACITY};
pub use error::ControllerError;
pub use event::ControllerEvent;
pub use facade::TurnaroundController;
