//! Service orchestration.
//!
//! On every phase change the [`ServiceOrchestrator`] asks each domain
//! coordinator to apply its phase policy, in a fixed order, and records the
//! outcome per domain. One coordinator failing never aborts the pass.
//!
//! # Architecture
//!
//! ```text
//! PhaseEvent::Changed ──► run_phase(phase)
//!                           │
//!                           ├─► Equipment
//!                           ├─► Door
//!                           ├─► Passenger ┐ concurrently
//!                           ├─► Cargo     ┘
//!                           └─► Fuel
//!                                 │
//!                                 ▼
//!                 OperationStatus per domain ──► broadcast
//! ```

mod service;
mod stats;
mod types;

pub use service::{
    OrchestratorConfig, PostDispatchHook, PreDispatchHook, ServiceOrchestrator,
};
pub use stats::{OrchestratorStats, OrchestratorStatsSnapshot};
pub use types::{OperationStatus, PassReport, ServiceFailure};
