//! Runtime configuration for the controller.

use std::time::Duration;

use crate::coordinator::CoordinatorSettings;
use crate::orchestrator::OrchestratorConfig;
use crate::phase::PhaseMachineConfig;

/// Default capacity of the outward event stream.
pub const DEFAULT_CONTROLLER_EVENT_CAPACITY: usize = 256;

/// Everything [`TurnaroundController::start`](super::TurnaroundController::start)
/// needs besides the adapters.
///
/// Usually built from the user's INI file with
/// [`ConfigFile::controller_config`](crate::config::ConfigFile::controller_config).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Phase state machine settings, including per-phase timeouts.
    pub machine: PhaseMachineConfig,

    /// Coordinator sampling and domain tuning.
    pub coordinators: CoordinatorSettings,

    /// Orchestration pass settings.
    pub orchestrator: OrchestratorConfig,

    /// Delay between telemetry evaluations.
    pub evaluation_interval: Duration,

    /// Advance the phase automatically from telemetry.
    pub auto_advance: bool,

    /// Synchronize every coordinator every N evaluations. Zero disables.
    pub sync_every_ticks: u32,

    /// Capacity of the outward event stream.
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            machine: PhaseMachineConfig::default(),
            coordinators: CoordinatorSettings::default(),
            orchestrator: OrchestratorConfig::default(),
            evaluation_interval: Duration::from_secs(1),
            auto_advance: true,
            sync_every_ticks: 10,
            event_capacity: DEFAULT_CONTROLLER_EVENT_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Set the evaluation interval.
    pub fn with_evaluation_interval(mut self, interval: Duration) -> Self {
        self.evaluation_interval = interval;
        self
    }

    /// Enable or disable telemetry-driven phase advancement.
    pub fn with_auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = enabled;
        self
    }
}
