//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::collections::BTreeMap;
use std::path::PathBuf;

pub use crate::coordinator::{CargoSettings, FuelSettings};
use crate::phase::OperationalPhase;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Evaluation loop and auto-advance
    pub controller: ControllerSettings,
    /// Long-running operation tracking
    pub operations: OperationsSettings,
    /// Refuel and defuel behaviour
    pub fuel: FuelSettings,
    /// Cargo distribution
    pub cargo: CargoSettings,
    /// Per-phase timeouts
    pub timeouts: TimeoutSettings,
    /// Log file location
    pub logging: LoggingSettings,
}

/// `[controller]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Milliseconds between telemetry evaluations.
    pub evaluation_interval_ms: u64,
    /// Advance the phase automatically from telemetry.
    pub auto_advance: bool,
    /// Prediction confidence needed for an automatic advance, `0.0..=1.0`.
    pub min_confidence: f64,
    /// Re-synchronize every coordinator every N evaluations (0 = never).
    pub sync_every_ticks: u32,
}

/// `[operations]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationsSettings {
    /// Milliseconds between progress samples.
    pub sample_interval_ms: u64,
    /// Minimum seconds between progress notifications.
    pub progress_interval_secs: u64,
    /// Consecutive sample failures before an operation fails.
    pub max_sample_failures: u32,
    /// Time budget for one coordinator call during a pass (0 = unbounded).
    pub coordinator_timeout_secs: u64,
    /// Attempts to obtain the doors for cargo operations.
    pub door_retry_attempts: u32,
}

/// `[timeouts]` section: minutes per phase, 0 disables.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutSettings {
    pub minutes: BTreeMap<OperationalPhase, u64>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory for the log file.
    pub directory: PathBuf,
    /// Log file name.
    pub file: String,
}
