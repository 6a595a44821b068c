//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use std::collections::BTreeMap;

use super::settings::*;
use crate::phase::OperationalPhase;

// =============================================================================
// Controller
// =============================================================================

pub const DEFAULT_EVALUATION_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_AUTO_ADVANCE: bool = true;
pub const DEFAULT_MIN_CONFIDENCE: f64 = crate::phase::DEFAULT_MIN_CONFIDENCE;
pub const DEFAULT_SYNC_EVERY_TICKS: u32 = 10;

// =============================================================================
// Operations
// =============================================================================

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_SAMPLE_FAILURES: u32 = 5;
pub const DEFAULT_COORDINATOR_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DOOR_RETRY_ATTEMPTS: u32 = 5;

// =============================================================================
// Timeouts (minutes)
// =============================================================================

pub const DEFAULT_DEPARTURE_TIMEOUT_MINS: u64 = 60;
pub const DEFAULT_ARRIVAL_TIMEOUT_MINS: u64 = 30;
pub const DEFAULT_TURNAROUND_TIMEOUT_MINS: u64 = 120;

// =============================================================================
// Logging
// =============================================================================

pub const DEFAULT_LOG_DIRECTORY: &str = crate::logging::DEFAULT_LOG_DIR;
pub const DEFAULT_LOG_FILE: &str = crate::logging::DEFAULT_LOG_FILE;

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: DEFAULT_EVALUATION_INTERVAL_MS,
            auto_advance: DEFAULT_AUTO_ADVANCE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            sync_every_ticks: DEFAULT_SYNC_EVERY_TICKS,
        }
    }
}

impl Default for OperationsSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            progress_interval_secs: DEFAULT_PROGRESS_INTERVAL_SECS,
            max_sample_failures: DEFAULT_MAX_SAMPLE_FAILURES,
            coordinator_timeout_secs: DEFAULT_COORDINATOR_TIMEOUT_SECS,
            door_retry_attempts: DEFAULT_DOOR_RETRY_ATTEMPTS,
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let mut minutes: BTreeMap<OperationalPhase, u64> =
            OperationalPhase::ALL.iter().map(|p| (*p, 0)).collect();
        minutes.insert(OperationalPhase::Departure, DEFAULT_DEPARTURE_TIMEOUT_MINS);
        minutes.insert(OperationalPhase::Arrival, DEFAULT_ARRIVAL_TIMEOUT_MINS);
        minutes.insert(OperationalPhase::Turnaround, DEFAULT_TURNAROUND_TIMEOUT_MINS);
        Self { minutes }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: DEFAULT_LOG_DIRECTORY.into(),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            controller: ControllerSettings::default(),
            operations: OperationsSettings::default(),
            fuel: FuelSettings::default(),
            cargo: CargoSettings::default(),
            timeouts: TimeoutSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
