//! User configuration for the turnaround controller.
//!
//! Settings are stored in `~/.turnaround/config.ini` and projected into the
//! runtime [`ControllerConfig`](crate::controller::ControllerConfig) with
//! [`ConfigFile::controller_config`].
//!
//! # Example
//!
//! ```
//! use turnaround::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let runtime = config.controller_config();
//! assert!(runtime.auto_advance);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use settings::{
    CargoSettings, ControllerSettings, FuelSettings, LoggingSettings, OperationsSettings,
    TimeoutSettings,
};

pub use defaults::{
    DEFAULT_ARRIVAL_TIMEOUT_MINS, DEFAULT_AUTO_ADVANCE, DEFAULT_COORDINATOR_TIMEOUT_SECS,
    DEFAULT_DEPARTURE_TIMEOUT_MINS, DEFAULT_DOOR_RETRY_ATTEMPTS, DEFAULT_EVALUATION_INTERVAL_MS,
    DEFAULT_MAX_SAMPLE_FAILURES, DEFAULT_MIN_CONFIDENCE, DEFAULT_PROGRESS_INTERVAL_SECS,
    DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_SYNC_EVERY_TICKS, DEFAULT_TURNAROUND_TIMEOUT_MINS,
};
