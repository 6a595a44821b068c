//! Configuration file handling for ~/.turnaround/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

pub use super::settings::*;

use crate::controller::ControllerConfig;
use crate::coordinator::{CoordinatorSettings, OperationSettings};
use crate::orchestrator::OrchestratorConfig;
use crate::phase::PhaseMachineConfig;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path (~/.turnaround/config.ini).
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path (~/.turnaround/config.ini).
    pub fn save(&self) -> Result<(), ConfigFileError> {
        let path = config_file_path();
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Render the file as it would be saved.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Build the runtime controller configuration from these settings.
    pub fn controller_config(&self) -> ControllerConfig {
        let phase_timeouts = self
            .timeouts
            .minutes
            .iter()
            .filter(|(_, minutes)| **minutes > 0)
            .map(|(phase, minutes)| (*phase, Duration::from_secs(minutes * 60)))
            .collect();

        let defaults = ControllerConfig::default();

        ControllerConfig {
            machine: PhaseMachineConfig {
                min_confidence: self.controller.min_confidence,
                phase_timeouts,
                ..defaults.machine
            },
            coordinators: CoordinatorSettings {
                operations: OperationSettings {
                    sample_interval: Duration::from_millis(self.operations.sample_interval_ms),
                    progress_interval: Duration::from_secs(self.operations.progress_interval_secs),
                    max_sample_failures: self.operations.max_sample_failures,
                    door_retry_attempts: self.operations.door_retry_attempts,
                    ..defaults.coordinators.operations
                },
                fuel: self.fuel.clone(),
                cargo: self.cargo.clone(),
            },
            orchestrator: OrchestratorConfig {
                coordinator_timeout: Duration::from_secs(self.operations.coordinator_timeout_secs),
                ..defaults.orchestrator
            },
            evaluation_interval: Duration::from_millis(self.controller.evaluation_interval_ms),
            auto_advance: self.controller.auto_advance,
            sync_every_ticks: self.controller.sync_every_ticks,
            ..defaults
        }
    }
}

/// Get the path to the config directory (~/.turnaround).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".turnaround")
}

/// Get the path to the config file (~/.turnaround/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::{
        DEFAULT_DEPARTURE_TIMEOUT_MINS, DEFAULT_EVALUATION_INTERVAL_MS, DEFAULT_LOG_FILE,
    };
    use crate::phase::OperationalPhase;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert_eq!(
            config.controller.evaluation_interval_ms,
            DEFAULT_EVALUATION_INTERVAL_MS
        );
        assert!(config.controller.auto_advance);
        assert_eq!(
            config.timeouts.minutes[&OperationalPhase::Departure],
            DEFAULT_DEPARTURE_TIMEOUT_MINS
        );
        assert_eq!(config.timeouts.minutes[&OperationalPhase::Flight], 0);
        assert_eq!(config.logging.file, DEFAULT_LOG_FILE);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        let default = ConfigFile::default();

        assert_eq!(config.controller, default.controller);
        assert_eq!(config.operations, default.operations);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.operations.sample_interval_ms = 250;
        config.fuel.refuel_rate_kg_s = 50.0;
        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded.operations.sample_interval_ms, 250);
        assert_eq!(loaded.fuel.refuel_rate_kg_s, 50.0);
    }

    #[test]
    fn test_load_reports_invalid_values() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, "[fuel]\nrefuel_rate_kg_s = -3\n").unwrap();

        let err = ConfigFile::load_from(&config_path).unwrap_err();
        assert!(err.to_string().contains("fuel.refuel_rate_kg_s"));
    }

    #[test]
    fn test_controller_config_projection() {
        let mut config = ConfigFile::default();
        config.controller.evaluation_interval_ms = 250;
        config.controller.min_confidence = 0.8;
        config.operations.coordinator_timeout_secs = 0;

        let runtime = config.controller_config();

        assert_eq!(runtime.evaluation_interval, Duration::from_millis(250));
        assert_eq!(runtime.machine.min_confidence, 0.8);
        assert_eq!(runtime.orchestrator.coordinator_timeout, Duration::ZERO);
        assert_eq!(
            runtime.machine.phase_timeouts[&OperationalPhase::Departure],
            Duration::from_secs(60 * 60)
        );
        // Disabled phases are not armed.
        assert!(!runtime
            .machine
            .phase_timeouts
            .contains_key(&OperationalPhase::Flight));
    }
}
