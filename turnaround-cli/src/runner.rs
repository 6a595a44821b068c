//! CLI runner for common setup.
//!
//! Encapsulates config loading, logging initialization and runtime creation
//! so command handlers only deal with their own work.

use std::path::Path;

use tracing::info;
use turnaround::config::ConfigFile;
use turnaround::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Load configuration (from `path`, or the default location) and
    /// initialize logging from its `[logging]` section.
    pub fn new(path: Option<&Path>) -> Result<Self, CliError> {
        let config = match path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Turnaround v{}", turnaround::VERSION);
        info!("Turnaround CLI: {} command", command);
    }

    /// Build the multi-threaded runtime the controller runs on.
    pub fn runtime(&self) -> Result<tokio::runtime::Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("turnaround")
            .build()
            .map_err(CliError::Runtime)
    }
}
