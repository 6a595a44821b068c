//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use turnaround::config::ConfigFileError;
use turnaround::controller::ControllerError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// Controller failed to start or a command failed
    Controller(ControllerError),
    /// A scripted simulation step did not complete in time
    Simulation(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(_) = self {
            eprintln!();
            eprintln!("Run 'turnaround config show' to see the active settings, or");
            eprintln!("'turnaround config init --force' to rewrite the file with defaults.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Controller(e) => write!(f, "Controller error: {}", e),
            CliError::Simulation(msg) => write!(f, "Simulation stalled: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Controller(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ControllerError> for CliError {
    fn from(e: ControllerError) -> Self {
        CliError::Controller(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err: CliError = ConfigFileError::WriteError("disk full".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Failed to write config file: disk full"
        );
    }

    #[test]
    fn test_simulation_error_message() {
        let err = CliError::Simulation("waiting for TaxiOut".to_string());
        assert_eq!(err.to_string(), "Simulation stalled: waiting for TaxiOut");
    }
}
