//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show` and `config path` for creating and
//! inspecting the INI configuration file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use turnaround::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Write to this file instead of ~/.turnaround/config.ini
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    ///
    /// Values missing from the file are shown with their defaults.
    Show {
        /// Read this file instead of ~/.turnaround/config.ini
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { path, force } => run_init(path.as_deref(), force),
        ConfigCommands::Show { path } => run_show(path.as_deref()),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

/// Create the configuration file.
fn run_init(path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);

    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Print the effective configuration.
fn run_show(path: Option<&Path>) -> Result<(), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;

    if path.exists() {
        println!("; Loaded from {}", path.display());
    } else {
        println!("; {} not found; showing defaults", path.display());
    }
    println!();
    print!("{}", config.to_ini_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        run_init(Some(&path), false).unwrap();
        assert!(path.exists());

        let err = run_init(Some(&path), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        run_init(Some(&path), true).unwrap();
    }

    #[test]
    fn test_show_reports_invalid_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[controller]\nmin_confidence = 7\n").unwrap();

        assert!(matches!(run_show(Some(&path)), Err(CliError::Config(_))));
    }
}
