//! Turnaround CLI - Command-line interface
//!
//! This binary drives the turnaround controller: it can run a scripted
//! turnaround against in-memory engines and manage the configuration file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "turnaround")]
#[command(version = turnaround::VERSION)]
#[command(about = "Coordinate ground services through an aircraft turnaround", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted turnaround against simulated engines
    ///
    /// Plays through Preflight, Departure, taxi, flight, arrival and the
    /// next Departure, printing every phase change and service event.
    Simulate(SimulateArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["turnaround", "simulate"]).unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.passengers, 150);
                assert_eq!(args.speed_up, 20);
                assert!(args.config.is_none());
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_speed_up_must_be_positive() {
        assert!(Cli::try_parse_from(["turnaround", "simulate", "--speed-up", "0"]).is_err());
    }
}
