//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (init, show, path)
//! - [`simulate`] - Scripted turnaround against in-memory engines

pub mod config;
pub mod simulate;
