//! Turnaround - ground-service coordination for simulated aircraft
//!
//! This library drives the ground side of an aircraft turnaround: it tracks
//! the operational phase from telemetry and, on every phase change, runs the
//! door, equipment, passenger, cargo and fuel services that phase calls for.
//!
//! # High-Level API
//!
//! For most use cases, the [`controller`] module provides a single facade:
//!
//! ```ignore
//! use turnaround::config::ConfigFile;
//! use turnaround::controller::TurnaroundController;
//!
//! let config = ConfigFile::load()?.controller_config();
//! let controller = TurnaroundController::start(config, adapters).await?;
//!
//! let mut events = controller.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod phase;

/// Version of the turnaround library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
