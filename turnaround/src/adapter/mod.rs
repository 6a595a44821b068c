//! Narrow gateways to the external engines.
//!
//! The controller depends only on three contracts:
//!
//! - [`GroundServicesAdapter`] - discrete read/write against the
//!   ground-services engine plus its unsolicited-change feed
//! - [`AircraftSystemsAdapter`] - value get/set against the aircraft-systems
//!   simulator plus its unsolicited-change feed
//! - [`FlightPlanProvider`] - read-only flight plan snapshot
//!
//! The traits use boxed futures so they can be held as trait objects and
//! swapped at runtime. Change feeds only carry changes made outside this
//! process (a human at a panel, the engine itself); the controller's own
//! writes are never echoed back.
//!
//! [`memory`] provides in-memory implementations used by the simulation
//! command and tests.

mod error;
pub mod memory;
pub mod signals;

pub use error::AdapterError;
pub use memory::{InMemoryAircraftSystems, InMemoryGroundServices, StaticFlightPlan};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Boxed future returned by adapter operations.
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AdapterError>> + Send + 'a>>;

/// Unsolicited change reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalChange {
    /// Signal id or variable path.
    pub key: String,
    /// New value.
    pub value: f64,
}

impl SignalChange {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Gateway to the ground-services engine.
pub trait GroundServicesAdapter: Send + Sync {
    /// Write a discrete signal.
    fn write_discrete<'a>(&'a self, signal: &'a str, value: f64) -> AdapterFuture<'a, ()>;

    /// Read a discrete signal.
    fn read_discrete<'a>(&'a self, signal: &'a str) -> AdapterFuture<'a, f64>;

    /// Subscribe to unsolicited signal changes.
    fn subscribe(&self) -> broadcast::Receiver<SignalChange>;
}

/// Gateway to the aircraft-systems simulator.
pub trait AircraftSystemsAdapter: Send + Sync {
    /// Set a simulator variable.
    fn set_value<'a>(&'a self, path: &'a str, value: f64) -> AdapterFuture<'a, ()>;

    /// Read a simulator variable.
    fn get_value<'a>(&'a self, path: &'a str) -> AdapterFuture<'a, f64>;

    /// Subscribe to unsolicited variable changes.
    fn subscribe(&self) -> broadcast::Receiver<SignalChange>;
}

/// Planned payload and fuel for the upcoming leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub origin: String,
    pub destination: String,
    pub passengers: u32,
    pub cargo_kg: f64,
    pub fuel_kg: f64,
}

/// Read-only source of the current flight plan.
pub trait FlightPlanProvider: Send + Sync {
    /// Current plan, or `None` when no plan is loaded.
    fn flight_plan(&self) -> Option<FlightPlan>;
}

/// The set of adapters handed to the controller.
#[derive(Clone)]
pub struct Adapters {
    pub ground_services: Arc<dyn GroundServicesAdapter>,
    pub aircraft: Arc<dyn AircraftSystemsAdapter>,
    pub flight_plan: Arc<dyn FlightPlanProvider>,
}
