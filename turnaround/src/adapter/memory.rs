//! In-memory adapters.
//!
//! Both engines are modelled by a [`SignalTable`]: a map of key to value with
//! a few knobs for exercising the controller without a simulator attached.
//!
//! - **Failure injection**: [`fail_key`](SignalTable::fail_key) makes every
//!   read and write of a key fail until [`heal_key`](SignalTable::heal_key)
//! - **Unsolicited changes**: [`inject`](SignalTable::inject) sets a value
//!   and publishes it on the change feed, as a human at a panel would
//! - **Ramps**: [`ramp`](SignalTable::ramp) advances a value by a fixed step
//!   on every read until it reaches a limit; [`ramp_on`](SignalTable::ramp_on)
//!   starts such a ramp whenever a trigger key is written non-zero, which is
//!   how the simulated ground-services engine "performs" boarding or loading
//!
//! Writes made through the adapter traits are recorded but never published
//! on the change feed.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;

use super::{
    AdapterError, AdapterFuture, AircraftSystemsAdapter, FlightPlan, FlightPlanProvider,
    GroundServicesAdapter, SignalChange,
};

/// Capacity of each in-memory change feed.
const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Ramp {
    step: f64,
    limit: f64,
}

impl Ramp {
    fn advance(&self, value: f64) -> f64 {
        if self.step >= 0.0 {
            (value + self.step).min(self.limit)
        } else {
            (value + self.step).max(self.limit)
        }
    }
}

#[derive(Debug, Clone)]
struct Trigger {
    target: String,
    ramp: Ramp,
}

#[derive(Default)]
struct TableState {
    values: HashMap<String, f64>,
    failing: HashSet<String>,
    ramps: HashMap<String, Ramp>,
    triggers: HashMap<String, Trigger>,
    writes: Vec<(String, f64)>,
    reads: u64,
    disconnected: bool,
}

impl TableState {
    fn check(&self, key: &str) -> Result<(), AdapterError> {
        if self.disconnected {
            return Err(AdapterError::Disconnected);
        }
        if self.failing.contains(key) {
            return Err(AdapterError::communication(key, "injected failure"));
        }
        Ok(())
    }
}

/// Key/value model of one external engine.
pub struct SignalTable {
    state: Mutex<TableState>,
    changes: broadcast::Sender<SignalChange>,
    latency: Duration,
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTable {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: Mutex::new(TableState::default()),
            changes,
            latency: Duration::ZERO,
        }
    }

    /// Delay applied to every adapter call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a value without publishing it.
    pub fn set(&self, key: &str, value: f64) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert(key.to_string(), value);
    }

    /// Current value without advancing ramps. Unset keys read as `None`.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.state.lock().unwrap().values.get(key).copied()
    }

    /// Set a value and publish it as an unsolicited change.
    pub fn inject(&self, key: &str, value: f64) {
        self.set(key, value);
        let _ = self.changes.send(SignalChange::new(key, value));
    }

    /// Make every access to `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.state.lock().unwrap().failing.insert(key.to_string());
    }

    /// Undo [`fail_key`](Self::fail_key).
    pub fn heal_key(&self, key: &str) {
        self.state.lock().unwrap().failing.remove(key);
    }

    /// Make every access fail with [`AdapterError::Disconnected`].
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().unwrap().disconnected = disconnected;
    }

    /// Advance `key` by `step` on every read until it reaches `limit`.
    pub fn ramp(&self, key: &str, step: f64, limit: f64) {
        self.state
            .lock()
            .unwrap()
            .ramps
            .insert(key.to_string(), Ramp { step, limit });
    }

    /// Stop ramping `key`; the value stays where it is.
    pub fn stop_ramp(&self, key: &str) {
        self.state.lock().unwrap().ramps.remove(key);
    }

    /// Start a ramp on `target` from zero whenever `trigger` is written
    /// non-zero; stop it when `trigger` is written zero.
    pub fn ramp_on(&self, trigger: &str, target: &str, step: f64, limit: f64) {
        self.state.lock().unwrap().triggers.insert(
            trigger.to_string(),
            Trigger {
                target: target.to_string(),
                ramp: Ramp { step, limit },
            },
        );
    }

    /// Every write made through the adapter trait, oldest first.
    pub fn writes(&self) -> Vec<(String, f64)> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Writes made to one key, oldest first.
    pub fn writes_to(&self, key: &str) -> Vec<f64> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of reads served.
    pub fn read_count(&self) -> u64 {
        self.state.lock().unwrap().reads
    }

    /// Subscribe to injected changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SignalChange> {
        self.changes.subscribe()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn write(&self, key: &str, value: f64) -> Result<(), AdapterError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.check(key)?;
        state.values.insert(key.to_string(), value);
        state.writes.push((key.to_string(), value));

        if let Some(trigger) = state.triggers.get(key).cloned() {
            if value != 0.0 {
                state.values.insert(trigger.target.clone(), 0.0);
                state.ramps.insert(trigger.target, trigger.ramp);
            } else {
                state.ramps.remove(&trigger.target);
            }
        }
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<f64, AdapterError> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        state.check(key)?;
        state.reads += 1;

        let current = state.values.get(key).copied().unwrap_or(0.0);
        let value = match state.ramps.get(key) {
            Some(ramp) => ramp.advance(current),
            None => current,
        };
        state.values.insert(key.to_string(), value);
        Ok(value)
    }
}

/// In-memory ground-services engine.
#[derive(Default)]
pub struct InMemoryGroundServices(SignalTable);

impl InMemoryGroundServices {
    pub fn new() -> Self {
        Self(SignalTable::new())
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self(SignalTable::new().with_latency(latency))
    }
}

impl Deref for InMemoryGroundServices {
    type Target = SignalTable;

    fn deref(&self) -> &SignalTable {
        &self.0
    }
}

impl GroundServicesAdapter for InMemoryGroundServices {
    fn write_discrete<'a>(&'a self, signal: &'a str, value: f64) -> AdapterFuture<'a, ()> {
        Box::pin(self.0.write(signal, value))
    }

    fn read_discrete<'a>(&'a self, signal: &'a str) -> AdapterFuture<'a, f64> {
        Box::pin(self.0.read(signal))
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalChange> {
        self.0.subscribe()
    }
}

/// In-memory aircraft-systems simulator.
#[derive(Default)]
pub struct InMemoryAircraftSystems(SignalTable);

impl InMemoryAircraftSystems {
    pub fn new() -> Self {
        Self(SignalTable::new())
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self(SignalTable::new().with_latency(latency))
    }
}

impl Deref for InMemoryAircraftSystems {
    type Target = SignalTable;

    fn deref(&self) -> &SignalTable {
        &self.0
    }
}

impl AircraftSystemsAdapter for InMemoryAircraftSystems {
    fn set_value<'a>(&'a self, path: &'a str, value: f64) -> AdapterFuture<'a, ()> {
        Box::pin(self.0.write(path, value))
    }

    fn get_value<'a>(&'a self, path: &'a str) -> AdapterFuture<'a, f64> {
        Box::pin(self.0.read(path))
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalChange> {
        self.0.subscribe()
    }
}

/// Flight plan provider backed by a replaceable value.
#[derive(Default)]
pub struct StaticFlightPlan {
    plan: Mutex<Option<FlightPlan>>,
}

impl StaticFlightPlan {
    pub fn new(plan: Option<FlightPlan>) -> Self {
        Self {
            plan: Mutex::new(plan),
        }
    }

    /// Replace the plan (e.g. the pilot filed the next leg).
    pub fn set(&self, plan: Option<FlightPlan>) {
        *self.plan.lock().unwrap() = plan;
    }
}

impl FlightPlanProvider for StaticFlightPlan {
    fn flight_plan(&self) -> Option<FlightPlan> {
        self.plan.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_unset_is_zero() {
        let gs = InMemoryGroundServices::new();
        assert_eq!(gs.read_discrete("gs.unknown").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_writes_are_recorded_not_published() {
        let sim = InMemoryAircraftSystems::new();
        let mut rx = AircraftSystemsAdapter::subscribe(&sim);

        sim.set_value("sim/doors/aft_left", 1.0).await.unwrap();

        assert_eq!(sim.value("sim/doors/aft_left"), Some(1.0));
        assert_eq!(sim.writes_to("sim/doors/aft_left"), vec![1.0]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inject_publishes() {
        let sim = InMemoryAircraftSystems::new();
        let mut rx = AircraftSystemsAdapter::subscribe(&sim);

        sim.inject("sim/doors/aft_left", 1.0);

        let change = rx.recv().await.unwrap();
        assert_eq!(change, SignalChange::new("sim/doors/aft_left", 1.0));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let gs = InMemoryGroundServices::new();
        gs.fail_key("gs.fuel.state");

        let err = gs.write_discrete("gs.fuel.state", 1.0).await.unwrap_err();
        assert!(matches!(err, AdapterError::Communication { .. }));
        assert!(gs.writes().is_empty());

        gs.heal_key("gs.fuel.state");
        gs.write_discrete("gs.fuel.state", 1.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnected() {
        let gs = InMemoryGroundServices::new();
        gs.set_disconnected(true);
        assert_eq!(
            gs.read_discrete("gs.boarding.count").await.unwrap_err(),
            AdapterError::Disconnected
        );
    }

    #[tokio::test]
    async fn test_ramp_advances_on_read() {
        let gs = InMemoryGroundServices::new();
        gs.ramp("gs.boarding.count", 40.0, 100.0);

        assert_eq!(gs.read_discrete("gs.boarding.count").await.unwrap(), 40.0);
        assert_eq!(gs.read_discrete("gs.boarding.count").await.unwrap(), 80.0);
        assert_eq!(gs.read_discrete("gs.boarding.count").await.unwrap(), 100.0);
        assert_eq!(gs.read_discrete("gs.boarding.count").await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_negative_ramp() {
        let sim = InMemoryAircraftSystems::new();
        sim.set("sim/fuel/total_kg", 100.0);
        sim.ramp("sim/fuel/total_kg", -60.0, 0.0);

        assert_eq!(sim.get_value("sim/fuel/total_kg").await.unwrap(), 40.0);
        assert_eq!(sim.get_value("sim/fuel/total_kg").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_trigger_starts_and_stops_ramp() {
        let gs = InMemoryGroundServices::new();
        gs.set("gs.boarding.count", 55.0);
        gs.ramp_on("gs.boarding.state", "gs.boarding.count", 10.0, 30.0);

        gs.write_discrete("gs.boarding.state", 1.0).await.unwrap();
        assert_eq!(gs.read_discrete("gs.boarding.count").await.unwrap(), 10.0);

        gs.write_discrete("gs.boarding.state", 0.0).await.unwrap();
        assert_eq!(gs.read_discrete("gs.boarding.count").await.unwrap(), 10.0);
    }

    #[test]
    fn test_static_flight_plan() {
        let provider = StaticFlightPlan::new(None);
        assert!(provider.flight_plan().is_none());

        provider.set(Some(FlightPlan {
            origin: "EGLL".to_string(),
            destination: "LFPG".to_string(),
            passengers: 150,
            cargo_kg: 2000.0,
            fuel_kg: 6000.0,
        }));
        assert_eq!(provider.flight_plan().unwrap().passengers, 150);
    }
}
