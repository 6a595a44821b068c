//! Domain coordinators.
//!
//! Each coordinator owns the lifecycle of one operational domain: it turns
//! intents ("open the door", "start boarding") into writes against both
//! external engines, tracks progress, folds unsolicited engine changes into
//! its [`DomainState`], and publishes [`DomainEvent`]s on its own channel.
//!
//! | Coordinator | Entities | Operations |
//! |-------------|----------|------------|
//! | [`DoorCoordinator`] | four doors | open, close |
//! | [`EquipmentCoordinator`] | GPU, PCA, chocks, jetway | connect, disconnect |
//! | [`PassengerCoordinator`] | passengers on board | boarding, deboarding |
//! | [`CargoCoordinator`] | forward and aft hold | loading, unloading |
//! | [`FuelCoordinator`] | total fuel | refueling, defueling |
//!
//! # Concurrency
//!
//! One mutex per domain guards entity values and the in-progress slot. An
//! operation holds the slot through an [`OperationTicket`](operation::OperationTicket)
//! that releases it on completion, stop, failure, cancellation or drop.
//! Operations in different domains run concurrently.
//!
//! Every operation comes in three forms:
//!
//! - `start_*` / `stop_*`: synchronous, return `bool`, run the operation on a
//!   spawned task
//! - `*_async(cancel)`: run inline to completion
//! - phase management: start writes inline so failures surface, then leave
//!   long operations tracking in the background

mod cargo;
mod discrete;
mod door;
mod equipment;
mod error;
mod event;
mod fuel;
pub mod operation;
mod passenger;
pub mod progress;
mod reconcile;
mod settings;
mod state;

pub use cargo::{CargoCoordinator, Hold};
pub use door::{Door, DoorCoordinator};
pub use equipment::{EquipmentCoordinator, EquipmentItem};
pub use error::CoordinatorError;
pub use event::{DomainEvent, OperationOutcome};
pub use fuel::{FuelCoordinator, FuelTank};
pub use passenger::{PassengerCoordinator, Passengers};
pub use settings::{CargoSettings, CoordinatorSettings, FuelSettings, OperationSettings};
pub use state::{
    Domain, DomainState, DomainStatus, Entity, EntityStatus, EntityValue, OperationKind,
};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AircraftSystemsAdapter, FlightPlan, GroundServicesAdapter, SignalChange};
use crate::phase::OperationalPhase;

/// Boxed future returned by coordinator trait methods.
pub type CoordinatorFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CoordinatorError>> + Send + 'a>>;

/// Everything a coordinator needs from the outside world.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub ground: Arc<dyn GroundServicesAdapter>,
    pub aircraft: Arc<dyn AircraftSystemsAdapter>,
    pub settings: CoordinatorSettings,
    /// Parent of every operation spawned by a synchronous `start_*`.
    pub shutdown: CancellationToken,
}

/// Contract shared by all five coordinators.
pub trait Coordinator: Send + Sync {
    fn domain(&self) -> Domain;

    /// Bring domain state in line with the simulator before first use.
    fn initialize<'a>(&'a self, cancel: &'a CancellationToken) -> CoordinatorFuture<'a, ()> {
        Box::pin(async move {
            let changed = self.synchronize(cancel).await?;
            tracing::debug!(domain = %self.domain(), changed, "Coordinator initialized");
            Ok(())
        })
    }

    /// Reconcile domain state against the simulator's observed values.
    ///
    /// Returns the number of entities whose value changed.
    fn synchronize<'a>(&'a self, cancel: &'a CancellationToken) -> CoordinatorFuture<'a, usize>;

    /// Apply this domain's policy for `phase`.
    fn manage_for_phase<'a>(
        &'a self,
        phase: OperationalPhase,
        cancel: &'a CancellationToken,
    ) -> CoordinatorFuture<'a, ()>;

    /// Fold an unsolicited engine change into state. Returns whether the key
    /// belongs to this domain.
    fn apply_external(&self, change: &SignalChange) -> bool;

    /// Seed planned values from the flight plan.
    fn apply_flight_plan(&self, _plan: &FlightPlan) {}

    /// Cancel any active operation and wait until the domain is idle.
    fn stop_active<'a>(&'a self) -> CoordinatorFuture<'a, ()>;

    /// Return to defaults for a new turnaround.
    fn reset(&self);

    fn status(&self) -> DomainStatus;

    fn subscribe(&self) -> broadcast::Receiver<DomainEvent>;
}

/// Runtime handle for spawning operations from synchronous entry points.
pub(crate) fn spawner(domain: Domain) -> Option<tokio::runtime::Handle> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(_) => {
            tracing::warn!(%domain, "No async runtime; operation not started");
            None
        }
    }
}

/// The five coordinators, wired together.
#[derive(Clone)]
pub struct CoordinatorSet {
    pub door: Arc<DoorCoordinator>,
    pub equipment: Arc<EquipmentCoordinator>,
    pub passenger: Arc<PassengerCoordinator>,
    pub cargo: Arc<CargoCoordinator>,
    pub fuel: Arc<FuelCoordinator>,
}

impl CoordinatorSet {
    /// Build every coordinator and late-bind the cargo→door peer.
    pub fn new(ctx: CoordinatorContext) -> Self {
        let door = DoorCoordinator::new(ctx.clone());
        let equipment = EquipmentCoordinator::new(ctx.clone());
        let passenger = PassengerCoordinator::new(ctx.clone());
        let cargo = CargoCoordinator::new(ctx.clone());
        let fuel = FuelCoordinator::new(ctx);

        cargo.set_door_coordinator(door.clone());

        Self {
            door,
            equipment,
            passenger,
            cargo,
            fuel,
        }
    }

    pub fn get(&self, domain: Domain) -> Arc<dyn Coordinator> {
        match domain {
            Domain::Door => self.door.clone(),
            Domain::Equipment => self.equipment.clone(),
            Domain::Passenger => self.passenger.clone(),
            Domain::Cargo => self.cargo.clone(),
            Domain::Fuel => self.fuel.clone(),
        }
    }

    /// All coordinators in orchestration order.
    pub fn all(&self) -> Vec<Arc<dyn Coordinator>> {
        Domain::ALL.iter().map(|d| self.get(*d)).collect()
    }
}
