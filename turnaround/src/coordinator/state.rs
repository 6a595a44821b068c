//! Domain state types.
//!
//! Each coordinator owns one [`DomainState`] over a small fixed set of
//! entities. An entity carries a planned target and a currently observed
//! value; booleans (door open, equipment connected) use `0.0` / `1.0`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Operational domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    Door,
    Equipment,
    Passenger,
    Cargo,
    Fuel,
}

impl Domain {
    /// All domains in orchestration order.
    pub const ALL: [Domain; 5] = [
        Domain::Equipment,
        Domain::Door,
        Domain::Passenger,
        Domain::Cargo,
        Domain::Fuel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Door => "door",
            Domain::Equipment => "equipment",
            Domain::Passenger => "passenger",
            Domain::Cargo => "cargo",
            Domain::Fuel => "fuel",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Domain::Door => "Door",
            Domain::Equipment => "Equipment",
            Domain::Passenger => "Passenger",
            Domain::Cargo => "Cargo",
            Domain::Fuel => "Fuel",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown domain '{}'", s))
    }
}

/// Operation a coordinator can run. Each domain runs at most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    OpenDoor,
    CloseDoor,
    Connect,
    Disconnect,
    Boarding,
    Deboarding,
    Loading,
    Unloading,
    Refueling,
    Defueling,
}

impl OperationKind {
    /// Domain that owns this operation.
    pub fn domain(&self) -> Domain {
        match self {
            OperationKind::OpenDoor | OperationKind::CloseDoor => Domain::Door,
            OperationKind::Connect | OperationKind::Disconnect => Domain::Equipment,
            OperationKind::Boarding | OperationKind::Deboarding => Domain::Passenger,
            OperationKind::Loading | OperationKind::Unloading => Domain::Cargo,
            OperationKind::Refueling | OperationKind::Defueling => Domain::Fuel,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::OpenDoor => "door opening",
            OperationKind::CloseDoor => "door closing",
            OperationKind::Connect => "equipment connection",
            OperationKind::Disconnect => "equipment disconnection",
            OperationKind::Boarding => "boarding",
            OperationKind::Deboarding => "deboarding",
            OperationKind::Loading => "cargo loading",
            OperationKind::Unloading => "cargo unloading",
            OperationKind::Refueling => "refueling",
            OperationKind::Defueling => "defueling",
        };
        f.write_str(s)
    }
}

/// A named sub-entity of a domain.
pub trait Entity: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    /// Every entity of the domain, in a fixed order.
    fn all() -> &'static [Self];

    /// Stable lowercase name.
    fn name(&self) -> &'static str;

    /// Ground-services signal id, if the engine exposes one.
    fn ground_signal(&self) -> Option<&'static str>;

    /// Simulator variable path holding the observed value.
    fn sim_path(&self) -> &'static str;
}

/// Planned and observed value of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityValue {
    pub planned: f64,
    pub current: f64,
}

/// The in-progress operation and the means to cancel it.
#[derive(Debug, Clone)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    pub id: u64,
    pub started_at: Instant,
    pub cancel: CancellationToken,
}

/// Mutable state of one domain. Guarded by the owning coordinator's cell.
#[derive(Debug, Clone)]
pub struct DomainState<E: Entity> {
    pub values: BTreeMap<E, EntityValue>,
    pub operation: Option<ActiveOperation>,
    /// Last percentage reported for the active operation.
    pub progress: Option<f64>,
}

impl<E: Entity> Default for DomainState<E> {
    fn default() -> Self {
        Self {
            values: E::all()
                .iter()
                .map(|e| (*e, EntityValue::default()))
                .collect(),
            operation: None,
            progress: None,
        }
    }
}

impl<E: Entity> DomainState<E> {
    pub fn value(&self, entity: E) -> EntityValue {
        self.values.get(&entity).copied().unwrap_or_default()
    }

    pub fn current(&self, entity: E) -> f64 {
        self.value(entity).current
    }

    pub fn planned(&self, entity: E) -> f64 {
        self.value(entity).planned
    }

    /// Sum of observed values across entities.
    pub fn total_current(&self) -> f64 {
        self.values.values().map(|v| v.current).sum()
    }

    /// Sum of planned values across entities.
    pub fn total_planned(&self) -> f64 {
        self.values.values().map(|v| v.planned).sum()
    }
}

/// Read-only view of one entity for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStatus {
    pub name: &'static str,
    pub planned: f64,
    pub current: f64,
}

/// Read-only view of a domain for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainStatus {
    pub domain: Domain,
    pub entities: Vec<EntityStatus>,
    pub active: Option<OperationKind>,
    /// Percent complete of the active operation, if any.
    pub progress_percent: Option<f64>,
}

impl DomainStatus {
    pub(crate) fn from_state<E: Entity>(domain: Domain, state: &DomainState<E>) -> Self {
        Self {
            domain,
            entities: state
                .values
                .iter()
                .map(|(e, v)| EntityStatus {
                    name: e.name(),
                    planned: v.planned,
                    current: v.current,
                })
                .collect(),
            active: state.operation.as_ref().map(|op| op.kind),
            progress_percent: state.progress,
        }
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityStatus> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn total_current(&self) -> f64 {
        self.entities.iter().map(|e| e.current).sum()
    }

    pub fn total_planned(&self) -> f64 {
        self.entities.iter().map(|e| e.planned).sum()
    }

    /// Overall current/planned ratio in percent (100 when nothing is planned).
    pub fn percent_of_plan(&self) -> f64 {
        let planned = self.total_planned();
        if planned <= f64::EPSILON {
            100.0
        } else {
            (self.total_current() / planned * 100.0).clamp(0.0, 100.0)
        }
    }

    /// Whether an operation is in progress.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }
}
