//! Coordinator tuning.

use std::time::Duration;

/// Settings shared by every long-running operation.
#[derive(Debug, Clone)]
pub struct OperationSettings {
    /// Delay between adapter samples.
    pub sample_interval: Duration,

    /// Minimum interval between progress notifications.
    pub progress_interval: Duration,

    /// Consecutive sample failures tolerated before the operation fails.
    pub max_sample_failures: u32,

    /// Attempts to obtain the door domain when cargo needs its doors.
    pub door_retry_attempts: u32,

    /// Per-coordinator broadcast capacity.
    pub event_capacity: usize,
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(5),
            max_sample_failures: 5,
            door_retry_attempts: 5,
            event_capacity: 128,
        }
    }
}

/// Refuel/defuel behaviour.
#[derive(Debug, Clone)]
pub struct FuelSettings {
    /// Pump rate while refueling, kg/s.
    pub refuel_rate_kg_s: f64,

    /// Pump rate while defueling, kg/s.
    pub defuel_rate_kg_s: f64,

    /// Quantities within this of the plan count as reached.
    pub tolerance_kg: f64,
}

impl Default for FuelSettings {
    fn default() -> Self {
        Self {
            refuel_rate_kg_s: 28.0,
            defuel_rate_kg_s: 15.0,
            tolerance_kg: 5.0,
        }
    }
}

/// Cargo distribution.
#[derive(Debug, Clone)]
pub struct CargoSettings {
    /// Share of planned cargo in the forward hold, `0..=1`.
    pub forward_share: f64,

    /// Holds within this of the plan count as reached.
    pub tolerance_kg: f64,
}

impl Default for CargoSettings {
    fn default() -> Self {
        Self {
            forward_share: 0.45,
            tolerance_kg: 1.0,
        }
    }
}

/// All coordinator settings.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorSettings {
    pub operations: OperationSettings,
    pub fuel: FuelSettings,
    pub cargo: CargoSettings,
}
