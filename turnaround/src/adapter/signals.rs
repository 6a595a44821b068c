//! Signal-id and variable-path vocabulary shared with the external engines.
//!
//! Discrete values are `f64`; booleans are `0.0` / `1.0`.

/// Ground-services engine signal ids.
pub mod gs {
    pub const DOOR_FORWARD_LEFT: &str = "gs.door.forward_left";
    pub const DOOR_AFT_LEFT: &str = "gs.door.aft_left";
    pub const DOOR_FORWARD_CARGO: &str = "gs.door.forward_cargo";
    pub const DOOR_AFT_CARGO: &str = "gs.door.aft_cargo";

    pub const GROUND_POWER: &str = "gs.equipment.gpu";
    pub const PRECONDITIONED_AIR: &str = "gs.equipment.pca";
    pub const CHOCKS: &str = "gs.equipment.chocks";
    pub const JETWAY: &str = "gs.equipment.jetway";

    /// 1 while boarding is requested.
    pub const BOARDING_STATE: &str = "gs.boarding.state";
    /// Passengers boarded so far in this boarding run.
    pub const BOARDING_COUNT: &str = "gs.boarding.count";
    pub const DEBOARDING_STATE: &str = "gs.deboarding.state";
    /// Passengers deboarded so far in this deboarding run.
    pub const DEBOARDING_COUNT: &str = "gs.deboarding.count";

    pub const CARGO_LOADING_STATE: &str = "gs.cargo.loading.state";
    /// Loading progress, 0-100.
    pub const CARGO_LOADING_PERCENT: &str = "gs.cargo.loading.percent";
    pub const CARGO_UNLOADING_STATE: &str = "gs.cargo.unloading.state";
    /// Unloading progress, 0-100.
    pub const CARGO_UNLOADING_PERCENT: &str = "gs.cargo.unloading.percent";

    /// 1 = refuel requested, -1 = defuel requested, 0 = idle.
    pub const FUEL_STATE: &str = "gs.fuel.state";
}

/// Aircraft-systems simulator variable paths.
pub mod sim {
    pub const DOOR_FORWARD_LEFT: &str = "sim/doors/forward_left";
    pub const DOOR_AFT_LEFT: &str = "sim/doors/aft_left";
    pub const DOOR_FORWARD_CARGO: &str = "sim/doors/forward_cargo";
    pub const DOOR_AFT_CARGO: &str = "sim/doors/aft_cargo";

    pub const GROUND_POWER: &str = "sim/ground/gpu_connected";
    pub const PRECONDITIONED_AIR: &str = "sim/ground/pca_connected";
    pub const CHOCKS: &str = "sim/ground/chocks";
    pub const JETWAY: &str = "sim/ground/jetway_attached";

    pub const PASSENGERS_PLANNED: &str = "sim/payload/passengers_planned";
    pub const PASSENGERS_ONBOARD: &str = "sim/payload/passengers_onboard";

    pub const CARGO_FORWARD_KG: &str = "sim/payload/cargo_forward_kg";
    pub const CARGO_AFT_KG: &str = "sim/payload/cargo_aft_kg";
    /// Total cargo the loaders are working toward.
    pub const CARGO_PLANNED_KG: &str = "sim/payload/cargo_planned_kg";

    /// Fuel quantity on board.
    pub const FUEL_TOTAL_KG: &str = "sim/fuel/total_kg";
    /// Target quantity armed on the refuel panel; 0 when disarmed.
    pub const FUEL_TARGET_KG: &str = "sim/fuel/target_kg";
}

/// Simulator variable paths the evaluation loop reads every tick.
pub mod telemetry {
    pub const ON_GROUND: &str = "sim/flight/on_ground";
    pub const ENGINES_RUNNING: &str = "sim/engines/running";
    pub const PARKING_BRAKE: &str = "sim/controls/parking_brake";
    pub const BEACON: &str = "sim/lights/beacon";
    pub const GROUND_SPEED_KTS: &str = "sim/flight/ground_speed_kts";
    pub const ALTITUDE_AGL_FT: &str = "sim/flight/altitude_agl_ft";
}

/// Boolean encoding for discrete values.
pub fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Boolean decoding for discrete values (anything above one half is set).
pub fn is_set(value: f64) -> bool {
    value > 0.5
}
