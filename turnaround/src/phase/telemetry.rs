//! Aircraft telemetry consumed by the phase state machine.

/// Point-in-time view of the aircraft supplied on every evaluation call.
///
/// This is read-only input. The state machine never stores it beyond the call
/// that uses it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AircraftTelemetrySnapshot {
    /// Weight on wheels.
    pub on_ground: bool,
    /// At least one engine is running.
    pub engines_running: bool,
    /// Parking brake set.
    pub parking_brake_set: bool,
    /// Beacon light on.
    pub beacon_on: bool,
    /// Ground speed in knots.
    pub ground_speed_kts: f64,
    /// Altitude above ground in feet.
    pub altitude_ft: f64,
    /// Any ground equipment (GPU, air, chocks, jetway) still attached.
    pub ground_equipment_connected: bool,
    /// A flight plan is available for the upcoming leg.
    pub flight_plan_loaded: bool,
}

impl AircraftTelemetrySnapshot {
    /// A parked aircraft: on ground, brake set, engines off.
    pub fn parked() -> Self {
        Self {
            on_ground: true,
            parking_brake_set: true,
            ..Default::default()
        }
    }

    /// Whether the aircraft is moving along the ground faster than `threshold_kts`.
    pub fn is_rolling(&self, threshold_kts: f64) -> bool {
        self.on_ground && self.ground_speed_kts > threshold_kts
    }

    /// Builder helper used by the evaluation loop and tests.
    pub fn with_flight_plan(mut self, loaded: bool) -> Self {
        self.flight_plan_loaded = loaded;
        self
    }

    /// Builder helper used by the evaluation loop and tests.
    pub fn with_ground_equipment(mut self, connected: bool) -> Self {
        self.ground_equipment_connected = connected;
        self
    }
}
