//! Background tasks owned by the controller.
//!
//! Every task runs until the shutdown token is cancelled or its source
//! channel closes. Lagging receivers are logged and skip ahead.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::ControllerEvent;
use crate::adapter::{signals, AdapterError, Adapters, SignalChange};
use crate::coordinator::{CoordinatorSet, DomainEvent};
use crate::orchestrator::{OperationStatus, PassReport, ServiceOrchestrator};
use crate::phase::{
    AircraftTelemetrySnapshot, OperationalPhase, PhaseEvent, PhaseStateMachine,
    PhaseTransitionRecord,
};

/// State shared between the facade and its tasks.
pub(super) struct Shared {
    pub machine: Arc<PhaseStateMachine>,
    pub coordinators: CoordinatorSet,
    pub orchestrator: Arc<ServiceOrchestrator>,
    pub adapters: Adapters,
    pub events: broadcast::Sender<ControllerEvent>,
    pub shutdown: CancellationToken,
    /// Held for the whole of a pass, including the domain preparation
    /// before it.
    pub passes: tokio::sync::Mutex<()>,
}

impl Shared {
    pub fn publish(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Seed every coordinator's planned values from the flight plan.
    pub fn seed_from_plan(&self) -> bool {
        match self.adapters.flight_plan.flight_plan() {
            Some(plan) => {
                info!(
                    origin = %plan.origin,
                    destination = %plan.destination,
                    passengers = plan.passengers,
                    cargo_kg = plan.cargo_kg,
                    fuel_kg = plan.fuel_kg,
                    "Seeding services from flight plan"
                );
                for coordinator in self.coordinators.all() {
                    coordinator.apply_flight_plan(&plan);
                }
                true
            }
            None => {
                debug!("No flight plan loaded; planned values unchanged");
                false
            }
        }
    }

    /// Re-read every domain from the simulator. Returns the total number of
    /// entities that changed and the first error, if any.
    pub async fn synchronize_all(&self) -> (usize, Option<crate::coordinator::CoordinatorError>) {
        let mut changed = 0;
        let mut first_error = None;
        for coordinator in self.coordinators.all() {
            match coordinator.synchronize(&self.shutdown).await {
                Ok(n) => changed += n,
                Err(e) => {
                    warn!(domain = %coordinator.domain(), error = %e, "Synchronize failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        (changed, first_error)
    }

    /// Read the telemetry the phase rules need.
    pub async fn read_telemetry(&self) -> Result<AircraftTelemetrySnapshot, AdapterError> {
        use signals::telemetry as t;
        let sim = self.adapters.aircraft.as_ref();

        Ok(AircraftTelemetrySnapshot {
            on_ground: signals::is_set(sim.get_value(t::ON_GROUND).await?),
            engines_running: signals::is_set(sim.get_value(t::ENGINES_RUNNING).await?),
            parking_brake_set: signals::is_set(sim.get_value(t::PARKING_BRAKE).await?),
            beacon_on: signals::is_set(sim.get_value(t::BEACON).await?),
            ground_speed_kts: sim.get_value(t::GROUND_SPEED_KTS).await?,
            altitude_ft: sim.get_value(t::ALTITUDE_AGL_FT).await?,
            ground_equipment_connected: self.coordinators.equipment.any_connected(),
            flight_plan_loaded: self.adapters.flight_plan.flight_plan().is_some(),
        })
    }

    /// Run one orchestration pass for `phase`.
    ///
    /// Passes never overlap: a pass waits for the one in flight to finish
    /// dispatching.
    pub async fn run_pass(&self, phase: OperationalPhase) -> PassReport {
        let _pass = self.passes.lock().await;
        self.dispatch(phase).await
    }

    /// Prepare the domains for the phase just entered, then run its pass.
    async fn enter_phase(&self, record: &PhaseTransitionRecord) -> PassReport {
        let _pass = self.passes.lock().await;
        self.prepare_for(record).await;
        self.dispatch(record.to).await
    }

    async fn dispatch(&self, phase: OperationalPhase) -> PassReport {
        let report = self.orchestrator.run_phase(phase, &self.shutdown).await;
        if !report.all_ok() {
            warn!(
                %phase,
                failed = report.failures().count(),
                "Some services failed for phase"
            );
        }
        report
    }

    /// Prepare the domains for the phase just entered.
    ///
    /// Entering Departure seeds planned values from the flight plan. Coming
    /// from Turnaround it first stops whatever is still running in every
    /// domain, waits for the slot to free up and only then resets and
    /// re-reads the simulator, starting a fresh turnaround.
    async fn prepare_for(&self, record: &PhaseTransitionRecord) {
        if record.to != OperationalPhase::Departure {
            return;
        }
        let new_turnaround = record.from == OperationalPhase::Turnaround;
        if new_turnaround {
            info!("New turnaround; resetting services");
            for coordinator in self.coordinators.all() {
                // A run left over from the last visit must not write after the reset.
                if let Err(e) = coordinator.stop_active().await {
                    warn!(domain = %coordinator.domain(), error = %e, "Stop before reset failed");
                }
                coordinator.reset();
            }
        }
        self.seed_from_plan();
        if new_turnaround {
            let (changed, _) = self.synchronize_all().await;
            debug!(changed, "Services synchronized for new turnaround");
        }
    }
}

// =============================================================================
// Phase listener
// =============================================================================

/// Run the pass for the phase current at startup, then republish phase
/// events and run one orchestration pass per entered phase.
///
/// The outward `PhaseChanged` is published before the pass starts so that it
/// precedes every domain event the pass causes.
pub(super) async fn phase_listener(shared: Arc<Shared>, mut rx: broadcast::Receiver<PhaseEvent>) {
    shared.run_pass(shared.machine.current_phase()).await;

    loop {
        let event = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(PhaseEvent::Changed(record)) => {
                shared.publish(ControllerEvent::PhaseChanged(record.clone()));
                shared.enter_phase(&record).await;
            }
            Ok(PhaseEvent::TimedOut { phase, after }) => {
                shared.publish(ControllerEvent::OperationTimedOut { phase, after });
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Phase listener lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!("Phase listener stopped");
}

// =============================================================================
// External change feeds
// =============================================================================

/// Route unsolicited engine changes to the coordinator that owns the key.
pub(super) async fn feed_listener(
    shared: Arc<Shared>,
    source: &'static str,
    mut rx: broadcast::Receiver<SignalChange>,
) {
    let coordinators = shared.coordinators.all();

    loop {
        let change = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            change = rx.recv() => change,
        };

        match change {
            Ok(change) => {
                let claimed = coordinators.iter().any(|c| c.apply_external(&change));
                if !claimed {
                    tracing::trace!(source, key = %change.key, "Unclaimed external change");
                }
            }
            Err(RecvError::Lagged(missed)) => {
                // Missed changes are recovered by the next synchronize.
                warn!(source, missed, "External change feed lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!(source, "External change listener stopped");
}

// =============================================================================
// Event fan-in
// =============================================================================

/// Forward one coordinator's events to the outward stream.
pub(super) async fn forward_domain_events(
    shared: Arc<Shared>,
    mut rx: broadcast::Receiver<DomainEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(event) => shared.publish(ControllerEvent::DomainStateChanged(event)),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Domain event forwarder lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Forward orchestrator outcomes to the outward stream.
pub(super) async fn forward_service_status(
    shared: Arc<Shared>,
    mut rx: broadcast::Receiver<OperationStatus>,
) {
    loop {
        let status = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            status = rx.recv() => status,
        };

        match status {
            Ok(status) => shared.publish(ControllerEvent::ServiceStatusChanged(status)),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Service status forwarder lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

// =============================================================================
// Evaluation loop
// =============================================================================

/// Evaluation loop settings.
pub(super) struct EvaluationSettings {
    pub interval: std::time::Duration,
    pub auto_advance: bool,
    pub sync_every_ticks: u32,
}

/// Poll telemetry, auto-advance the phase and periodically resynchronize.
pub(super) async fn evaluation_loop(shared: Arc<Shared>, settings: EvaluationSettings) {
    let mut interval = tokio::time::interval(settings.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        tick += 1;

        if settings.auto_advance {
            match shared.read_telemetry().await {
                Ok(telemetry) => {
                    if let Some(record) = shared.machine.evaluate(&telemetry) {
                        debug!(from = %record.from, to = %record.to, "Auto-advanced from telemetry");
                    }
                }
                Err(e) => debug!(error = %e, "Telemetry unavailable; evaluation skipped"),
            }
        }

        if settings.sync_every_ticks > 0 && tick % u64::from(settings.sync_every_ticks) == 0 {
            let (changed, _) = shared.synchronize_all().await;
            if changed > 0 {
                debug!(changed, "Periodic synchronize applied changes");
            }
        }
    }

    debug!("Evaluation loop stopped");
}
