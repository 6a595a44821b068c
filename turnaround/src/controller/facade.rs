//! The turnaround controller facade.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::command::ServiceCommand;
use super::config::ControllerConfig;
use super::error::ControllerError;
use super::event::ControllerEvent;
use super::tasks::{self, EvaluationSettings, Shared};
use crate::adapter::Adapters;
use crate::coordinator::{
    CoordinatorContext, CoordinatorSet, Domain, DomainStatus, OperationOutcome,
};
use crate::orchestrator::{OperationStatus, OrchestratorStatsSnapshot, ServiceOrchestrator};
use crate::phase::{
    AircraftTelemetrySnapshot, OperationalPhase, PhasePrediction, PhaseSnapshot,
    PhaseStateMachine, PhaseTransitionRecord, TimeoutHandle, TransitionCondition,
};

/// Ground-services controller for one aircraft.
///
/// Composes the phase state machine, the service orchestrator and the five
/// domain coordinators, and republishes everything they report as one
/// ordered [`ControllerEvent`] stream.
///
/// # Lifecycle
///
/// 1. **Start**: [`start`](Self::start) wires every component, synchronizes
///    the domains with the simulator and spawns the background tasks
/// 2. **Operation**: telemetry drives the phase; each phase change runs one
///    orchestration pass; callers may override the phase or command domains
/// 3. **Shutdown**: [`shutdown`](Self::shutdown) cancels running operations
///    and waits for every task to finish
///
/// # Example
///
/// ```ignore
/// use turnaround::controller::{ControllerConfig, TurnaroundController};
///
/// let controller = TurnaroundController::start(ControllerConfig::default(), adapters).await?;
/// let mut events = controller.subscribe();
/// while let Ok(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// controller.shutdown().await;
/// ```
pub struct TurnaroundController {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TurnaroundController {
    /// Build, wire and start the controller.
    ///
    /// Must be called inside a tokio runtime. A domain that cannot be
    /// synchronized at startup is logged and left for the periodic
    /// synchronize; it does not fail the start.
    pub async fn start(
        config: ControllerConfig,
        adapters: Adapters,
    ) -> Result<Self, ControllerError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ControllerError::NoRuntime);
        }

        info!("Starting turnaround controller");

        let shutdown = CancellationToken::new();
        let coordinators = CoordinatorSet::new(CoordinatorContext {
            ground: adapters.ground_services.clone(),
            aircraft: adapters.aircraft.clone(),
            settings: config.coordinators.clone(),
            shutdown: shutdown.clone(),
        });
        let orchestrator = Arc::new(ServiceOrchestrator::new(
            coordinators.clone(),
            config.orchestrator.clone(),
        ));
        let machine = PhaseStateMachine::new(config.machine.clone());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let shared = Arc::new(Shared {
            machine,
            coordinators,
            orchestrator,
            adapters,
            events,
            shutdown,
            passes: tokio::sync::Mutex::new(()),
        });

        for coordinator in shared.coordinators.all() {
            if let Err(e) = coordinator.initialize(&shared.shutdown).await {
                warn!(domain = %coordinator.domain(), error = %e, "Coordinator initialization failed");
            }
        }
        shared.seed_from_plan();

        let controller = Self {
            shared: shared.clone(),
            tasks: Mutex::new(Vec::new()),
        };
        controller.spawn_tasks(&config);

        info!(
            phase = %shared.machine.current_phase(),
            auto_advance = config.auto_advance,
            "Turnaround controller started"
        );
        Ok(controller)
    }

    fn spawn_tasks(&self, config: &ControllerConfig) {
        let shared = &self.shared;
        let mut handles = Vec::new();

        // Subscribe before spawning so nothing published in between is lost.
        for coordinator in shared.coordinators.all() {
            handles.push(tokio::spawn(tasks::forward_domain_events(
                shared.clone(),
                coordinator.subscribe(),
            )));
        }
        handles.push(tokio::spawn(tasks::forward_service_status(
            shared.clone(),
            shared.orchestrator.subscribe(),
        )));
        handles.push(tokio::spawn(tasks::feed_listener(
            shared.clone(),
            "aircraft",
            shared.adapters.aircraft.subscribe(),
        )));
        handles.push(tokio::spawn(tasks::feed_listener(
            shared.clone(),
            "ground",
            shared.adapters.ground_services.subscribe(),
        )));
        handles.push(tokio::spawn(tasks::phase_listener(
            shared.clone(),
            shared.machine.subscribe(),
        )));
        handles.push(tokio::spawn(tasks::evaluation_loop(
            shared.clone(),
            EvaluationSettings {
                interval: config.evaluation_interval,
                auto_advance: config.auto_advance,
                sync_every_ticks: config.sync_every_ticks,
            },
        )));

        self.tasks.lock().unwrap().extend(handles);
    }

    // =========================================================================
    // Phase
    // =========================================================================

    pub fn current_phase(&self) -> OperationalPhase {
        self.shared.machine.current_phase()
    }

    pub fn time_in_phase(&self) -> Duration {
        self.shared.machine.time_in_phase()
    }

    /// Committed transitions, oldest first.
    pub fn phase_history(&self) -> Vec<PhaseTransitionRecord> {
        self.shared.machine.history()
    }

    pub fn predict_next(&self, telemetry: &AircraftTelemetrySnapshot) -> PhasePrediction {
        self.shared.machine.predict_next(telemetry)
    }

    /// Attempt a validated transition against caller-supplied telemetry.
    pub fn try_transition(
        &self,
        target: OperationalPhase,
        telemetry: &AircraftTelemetrySnapshot,
        reason: Option<&str>,
    ) -> Result<PhaseTransitionRecord, ControllerError> {
        Ok(self.shared.machine.try_transition(target, telemetry, reason)?)
    }

    /// Attempt a validated transition against freshly read telemetry.
    pub async fn request_transition(
        &self,
        target: OperationalPhase,
        reason: Option<&str>,
    ) -> Result<PhaseTransitionRecord, ControllerError> {
        let telemetry = self.shared.read_telemetry().await?;
        self.try_transition(target, &telemetry, reason)
    }

    /// Manual override. The cycle is still enforced; preconditions are not.
    pub fn force_transition(
        &self,
        target: OperationalPhase,
        reason: Option<&str>,
    ) -> Result<PhaseTransitionRecord, ControllerError> {
        let record = self.shared.machine.force_transition(target, reason)?;
        warn!(from = %record.from, to = %record.to, "Phase forced by manual override");
        Ok(record)
    }

    /// Authorize an extra edge while `condition` holds.
    pub fn add_conditional_transition(
        &self,
        from: OperationalPhase,
        to: OperationalPhase,
        condition: Box<dyn TransitionCondition>,
    ) {
        self.shared
            .machine
            .add_conditional_transition(from, to, condition);
    }

    /// Arm a timeout for the current phase visit.
    ///
    /// Expiry is reported as [`ControllerEvent::OperationTimedOut`].
    pub fn set_phase_timeout(&self, duration: Duration) -> TimeoutHandle {
        self.shared.machine.set_timeout(duration, Box::new(|_| {}))
    }

    /// Read telemetry from the simulator as the evaluation loop sees it.
    pub async fn telemetry(&self) -> Result<AircraftTelemetrySnapshot, ControllerError> {
        Ok(self.shared.read_telemetry().await?)
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Start or stop a domain operation without waiting for it.
    ///
    /// Returns false when the domain is busy (start) or idle (stop).
    pub fn execute(&self, command: ServiceCommand) -> bool {
        let accepted = command.execute(&self.shared.coordinators);
        tracing::debug!(%command, accepted, "Service command");
        accepted
    }

    /// Run a domain operation to completion.
    pub async fn execute_async(
        &self,
        command: ServiceCommand,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, ControllerError> {
        command
            .execute_async(&self.shared.coordinators, cancel)
            .await
    }

    pub fn domain_status(&self, domain: Domain) -> DomainStatus {
        self.shared.coordinators.get(domain).status()
    }

    /// Direct access to the coordinators for typed queries.
    pub fn coordinators(&self) -> &CoordinatorSet {
        &self.shared.coordinators
    }

    pub fn last_operation_status(&self, domain: Domain) -> Option<OperationStatus> {
        self.shared.orchestrator.last_operation_status(domain)
    }

    pub fn orchestrator_stats(&self) -> OrchestratorStatsSnapshot {
        self.shared.orchestrator.stats()
    }

    /// Re-run one domain's policy for the current phase.
    pub async fn retry_domain(&self, domain: Domain) -> OperationStatus {
        let phase = self.current_phase();
        self.shared
            .orchestrator
            .retry(domain, phase, &self.shared.shutdown)
            .await
    }

    /// Re-read every domain from the simulator.
    ///
    /// Every domain is attempted; the first failure is returned after all of
    /// them ran.
    pub async fn synchronize_all(&self) -> Result<usize, ControllerError> {
        match self.shared.synchronize_all().await {
            (_, Some(e)) => Err(e.into()),
            (changed, None) => Ok(changed),
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn snapshot(&self) -> PhaseSnapshot {
        self.shared.machine.snapshot()
    }

    /// Write the phase snapshot to `writer`.
    pub fn save_snapshot<W: Write>(&self, writer: W) -> Result<(), ControllerError> {
        Ok(self.shared.machine.save_snapshot(writer)?)
    }

    /// Restore a snapshot from `reader` and apply the restored phase's
    /// service policy.
    ///
    /// Restoring fires no phase hooks and publishes no `PhaseChanged`. The
    /// pass waits for any pass already running, including the startup one.
    pub async fn resume<R: Read>(&self, reader: R) -> Result<PhaseSnapshot, ControllerError> {
        let snapshot = self.shared.machine.load_snapshot(reader)?;
        info!(phase = %snapshot.phase, "Resuming turnaround from snapshot");
        self.shared.seed_from_plan();
        self.shared.run_pass(snapshot.phase).await;
        Ok(snapshot)
    }

    // =========================================================================
    // Events and teardown
    // =========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.shared.shutdown.is_cancelled()
    }

    /// Stop every background task and running operation.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        if handles.is_empty() && self.shared.shutdown.is_cancelled() {
            return;
        }

        info!("Shutting down turnaround controller");
        self.shared.shutdown.cancel();

        for coordinator in self.shared.coordinators.all() {
            let _ = coordinator.stop_active().await;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Controller task panicked: {}", e);
            }
        }

        info!("Turnaround controller stopped");
    }
}

impl Drop for TurnaroundController {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
