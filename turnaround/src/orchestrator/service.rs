//! Phase-driven dispatch to the domain coordinators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::stats::{OrchestratorStats, OrchestratorStatsSnapshot};
use super::types::{OperationStatus, PassReport};
use crate::coordinator::{CoordinatorError, CoordinatorSet, Domain};
use crate::phase::OperationalPhase;

/// Called before a coordinator's phase policy runs.
pub type PreDispatchHook = Arc<dyn Fn(OperationalPhase, Domain) + Send + Sync>;

/// Called with the outcome of a coordinator's phase policy.
pub type PostDispatchHook = Arc<dyn Fn(&OperationStatus) + Send + Sync>;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time budget for one coordinator call. Zero disables the budget.
    pub coordinator_timeout: Duration,

    /// Capacity of the status broadcast channel.
    pub status_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            coordinator_timeout: Duration::from_secs(60),
            status_capacity: 64,
        }
    }
}

/// Sequences coordinator phase policies and isolates their failures.
///
/// Dispatch order for every pass is Equipment, Door, then Passenger and
/// Cargo concurrently, then Fuel. A failing coordinator is logged and
/// recorded; the pass carries on with the others and the failing domain is
/// left for [`retry`](Self::retry) or the next phase entry.
///
/// # Example
///
/// ```ignore
/// use turnaround::orchestrator::{OrchestratorConfig, ServiceOrchestrator};
///
/// let orchestrator = ServiceOrchestrator::new(coordinators, OrchestratorConfig::default());
/// let report = orchestrator.run_phase(OperationalPhase::Departure, &cancel).await;
/// for failure in report.failures() {
///     eprintln!("{} failed: {:?}", failure.domain, failure.error);
/// }
/// ```
pub struct ServiceOrchestrator {
    coordinators: CoordinatorSet,
    config: OrchestratorConfig,
    last_status: Mutex<HashMap<Domain, OperationStatus>>,
    pre_hooks: RwLock<Vec<PreDispatchHook>>,
    post_hooks: RwLock<Vec<PostDispatchHook>>,
    events: broadcast::Sender<OperationStatus>,
    stats: OrchestratorStats,
}

impl ServiceOrchestrator {
    pub fn new(coordinators: CoordinatorSet, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(config.status_capacity.max(1));
        Self {
            coordinators,
            config,
            last_status: Mutex::new(HashMap::new()),
            pre_hooks: RwLock::new(Vec::new()),
            post_hooks: RwLock::new(Vec::new()),
            events,
            stats: OrchestratorStats::new(),
        }
    }

    pub fn coordinators(&self) -> &CoordinatorSet {
        &self.coordinators
    }

    /// Subscribe to per-domain outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationStatus> {
        self.events.subscribe()
    }

    pub fn on_before_dispatch<F>(&self, hook: F)
    where
        F: Fn(OperationalPhase, Domain) + Send + Sync + 'static,
    {
        self.pre_hooks.write().unwrap().push(Arc::new(hook));
    }

    pub fn on_after_dispatch<F>(&self, hook: F)
    where
        F: Fn(&OperationStatus) + Send + Sync + 'static,
    {
        self.post_hooks.write().unwrap().push(Arc::new(hook));
    }

    /// Outcome of the most recent call to `domain`'s coordinator.
    pub fn last_operation_status(&self, domain: Domain) -> Option<OperationStatus> {
        self.last_status.lock().unwrap().get(&domain).cloned()
    }

    pub fn stats(&self) -> OrchestratorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Apply every coordinator's policy for `phase`.
    ///
    /// Long operations started by a coordinator keep running after this
    /// returns; their parent token is `cancel`.
    pub async fn run_phase(
        &self,
        phase: OperationalPhase,
        cancel: &CancellationToken,
    ) -> PassReport {
        let started = Instant::now();
        self.stats.record_pass();
        tracing::info!(%phase, "Orchestration pass started");

        let mut statuses = Vec::with_capacity(Domain::ALL.len());
        statuses.push(self.dispatch(Domain::Equipment, phase, cancel).await);
        statuses.push(self.dispatch(Domain::Door, phase, cancel).await);

        let (passenger, cargo) = tokio::join!(
            self.dispatch(Domain::Passenger, phase, cancel),
            self.dispatch(Domain::Cargo, phase, cancel),
        );
        statuses.push(passenger);
        statuses.push(cargo);

        statuses.push(self.dispatch(Domain::Fuel, phase, cancel).await);

        let report = PassReport {
            phase,
            statuses,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            %phase,
            failed = report.failures().count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Orchestration pass finished"
        );
        report
    }

    /// Re-run one domain's policy for `phase`.
    pub async fn retry(
        &self,
        domain: Domain,
        phase: OperationalPhase,
        cancel: &CancellationToken,
    ) -> OperationStatus {
        self.stats.record_retry();
        tracing::info!(%domain, %phase, "Retrying coordinator");
        self.dispatch(domain, phase, cancel).await
    }

    async fn dispatch(
        &self,
        domain: Domain,
        phase: OperationalPhase,
        cancel: &CancellationToken,
    ) -> OperationStatus {
        let hooks: Vec<PreDispatchHook> = self.pre_hooks.read().unwrap().clone();
        for hook in hooks {
            hook(phase, domain);
        }

        let result = if cancel.is_cancelled() {
            Err(CoordinatorError::Cancelled)
        } else {
            self.call(domain, phase, cancel).await
        };

        if let Err(e) = &result {
            tracing::warn!(%domain, %phase, error = %e, "Coordinator failed; continuing pass");
        } else {
            tracing::debug!(%domain, %phase, "Coordinator applied phase policy");
        }

        let status = OperationStatus::from_result(domain, phase, &result);
        self.record(status.clone());
        status
    }

    async fn call(
        &self,
        domain: Domain,
        phase: OperationalPhase,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let coordinator = self.coordinators.get(domain);
        let budget = self.config.coordinator_timeout;
        if budget.is_zero() {
            return coordinator.manage_for_phase(phase, cancel).await;
        }
        match tokio::time::timeout(budget, coordinator.manage_for_phase(phase, cancel)).await {
            Ok(result) => result,
            Err(_) => {
                self.stats.record_timeout();
                Err(CoordinatorError::Timeout(budget))
            }
        }
    }

    fn record(&self, status: OperationStatus) {
        self.stats.record_dispatch(status.ok);
        self.last_status
            .lock()
            .unwrap()
            .insert(status.domain, status.clone());

        let hooks: Vec<PostDispatchHook> = self.post_hooks.read().unwrap().clone();
        for hook in hooks {
            hook(&status);
        }

        // No subscribers is fine
        let _ = self.events.send(status);
    }
}
