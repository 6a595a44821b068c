//! Phase State Machine - the authoritative source of the operational phase.
//!
//! Owns the current phase, the append-only transition history and all pending
//! phase timeouts. Every mutation goes through one of:
//!
//! - [`try_transition`](PhaseStateMachine::try_transition): cycle edge (or an
//!   authorized conditional edge) whose preconditions hold for the telemetry
//! - [`force_transition`](PhaseStateMachine::force_transition): cycle edge,
//!   preconditions skipped
//! - [`evaluate`](PhaseStateMachine::evaluate): auto-advance from telemetry
//! - [`restore`](PhaseStateMachine::restore): replace state from a snapshot
//!
//! # Ordering
//!
//! Transitions are serialized by an atomic latch. A second attempt while one
//! is being validated, committed or while its hooks run is rejected with
//! [`PhaseError::TransitionInProgress`]; it is never queued. On commit the
//! machine fires exit hooks for the old phase, then transition hooks, then
//! entry hooks for the new phase, and finally broadcasts exactly one
//! [`PhaseEvent::Changed`].
//!
//! A failed attempt performs no mutation: no history entry, no hooks, no
//! notification.
//!
//! # Usage
//!
//! ```ignore
//! let machine = PhaseStateMachine::new(PhaseMachineConfig::default());
//! let mut events = machine.subscribe();
//!
//! let telemetry = AircraftTelemetrySnapshot::parked().with_flight_plan(true);
//! machine.try_transition(OperationalPhase::Departure, &telemetry, Some("boarding"))?;
//!
//! machine.set_timeout(Duration::from_secs(1800), Box::new(|phase| {
//!     tracing::warn!(%phase, "Still at the gate");
//! }));
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::condition::TransitionCondition;
use super::error::PhaseError;
use super::rules::{self, PhasePrediction};
use super::snapshot::PhaseSnapshot;
use super::telemetry::AircraftTelemetrySnapshot;
use super::timeout::{PendingTimeout, TimeoutCallback, TimeoutHandle};
use super::types::{OperationalPhase, PhaseTransitionRecord};

/// Default capacity of the phase event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default minimum prediction confidence for auto-advance.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.9;

/// Configuration for the phase state machine.
#[derive(Debug, Clone)]
pub struct PhaseMachineConfig {
    /// Minimum prediction confidence `evaluate` needs before advancing.
    pub min_confidence: f64,

    /// Timeouts armed automatically whenever the phase is entered.
    pub phase_timeouts: HashMap<OperationalPhase, Duration>,

    /// Broadcast channel capacity.
    pub event_capacity: usize,
}

impl Default for PhaseMachineConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            phase_timeouts: HashMap::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Notification published by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    /// A transition was committed.
    Changed(PhaseTransitionRecord),
    /// A phase timeout expired while still in `phase`.
    TimedOut {
        phase: OperationalPhase,
        after: Duration,
    },
}

type PhaseHook = Arc<dyn Fn(OperationalPhase) + Send + Sync>;
type TransitionHook = Arc<dyn Fn(OperationalPhase, OperationalPhase) + Send + Sync>;

#[derive(Default)]
struct PhaseHooks {
    exit: Vec<(OperationalPhase, PhaseHook)>,
    transition: Vec<TransitionHook>,
    entry: Vec<(OperationalPhase, PhaseHook)>,
}

struct ConditionalTransition {
    from: OperationalPhase,
    to: OperationalPhase,
    condition: Box<dyn TransitionCondition>,
}

/// Mutable state guarded by one mutex.
struct MachineState {
    phase: OperationalPhase,
    entered_at: Instant,
    entered_wall: DateTime<Utc>,
    history: Vec<PhaseTransitionRecord>,
    /// Bumped on every commit or restore; scopes timeouts to one phase visit.
    epoch: u64,
    timeouts: HashMap<u64, PendingTimeout>,
}

impl MachineState {
    fn void_timeouts(&mut self) {
        for (_, pending) in self.timeouts.drain() {
            pending.token.cancel();
        }
    }
}

/// Clears the transition latch on every exit path, including panics in hooks.
struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How a transition was authorized.
enum Authorization {
    Cycle,
    Conditional(String),
    Forced,
}

/// The phase state machine.
pub struct PhaseStateMachine {
    state: Mutex<MachineState>,
    hooks: RwLock<PhaseHooks>,
    conditionals: RwLock<Vec<ConditionalTransition>>,
    transitioning: AtomicBool,
    next_timeout_id: AtomicU64,
    events: broadcast::Sender<PhaseEvent>,
    config: PhaseMachineConfig,
    this: Weak<PhaseStateMachine>,
}

impl PhaseStateMachine {
    /// Create a machine in `Preflight`.
    pub fn new(config: PhaseMachineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(MachineState {
                phase: OperationalPhase::Preflight,
                entered_at: Instant::now(),
                entered_wall: Utc::now(),
                history: Vec::new(),
                epoch: 0,
                timeouts: HashMap::new(),
            }),
            hooks: RwLock::new(PhaseHooks::default()),
            conditionals: RwLock::new(Vec::new()),
            transitioning: AtomicBool::new(false),
            next_timeout_id: AtomicU64::new(1),
            events,
            config,
            this: this.clone(),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The active phase.
    pub fn current_phase(&self) -> OperationalPhase {
        self.state.lock().unwrap().phase
    }

    /// Time spent in the active phase so far.
    pub fn time_in_phase(&self) -> Duration {
        self.state.lock().unwrap().entered_at.elapsed()
    }

    /// Wall-clock time the active phase was entered.
    pub fn entered_at(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().entered_wall
    }

    /// Committed transitions, oldest first.
    pub fn history(&self) -> Vec<PhaseTransitionRecord> {
        self.state.lock().unwrap().history.clone()
    }

    /// Deterministic next-phase prediction. Never mutates state.
    pub fn predict_next(&self, telemetry: &AircraftTelemetrySnapshot) -> PhasePrediction {
        rules::predict(self.current_phase(), telemetry)
    }

    /// Number of live timeout registrations.
    pub fn pending_timeouts(&self) -> usize {
        self.state.lock().unwrap().timeouts.len()
    }

    /// Subscribe to phase notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Run `hook` whenever `phase` is left.
    pub fn on_exit<F>(&self, phase: OperationalPhase, hook: F)
    where
        F: Fn(OperationalPhase) + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().exit.push((phase, Arc::new(hook)));
    }

    /// Run `hook(from, to)` on every committed transition.
    pub fn on_transition<F>(&self, hook: F)
    where
        F: Fn(OperationalPhase, OperationalPhase) + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().transition.push(Arc::new(hook));
    }

    /// Run `hook` whenever `phase` is entered.
    pub fn on_entry<F>(&self, phase: OperationalPhase, hook: F)
    where
        F: Fn(OperationalPhase) + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().entry.push((phase, Arc::new(hook)));
    }

    /// Authorize `from -> to` while `condition` holds.
    pub fn add_conditional_transition(
        &self,
        from: OperationalPhase,
        to: OperationalPhase,
        condition: Box<dyn TransitionCondition>,
    ) {
        tracing::debug!(
            %from,
            %to,
            condition = condition.description(),
            "Registered conditional transition"
        );
        self.conditionals
            .write()
            .unwrap()
            .push(ConditionalTransition {
                from,
                to,
                condition,
            });
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Attempt a transition validated against the cycle and telemetry.
    ///
    /// Returns the committed record, or the reason the attempt was rejected.
    /// Rejection leaves every piece of state untouched.
    pub fn try_transition(
        &self,
        target: OperationalPhase,
        telemetry: &AircraftTelemetrySnapshot,
        reason: Option<&str>,
    ) -> Result<PhaseTransitionRecord, PhaseError> {
        self.transition(target, Some(telemetry), reason)
    }

    /// Manual override: the cycle edge is still enforced, preconditions are not.
    ///
    /// The record is marked `forced` so the override stays visible in history.
    pub fn force_transition(
        &self,
        target: OperationalPhase,
        reason: Option<&str>,
    ) -> Result<PhaseTransitionRecord, PhaseError> {
        self.transition(target, None, reason)
    }

    /// Auto-advance from telemetry.
    ///
    /// Authorized conditional transitions from the current phase are tried
    /// first, then the predicted successor when its confidence reaches the
    /// configured minimum. Returns the committed record, if any.
    pub fn evaluate(
        &self,
        telemetry: &AircraftTelemetrySnapshot,
    ) -> Option<PhaseTransitionRecord> {
        let current = self.current_phase();

        let conditional_target = self
            .conditionals
            .read()
            .unwrap()
            .iter()
            .find(|c| c.from == current && c.condition.is_satisfied(telemetry))
            .map(|c| (c.to, c.condition.description().to_string()));

        if let Some((target, description)) = conditional_target {
            let reason = format!("condition: {}", description);
            match self.try_transition(target, telemetry, Some(&reason)) {
                Ok(record) => return Some(record),
                Err(e) => {
                    tracing::debug!(%current, %target, error = %e, "Conditional transition not taken");
                }
            }
        }

        let prediction = rules::predict(current, telemetry);
        if prediction.phase == current
            || !current.can_advance_to(prediction.phase)
            || prediction.confidence < self.config.min_confidence
        {
            return None;
        }

        let reason = format!("predicted (confidence {:.2})", prediction.confidence);
        match self.try_transition(prediction.phase, telemetry, Some(&reason)) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(
                    %current,
                    target = %prediction.phase,
                    error = %e,
                    "Predicted transition not taken"
                );
                None
            }
        }
    }

    fn transition(
        &self,
        target: OperationalPhase,
        telemetry: Option<&AircraftTelemetrySnapshot>,
        reason: Option<&str>,
    ) -> Result<PhaseTransitionRecord, PhaseError> {
        let _latch = self.acquire_latch()?;

        let record = {
            let mut state = self.state.lock().unwrap();
            let from = state.phase;

            let authorization = match telemetry {
                Some(t) => self.authorize(from, target, t)?,
                None if from.can_advance_to(target) => Authorization::Forced,
                None => {
                    return Err(PhaseError::InvalidTransition { from, to: target });
                }
            };

            let now = Instant::now();
            let record = PhaseTransitionRecord {
                from,
                to: target,
                timestamp: Utc::now(),
                time_in_phase: now.duration_since(state.entered_at),
                reason: reason.map(str::to_string),
                forced: matches!(authorization, Authorization::Forced),
            };

            state.history.push(record.clone());
            state.phase = target;
            state.entered_at = now;
            state.entered_wall = record.timestamp;
            state.epoch += 1;
            state.void_timeouts();

            match authorization {
                Authorization::Forced => tracing::warn!(
                    from = %from,
                    to = %target,
                    reason = reason.unwrap_or(""),
                    "Forced phase transition (preconditions skipped)"
                ),
                Authorization::Conditional(condition) => tracing::info!(
                    from = %from,
                    to = %target,
                    condition = %condition,
                    "Conditional phase transition"
                ),
                Authorization::Cycle => tracing::info!(
                    from = %from,
                    to = %target,
                    time_in_phase_secs = record.time_in_phase.as_secs(),
                    reason = reason.unwrap_or(""),
                    "Phase transition"
                ),
            }

            record
        };

        self.arm_configured_timeout(target);
        self.fire_hooks(record.from, record.to);

        // No receivers is fine
        let _ = self.events.send(PhaseEvent::Changed(record.clone()));

        Ok(record)
    }

    fn acquire_latch(&self) -> Result<LatchGuard<'_>, PhaseError> {
        self.transitioning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                tracing::debug!("Phase transition rejected: another transition is in progress");
                PhaseError::TransitionInProgress
            })?;
        Ok(LatchGuard(&self.transitioning))
    }

    fn authorize(
        &self,
        from: OperationalPhase,
        to: OperationalPhase,
        telemetry: &AircraftTelemetrySnapshot,
    ) -> Result<Authorization, PhaseError> {
        let conditionals = self.conditionals.read().unwrap();
        let mut registered = conditionals
            .iter()
            .filter(|c| c.from == from && c.to == to)
            .peekable();
        let has_conditional = registered.peek().is_some();

        if let Some(c) = registered.find(|c| c.condition.is_satisfied(telemetry)) {
            return Ok(Authorization::Conditional(
                c.condition.description().to_string(),
            ));
        }

        if !from.can_advance_to(to) {
            if has_conditional {
                return Err(PhaseError::PreconditionNotMet {
                    from,
                    to,
                    reason: "transition condition not satisfied".to_string(),
                });
            }
            tracing::debug!(%from, %to, "Rejected transition outside the phase cycle");
            return Err(PhaseError::InvalidTransition { from, to });
        }

        rules::check_preconditions(from, to, telemetry).map_err(|reason| {
            tracing::debug!(%from, %to, reason, "Transition precondition not met");
            PhaseError::PreconditionNotMet {
                from,
                to,
                reason: reason.to_string(),
            }
        })?;

        Ok(Authorization::Cycle)
    }

    fn fire_hooks(&self, from: OperationalPhase, to: OperationalPhase) {
        // Clone out so hooks may register further hooks without deadlocking
        let (exit, transition, entry) = {
            let hooks = self.hooks.read().unwrap();
            let exit: Vec<PhaseHook> = hooks
                .exit
                .iter()
                .filter(|(p, _)| *p == from)
                .map(|(_, h)| h.clone())
                .collect();
            let entry: Vec<PhaseHook> = hooks
                .entry
                .iter()
                .filter(|(p, _)| *p == to)
                .map(|(_, h)| h.clone())
                .collect();
            (exit, hooks.transition.clone(), entry)
        };

        for hook in exit {
            hook(from);
        }
        for hook in transition {
            hook(from, to);
        }
        for hook in entry {
            hook(to);
        }
    }

    // =========================================================================
    // Timeouts
    // =========================================================================

    /// Fire `on_expire` if the machine is still in the current phase visit
    /// after `duration`.
    ///
    /// Expiry also broadcasts [`PhaseEvent::TimedOut`]. It never forces a
    /// transition. Outside a tokio runtime the returned handle is inert.
    pub fn set_timeout(&self, duration: Duration, on_expire: TimeoutCallback) -> TimeoutHandle {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let phase = self.current_phase();
                tracing::warn!(%phase, "No async runtime; phase timeout will not fire");
                return TimeoutHandle::inert(phase);
            }
        };

        let id = self.next_timeout_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let phase = {
            let mut state = self.state.lock().unwrap();
            let phase = state.phase;
            let epoch = state.epoch;
            state.timeouts.insert(
                id,
                PendingTimeout {
                    phase,
                    epoch,
                    duration,
                    token: token.clone(),
                },
            );
            phase
        };

        tracing::debug!(%phase, timeout_secs = duration.as_secs_f64(), "Phase timeout armed");

        let weak = self.this.clone();
        let task_token = token.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    if let Some(machine) = weak.upgrade() {
                        machine.forget_timeout(id);
                    }
                }
                _ = tokio::time::sleep(duration) => {
                    if let Some(machine) = weak.upgrade() {
                        machine.expire(id, on_expire);
                    }
                }
            }
        });

        TimeoutHandle::new(id, phase, token)
    }

    fn forget_timeout(&self, id: u64) {
        self.state.lock().unwrap().timeouts.remove(&id);
    }

    fn expire(&self, id: u64, on_expire: TimeoutCallback) {
        let fired = {
            let mut state = self.state.lock().unwrap();
            match state.timeouts.remove(&id) {
                Some(pending) if pending.is_live(state.phase, state.epoch) => {
                    Some((pending.phase, pending.duration))
                }
                _ => None,
            }
        };

        let Some((phase, after)) = fired else {
            return;
        };

        tracing::warn!(%phase, after_secs = after.as_secs_f64(), "Phase timeout expired");
        on_expire(phase);
        let _ = self.events.send(PhaseEvent::TimedOut { phase, after });
    }

    fn arm_configured_timeout(&self, phase: OperationalPhase) {
        if let Some(duration) = self.config.phase_timeouts.get(&phase) {
            if !duration.is_zero() {
                self.set_timeout(*duration, Box::new(|_| {}));
            }
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Capture phase, entry time and history.
    pub fn snapshot(&self) -> PhaseSnapshot {
        let state = self.state.lock().unwrap();
        PhaseSnapshot {
            phase: state.phase,
            entered_at: state.entered_wall,
            history: state.history.clone(),
        }
    }

    /// Replace phase, entry time and history from a snapshot.
    ///
    /// Pending timeouts are voided and no hooks fire. Configured timeouts for
    /// the restored phase are re-armed from now.
    pub fn restore(&self, snapshot: PhaseSnapshot) -> Result<(), PhaseError> {
        let _latch = self.acquire_latch()?;

        let phase = snapshot.phase;
        {
            let mut state = self.state.lock().unwrap();
            state.entered_at = instant_since(snapshot.entered_at);
            state.entered_wall = snapshot.entered_at;
            state.phase = phase;
            state.history = snapshot.history;
            state.epoch += 1;
            state.void_timeouts();

            tracing::info!(
                %phase,
                history_len = state.history.len(),
                "Phase state restored from snapshot"
            );
        }

        self.arm_configured_timeout(phase);
        Ok(())
    }

    /// Write a snapshot to `writer`.
    pub fn save_snapshot<W: Write>(&self, writer: W) -> Result<(), PhaseError> {
        self.snapshot().write_to(writer)
    }

    /// Read a snapshot from `reader` and restore it.
    pub fn load_snapshot<R: Read>(&self, reader: R) -> Result<PhaseSnapshot, PhaseError> {
        let snapshot = PhaseSnapshot::read_from(reader)?;
        self.restore(snapshot.clone())?;
        Ok(snapshot)
    }
}

/// Monotonic instant for a restored wall-clock entry time.
///
/// Future timestamps, and ones older than the monotonic clock reaches back,
/// map to now.
fn instant_since(entered: DateTime<Utc>) -> Instant {
    let now = Instant::now();
    Utc::now()
        .signed_duration_since(entered)
        .to_std()
        .ok()
        .and_then(|elapsed| now.checked_sub(elapsed))
        .unwrap_or(now)
}
