//! Domain cell and operation tickets.
//!
//! A [`DomainCell`] is the single lock around one domain's state. Its
//! in-progress slot is claimed with [`DomainCell::try_begin`], which returns
//! an [`OperationTicket`]. The ticket is the only way to release the slot:
//!
//! - [`complete`](OperationTicket::complete), [`stopped`](OperationTicket::stopped)
//!   and [`failed`](OperationTicket::failed) release it and then publish the
//!   terminal event
//! - dropping an unfinished ticket (task aborted, panic) releases it too
//!
//! so a cancelled or failed operation can always be retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::error::CoordinatorError;
use super::event::{DomainEvent, OperationOutcome};
use super::state::{ActiveOperation, Domain, DomainState, DomainStatus, Entity, OperationKind};

/// Values closer than this are treated as equal when detecting changes.
const CHANGE_EPSILON: f64 = 1e-6;

/// Lock, in-progress slot and event channel for one domain.
pub struct DomainCell<E: Entity> {
    domain: Domain,
    state: Mutex<DomainState<E>>,
    busy: watch::Sender<Option<OperationKind>>,
    next_id: AtomicU64,
    events: broadcast::Sender<DomainEvent>,
}

impl<E: Entity> DomainCell<E> {
    pub fn new(domain: Domain, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (busy, _) = watch::channel(None);
        Self {
            domain,
            state: Mutex::new(DomainState::default()),
            busy,
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: DomainEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Claim the in-progress slot for `kind`.
    ///
    /// The ticket's cancellation token is a child of `parent`, so cancelling
    /// the parent cancels the operation. Fails without touching state when
    /// any operation is already active in this domain.
    pub fn try_begin(
        self: &Arc<Self>,
        kind: OperationKind,
        parent: &CancellationToken,
    ) -> Result<OperationTicket<E>, CoordinatorError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(active) = &state.operation {
                tracing::debug!(
                    domain = %self.domain,
                    requested = %kind,
                    active = %active.kind,
                    "Operation rejected: domain busy"
                );
                return Err(CoordinatorError::AlreadyInProgress {
                    domain: self.domain,
                    active: active.kind,
                });
            }
            state.operation = Some(ActiveOperation {
                kind,
                id,
                started_at: Instant::now(),
                cancel: token.clone(),
            });
            state.progress = Some(0.0);
        }
        self.busy.send_replace(Some(kind));

        tracing::info!(domain = %self.domain, operation = %kind, "Operation started");
        self.emit(DomainEvent::OperationStarted {
            domain: self.domain,
            kind,
        });

        Ok(OperationTicket {
            cell: Arc::clone(self),
            id,
            kind,
            token,
            finished: false,
        })
    }

    /// Kind of the active operation.
    pub fn active(&self) -> Option<OperationKind> {
        self.state
            .lock()
            .unwrap()
            .operation
            .as_ref()
            .map(|op| op.kind)
    }

    /// Cancel the active operation if it is one of `kinds`.
    ///
    /// Returns the cancelled kind. The slot is released by the operation's
    /// own task once it observes the cancellation.
    pub fn cancel_active(&self, kinds: &[OperationKind]) -> Option<OperationKind> {
        let state = self.state.lock().unwrap();
        let op = state.operation.as_ref()?;
        if !kinds.contains(&op.kind) {
            return None;
        }
        op.cancel.cancel();
        Some(op.kind)
    }

    /// Wait until no operation is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.busy.subscribe();
        // Sender lives as long as self
        let _ = rx.wait_for(|busy| busy.is_none()).await;
    }

    /// Run `f` against the state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&DomainState<E>) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    pub fn current(&self, entity: E) -> f64 {
        self.read(|s| s.current(entity))
    }

    pub fn planned(&self, entity: E) -> f64 {
        self.read(|s| s.planned(entity))
    }

    /// Update an observed value. Publishes only when the value changed.
    pub fn set_current(&self, entity: E, value: f64) -> bool {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let entry = state.values.entry(entity).or_default();
            if (entry.current - value).abs() <= CHANGE_EPSILON {
                None
            } else {
                entry.current = value;
                Some(*entry)
            }
        };

        match changed {
            Some(v) => {
                self.emit(DomainEvent::StateChanged {
                    domain: self.domain,
                    entity: entity.name(),
                    planned: v.planned,
                    current: v.current,
                });
                true
            }
            None => false,
        }
    }

    /// Update a planned value. Publishes only when the value changed.
    pub fn set_planned(&self, entity: E, value: f64) -> bool {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let entry = state.values.entry(entity).or_default();
            if (entry.planned - value).abs() <= CHANGE_EPSILON {
                None
            } else {
                entry.planned = value;
                Some(*entry)
            }
        };

        match changed {
            Some(v) => {
                self.emit(DomainEvent::StateChanged {
                    domain: self.domain,
                    entity: entity.name(),
                    planned: v.planned,
                    current: v.current,
                });
                true
            }
            None => false,
        }
    }

    /// Return every entity to defaults. An active operation is cancelled but
    /// not waited for; its ticket still releases the slot. Callers that need
    /// the slot free first stop the operation and [`wait_idle`](Self::wait_idle).
    pub fn reset(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(op) = &state.operation {
                op.cancel.cancel();
            }
            for value in state.values.values_mut() {
                *value = Default::default();
            }
        }
        tracing::debug!(domain = %self.domain, "Domain state reset");
        self.emit(DomainEvent::Reset {
            domain: self.domain,
        });
    }

    pub fn status(&self) -> DomainStatus {
        self.read(|s| DomainStatus::from_state(self.domain, s))
    }

    fn record_progress(&self, id: u64, percent: f64) {
        let mut state = self.state.lock().unwrap();
        if state.operation.as_ref().map(|op| op.id) == Some(id) {
            state.progress = Some(percent);
        }
    }

    /// Free the slot held by operation `id`. Returns the last progress it
    /// published.
    fn release(&self, id: u64) -> Option<f64> {
        let progress = {
            let mut state = self.state.lock().unwrap();
            if state.operation.as_ref().map(|op| op.id) != Some(id) {
                return None;
            }
            state.operation = None;
            state.progress.take()
        };
        self.busy.send_replace(None);
        progress
    }
}

/// RAII form of the in-progress flag.
pub struct OperationTicket<E: Entity> {
    cell: Arc<DomainCell<E>>,
    id: u64,
    kind: OperationKind,
    token: CancellationToken,
    finished: bool,
}

impl<E: Entity> OperationTicket<E> {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Cancelled by stop requests, reset, or the parent token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Publish progress of this operation.
    pub fn progress(&self, percent: f64) {
        self.cell.record_progress(self.id, percent);
        self.cell.emit(DomainEvent::Progress {
            domain: self.cell.domain,
            kind: self.kind,
            percent,
        });
    }

    /// Target reached.
    pub fn complete(mut self) -> OperationOutcome {
        self.finish();
        tracing::info!(domain = %self.cell.domain, operation = %self.kind, "Operation completed");
        self.cell.emit(DomainEvent::OperationCompleted {
            domain: self.cell.domain,
            kind: self.kind,
        });
        OperationOutcome::Completed
    }

    /// Stopped part-way at `percent`.
    pub fn stopped(mut self, percent: f64) -> OperationOutcome {
        self.finish();
        tracing::info!(
            domain = %self.cell.domain,
            operation = %self.kind,
            percent,
            "Operation stopped"
        );
        self.cell.emit(DomainEvent::OperationStopped {
            domain: self.cell.domain,
            kind: self.kind,
            percent,
        });
        OperationOutcome::Stopped { percent }
    }

    /// Failed with `error`; returns it for propagation.
    pub fn failed(mut self, error: CoordinatorError) -> CoordinatorError {
        self.finish();
        tracing::warn!(
            domain = %self.cell.domain,
            operation = %self.kind,
            error = %error,
            "Operation failed"
        );
        self.cell.emit(DomainEvent::OperationFailed {
            domain: self.cell.domain,
            kind: self.kind,
            error: error.kind(),
            message: error.to_string(),
        });
        error
    }

    fn finish(&mut self) {
        self.finished = true;
        self.cell.release(self.id);
    }
}

impl<E: Entity> Drop for OperationTicket<E> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                domain = %self.cell.domain,
                operation = %self.kind,
                "Operation abandoned; releasing in-progress flag"
            );
            let percent = self.cell.release(self.id).unwrap_or_default();
            self.cell.emit(DomainEvent::OperationStopped {
                domain: self.cell.domain,
                kind: self.kind,
                percent,
            });
        }
    }
}
