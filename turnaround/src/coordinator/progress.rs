//! Progress tracking for long-running operations.
//!
//! Boarding, cargo and fuel operations all follow the same loop: sample the
//! adapters at a fixed cadence, fold the sample into domain state, report
//! percent-complete at a bounded rate, and stop on completion, cancellation
//! or too many consecutive sample failures. [`track`] implements that loop
//! once; each operation supplies a [`ProgressSource`].

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::error::CoordinatorError;
use super::event::OperationOutcome;
use super::operation::OperationTicket;
use super::settings::OperationSettings;
use super::state::{Entity, OperationKind};
use crate::adapter::AdapterFuture;

/// Progress of a quantity moving from `start` toward `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub start: f64,
    pub target: f64,
    pub tolerance: f64,
}

impl Progress {
    pub fn new(start: f64, target: f64, tolerance: f64) -> Self {
        Self {
            start,
            target,
            tolerance: tolerance.max(0.0),
        }
    }

    /// Whether `achieved` is within tolerance of the target.
    pub fn is_complete(&self, achieved: f64) -> bool {
        (self.target - achieved).abs() <= self.tolerance
    }

    /// Percent of the distance covered, clamped to `[0, 100]`.
    pub fn percent(&self, achieved: f64) -> f64 {
        if self.is_complete(achieved) {
            return 100.0;
        }
        let span = self.target - self.start;
        if span.abs() <= f64::EPSILON {
            return 100.0;
        }
        ((achieved - self.start) / span * 100.0).clamp(0.0, 100.0)
    }
}

/// Rate limiter for progress notifications.
///
/// Reports at most once per interval, never repeats an unchanged value, and
/// always lets the final 100 % through.
#[derive(Debug)]
pub struct ProgressReporter {
    min_interval: Duration,
    last_at: Option<Instant>,
    last_percent: Option<f64>,
}

impl ProgressReporter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_at: None,
            last_percent: None,
        }
    }

    /// Whether `percent` should be published now. Records it if so.
    pub fn should_report(&mut self, percent: f64) -> bool {
        if self.last_percent == Some(percent) {
            return false;
        }
        let final_report = percent >= 100.0;
        let due = self
            .last_at
            .map_or(true, |at| at.elapsed() >= self.min_interval);
        if final_report || due {
            self.last_at = Some(Instant::now());
            self.last_percent = Some(percent);
            true
        } else {
            false
        }
    }
}

/// One long-running operation as seen by [`track`].
pub(crate) trait ProgressSource: Send + Sync {
    /// Sample the adapters once, fold the result into domain state and
    /// return the achieved quantity.
    fn sample(&self) -> AdapterFuture<'_, f64>;

    /// Best-effort writes telling the engines the operation is over.
    fn finish(&self) -> AdapterFuture<'_, ()>;
}

/// Drive `source` until it reaches `progress.target`, the ticket is
/// cancelled, or sampling fails `max_sample_failures` times in a row.
///
/// Cancellation is observed before every resample. On cancellation domain
/// state keeps whatever was actually achieved.
pub(crate) async fn track<E, S>(
    ticket: OperationTicket<E>,
    source: &S,
    progress: Progress,
    settings: &OperationSettings,
) -> Result<OperationOutcome, CoordinatorError>
where
    E: Entity,
    S: ProgressSource,
{
    let mut reporter = ProgressReporter::new(settings.progress_interval);
    let mut interval = tokio::time::interval(settings.sample_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut achieved = progress.start;
    let mut consecutive_failures: u32 = 0;

    loop {
        if progress.is_complete(achieved) {
            if reporter.should_report(100.0) {
                ticket.progress(100.0);
            }
            end(source, ticket.kind()).await;
            return Ok(ticket.complete());
        }

        let cancelled = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => true,
            _ = interval.tick() => false,
        };
        if cancelled {
            end(source, ticket.kind()).await;
            return Ok(ticket.stopped(progress.percent(achieved)));
        }

        match source.sample().await {
            Ok(value) => {
                consecutive_failures = 0;
                achieved = value;
                let percent = progress.percent(achieved);
                if percent < 100.0 && reporter.should_report(percent) {
                    ticket.progress(percent);
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    operation = %ticket.kind(),
                    consecutive_failures,
                    error = %e,
                    "Progress sample failed"
                );
                if consecutive_failures >= settings.max_sample_failures {
                    end(source, ticket.kind()).await;
                    let error = CoordinatorError::SampleFailures {
                        kind: ticket.kind(),
                        failures: consecutive_failures,
                        last: e,
                    };
                    return Err(ticket.failed(error));
                }
            }
        }
    }
}

/// An operation whose start writes succeeded, ready to be tracked.
pub(crate) struct TrackedRun<E: Entity, S> {
    pub ticket: OperationTicket<E>,
    pub source: S,
    pub progress: Progress,
}

impl<E: Entity, S: ProgressSource> TrackedRun<E, S> {
    pub async fn follow(
        self,
        settings: &OperationSettings,
    ) -> Result<OperationOutcome, CoordinatorError> {
        track(self.ticket, &self.source, self.progress, settings).await
    }
}

/// Result of the start phase of a long-running operation.
pub(crate) enum Begun<E: Entity, S> {
    /// Nothing to do; the ticket was completed immediately.
    Done(OperationOutcome),
    Running(TrackedRun<E, S>),
}

/// Await a compensating write, logging instead of failing.
pub(crate) async fn best_effort(write: AdapterFuture<'_, ()>, key: &str) {
    if let Err(e) = write.await {
        tracing::warn!(key, error = %e, "Rollback write failed");
    }
}

async fn end<S: ProgressSource>(source: &S, kind: OperationKind) {
    if let Err(e) = source.finish().await {
        tracing::warn!(operation = %kind, error = %e, "Failed to signal end of operation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::coordinator::operation::DomainCell;
    use crate::coordinator::state::Domain;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Level;

    impl Entity for Level {
        fn all() -> &'static [Self] {
            &[Level]
        }
        fn name(&self) -> &'static str {
            "level"
        }
        fn ground_signal(&self) -> Option<&'static str> {
            None
        }
        fn sim_path(&self) -> &'static str {
            "sim/level"
        }
    }

    /// Source that climbs by `step` per sample and can fail on demand.
    struct Climb {
        value: Mutex<f64>,
        step: f64,
        fail: bool,
        finished: AtomicU32,
    }

    impl Climb {
        fn new(step: f64, fail: bool) -> Self {
            Self {
                value: Mutex::new(0.0),
                step,
                fail,
                finished: AtomicU32::new(0),
            }
        }
    }

    impl ProgressSource for Climb {
        fn sample(&self) -> AdapterFuture<'_, f64> {
            Box::pin(async move {
                if self.fail {
                    return Err(AdapterError::communication("sim/level", "down"));
                }
                let mut v = self.value.lock().unwrap();
                *v += self.step;
                Ok(*v)
            })
        }

        fn finish(&self) -> AdapterFuture<'_, ()> {
            Box::pin(async move {
                self.finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn settings() -> OperationSettings {
        OperationSettings {
            sample_interval: Duration::from_millis(1),
            progress_interval: Duration::ZERO,
            max_sample_failures: 3,
            ..Default::default()
        }
    }

    fn cell() -> Arc<DomainCell<Level>> {
        Arc::new(DomainCell::new(Domain::Fuel, 64))
    }

    #[test]
    fn test_progress_percent() {
        let p = Progress::new(0.0, 200.0, 1.0);
        assert_eq!(p.percent(50.0), 25.0);
        assert_eq!(p.percent(199.5), 100.0);
        assert!(p.is_complete(199.5));

        let down = Progress::new(100.0, 0.0, 0.0);
        assert_eq!(down.percent(75.0), 25.0);
    }

    #[test]
    fn test_reporter_rate_limits() {
        let mut r = ProgressReporter::new(Duration::from_secs(3600));
        assert!(r.should_report(10.0));
        assert!(!r.should_report(20.0));
        assert!(r.should_report(100.0));
        assert!(!r.should_report(100.0));
    }

    #[tokio::test]
    async fn test_track_completes() {
        let cell = cell();
        let source = Climb::new(25.0, false);
        let mut rx = cell.subscribe();
        let ticket = cell
            .try_begin(OperationKind::Refueling, &CancellationToken::new())
            .unwrap();

        let outcome = track(ticket, &source, Progress::new(0.0, 100.0, 0.5), &settings())
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(cell.active(), None);
        assert_eq!(source.finished.load(Ordering::SeqCst), 1);

        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let crate::coordinator::DomainEvent::Progress { percent, .. } = event {
                percents.push(percent);
            }
        }
        assert_eq!(percents, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[tokio::test]
    async fn test_track_cancel_clears_flag() {
        let cell = cell();
        let source = Climb::new(1.0, false);
        let root = CancellationToken::new();
        let ticket = cell.try_begin(OperationKind::Refueling, &root).unwrap();
        root.cancel();

        let outcome = track(ticket, &source, Progress::new(0.0, 100.0, 0.5), &settings())
            .await
            .unwrap();

        assert!(matches!(outcome, OperationOutcome::Stopped { .. }));
        assert_eq!(cell.active(), None);
    }

    #[tokio::test]
    async fn test_track_fails_after_consecutive_errors() {
        let cell = cell();
        let source = Climb::new(1.0, true);
        let ticket = cell
            .try_begin(OperationKind::Refueling, &CancellationToken::new())
            .unwrap();

        let err = track(ticket, &source, Progress::new(0.0, 100.0, 0.5), &settings())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoordinatorError::SampleFailures {
                failures: 3,
                last: AdapterError::Communication { .. },
                ..
            }
        ));
        assert_eq!(cell.active(), None);
        assert_eq!(source.finished.load(Ordering::SeqCst), 1);
    }
}
