use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::recorder::{CaptureLoop, TickOutcome};
use crate::source::FrameSource;

/// Counters for one capture run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Ticks whose body took longer than the capture interval.
    pub deadline_misses: u64,
    pub worst_case: Duration,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome, elapsed: Duration, interval: Duration) {
        match outcome {
            TickOutcome::Accepted { .. } => self.accepted += 1,
            TickOutcome::Skipped { .. } => self.skipped += 1,
            TickOutcome::AcquisitionFailed(_) | TickOutcome::PersistenceFailed(_) => {
                self.failed += 1
            }
            // end of run, not a capture attempt
            TickOutcome::Exhausted | TickOutcome::Stopped => return,
        }
        self.ticks += 1;
        if elapsed > interval {
            self.deadline_misses += 1;
        }
        if elapsed > self.worst_case {
            self.worst_case = elapsed;
        }
    }
}

/// Control handle for a running capture task.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<RunSummary, CaptureError>>,
}

impl SchedulerHandle {
    /// Ask the run to stop. A pending tick is cancelled and an in-flight
    /// fetch is abandoned. Calling this again is a no-op.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the run to finish. Must not be awaited again once it has
    /// returned.
    pub async fn join(&mut self) -> Result<RunSummary, CaptureError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(CaptureError::Task(e.to_string())),
        }
    }
}

/// Start ticking `capture` on a background task.
///
/// Tick `n + 1` is due one capture interval after tick `n` was due. A tick
/// that overruns delays the next one instead of overlapping it, since ticks
/// run one after another on a single task. The interval is re-read after
/// every tick so edits take effect on the following one.
pub fn start<S>(capture: CaptureLoop<S>) -> SchedulerHandle
where
    S: FrameSource + 'static,
{
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run(capture, shutdown_rx));
    SchedulerHandle { shutdown, task }
}

/// Deadlines advance from the previous deadline, not from when the tick woke
/// up, so wake-up lag does not accumulate. A deadline already in the past
/// collapses to `now`, and missed slots are not made up.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    (previous + interval).max(now)
}

async fn run<S: FrameSource>(
    mut capture: CaptureLoop<S>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RunSummary, CaptureError> {
    let mut summary = RunSummary::default();
    let mut next_due = Instant::now();

    info!("capture run started");
    let result = loop {
        if *shutdown.borrow_and_update() {
            break Ok(());
        }

        let due = tokio::select! {
            _ = shutdown.changed() => false,
            _ = tokio::time::sleep_until(next_due) => true,
        };
        if !due {
            break Ok(());
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = shutdown.changed() => None,
            outcome = capture.tick() => Some(outcome),
        };
        let Some(outcome) = outcome else {
            debug!("in-flight tick cancelled");
            break Ok(());
        };

        let elapsed = started.elapsed();
        let interval = capture.capture_interval();
        match outcome {
            Err(e) => break Err(e),
            Ok(outcome) => {
                summary.record(&outcome, elapsed, interval);
                if matches!(outcome, TickOutcome::Exhausted | TickOutcome::Stopped) {
                    break Ok(());
                }
            }
        }

        if elapsed > interval {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "tick overran the capture interval, next capture starts immediately"
            );
        }
        next_due = next_deadline(next_due, interval, Instant::now());
        debug!(
            next_in_ms = next_due.saturating_duration_since(Instant::now()).as_millis() as u64,
            "next capture scheduled"
        );
    };

    capture.shutdown();
    info!(
        ticks = summary.ticks,
        accepted = summary.accepted,
        skipped = summary.skipped,
        failed = summary.failed,
        deadline_misses = summary.deadline_misses,
        worst_case_ms = summary.worst_case.as_millis() as u64,
        "capture run finished"
    );
    result.map(|()| summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::LatestFrame;
    use crate::testing::{capture_config, file_count, ScriptedSource, Step};
    use crystal_capture_common::config::CaptureConfig;
    use crystal_capture_common::frame::{Frame, PixelFormat};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn gray(value: u8) -> Frame {
        Frame::filled(4, 4, PixelFormat::Gray8, value).unwrap()
    }

    async fn opened(
        source: ScriptedSource,
        config: CaptureConfig,
    ) -> (CaptureLoop<ScriptedSource>, watch::Sender<CaptureConfig>) {
        let (tx, rx) = watch::channel(config);
        let mut capture = CaptureLoop::new(source, rx, Arc::new(LatestFrame::new()));
        capture.open().await.unwrap();
        (capture, tx)
    }

    #[test]
    fn deadlines_advance_from_previous_deadline() {
        let base = Instant::now();
        let interval = Duration::from_millis(100);
        // woke 7 ms late
        let next = next_deadline(base, interval, base + Duration::from_millis(27));
        assert_eq!(next, base + interval);
        let after = next_deadline(next, interval, next + Duration::from_millis(3));
        assert_eq!(after, base + 2 * interval);
    }

    #[test]
    fn overrun_schedules_next_tick_immediately() {
        let base = Instant::now();
        let now = base + Duration::from_millis(450);
        assert_eq!(next_deadline(base, Duration::from_millis(100), now), now);
    }

    #[tokio::test]
    async fn runs_until_source_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::frames([gray(0), gray(0), gray(5)]);
        let closes = Arc::clone(&source.closes);
        let (capture, _tx) = opened(source, capture_config(dir.path(), 10.0)).await;

        let mut handle = start(capture);
        let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(file_count(dir.path()), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = capture_config(dir.path(), 10.0);
        config.fetch_timeout = Duration::from_millis(30);
        let source = ScriptedSource::new([
            Step::Hang(Duration::from_secs(30)),
            Step::Frame(gray(0)),
        ]);
        let (capture, _tx) = opened(source, config).await;

        let mut handle = start(capture);
        let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.accepted, 1);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = capture_config(dir.path(), 10.0);
        config.fetch_timeout = Duration::from_secs(60);
        let source = ScriptedSource::new([Step::Hang(Duration::from_secs(60))]);
        let closes = Arc::clone(&source.closes);
        let fetches = Arc::clone(&source.fetches);
        let (capture, _tx) = opened(source, config).await;

        let mut handle = start(capture);
        while fetches.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop();
        handle.stop();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn stop_cancels_pending_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = capture_config(dir.path(), 10.0);
        config.capture_interval = Duration::from_secs(3600);
        let source = ScriptedSource::frames([gray(0), gray(100)]);
        let fetches = Arc::clone(&source.fetches);
        let (capture, _tx) = opened(source, config).await;

        let mut handle = start(capture);
        while fetches.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shape_mismatch_ends_the_run_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::frames([gray(0), Frame::filled(8, 8, PixelFormat::Gray8, 0).unwrap()]);
        let closes = Arc::clone(&source.closes);
        let (capture, _tx) = opened(source, capture_config(dir.path(), 10.0)).await;

        let mut handle = start(capture);
        let result = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();

        assert!(matches!(result, Err(CaptureError::ShapeMismatch(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn ticks_do_not_overlap_when_body_outlasts_interval() {
        // Each hang outlasts both the interval and the fetch bound; a second
        // tick may only start once the first has given up.
        let dir = tempfile::tempdir().unwrap();
        let mut config = capture_config(dir.path(), 10.0);
        config.capture_interval = Duration::from_millis(1);
        config.fetch_timeout = Duration::from_millis(40);
        let source = ScriptedSource::new([
            Step::Hang(Duration::from_secs(30)),
            Step::Hang(Duration::from_secs(30)),
        ]);
        let (capture, _tx) = opened(source, config).await;

        let started = std::time::Instant::now();
        let mut handle = start(capture);
        let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.deadline_misses, 2);
        assert!(summary.worst_case >= Duration::from_millis(40));
        assert!(started.elapsed() >= Duration::from_millis(80));
    }
}
