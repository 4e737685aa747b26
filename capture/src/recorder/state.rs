use chrono::{DateTime, Local};
use crystal_capture_common::config::{CaptureConfig, DisplayPolicy};
use crystal_capture_common::frame::Frame;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::display::DisplaySink;
use crate::error::CaptureError;
use crate::scorer::{MeanSquaredError, SimilarityScorer};
use crate::source::{FrameSource, SourceError};
use crate::store::FrameStore;

/// Where the loop is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Fetching,
    Scoring,
    Accepting,
    Skipping,
    /// The source has been released; further ticks do nothing.
    Stopped,
}

/// The only state carried from one tick to the next.
#[derive(Debug, Default)]
pub struct LoopState {
    /// Last frame that was written to disk. Skipped frames never replace it,
    /// so every new frame is compared against the last *saved* scene.
    last_accepted: Option<Arc<Frame>>,
}

impl LoopState {
    pub fn last_accepted(&self) -> Option<&Arc<Frame>> {
        self.last_accepted.as_ref()
    }
}

/// Result of a single tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// Frame saved. `score` is `None` for the first frame of a run.
    Accepted { path: PathBuf, score: Option<f64> },
    /// Frame too similar to the last saved one.
    Skipped { score: f64 },
    /// No frame this tick; state untouched.
    AcquisitionFailed(CaptureError),
    /// Frame could not be written; state untouched.
    PersistenceFailed(CaptureError),
    /// The source has no more frames.
    Exhausted,
    /// The loop was already shut down.
    Stopped,
}

/// Fetch → score → save-or-skip, one frame per tick.
///
/// The loop owns the source and its [`LoopState`]. Configuration is read from
/// a watch channel once at the start of every tick, so edits land between
/// ticks, never in the middle of one.
pub struct CaptureLoop<S: FrameSource> {
    source: Option<S>,
    scorer: Box<dyn SimilarityScorer>,
    store: FrameStore,
    display: Arc<dyn DisplaySink>,
    config: watch::Receiver<CaptureConfig>,
    state: LoopState,
    phase: LoopPhase,
}

impl<S: FrameSource> CaptureLoop<S> {
    pub fn new(
        source: S,
        config: watch::Receiver<CaptureConfig>,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            source: Some(source),
            scorer: Box::new(MeanSquaredError),
            store: FrameStore::new(),
            display,
            config,
            state: LoopState::default(),
            phase: LoopPhase::Idle,
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Capture interval from the current configuration.
    pub fn capture_interval(&self) -> Duration {
        self.config.borrow().capture_interval
    }

    pub async fn open(&mut self) -> Result<(), SourceError> {
        let source = self.source.as_mut().ok_or(SourceError::Closed)?;
        source.open().await?;
        info!(
            source = source.name(),
            scorer = self.scorer.name(),
            "capture loop ready"
        );
        Ok(())
    }

    /// Run one tick.
    ///
    /// Per-tick failures come back as `Ok` outcomes. `Err` is reserved for
    /// frames whose shape no longer matches the saved baseline, which the
    /// caller should treat as fatal.
    ///
    /// The only await point is the fetch, so dropping this future cancels
    /// the fetch without touching [`LoopState`].
    pub async fn tick(&mut self) -> Result<TickOutcome, CaptureError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(TickOutcome::Stopped);
        };
        let config = self.config.borrow().clone();

        self.phase = LoopPhase::Fetching;
        let fetched =
            tokio::time::timeout(config.fetch_timeout, source.fetch(config.fetch_timeout)).await;
        let captured_at = Local::now();

        let frame = match fetched {
            Ok(Ok(frame)) => Arc::new(frame),
            Ok(Err(SourceError::Exhausted)) => {
                self.phase = LoopPhase::Idle;
                info!("frame source exhausted");
                return Ok(TickOutcome::Exhausted);
            }
            Ok(Err(SourceError::TimedOut)) | Err(_) => {
                self.phase = LoopPhase::Idle;
                warn!(
                    timeout_ms = config.fetch_timeout.as_millis() as u64,
                    "frame acquisition timed out"
                );
                return Ok(TickOutcome::AcquisitionFailed(
                    CaptureError::AcquisitionTimeout(config.fetch_timeout),
                ));
            }
            Ok(Err(e)) => {
                self.phase = LoopPhase::Idle;
                warn!(error = %e, "frame acquisition failed");
                return Ok(TickOutcome::AcquisitionFailed(CaptureError::Acquisition(e)));
            }
        };

        self.phase = LoopPhase::Scoring;
        let score = match self.state.last_accepted.as_deref() {
            None => None,
            Some(last) => match self.scorer.score(last, &frame) {
                Ok(score) => Some(score),
                Err(e) => {
                    self.phase = LoopPhase::Idle;
                    error!(error = %e, "frame shape changed mid-run");
                    return Err(e.into());
                }
            },
        };

        let outcome = match score {
            Some(score) if score < config.min_change_threshold => {
                self.skip(frame, captured_at, score, &config)
            }
            _ => self.accept(frame, captured_at, score, &config),
        };
        self.phase = LoopPhase::Idle;
        Ok(outcome)
    }

    fn skip(
        &mut self,
        frame: Arc<Frame>,
        captured_at: DateTime<Local>,
        score: f64,
        config: &CaptureConfig,
    ) -> TickOutcome {
        self.phase = LoopPhase::Skipping;
        debug!(
            score,
            threshold = config.min_change_threshold,
            "skipping capture, scene unchanged"
        );
        if config.display_policy == DisplayPolicy::EveryFrame {
            self.display.show(frame, captured_at);
        }
        TickOutcome::Skipped { score }
    }

    fn accept(
        &mut self,
        frame: Arc<Frame>,
        captured_at: DateTime<Local>,
        score: Option<f64>,
        config: &CaptureConfig,
    ) -> TickOutcome {
        self.phase = LoopPhase::Accepting;
        match self.store.save(&frame, &config.data_location, captured_at) {
            Ok(path) => {
                info!(
                    path = %path.display(),
                    score,
                    threshold = config.min_change_threshold,
                    "captured image"
                );
                self.display.show(Arc::clone(&frame), captured_at);
                // Only after the file exists: a crash here leaves the state
                // one frame behind the disk, never ahead of it.
                self.state.last_accepted = Some(frame);
                TickOutcome::Accepted { path, score }
            }
            Err(e) => {
                error!(
                    error = %e,
                    dir = %config.data_location.display(),
                    "failed to save accepted frame"
                );
                TickOutcome::PersistenceFailed(CaptureError::PersistenceFailure(e))
            }
        }
    }

    /// Release the source. Safe to call any number of times.
    pub fn shutdown(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            info!(source = source.name(), "frame source released");
        }
        self.phase = LoopPhase::Stopped;
    }
}

impl<S: FrameSource> Drop for CaptureLoop<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
