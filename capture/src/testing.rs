use crystal_capture_common::config::{CaptureConfig, DisplayPolicy};
use crystal_capture_common::frame::Frame;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::source::{FrameSource, SourceError};

/// One scripted answer to `fetch`.
pub enum Step {
    Frame(Frame),
    Fail,
    Hang(Duration),
}

/// Plays back a fixed list of steps, then reports `Exhausted`.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    open: bool,
    pub closes: Arc<AtomicUsize>,
    pub fetches: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            open: false,
            closes: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self::new(frames.into_iter().map(Step::Frame))
    }
}

impl FrameSource for ScriptedSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        self.open = true;
        Ok(())
    }

    async fn fetch(&mut self, _timeout: Duration) -> Result<Frame, SourceError> {
        if !self.open {
            return Err(SourceError::Closed);
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Frame(frame)) => Ok(frame),
            Some(Step::Fail) => Err(SourceError::HttpStatus(503)),
            Some(Step::Hang(d)) => {
                tokio::time::sleep(d).await;
                Err(SourceError::TimedOut)
            }
            None => Err(SourceError::Exhausted),
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn capture_config(dir: &Path, threshold: f64) -> CaptureConfig {
    CaptureConfig {
        data_location: dir.to_path_buf(),
        capture_interval: Duration::from_millis(10),
        min_change_threshold: threshold,
        fetch_timeout: Duration::from_millis(200),
        display_policy: DisplayPolicy::AcceptedOnly,
    }
}

/// Number of files directly inside `dir`, or 0 if it does not exist.
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}
