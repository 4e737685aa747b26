use chrono::{DateTime, Local};
use crystal_capture_common::frame::Frame;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Where the newest frame goes for presentation. `show` must return
/// immediately and never feeds anything back into the capture loop.
pub trait DisplaySink: Send + Sync {
    fn show(&self, frame: Arc<Frame>, captured_at: DateTime<Local>);
}

/// A frame as last presented to the operator.
#[derive(Debug, Clone)]
pub struct DisplayedFrame {
    pub frame: Arc<Frame>,
    pub captured_at: DateTime<Local>,
}

/// Single-slot "latest frame" that any number of viewers can subscribe to.
///
/// Publishing replaces the slot without waiting for readers, and readers
/// only ever see an immutable snapshot.
#[derive(Debug)]
pub struct LatestFrame {
    tx: watch::Sender<Option<DisplayedFrame>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DisplayedFrame>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<DisplayedFrame> {
        self.tx.borrow().clone()
    }
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for LatestFrame {
    fn show(&self, frame: Arc<Frame>, captured_at: DateTime<Local>) {
        self.tx.send_replace(Some(DisplayedFrame { frame, captured_at }));
    }
}

/// Reports each presented frame in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn show(&self, frame: Arc<Frame>, captured_at: DateTime<Local>) {
        info!(
            width = frame.width(),
            height = frame.height(),
            format = %frame.format(),
            captured_at = %captured_at.format("%Y-%m-%d %H:%M:%S"),
            "latest frame"
        );
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Arc<T> {
    fn show(&self, frame: Arc<Frame>, captured_at: DateTime<Local>) {
        (**self).show(frame, captured_at)
    }
}

/// Fan out to several sinks in order.
impl DisplaySink for Vec<Box<dyn DisplaySink>> {
    fn show(&self, frame: Arc<Frame>, captured_at: DateTime<Local>) {
        for sink in self {
            sink.show(Arc::clone(&frame), captured_at);
        }
    }
}
