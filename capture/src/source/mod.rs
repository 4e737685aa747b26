pub mod decode;
pub mod directory;
pub mod http;

pub use directory::DirectorySource;
pub use http::HttpSnapshotSource;

use crystal_capture_common::frame::{Frame, FrameError};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Hands the capture loop one decoded frame per tick. Vendor camera control
/// lives behind whatever endpoint or directory a source reads from.
pub trait FrameSource: Send {
    /// Acquire the underlying device or transport.
    fn open(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Fetch one frame. Implementations should give up after `timeout` and
    /// return [`SourceError::TimedOut`]; the capture loop also enforces the
    /// bound by dropping the returned future.
    fn fetch(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Frame, SourceError>> + Send;

    /// Release the underlying device. Calling this more than once is a no-op.
    fn close(&mut self);

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source is not open")]
    Closed,
    #[error("fetch timed out")]
    TimedOut,
    #[error("no more frames")]
    Exhausted,
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
