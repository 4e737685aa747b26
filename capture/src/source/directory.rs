use crystal_capture_common::frame::{Frame, PixelFormat};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::decode::decode_frame;
use super::{FrameSource, SourceError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Replays the images in a directory, one per fetch, in file-name order.
///
/// Useful for re-running change detection over an earlier capture session.
pub struct DirectorySource {
    dir: PathBuf,
    format: PixelFormat,
    pending: Option<VecDeque<PathBuf>>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, format: PixelFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            pending: None,
        }
    }
}

fn io_error(path: PathBuf) -> impl FnOnce(std::io::Error) -> SourceError {
    move |source| SourceError::Io { path, source }
}

impl FrameSource for DirectorySource {
    async fn open(&mut self) -> Result<(), SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(io_error(self.dir.clone()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(self.dir.clone()))?
        {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        info!(dir = %self.dir.display(), frames = files.len(), "directory frame source ready");
        self.pending = Some(files.into());
        Ok(())
    }

    async fn fetch(&mut self, _timeout: Duration) -> Result<Frame, SourceError> {
        let pending = self.pending.as_mut().ok_or(SourceError::Closed)?;
        let path = pending.pop_front().ok_or(SourceError::Exhausted)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(io_error(path.clone()))?;
        decode_frame(&bytes, self.format)
    }

    fn close(&mut self) {
        if self.pending.take().is_some() {
            info!(dir = %self.dir.display(), "directory frame source closed");
        }
    }

    fn name(&self) -> &str {
        self.dir.to_str().unwrap_or("directory")
    }
}
