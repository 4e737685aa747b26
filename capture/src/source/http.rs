use crystal_capture_common::frame::{Frame, PixelFormat};
use std::time::Duration;
use tracing::{debug, info};

use super::decode::decode_frame;
use super::{FrameSource, SourceError};

/// Polls a camera endpoint that answers every GET with a single encoded image.
pub struct HttpSnapshotSource {
    url: String,
    format: PixelFormat,
    client: Option<reqwest::Client>,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>, format: PixelFormat) -> Self {
        Self {
            url: url.into(),
            format,
            client: None,
        }
    }
}

impl FrameSource for HttpSnapshotSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(SourceError::Http)?;
        self.client = Some(client);
        info!(url = self.url, "HTTP frame source ready");
        Ok(())
    }

    async fn fetch(&mut self, timeout: Duration) -> Result<Frame, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::Closed)?;

        let response = client
            .get(&self.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(map_reqwest)?;
        debug!(bytes = body.len(), "fetched frame");
        decode_frame(&body, self.format)
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            info!(url = self.url, "HTTP frame source closed");
        }
    }

    fn name(&self) -> &str {
        &self.url
    }
}

fn map_reqwest(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::TimedOut
    } else {
        SourceError::Http(e)
    }
}
