use serde::Deserialize;
use std::fmt;

/// Sample layout of a decoded frame. Fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// One 8-bit intensity sample per pixel.
    Gray8,
    /// Three interleaved 8-bit samples per pixel.
    Rgb8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Gray8 => f.write_str("gray8"),
            PixelFormat::Rgb8 => f.write_str("rgb8"),
        }
    }
}

/// Dimensions and layout of a frame. Two frames can only be compared when
/// their shapes are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// A decoded raster image from the sensor.
///
/// Samples are stored row-major with channels interleaved, so the sample at
/// `(x, y, c)` lives at `(y * width + x) * channels + c`.
///
/// A frame is never mutated after construction; the capture loop shares it
/// behind an `Arc` when handing it to the store and the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    samples: Vec<u8>,
}

impl Frame {
    /// Wrap a sample buffer, checking that its length matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        samples: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * format.channels();
        if samples.len() != expected {
            return Err(FrameError::SampleCount {
                expected,
                got: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            samples,
        })
    }

    /// A frame where every sample has the same value.
    pub fn filled(
        width: u32,
        height: u32,
        format: PixelFormat,
        value: u8,
    ) -> Result<Self, FrameError> {
        let len = width as usize * height as usize * format.channels();
        Self::new(width, height, format, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Number of pixels (`width * height`), independent of channel count.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Consume the frame and return its sample buffer.
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame has zero area: {width}x{height}")]
    Empty { width: u32, height: u32 },
    #[error("frame sample buffer has {got} samples, expected {expected}")]
    SampleCount { expected: usize, got: usize },
}
