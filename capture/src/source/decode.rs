use crystal_capture_common::frame::{Frame, PixelFormat};
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

use super::SourceError;

/// Decode an encoded image (JPEG, PNG, ...) into a frame of the given format.
pub fn decode_frame(bytes: &[u8], format: PixelFormat) -> Result<Frame, SourceError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;
    frame_from_image(img, format)
}

pub fn frame_from_image(img: DynamicImage, format: PixelFormat) -> Result<Frame, SourceError> {
    let frame = match format {
        PixelFormat::Gray8 => {
            let gray = img.into_luma8();
            let (width, height) = gray.dimensions();
            Frame::new(width, height, format, gray.into_raw())?
        }
        PixelFormat::Rgb8 => {
            let rgb = img.into_rgb8();
            let (width, height) = rgb.dimensions();
            Frame::new(width, height, format, rgb.into_raw())?
        }
    };
    Ok(frame)
}
