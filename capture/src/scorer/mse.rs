use crystal_capture_common::frame::Frame;

use super::traits::{ShapeMismatch, SimilarityScorer};

/// Mean squared intensity difference.
///
/// Squared differences are summed over every sample (all channels) and
/// divided by the pixel count `width * height`, so a 3-channel frame scores
/// up to three times higher than its grayscale equivalent. The sum is kept in
/// integers, which makes the score exactly symmetric.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl SimilarityScorer for MeanSquaredError {
    fn score(&self, a: &Frame, b: &Frame) -> Result<f64, ShapeMismatch> {
        ShapeMismatch::check(a, b)?;

        let sum: u64 = a
            .samples()
            .iter()
            .zip(b.samples())
            .map(|(&x, &y)| {
                let d = i32::from(x) - i32::from(y);
                (d * d) as u64
            })
            .sum();

        Ok(sum as f64 / a.pixel_count() as f64)
    }

    fn name(&self) -> &str {
        "mse"
    }
}
