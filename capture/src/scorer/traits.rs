use crystal_capture_common::frame::{Frame, FrameShape};

/// Scene-change metric used to decide whether a frame is worth keeping.
///
/// Implementations compare two frames of the same shape and return a
/// non-negative dissimilarity: 0 for identical frames, larger for frames
/// that differ more. They must be pure so a decision can be reproduced.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &Frame, b: &Frame) -> Result<f64, ShapeMismatch>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Two frames with different dimensions or pixel formats were compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot compare a {left} frame with a {right} frame")]
pub struct ShapeMismatch {
    pub left: FrameShape,
    pub right: FrameShape,
}

impl ShapeMismatch {
    /// `Ok(())` when both frames share a shape.
    pub fn check(a: &Frame, b: &Frame) -> Result<(), ShapeMismatch> {
        if a.shape() == b.shape() {
            Ok(())
        } else {
            Err(ShapeMismatch {
                left: a.shape(),
                right: b.shape(),
            })
        }
    }
}
