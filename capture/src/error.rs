use std::time::Duration;

use crate::scorer::ShapeMismatch;
use crate::source::SourceError;
use crate::store::StoreError;

/// Failures of a capture tick or run.
///
/// `AcquisitionTimeout`, `Acquisition` and `PersistenceFailure` only affect
/// the tick they happen in. `ShapeMismatch` means the source changed shape
/// mid-run and stops the run.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("frame acquisition timed out after {0:?}")]
    AcquisitionTimeout(Duration),
    #[error("frame acquisition failed: {0}")]
    Acquisition(#[source] SourceError),
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatch),
    #[error("failed to persist frame: {0}")]
    PersistenceFailure(#[from] StoreError),
    #[error("capture task failed: {0}")]
    Task(String),
}
