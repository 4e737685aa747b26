pub mod mse;
pub mod traits;

pub use mse::MeanSquaredError;
pub use traits::{ShapeMismatch, SimilarityScorer};
