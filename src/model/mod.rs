// Learned components
// The pipeline only sees two capabilities: score one frame, and predict a landing point
// from a stacked sequence. The bundled implementation is a pooled-feature linear model.

pub mod linear;

use crate::coords::NormalizedPoint;
use crate::error::Result;
use crate::imaging::ImageTensor;

pub use linear::{pool_features, HitFrameScorer, LandingPredictor, LinearRegressor, ModelKind};

/// Image -> hit-likelihood score
pub trait Scorer: Send + Sync {
    fn score(&self, image: &ImageTensor) -> Result<f64>;
}

/// Stacked frame sequence -> normalised landing point (not clipped)
pub trait SequencePredictor: Send + Sync {
    fn predict(&self, sequence: &ImageTensor) -> Result<NormalizedPoint>;
}
