// Courtside - Library Entry Point
// Tennis shot analysis: hit-frame weighting, landing sequences, and landing-point inference.

pub mod constants;
pub mod error;
pub mod config;
pub mod report;
pub mod coords;
pub mod frames;
pub mod labels;
pub mod dataset;
pub mod imaging;
pub mod model;
pub mod training;
pub mod inference;

pub use config::PipelineConfig;
pub use error::{CourtsideError, Result};
pub use inference::{InferencePipeline, PipelineFailure, PipelineState, Prediction};
