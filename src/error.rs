// Courtside Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourtsideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unparsable frame index: {0}")]
    UnparsableFrameIndex(String),

    #[error("No landing record for shot {0}")]
    MissingLanding(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Sequence length mismatch: expected {expected}, got {actual}")]
    SequenceLengthMismatch { expected: usize, actual: usize },

    #[error("No canonical hit frame for video {0}")]
    NoCanonicalHit(String),

    #[error("Duplicate shot id: {0}")]
    DuplicateShotId(String),

    #[error("Invalid shot id: {0}")]
    InvalidShotId(String),

    #[error("Unknown shot type: {0}")]
    UnknownShotType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not enough data: {available} examples available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("No valid sequences produced")]
    NoSequences,

    #[error("Model error: {0}")]
    Model(String),

    #[error("{0}")]
    Other(String),
}

impl CourtsideError {
    /// Errors that drop a single record or video while the batch continues
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            CourtsideError::UnparsableFrameIndex(_)
                | CourtsideError::MissingLanding(_)
                | CourtsideError::InvalidCoordinates(_)
                | CourtsideError::SequenceLengthMismatch { .. }
                | CourtsideError::NoCanonicalHit(_)
                | CourtsideError::InvalidShotId(_)
                | CourtsideError::UnknownShotType(_)
        )
    }
}

impl From<anyhow::Error> for CourtsideError {
    fn from(err: anyhow::Error) -> Self {
        CourtsideError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CourtsideError>;
