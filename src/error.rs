use thiserror::Error;

#[derive(Error, Debug)]
pub enum RectifyError {
    #[error("Probe left the valid region at pixel ({row}, {col})")]
    BoundaryExceeded { row: i64, col: i64 },

    #[error("Tile has no positive brightness")]
    DegenerateTile,

    #[error("Inconsistent optics: {reason}")]
    InconsistentOptics { reason: String },

    #[error("Detection failed after {attempts} attempts: {reason}")]
    DetectionFailed { attempts: usize, reason: String },

    #[error("Invalid Frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Decoding Error: {0}")]
    Image(#[from] image::ImageError),
}

impl RectifyError {
    /// Errors that a fresh random draw (another tile, another restart) may avoid.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RectifyError::BoundaryExceeded { .. } | RectifyError::DegenerateTile
        )
    }
}

pub type RectifyResult<T> = Result<T, RectifyError>;
