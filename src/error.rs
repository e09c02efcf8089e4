use std::path::PathBuf;

use thiserror::Error;

/// Frame geometry as `(width, height, channels)`.
pub type Geometry = (usize, usize, usize);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(
        "frame dimension mismatch: {}x{}x{} vs {}x{}x{}",
        expected.0, expected.1, expected.2, found.0, found.1, found.2
    )]
    DimensionMismatch { expected: Geometry, found: Geometry },

    #[error("decode failed for {}: {reason}", path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DecodeFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}
