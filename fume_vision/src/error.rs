use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Every way a fume analysis run can fail.
///
/// Only the decode variants are recoverable: the pipeline treats them as the
/// end of the stream and keeps whatever it has already accumulated.
#[derive(Error, Debug)]
pub enum FumeError {
    #[error("Video source {path:?} is unavailable: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("The video ended before a frame could be compared against the reference frame.")]
    EmptyStream,
    #[error("Failed to decode frame: {0}")]
    TransientDecode(String),
    #[error("No frame arrived within {0:?}")]
    DecodeTimeout(Duration),
    #[error("Failed to read video {path:?}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write artifact video {path:?}: {reason}")]
    ArtifactWrite { path: PathBuf, reason: String },
    #[error("Failed to prepare artifact location {path:?}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
}

impl FumeError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FumeError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn artifact_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FumeError::ArtifactWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that end the frame stream without aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FumeError::TransientDecode(_) | FumeError::DecodeTimeout(_))
    }
}
