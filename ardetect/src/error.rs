use std::path::PathBuf;

use arcore::ArError;
use thiserror::Error;
use track::TrackError;

/// Errors that abort the processing of one input file.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Decomposition, thresholding or segmentation failed.
    #[error("detection failed: {0}")]
    Detection(#[from] ArError),

    /// Linking or track configuration failed.
    #[error("tracking failed: {0}")]
    Tracking(#[from] TrackError),

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration or data file is not valid JSON for its schema.
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The task panicked; the message is the panic payload when it was a string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The worker pool could not be built.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.into(),
            source,
        }
    }
}
