use thiserror::Error;

use crate::types::ComponentKind;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("{0}")]
    Msg(String),

    #[error("network connectivity unavailable")]
    ConnectivityUnavailable,

    #[error("checksum mismatch for {file} (got {actual}, want {expected})")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("failed to extract {archive}: {reason}")]
    Extraction { archive: String, reason: String },

    #[error("unsupported archive format for {0}")]
    UnsupportedArchive(String),

    #[error("no {0} component is installed")]
    MissingPrerequisite(ComponentKind),

    #[error("release feed for {0} returned no releases")]
    EmptyFeed(ComponentKind),

    #[error("task `{0}` could not be started: {1}")]
    TaskSpawn(String, std::io::Error),

    #[error("task `{0}` panicked")]
    TaskPanicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Net(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<anyhow::Error> for ComponentError {
    fn from(e: anyhow::Error) -> Self {
        ComponentError::Msg(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ComponentError>;
