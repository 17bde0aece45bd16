use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedactError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing capability: {0}")]
    Capability(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Under-redaction: {0}")]
    UnderRedaction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error classes a front end can map to exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing settings, raised before the image is touched.
    Configuration,
    /// A required search accelerator is not available, raised before the image is touched.
    Capability,
    /// Failure during the walk; the run is aborted after cleanup.
    Run,
}

impl RedactError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn image(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Image {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Capability(_) => ErrorKind::Capability,
            Self::Report(_)
            | Self::Image { .. }
            | Self::Io(_)
            | Self::NotImplemented(_)
            | Self::UnderRedaction(_)
            | Self::Serialization(_) => ErrorKind::Run,
        }
    }
}

pub type Result<T> = std::result::Result<T, RedactError>;
