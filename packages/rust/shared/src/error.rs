//! Error types for EverythingPDF.
//!
//! Library crates use [`EverythingPdfError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all EverythingPDF operations.
#[derive(Debug, thiserror::Error)]
pub enum EverythingPdfError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Key-value store / database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (bad argument, malformed value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An input is neither a PDF nor a supported raster image.
    #[error("unsupported input '{name}': {reason}")]
    Classification { name: String, reason: String },

    /// The Free plan queue limit is already reached.
    #[error("Free plan allows only {limit} uploads; upgrade to Pro to add more")]
    AdmissionCapped { limit: usize },

    /// A queue position does not exist.
    #[error("queue index {index} out of range (queue length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Opening, decoding, or serializing failed while assembling the output.
    #[error("build failed at {item}: {message}")]
    Assembly { item: String, message: String },

    /// A build was triggered while another one is still running.
    #[error("a build is already in progress")]
    BuildInProgress,

    /// Download or share was requested without a successful build.
    #[error("no built document available; build first")]
    NoArtifact,

    /// Remote publish failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// A publish was triggered while another upload is still running.
    #[error("an upload is already in progress")]
    PublishInProgress,

    /// Sharing was requested but no publish endpoint is configured.
    #[error("sharing is not configured; set [publish].endpoint in the config file")]
    PublishNotConfigured,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EverythingPdfError>;

impl EverythingPdfError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an assembly error attributed to a specific input.
    pub fn assembly(item: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Assembly {
            item: item.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
