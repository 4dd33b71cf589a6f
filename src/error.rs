//! Error taxonomy for the engine.
//!
//! | Variant | Meaning | Retry? |
//! |---|---|---|
//! | [`EngineError::UnsupportedFormat`] | unknown extension, nothing was decoded | no |
//! | [`EngineError::DecodeUnavailable`] | no RAW backend could handle the file | no, pre-convert |
//! | [`EngineError::ConversionFailure`] | a backend ran and reported an error | no |
//! | [`EngineError::Timeout`] | the request deadline expired | yes, with a cheaper pipeline |
//! | [`EngineError::InvalidRequest`] | caller passed impossible parameters | no |
//! | [`EngineError::Metrics`] | quality assessment failed | never surfaced by compression |
//!
//! Messages are meant to be shown to end users, so backend diagnostics are
//! kept in a single trailing clause and RAW failures always end with the
//! pre-conversion hint.

use crate::config::ConfigError;
use crate::deadline::Stage;
use std::time::Duration;
use thiserror::Error;

/// Hint appended to every RAW failure.
pub const PRECONVERT_HINT: &str =
    "Convert your RAW file to JPEG or PNG first, then upload the converted image.";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Cannot decode .{extension} files on this server. {}", PRECONVERT_HINT)]
    DecodeUnavailable {
        extension: String,
        /// Per-backend reasons, in chain order. Logged, not displayed.
        attempts: Vec<String>,
    },

    #[error("Conversion failed ({backend}): {message}")]
    ConversionFailure { backend: String, message: String },

    #[error("Timed out during {stage} after {}ms", limit.as_millis())]
    Timeout { stage: Stage, limit: Duration },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Quality metrics failed: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn conversion(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConversionFailure {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn metrics(message: impl Into<String>) -> Self {
        Self::Metrics(message.into())
    }

    /// Only deadline failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Rewrap a failure from the RAW path so the caller sees the extension
    /// and the pre-conversion hint instead of raw backend output.
    ///
    /// Timeouts and already-actionable RAW errors pass through unchanged.
    pub fn for_raw(self, extension: &str) -> Self {
        match self {
            Self::Timeout { .. } | Self::DecodeUnavailable { .. } => self,
            Self::ConversionFailure { backend, message } => Self::ConversionFailure {
                backend,
                message: format!(
                    "could not process .{extension} file ({message}). {PRECONVERT_HINT}"
                ),
            },
            other => Self::ConversionFailure {
                backend: "raw".into(),
                message: format!("could not process .{extension} file ({other}). {PRECONVERT_HINT}"),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
