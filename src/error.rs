//! Error types for the edgequake-doc2pdf library.
//!
//! Two layers reflect the two places a conversion can fail:
//!
//! * [`StrategyError`] is raised by exactly one conversion strategy (image
//!   embed, text layout, office delegate, passthrough copy). Each variant is
//!   a classified cause; strategies never return anything vaguer.
//!
//! * [`ConversionError`] is the single outward-facing error returned by
//!   [`crate::convert::Converter`]. Strategy failures arrive wrapped in
//!   [`ConversionError::Strategy`] together with the strategy that raised
//!   them, so callers can log the full chain with `source()` while the HTTP
//!   layer shows only [`ConversionError::user_message`].
//!
//! Every error maps onto one [`ErrorKind`], a flat serialisable tag suitable
//! for API responses and metrics.

use crate::pipeline::classify::Strategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Flat classification of every failure the library can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    UnsupportedImageFormat,
    DecodeFailure,
    OfficeConversionUnavailable,
    IoFailure,
    InvalidConfig,
    Internal,
}

/// A classified failure raised by one conversion strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// GIF and BMP are admitted at upload time but cannot be embedded.
    #[error("Image format {format} requires conversion. Please use JPG or PNG.")]
    UnsupportedImageFormat { format: String },

    /// Image bytes did not decode as the format their extension claims.
    #[error("Could not decode {format} data: {detail}")]
    DecodeFailure { format: String, detail: String },

    /// The external office conversion service failed for any reason.
    #[error("Office conversion failed: {detail}\n{hint}")]
    OfficeConversionUnavailable { detail: String, hint: String },

    /// Reading the input or writing the output failed.
    #[error("{action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StrategyError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StrategyError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StrategyError::UnsupportedImageFormat { .. } => ErrorKind::UnsupportedImageFormat,
            StrategyError::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            StrategyError::OfficeConversionUnavailable { .. } => {
                ErrorKind::OfficeConversionUnavailable
            }
            StrategyError::Io { .. } => ErrorKind::IoFailure,
        }
    }

    /// True when the write failed only because another writer already owns
    /// the target path. The dispatcher must not clean that file up.
    pub(crate) fn is_target_taken(&self) -> bool {
        matches!(
            self,
            StrategyError::Io { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists
        )
    }
}

/// All errors returned by [`crate::convert::Converter`] and config builders.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The input's extension maps to no strategy. Nothing was touched.
    #[error("Unsupported file type: '{extension}'")]
    UnsupportedFormat { extension: String },

    /// The selected strategy failed; any partial output was removed.
    #[error("{strategy} conversion failed: {source}")]
    Strategy {
        strategy: Strategy,
        #[source]
        source: StrategyError,
    },

    /// Dispatcher-level filesystem failure (e.g. creating the output directory).
    #[error("{action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ConversionError::Strategy { source, .. } => source.kind(),
            ConversionError::Io { .. } => ErrorKind::IoFailure,
            ConversionError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ConversionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The strategy cause, when the failure came from a strategy.
    pub fn strategy_error(&self) -> Option<&StrategyError> {
        match self {
            ConversionError::Strategy { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Human-readable message safe to show an end user: no filesystem paths.
    pub fn user_message(&self) -> String {
        match self {
            ConversionError::UnsupportedFormat { extension } if extension.is_empty() => {
                "Unsupported file type: the file has no extension".to_string()
            }
            ConversionError::UnsupportedFormat { extension } => {
                format!("Unsupported file type: {extension}")
            }
            ConversionError::Strategy { source, .. } => match source {
                StrategyError::Io { .. } => {
                    "Conversion failed: the file could not be read or written".to_string()
                }
                StrategyError::OfficeConversionUnavailable { .. } => {
                    "Office document conversion is currently unavailable".to_string()
                }
                other => other.to_string(),
            },
            ConversionError::Io { .. } | ConversionError::Internal(_) => {
                "Conversion failed due to a server error".to_string()
            }
            ConversionError::InvalidConfig(msg) => format!("Invalid configuration: {msg}"),
        }
    }
}
