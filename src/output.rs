//! Output types returned by the dispatcher.

use crate::error::ErrorKind;
use crate::pipeline::classify::Strategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A successfully converted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Epoch-millisecond id, also the prefix of `converted_name`.
    pub id: u64,
    /// Name the caller supplied for the upload (or the input's file name).
    pub original_name: String,
    /// `{id}-{base}.pdf`, the name a download link refers to.
    pub converted_name: String,
    pub output_path: PathBuf,
    pub strategy: Strategy,
    pub size_bytes: u64,
    pub converted_at_ms: u64,
    pub duration_ms: u64,
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ConversionOutput>,
    /// User-safe message when the conversion failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FileResult {
    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }
}

/// Aggregate result of [`crate::convert::Converter::convert_many`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// In input order.
    pub files: Vec<FileResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}
