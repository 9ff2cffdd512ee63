//! Progress-callback trait for batch conversion events.
//!
//! Attach an [`Arc<dyn ConversionProgressCallback>`] with
//! [`crate::convert::Converter::with_progress_callback`] to receive events as
//! [`crate::convert::Converter::convert_many`] works through its inputs.
//! Callers can forward them to a channel, a WebSocket, or a terminal
//! progress bar without the library knowing how the host communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2pdf::{ConversionOutput, ConversionProgressCallback};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output: &ConversionOutput) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", index + 1, total, output.converted_name);
//!     }
//! }
//! ```

use crate::output::ConversionOutput;
use std::sync::Arc;

/// Called by the dispatcher as a batch progresses.
///
/// Files are converted concurrently, so `on_file_*` calls for different
/// indices may arrive from different threads and out of order. All methods
/// default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any file is converted.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before file `index` (0-based) is dispatched.
    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    fn on_file_complete(&self, index: usize, total: usize, output: &ConversionOutput) {
        let _ = (index, total, output);
    }

    /// `error` is the user-safe message, without filesystem paths.
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored on [`crate::convert::Converter`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
