//! # edgequake-doc2pdf
//!
//! Normalise uploaded documents to PDF, and delete them again once they
//! expire.
//!
//! Two subsystems share one pair of directories:
//!
//! * the **dispatcher** ([`Converter`]) turns an image, plain-text file,
//!   office document, or PDF into a PDF in the output directory, choosing
//!   exactly one strategy by file extension;
//! * the **sweeper** ([`Sweeper`], driven periodically by
//!   [`SweepScheduler`]) deletes anything in the staging or output directory
//!   older than the retention window.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads/1718…-7-report.docx
//!  │
//!  ├─ 1. Classify  extension → InputKind → Strategy
//!  ├─ 2. Allocate  converted/{epochMillis}-{originalBase}.pdf
//!  ├─ 3. Convert   image-embed | text-layout | office-delegate | passthrough-copy
//!  └─ 4. Persist   temp file + rename; failures leave nothing behind
//!
//! every sweep_interval_secs:  delete entries with age > retention_minutes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2pdf::{Converter, ConverterConfig, SweepScheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::default();
//!     let converter = Converter::new(&config);
//!     converter.store().ensure_dirs()?;
//!
//!     let sweeper = SweepScheduler::from_config(&config).spawn();
//!
//!     let output = converter
//!         .convert_upload("uploads/1718000000000-0-notes.txt", "notes.txt")
//!         .await?;
//!     println!("{}", output.converted_name);
//!
//!     sweeper.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edgequake-doc2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod schedule;
pub mod store;
pub mod sweep;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use convert::{Converter, StagedInput};
pub use error::{ConversionError, ErrorKind, StrategyError};
pub use output::{BatchReport, ConversionOutput, FileResult};
pub use pipeline::classify::{classify, ImageFormat, InputKind, Strategy};
pub use pipeline::office::{OfficeConverter, ServiceError, SofficeConverter};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schedule::{SchedulerStats, SweepHandle, SweepScheduler};
pub use store::ArtifactStore;
pub use sweep::{EntryOutcome, EntryReport, SweepSummary, Sweeper};
