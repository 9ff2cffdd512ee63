//! Configuration for conversion and retention sweeping.
//!
//! Every directory and policy knob lives in [`ConverterConfig`], built via
//! [`ConverterConfigBuilder`]. Components receive the config (or the pieces
//! of it they need) at construction instead of reading process-wide
//! globals, which is what lets tests point a whole pipeline at a pair of
//! temporary directories.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the dispatcher, the sweeper, and the scheduler.
///
/// # Example
/// ```rust
/// use edgequake_doc2pdf::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .staging_dir("/var/lib/doc2pdf/uploads")
///     .output_dir("/var/lib/doc2pdf/converted")
///     .retention_minutes(45)
///     .build()
///     .unwrap();
/// assert_eq!(config.retention_minutes, 45);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Where original uploads land before conversion. Default: `uploads`.
    pub staging_dir: PathBuf,

    /// Where converted PDFs are written. Default: `converted`.
    pub output_dir: PathBuf,

    /// Files older than this many minutes are swept. Default: 30.
    ///
    /// Must stay well above the slowest conversion: the sweeper takes no
    /// lock, so a window shorter than a conversion could delete a file that
    /// is still being produced or downloaded.
    pub retention_minutes: u64,

    /// Seconds between scheduled sweeps. Default: 600.
    pub sweep_interval_secs: u64,

    /// Wall-clock budget for one office conversion. Default: 120 s.
    /// `None` waits for LibreOffice indefinitely.
    pub office_timeout_secs: Option<u64>,

    /// Explicit LibreOffice executable. `None` searches `SOFFICE_PATH`,
    /// `PATH`, and the platform's install locations on first use.
    pub soffice_path: Option<PathBuf>,

    /// Maximum conversions in flight during a batch. Default: 4.
    pub concurrency: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("converted"),
            retention_minutes: 30,
            sweep_interval_secs: 600,
            office_timeout_secs: Some(120),
            soffice_path: None,
            concurrency: 4,
        }
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn office_timeout(&self) -> Option<Duration> {
        self.office_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn retention_minutes(mut self, minutes: u64) -> Self {
        self.config.retention_minutes = minutes;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    /// `0` disables the timeout, matching the CLI's `--office-timeout-secs 0`.
    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConversionError> {
        let c = &self.config;
        if c.staging_dir == c.output_dir {
            return Err(ConversionError::InvalidConfig(format!(
                "staging and output directories must differ (both are '{}')",
                c.staging_dir.display()
            )));
        }
        if c.sweep_interval_secs == 0 {
            return Err(ConversionError::InvalidConfig(
                "Sweep interval must be ≥ 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(ConversionError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let c = ConverterConfig::default();
        assert_eq!(c.retention_minutes, 30);
        assert_eq!(c.sweep_interval(), Duration::from_secs(600));
        assert_eq!(c.office_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(c.staging_dir, PathBuf::from("uploads"));
        assert_eq!(c.output_dir, PathBuf::from("converted"));
    }

    #[test]
    fn same_directories_rejected() {
        let err = ConverterConfig::builder()
            .staging_dir("/data/files")
            .output_dir("/data/files")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidConfig(_)));
    }

    #[test]
    fn zero_interval_and_concurrency_rejected() {
        assert!(ConverterConfig::builder()
            .sweep_interval_secs(0)
            .build()
            .is_err());
        assert!(ConverterConfig::builder().concurrency(0).build().is_err());
    }

    #[test]
    fn zero_retention_is_allowed() {
        let c = ConverterConfig::builder().retention_minutes(0).build().unwrap();
        assert_eq!(c.retention_minutes, 0);
    }

    #[test]
    fn zero_office_timeout_disables_it() {
        let c = ConverterConfig::builder()
            .office_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.office_timeout(), None);
        let c = ConverterConfig::builder()
            .office_timeout_secs(15)
            .build()
            .unwrap();
        assert_eq!(c.office_timeout(), Some(Duration::from_secs(15)));
    }
}
