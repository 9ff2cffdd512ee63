//! Office delegation: hand `.doc`/`.docx`/`.xls`/`.xlsx`/`.ppt`/`.pptx`
//! bytes to an external converter and persist whatever PDF comes back.
//!
//! The converter is a trait object so deployments (and tests) can swap the
//! LibreOffice-backed [`SofficeConverter`] for anything that turns document
//! bytes into PDF bytes. Every failure of the service, whatever its cause,
//! surfaces as [`StrategyError::OfficeConversionUnavailable`] with a hint.

use crate::error::StrategyError;
use crate::pipeline::classify::extension_of;
use crate::store;
use soffice_auto::SofficeRunner;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type returned by [`OfficeConverter`] implementations.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Target format requested from the service.
pub const TARGET_FORMAT: &str = "pdf";

/// Appended to every office failure shown to operators.
pub const OFFICE_HINT: &str = "Make sure LibreOffice is installed and accessible.";

/// Converts office document bytes into PDF bytes.
///
/// Implementations block; the dispatcher already runs strategies off the
/// async executor.
pub trait OfficeConverter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// `source_extension` is the input's lowercase extension without the dot.
    fn convert(
        &self,
        document: &[u8],
        source_extension: &str,
        target_format: &str,
    ) -> Result<Vec<u8>, ServiceError>;
}

/// LibreOffice (`soffice --headless --convert-to`) backed converter.
///
/// The executable is resolved on first use unless given explicitly, so a
/// host without LibreOffice can still convert every other kind.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    binary: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self {
            binary: None,
            timeout: Some(soffice_auto::DEFAULT_TIMEOUT),
        }
    }
}

impl SofficeConverter {
    pub fn new(binary: Option<PathBuf>, timeout: Option<Duration>) -> Self {
        Self { binary, timeout }
    }

    fn runner(&self) -> Result<SofficeRunner, ServiceError> {
        let binary = match &self.binary {
            Some(path) => path.clone(),
            None => soffice_auto::locate_soffice()?,
        };
        Ok(SofficeRunner::new(binary).with_timeout(self.timeout))
    }
}

impl OfficeConverter for SofficeConverter {
    fn name(&self) -> &str {
        "soffice"
    }

    fn convert(
        &self,
        document: &[u8],
        source_extension: &str,
        target_format: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        let runner = self.runner()?;
        debug!(
            "Running {} on {} bytes of .{}",
            runner.binary().display(),
            document.len(),
            source_extension
        );
        Ok(runner.convert_bytes(document, source_extension, target_format)?)
    }
}

/// Office strategy: send `input` through `converter` and write the result.
pub fn delegate_office(
    input: &Path,
    output: &Path,
    converter: &dyn OfficeConverter,
) -> Result<(), StrategyError> {
    let document = std::fs::read(input)
        .map_err(|e| StrategyError::io("Failed to read input", input, e))?;
    let extension = extension_of(input);
    let extension = extension.trim_start_matches('.');

    let pdf = converter
        .convert(&document, extension, TARGET_FORMAT)
        .map_err(|e| {
            warn!(
                "Office conversion of {} via {} failed: {}",
                input.display(),
                converter.name(),
                e
            );
            StrategyError::OfficeConversionUnavailable {
                detail: e.to_string(),
                hint: OFFICE_HINT.to_string(),
            }
        })?;

    store::persist_bytes(output, &pdf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Mutex;

    struct Recording {
        reply: Result<Vec<u8>, String>,
        seen: Mutex<Vec<(Vec<u8>, String, String)>>,
    }

    impl OfficeConverter for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn convert(&self, doc: &[u8], ext: &str, target: &str) -> Result<Vec<u8>, ServiceError> {
            self.seen
                .lock()
                .unwrap()
                .push((doc.to_vec(), ext.to_string(), target.to_string()));
            self.reply.clone().map_err(Into::into)
        }
    }

    #[test]
    fn service_bytes_are_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Report.DOCX");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, b"PK fake docx").unwrap();

        let svc = Recording {
            reply: Ok(b"%PDF-1.4 from service".to_vec()),
            seen: Mutex::new(Vec::new()),
        };
        delegate_office(&input, &output, &svc).unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4 from service");
        let seen = svc.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, b"PK fake docx");
        assert_eq!(seen[0].1, "docx");
        assert_eq!(seen[0].2, "pdf");
    }

    #[test]
    fn service_failure_is_classified_with_hint() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sheet.xlsx");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, b"x").unwrap();

        let svc = Recording {
            reply: Err("connection refused".into()),
            seen: Mutex::new(Vec::new()),
        };
        let err = delegate_office(&input, &output, &svc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OfficeConversionUnavailable);
        let msg = err.to_string();
        assert!(msg.contains("connection refused"), "{msg}");
        assert!(msg.contains(OFFICE_HINT), "{msg}");
        assert!(!output.exists());
    }

    #[test]
    fn missing_binary_is_unavailable_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("deck.pptx");
        std::fs::write(&input, b"x").unwrap();
        let svc = SofficeConverter::new(
            Some(dir.path().join("no-such-soffice")),
            Some(Duration::from_secs(5)),
        );
        let err = delegate_office(&input, &dir.path().join("o.pdf"), &svc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OfficeConversionUnavailable);
    }
}
