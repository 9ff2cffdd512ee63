//! Conversion dispatch: classify an input, run its one strategy, and make
//! sure a failure never leaves a converted file behind.
//!
//! [`Converter`] is cheap to clone and safe to share. Strategies do blocking
//! file and process I/O, so the async entry points hop onto tokio's blocking
//! pool; the `*_blocking` variants are for callers already off the executor.
//!
//! Two flows are offered:
//!
//! * [`Converter::convert`] converts a path and leaves the input alone.
//! * [`Converter::convert_upload`] names the output after the caller's
//!   original filename and deletes the input on every terminal outcome, the
//!   way staged uploads are consumed.

use crate::config::ConverterConfig;
use crate::error::ConversionError;
use crate::output::{BatchReport, ConversionOutput, FileResult};
use crate::pipeline::classify::{classify, extension_of, Strategy};
use crate::pipeline::office::{OfficeConverter, SofficeConverter};
use crate::pipeline::{image, office, passthrough, text};
use crate::progress::ProgressCallback;
use crate::store::{self, ArtifactStore};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

/// One file waiting in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    pub path: PathBuf,
    /// Name the output is derived from, usually the uploaded filename.
    pub original_name: String,
}

impl StagedInput {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
        }
    }

    /// Use the file's own name as the original name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let original_name = file_name_of(&path);
        Self {
            path,
            original_name,
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The Conversion Dispatcher.
#[derive(Clone)]
pub struct Converter {
    store: ArtifactStore,
    office: Arc<dyn OfficeConverter>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("store", &self.store)
            .field("office", &self.office.name())
            .field("concurrency", &self.concurrency)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Converter {
    /// A converter over the config's directories, delegating office
    /// documents to LibreOffice.
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            store: ArtifactStore::from_config(config),
            office: Arc::new(SofficeConverter::new(
                config.soffice_path.clone(),
                config.office_timeout(),
            )),
            concurrency: config.concurrency.max(1),
            progress: None,
        }
    }

    /// Replace the office conversion service.
    pub fn with_office_converter(mut self, office: Arc<dyn OfficeConverter>) -> Self {
        self.office = office;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Convert `input` into the output directory, naming the result after
    /// the input's own file name. The input is left in place.
    ///
    /// # Errors
    /// * [`ConversionError::UnsupportedFormat`] before anything is touched.
    /// * [`ConversionError::Strategy`] when the strategy fails; no output
    ///   file remains.
    /// * [`ConversionError::Io`] when the output directory cannot be created.
    pub fn convert_blocking(&self, input: &Path) -> Result<ConversionOutput, ConversionError> {
        self.dispatch(input, &file_name_of(input))
    }

    /// Upload flow: convert `input`, name the output after `original_name`,
    /// then delete `input` whatever the outcome.
    pub fn convert_upload_blocking(
        &self,
        input: &Path,
        original_name: &str,
    ) -> Result<ConversionOutput, ConversionError> {
        let result = self.dispatch(input, original_name);
        store::remove_file_best_effort(input);
        result
    }

    /// Async form of [`Converter::convert_blocking`].
    pub async fn convert(
        &self,
        input: impl Into<PathBuf>,
    ) -> Result<ConversionOutput, ConversionError> {
        let this = self.clone();
        let input = input.into();
        tokio::task::spawn_blocking(move || this.convert_blocking(&input))
            .await
            .map_err(|e| ConversionError::Internal(format!("conversion task failed: {e}")))?
    }

    /// Async form of [`Converter::convert_upload_blocking`].
    pub async fn convert_upload(
        &self,
        input: impl Into<PathBuf>,
        original_name: impl Into<String>,
    ) -> Result<ConversionOutput, ConversionError> {
        let this = self.clone();
        let input = input.into();
        let original_name = original_name.into();
        tokio::task::spawn_blocking(move || this.convert_upload_blocking(&input, &original_name))
            .await
            .map_err(|e| ConversionError::Internal(format!("conversion task failed: {e}")))?
    }

    /// Convert staged uploads concurrently, consuming each input.
    ///
    /// At most `concurrency` conversions run at once. Individual failures
    /// are recorded in the report rather than aborting the batch; results
    /// come back in input order.
    pub async fn convert_many(&self, inputs: Vec<StagedInput>) -> BatchReport {
        let started = Instant::now();
        let total = inputs.len();
        info!("Starting batch of {} files", total);
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let mut results: Vec<(usize, FileResult)> =
            stream::iter(inputs.into_iter().enumerate().map(|(index, staged)| {
                let this = self.clone();
                async move {
                    if let Some(ref cb) = this.progress {
                        cb.on_file_start(index, total, &staged.original_name);
                    }
                    let outcome = this
                        .convert_upload(staged.path.clone(), staged.original_name.clone())
                        .await;
                    let result = match outcome {
                        Ok(output) => {
                            if let Some(ref cb) = this.progress {
                                cb.on_file_complete(index, total, &output);
                            }
                            FileResult {
                                input: staged.path,
                                output: Some(output),
                                error: None,
                                error_kind: None,
                            }
                        }
                        Err(e) => {
                            warn!("Failed to convert {}: {}", staged.original_name, e);
                            let message = e.user_message();
                            if let Some(ref cb) = this.progress {
                                cb.on_file_error(index, total, &message);
                            }
                            FileResult {
                                input: staged.path,
                                output: None,
                                error: Some(message),
                                error_kind: Some(e.kind()),
                            }
                        }
                    };
                    (index, result)
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        let files: Vec<FileResult> = results.into_iter().map(|(_, r)| r).collect();
        let succeeded = files.iter().filter(|f| f.is_success()).count();

        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, succeeded);
        }
        let report = BatchReport {
            failed: files.len() - succeeded,
            succeeded,
            files,
            total_duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Batch complete: {}/{} converted, {}ms total",
            report.succeeded, total, report.total_duration_ms
        );
        report
    }

    fn dispatch(
        &self,
        input: &Path,
        original_name: &str,
    ) -> Result<ConversionOutput, ConversionError> {
        let started = Instant::now();
        let kind = classify(input);
        let Some(strategy) = kind.strategy() else {
            let extension = extension_of(input);
            info!("Rejected {}: unsupported extension {:?}", input.display(), extension);
            return Err(ConversionError::UnsupportedFormat { extension });
        };

        let output_dir = self.store.output_dir();
        std::fs::create_dir_all(output_dir).map_err(|e| ConversionError::Io {
            action: "Failed to create output directory",
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let now = SystemTime::now();
        let (id, output_path) = self.store.allocate_output(original_name, now);
        debug!(
            "Dispatching {} ({}) via {} → {}",
            input.display(),
            kind.label(),
            strategy,
            output_path.display()
        );

        let result = match strategy {
            Strategy::ImageEmbed => image::embed_image(input, &output_path),
            Strategy::TextLayout => text::layout_text(input, &output_path),
            Strategy::OfficeDelegate => {
                office::delegate_office(input, &output_path, self.office.as_ref())
            }
            Strategy::PassthroughCopy => passthrough::copy_pdf(input, &output_path),
        };

        if let Err(source) = result {
            // A taken target belongs to another conversion; leave it alone.
            if !source.is_target_taken() {
                store::remove_file_best_effort(&output_path);
            }
            warn!("{} failed for {}: {}", strategy, input.display(), source);
            return Err(ConversionError::Strategy { strategy, source });
        }

        let size_bytes = std::fs::metadata(&output_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let output = ConversionOutput {
            id,
            original_name: original_name.to_string(),
            converted_name: file_name_of(&output_path),
            output_path,
            strategy,
            size_bytes,
            converted_at_ms: store::epoch_millis(now),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Converted {} → {} ({} bytes, {}ms)",
            original_name, output.converted_name, output.size_bytes, output.duration_ms
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::office::ServiceError;
    use tempfile::TempDir;

    struct StubOffice(Result<&'static [u8], &'static str>);

    impl OfficeConverter for StubOffice {
        fn name(&self) -> &str {
            "stub"
        }

        fn convert(&self, _: &[u8], _: &str, _: &str) -> Result<Vec<u8>, ServiceError> {
            self.0.map(|b| b.to_vec()).map_err(Into::into)
        }
    }

    fn setup() -> (TempDir, Converter) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::builder()
            .staging_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("converted"))
            .concurrency(2)
            .build()
            .unwrap();
        let converter = Converter::new(&config)
            .with_office_converter(Arc::new(StubOffice(Ok(b"%PDF-1.4 stub"))));
        converter.store().ensure_dirs().unwrap();
        (dir, converter)
    }

    fn stage(converter: &Converter, name: &str, bytes: &[u8]) -> PathBuf {
        let path = converter.store().staging_dir().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn output_count(converter: &Converter) -> usize {
        std::fs::read_dir(converter.store().output_dir())
            .map(|d| d.count())
            .unwrap_or(0)
    }

    #[test]
    fn text_input_converts_and_input_survives() {
        let (_dir, converter) = setup();
        let input = stage(&converter, "notes.txt", b"one\ntwo\nthree");

        let out = converter.convert_blocking(&input).unwrap();
        assert_eq!(out.strategy, Strategy::TextLayout);
        assert_eq!(out.converted_name, format!("{}-notes.pdf", out.id));
        assert!(out.output_path.starts_with(converter.store().output_dir()));
        assert!(out.size_bytes > 0);
        assert!(input.exists());
    }

    #[test]
    fn unsupported_extension_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::builder()
            .staging_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("never-created"))
            .build()
            .unwrap();
        let converter = Converter::new(&config);
        let input = dir.path().join("tool.exe");
        std::fs::write(&input, b"MZ").unwrap();

        let err = converter.convert_blocking(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(!dir.path().join("never-created").exists());
        assert!(input.exists());
    }

    #[test]
    fn strategy_failure_leaves_no_output() {
        let (_dir, converter) = setup();
        let input = stage(&converter, "diagram.bmp", b"BM....");
        let err = converter.convert_blocking(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedImageFormat);
        assert!(matches!(
            err,
            ConversionError::Strategy {
                strategy: Strategy::ImageEmbed,
                ..
            }
        ));
        assert_eq!(output_count(&converter), 0);
    }

    #[test]
    fn office_failure_is_wrapped_and_cleaned() {
        let (_dir, converter) = setup();
        let converter = converter.with_office_converter(Arc::new(StubOffice(Err("boom"))));
        let input = stage(&converter, "report.docx", b"PK");
        let err = converter.convert_blocking(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OfficeConversionUnavailable);
        assert_eq!(output_count(&converter), 0);
    }

    #[test]
    fn upload_flow_names_after_original_and_consumes_input() {
        let (_dir, converter) = setup();
        let input = stage(&converter, "1700000000000-3-x.pdf", b"%PDF-1.7 body");
        let out = converter
            .convert_upload_blocking(&input, "Quarterly Report.pdf")
            .unwrap();
        assert!(out.converted_name.ends_with("-Quarterly Report.pdf"));
        assert_eq!(std::fs::read(&out.output_path).unwrap(), b"%PDF-1.7 body");
        assert!(!input.exists());
    }

    #[test]
    fn upload_flow_consumes_input_on_failure() {
        let (_dir, converter) = setup();
        let input = stage(&converter, "anim.gif", b"GIF89a");
        assert!(converter.convert_upload_blocking(&input, "anim.gif").is_err());
        assert!(!input.exists());
        assert_eq!(output_count(&converter), 0);
    }

    #[test]
    fn same_name_same_instant_gets_distinct_outputs() {
        let (_dir, converter) = setup();
        let a = stage(&converter, "a.pdf", b"A");
        let b = stage(&converter, "b.pdf", b"B");
        let out_a = converter.convert_upload_blocking(&a, "same.pdf").unwrap();
        let out_b = converter.convert_upload_blocking(&b, "same.pdf").unwrap();
        assert_ne!(out_a.output_path, out_b.output_path);
        assert_eq!(std::fs::read(&out_a.output_path).unwrap(), b"A");
        assert_eq!(std::fs::read(&out_b.output_path).unwrap(), b"B");
    }

    #[tokio::test]
    async fn async_convert_matches_blocking() {
        let (_dir, converter) = setup();
        let input = stage(&converter, "deck.pptx", b"PK");
        let out = converter.convert(input.clone()).await.unwrap();
        assert_eq!(out.strategy, Strategy::OfficeDelegate);
        assert_eq!(std::fs::read(&out.output_path).unwrap(), b"%PDF-1.4 stub");
        assert!(input.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_name_batch_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::builder()
            .staging_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("converted"))
            .concurrency(8)
            .build()
            .unwrap();
        let converter = Converter::new(&config);
        converter.store().ensure_dirs().unwrap();

        for round in 0..10 {
            let inputs = (0..8)
                .map(|i| {
                    let staged = stage(&converter, &format!("{round}-{i}.pdf"), b"%PDF-1.4");
                    StagedInput::new(staged, "scan.pdf")
                })
                .collect();
            let report = converter.convert_many(inputs).await;
            assert_eq!(report.failed, 0, "round {round}: {:?}", report.files);
        }
        assert_eq!(output_count(&converter), 80);
    }

    #[tokio::test]
    async fn batch_reports_in_input_order() {
        let (_dir, converter) = setup();
        let inputs = vec![
            StagedInput::from_path(stage(&converter, "a.txt", b"hello")),
            StagedInput::from_path(stage(&converter, "b.exe", b"MZ")),
            StagedInput::new(stage(&converter, "c", b"%PDF"), "c.pdf"),
        ];

        let report = converter.convert_many(inputs).await;
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert!(report.files[0].is_success());
        assert_eq!(report.files[1].error_kind, Some(ErrorKind::UnsupportedFormat));
        // Classification uses the staged path, not the display name.
        assert_eq!(report.files[2].error_kind, Some(ErrorKind::UnsupportedFormat));
        assert_eq!(
            std::fs::read_dir(converter.store().staging_dir()).unwrap().count(),
            0
        );
    }
}
