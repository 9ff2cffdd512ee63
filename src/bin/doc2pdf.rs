//! CLI binary for edgequake-doc2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConverterConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_doc2pdf::{
    classify, ArtifactStore, BatchReport, ConversionOutput, ConversionProgressCallback, Converter,
    ConverterConfig, ProgressCallback, StagedInput, SweepScheduler, SweepSummary, Sweeper,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per file.
/// Files finish out of order, so start times are keyed by batch index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output: &ConversionOutput) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            output.converted_name,
            dim(&format!("{:>8} bytes", output.size_bytes)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert files (copies are staged, originals are left alone)
  doc2pdf convert report.docx photo.png notes.txt

  # Same, with JSON output
  doc2pdf convert --json scan.jpg > result.json

  # Show which strategy each file would use
  doc2pdf classify a.pdf b.gif c.xlsx

  # Delete expired files once
  doc2pdf --retention-minutes 30 sweep

  # Keep sweeping every 10 minutes until Ctrl-C
  doc2pdf watch --now

SUPPORTED INPUTS:
  Kind      Extensions                          Strategy
  ────────  ──────────────────────────────────  ─────────────────
  image     .png .jpg .jpeg (.gif .bmp rejected) image-embed
  text      .txt                                text-layout
  office    .doc .docx .xls .xlsx .ppt .pptx    office-delegate
  pdf       .pdf                                passthrough-copy

ENVIRONMENT VARIABLES:
  UPLOAD_DIR               Staging directory for originals (default: uploads)
  CONVERTED_DIR            Output directory for PDFs (default: converted)
  FILE_RETENTION_MINUTES   Retention window in minutes (default: 30)
  SWEEP_INTERVAL_SECS      Seconds between sweeps in `watch` (default: 600)
  OFFICE_TIMEOUT_SECS      LibreOffice time budget, 0 = unlimited (default: 120)
  SOFFICE_PATH             Path to the soffice executable
  DOC2PDF_CONCURRENCY      Files converted at once (default: 4)

SETUP:
  Office documents need LibreOffice (`soffice`) on PATH or in SOFFICE_PATH.
  Images, text, and PDFs convert without it.
"#;

/// Convert uploaded documents to PDF and sweep expired artifacts.
#[derive(Parser, Debug)]
#[command(
    name = "doc2pdf",
    version,
    about = "Convert documents to PDF and sweep expired artifacts",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOC2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOC2PDF_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Staging directory for original uploads.
    #[arg(long, global = true, env = "UPLOAD_DIR", default_value = "uploads")]
    staging_dir: PathBuf,

    /// Output directory for converted PDFs.
    #[arg(long, global = true, env = "CONVERTED_DIR", default_value = "converted")]
    output_dir: PathBuf,

    /// Files older than this many minutes are swept.
    #[arg(long, global = true, env = "FILE_RETENTION_MINUTES", default_value_t = 30)]
    retention_minutes: u64,

    /// Seconds between sweeps in `watch` mode.
    #[arg(long, global = true, env = "SWEEP_INTERVAL_SECS", default_value_t = 600,
          value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_secs: u64,

    /// LibreOffice time budget in seconds; 0 waits indefinitely.
    #[arg(long, global = true, env = "OFFICE_TIMEOUT_SECS", default_value_t = 120)]
    office_timeout_secs: u64,

    /// Path to the soffice executable.
    #[arg(long, global = true, env = "SOFFICE_PATH")]
    soffice_path: Option<PathBuf>,

    /// Number of files converted at once.
    #[arg(short, long, global = true, env = "DOC2PDF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage copies of FILES and convert them to PDF.
    Convert {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output a JSON BatchReport instead of text.
        #[arg(long, env = "DOC2PDF_JSON")]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "DOC2PDF_NO_PROGRESS")]
        no_progress: bool,
    },
    /// Run one retention sweep over both directories.
    Sweep {
        /// Output a JSON SweepSummary instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Sweep every --sweep-interval-secs until Ctrl-C.
    Watch {
        /// Sweep once at startup instead of after the first interval.
        #[arg(long)]
        now: bool,
    },
    /// Print the kind and strategy for FILES without converting.
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs while it is shown.
    let show_progress = match &cli.command {
        Command::Convert {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.store)?;

    match cli.command {
        Command::Convert { files, json, .. } => {
            run_convert(&config, files, json, show_progress, cli.quiet).await
        }
        Command::Sweep { json } => run_sweep(&config, json, cli.quiet).await,
        Command::Watch { now } => run_watch(&config, now, cli.quiet).await,
        Command::Classify { files } => {
            run_classify(&files);
            Ok(())
        }
    }
}

/// Map CLI args to `ConverterConfig`.
fn build_config(args: &StoreArgs) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .staging_dir(&args.staging_dir)
        .output_dir(&args.output_dir)
        .retention_minutes(args.retention_minutes)
        .sweep_interval_secs(args.sweep_interval_secs)
        .office_timeout_secs(args.office_timeout_secs)
        .concurrency(args.concurrency);
    if let Some(ref path) = args.soffice_path {
        builder = builder.soffice_path(path);
    }
    builder.build().context("Invalid configuration")
}

async fn run_convert(
    config: &ConverterConfig,
    files: Vec<PathBuf>,
    json: bool,
    show_progress: bool,
    quiet: bool,
) -> Result<()> {
    let mut converter = Converter::new(config);
    if show_progress {
        let cb = CliProgressCallback::new();
        converter = converter.with_progress_callback(cb as ProgressCallback);
    }
    converter
        .store()
        .ensure_dirs()
        .context("Failed to create working directories")?;

    let mut staged = Vec::with_capacity(files.len());
    for file in &files {
        let path = converter
            .store()
            .stage_file(file)
            .with_context(|| format!("Failed to stage {}", file.display()))?;
        staged.push(StagedInput::new(path, display_name(file)));
    }

    let report = converter.convert_many(staged).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !quiet {
        print_report(&files, &report, show_progress);
    }

    if report.failed > 0 {
        anyhow::bail!("{} of {} files failed to convert", report.failed, files.len());
    }
    Ok(())
}

fn print_report(files: &[PathBuf], report: &BatchReport, show_progress: bool) {
    for (file, result) in files.iter().zip(&report.files) {
        match (&result.output, &result.error) {
            (Some(out), _) => println!("{}", out.output_path.display()),
            (None, Some(err)) if !show_progress => {
                eprintln!("{} {}: {}", red("✗"), file.display(), err)
            }
            _ => {}
        }
    }
    if !show_progress {
        eprintln!(
            "Converted {}/{} files in {}ms",
            report.succeeded,
            report.files.len(),
            report.total_duration_ms
        );
    }
}

async fn run_sweep(config: &ConverterConfig, json: bool, quiet: bool) -> Result<()> {
    let sweeper = Sweeper::new(&ArtifactStore::from_config(config));
    let minutes = config.retention_minutes;
    let summary = tokio::task::spawn_blocking(move || sweeper.sweep_summary(minutes))
        .await
        .context("Sweep task failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !quiet {
        print_summary(&summary, minutes);
    }
    Ok(())
}

fn print_summary(summary: &SweepSummary, minutes: u64) {
    let mark = if summary.failed == 0 { green("✔") } else { cyan("⚠") };
    eprintln!(
        "{} {} deleted, {} retained, {} failed  {}",
        mark,
        bold(&summary.deleted.to_string()),
        summary.retained,
        summary.failed,
        dim(&format!("(older than {minutes} min)")),
    );
    for dir in &summary.missing_dirs {
        eprintln!("   {}", dim(&format!("{} does not exist", dir.display())));
    }
}

async fn run_watch(config: &ConverterConfig, now: bool, quiet: bool) -> Result<()> {
    ArtifactStore::from_config(config)
        .ensure_dirs()
        .context("Failed to create working directories")?;

    let handle = SweepScheduler::from_config(config)
        .run_immediately(now)
        .spawn();
    if !quiet {
        eprintln!(
            "{} Sweeping every {}s (retention {} min). Press Ctrl-C to stop.",
            cyan("◆"),
            config.sweep_interval_secs,
            config.retention_minutes
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let stats = handle.shutdown().await;
    if !quiet {
        eprintln!(
            "{} {} sweeps, {} files deleted",
            green("✔"),
            stats.runs,
            stats.deleted_total
        );
    }
    Ok(())
}

fn run_classify(files: &[PathBuf]) {
    for file in files {
        let kind = classify(file);
        let strategy = kind
            .strategy()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}\t{}", file.display(), kind.label(), strategy);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_dirs_after_subcommand() {
        let cli = Cli::try_parse_from([
            "doc2pdf",
            "sweep",
            "--staging-dir",
            "/tmp/in",
            "--output-dir",
            "/tmp/out",
            "--retention-minutes",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.store.staging_dir, PathBuf::from("/tmp/in"));
        assert_eq!(cli.store.retention_minutes, 5);
        assert!(matches!(cli.command, Command::Sweep { json: false }));
    }

    #[test]
    fn progress_counts_failed_files() {
        let progress = CliProgressCallback::new();
        progress.on_batch_start(3);
        progress.on_file_start(0, 3, "a.bmp");
        progress.on_file_error(0, 3, "unsupported image format");
        progress.on_file_start(1, 3, "b.zip");
        progress.on_file_error(1, 3, "unsupported format");
        assert_eq!(progress.errors.load(Ordering::SeqCst), 2);
        progress.on_batch_complete(3, 1);
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn zero_interval_rejected_by_parser() {
        assert!(Cli::try_parse_from(["doc2pdf", "--sweep-interval-secs", "0", "watch"]).is_err());
    }

    #[test]
    fn build_config_maps_zero_office_timeout() {
        let cli = Cli::try_parse_from([
            "doc2pdf",
            "--office-timeout-secs",
            "0",
            "classify",
            "a.txt",
        ])
        .unwrap();
        let config = build_config(&cli.store).unwrap();
        assert_eq!(config.office_timeout(), None);
    }

    #[test]
    fn same_dirs_rejected() {
        let cli = Cli::try_parse_from([
            "doc2pdf",
            "--staging-dir",
            "x",
            "--output-dir",
            "x",
            "sweep",
        ])
        .unwrap();
        assert!(build_config(&cli.store).is_err());
    }
}
