//! # soffice-auto
//!
//! Locate a [LibreOffice](https://www.libreoffice.org/) installation and run
//! headless `--convert-to` conversions without any manual setup, so callers of
//! the office conversion path never need to know where `soffice` lives or how
//! to keep concurrent invocations from trampling each other.
//!
//! ## How it works
//!
//! On the first call to [`locate_soffice`]:
//!
//! 1. Honours `SOFFICE_PATH` when it points to an existing file.
//! 2. Looks up `soffice`, then `libreoffice`, on `PATH` via [`which`].
//! 3. Falls back to the platform's usual install locations.
//!
//! The resolved path is cached for the rest of the process lifetime.
//!
//! Every [`SofficeRunner::convert_bytes`] call gets its own scratch directory
//! holding the input copy, the output directory, and a private LibreOffice
//! user profile. Two `soffice` processes sharing a profile refuse to run side
//! by side, so the private profile is what makes concurrent conversions work.
//!
//! On Unix the child is started as the leader of a new process group. The
//! `soffice` launcher forks `soffice.bin`, so a timeout kills the whole group
//! rather than just the launcher.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_auto::SofficeRunner;
//! use std::time::Duration;
//!
//! let runner = SofficeRunner::discover()
//!     .expect("LibreOffice not installed")
//!     .with_timeout(Some(Duration::from_secs(60)));
//! let docx = std::fs::read("report.docx").unwrap();
//! let pdf = runner.convert_bytes(&docx, "docx", "pdf").unwrap();
//! std::fs::write("report.pdf", pdf).unwrap();
//! ```
//!
//! ## Platform defaults
//!
//! | OS      | Fallback locations |
//! |---------|--------------------|
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice` |
//! | Linux   | `/usr/bin/soffice`, `/usr/lib/libreoffice/program/soffice`, `/opt/libreoffice/program/soffice`, `/snap/bin/libreoffice` |
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe` (and the x86 variant) |

use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable holding an explicit path to the `soffice` executable.
pub const SOFFICE_PATH_ENV: &str = "SOFFICE_PATH";

/// Wall-clock budget applied by [`SofficeRunner::new`] unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest stderr excerpt carried inside [`SofficeError::Failed`].
const STDERR_EXCERPT_LEN: usize = 512;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-auto operations.
#[derive(Error, Debug)]
pub enum SofficeError {
    /// No LibreOffice executable could be found.
    #[error("LibreOffice executable not found (searched {} locations); install LibreOffice or set SOFFICE_PATH", searched.len())]
    NotFound { searched: Vec<PathBuf> },

    /// The per-call scratch directory could not be prepared or read.
    #[error("Scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),

    /// The executable exists but could not be started.
    #[error("Failed to start '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The runtime driving the child process could not be built.
    #[error("Failed to start the conversion runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Waiting on the child process failed.
    #[error("Failed to wait for LibreOffice: {0}")]
    Wait(#[source] std::io::Error),

    /// The conversion exceeded its wall-clock budget and was killed.
    #[error("LibreOffice conversion timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// LibreOffice exited unsuccessfully.
    #[error("LibreOffice exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// LibreOffice exited cleanly but produced nothing.
    #[error("LibreOffice produced no '{format}' output")]
    NoOutput { format: String },
}

// ── Discovery ────────────────────────────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

fn executable_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["soffice.exe", "soffice.com"]
    } else {
        &["soffice", "libreoffice"]
    }
}

fn platform_default_paths() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => vec![PathBuf::from(
            "/Applications/LibreOffice.app/Contents/MacOS/soffice",
        )],
        "windows" => vec![
            PathBuf::from(r"C:\Program Files\LibreOffice\program\soffice.exe"),
            PathBuf::from(r"C:\Program Files (x86)\LibreOffice\program\soffice.exe"),
        ],
        _ => vec![
            PathBuf::from("/usr/bin/soffice"),
            PathBuf::from("/usr/lib/libreoffice/program/soffice"),
            PathBuf::from("/opt/libreoffice/program/soffice"),
            PathBuf::from("/snap/bin/libreoffice"),
        ],
    }
}

/// Returns the path to a LibreOffice executable, searching on first call.
///
/// Resolution order: `SOFFICE_PATH`, then `PATH`, then platform defaults.
///
/// # Thread safety
///
/// Safe to call from multiple threads; a successful lookup is cached once
/// per process. Failures are not cached so a later install is picked up.
pub fn locate_soffice() -> Result<PathBuf, SofficeError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = resolve_uncached()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

fn resolve_uncached() -> Result<PathBuf, SofficeError> {
    let mut searched = Vec::new();

    // 1. Environment variable override.
    if let Some(env_path) = std::env::var_os(SOFFICE_PATH_ENV) {
        let p = PathBuf::from(env_path);
        if which::which(&p).is_ok() {
            return Ok(p);
        }
        searched.push(p);
    }

    // 2. PATH search.
    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = find_in_path(executable_names(), &path_var) {
            return Ok(found);
        }
        for dir in std::env::split_paths(&path_var) {
            for name in executable_names() {
                searched.push(dir.join(name));
            }
        }
    }

    // 3. Usual install locations.
    for candidate in platform_default_paths() {
        if which::which(&candidate).is_ok() {
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    Err(SofficeError::NotFound { searched })
}

/// Looks each of `names` up on a `PATH`-style list, in order.
///
/// Names take precedence over directories: `/b/soffice` beats
/// `/a/libreoffice` when `soffice` is listed first.
pub fn find_in_path(names: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    names
        .iter()
        .find_map(|name| which::which_in(name, Some(path_var), &cwd).ok())
}

// ── Conversion ───────────────────────────────────────────────────────────────

/// A LibreOffice executable plus the time budget for each conversion.
#[derive(Debug, Clone)]
pub struct SofficeRunner {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl SofficeRunner {
    /// Wraps an explicit executable path with [`DEFAULT_TIMEOUT`].
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Wraps whatever [`locate_soffice`] finds.
    pub fn discover() -> Result<Self, SofficeError> {
        locate_soffice().map(Self::new)
    }

    /// Replaces the time budget. `None` waits for LibreOffice indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Blocking form of [`SofficeRunner::convert`].
    ///
    /// Drives the conversion on a private current-thread runtime, so it must
    /// not be called from inside an async task (use `spawn_blocking`).
    pub fn convert_bytes(
        &self,
        document: &[u8],
        source_extension: &str,
        target_format: &str,
    ) -> Result<Vec<u8>, SofficeError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SofficeError::Runtime)?
            .block_on(self.convert(document, source_extension, target_format))
    }

    /// Converts `document` to `target_format` and returns the produced bytes.
    ///
    /// `source_extension` tells LibreOffice which import filter to use
    /// (`"docx"`, `".xls"`, …). `target_format` is a `--convert-to` token such
    /// as `"pdf"` or `"pdf:writer_pdf_Export"`; a leading dot is accepted.
    ///
    /// When the budget runs out the child's process group is killed and
    /// [`SofficeError::Timeout`] is returned.
    pub async fn convert(
        &self,
        document: &[u8],
        source_extension: &str,
        target_format: &str,
    ) -> Result<Vec<u8>, SofficeError> {
        let scratch = tempfile::Builder::new()
            .prefix("soffice-auto-")
            .tempdir()
            .map_err(SofficeError::Scratch)?;

        let target_format = target_format.trim_start_matches('.');
        let source_extension = source_extension.trim_start_matches('.');
        let input_name = if source_extension.is_empty() {
            "source".to_string()
        } else {
            format!("source.{source_extension}")
        };

        let input_path = scratch.path().join(&input_name);
        let out_dir = scratch.path().join("out");
        let profile_dir = scratch.path().join("profile");
        tokio::fs::write(&input_path, document)
            .await
            .map_err(SofficeError::Scratch)?;
        tokio::fs::create_dir(&out_dir)
            .await
            .map_err(SofficeError::Scratch)?;

        // stderr goes to a file so a chatty child can never fill a pipe and stall.
        let stderr_path = scratch.path().join("stderr.log");
        let stderr_file = File::create(&stderr_path).map_err(SofficeError::Scratch)?;

        let mut command = std::process::Command::new(&self.binary);
        command
            .arg(format!("-env:UserInstallation={}", file_url(&profile_dir)))
            .args([
                "--headless",
                "--invisible",
                "--nodefault",
                "--nofirststartwizard",
                "--nolockcheck",
                "--nologo",
                "--norestore",
            ])
            .arg("--convert-to")
            .arg(target_format)
            .arg("--outdir")
            .arg(&out_dir)
            .arg(&input_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = Command::from(command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SofficeError::Spawn {
                path: self.binary.clone(),
                source,
            })?;

        let status = wait_with_deadline(&mut child, self.timeout).await?;

        if !status.success() {
            let stderr = tokio::fs::read_to_string(&stderr_path)
                .await
                .unwrap_or_default();
            return Err(SofficeError::Failed {
                code: status.code(),
                stderr: excerpt(stderr.trim()),
            });
        }

        let produced = out_dir.join(format!("source.{}", output_extension(target_format)));
        match tokio::fs::read(&produced).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(SofficeError::NoOutput {
                format: target_format.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SofficeError::NoOutput {
                format: target_format.to_string(),
            }),
            Err(e) => Err(SofficeError::Scratch(e)),
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

async fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, SofficeError> {
    let Some(limit) = timeout else {
        return child.wait().await.map_err(SofficeError::Wait);
    };

    let waited = tokio::time::timeout(limit, child.wait()).await;
    match waited {
        Ok(status) => status.map_err(SofficeError::Wait),
        Err(_) => {
            kill_process_group(child).await;
            Err(SofficeError::Timeout { limit })
        }
    }
}

/// Kills the child and everything it forked, then reaps the child.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The child leads its own group, so its pid is the group id.
        if let Some(pid) = child.id() {
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
    // Already-exited races make kill() fail harmlessly; it reaps either way.
    let _ = child.kill().await;
}

/// `"pdf:writer_pdf_Export"` → `"pdf"`.
fn output_extension(target_format: &str) -> &str {
    target_format
        .split_once(':')
        .map(|(ext, _)| ext)
        .unwrap_or(target_format)
}

/// LibreOffice wants the profile location as a `file://` URL.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

fn excerpt(s: &str) -> String {
    if s.len() <= STDERR_EXCERPT_LEN {
        return s.to_string();
    }
    let mut end = STDERR_EXCERPT_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &s[..end])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
