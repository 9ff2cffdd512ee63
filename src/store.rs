//! Artifact store: the directory convention every component agrees on.
//!
//! Two sibling directories are managed:
//!
//! ```text
//! staging_dir/   originals as uploaded, e.g. 1718000000000-7-report.docx
//! output_dir/    converted PDFs,         e.g. 1718000000412-report.pdf
//! ```
//!
//! Converted names are `{epochMillis}-{originalBaseName}.pdf`. Uniqueness of
//! that name is the only thing keeping concurrent conversions apart, so
//! [`ArtifactStore::allocate_output`] never hands out the same id twice for
//! one output directory within a process, skips names already on disk, and
//! [`persist_with`] refuses to replace an existing file. Outputs are written
//! to a temporary sibling and renamed into place, so a converted name never
//! refers to a half-written PDF.

use crate::config::ConverterConfig;
use crate::error::StrategyError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Fallback base name for uploads whose name has no usable stem.
const FALLBACK_BASE_NAME: &str = "document";

static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Last output id handed out, per output directory.
static LAST_OUTPUT_IDS: OnceLock<Mutex<HashMap<PathBuf, u64>>> = OnceLock::new();

/// The pair of managed directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    staging_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(staging_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(&config.staging_dir, &config.output_dir)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Both directories, staging first. These are what the sweeper scans.
    pub fn managed_dirs(&self) -> [&Path; 2] {
        [&self.staging_dir, &self.output_dir]
    }

    /// Create both directories if they are missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in self.managed_dirs() {
            std::fs::create_dir_all(dir)?;
            debug!("Ensured directory {}", dir.display());
        }
        Ok(())
    }

    /// Pick `(id, path)` for a new converted artifact.
    ///
    /// `id` is the epoch-millisecond timestamp embedded in the file name.
    /// Ids are strictly increasing per output directory within the process,
    /// so two conversions allocating in the same millisecond get different
    /// names even before either has written anything. A name already on disk
    /// is skipped by bumping the id. The final write still refuses to
    /// clobber, which covers other processes sharing the directory.
    pub fn allocate_output(&self, original_name: &str, now: SystemTime) -> (u64, PathBuf) {
        let mut last_ids = LAST_OUTPUT_IDS
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let last = last_ids.entry(self.output_dir.clone()).or_insert(0);

        let mut id = epoch_millis(now).max(last.saturating_add(1));
        loop {
            let path = self.output_dir.join(converted_name(original_name, id));
            if !path.exists() {
                *last = id;
                return (id, path);
            }
            id += 1;
        }
    }

    /// Copy an external file into the staging directory under a unique name,
    /// the way the upload layer stores originals.
    pub fn stage_file(&self, source: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.staging_dir)?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string());
        let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let staged = self.staging_dir.join(format!(
            "{}-{}-{}",
            epoch_millis(SystemTime::now()),
            seq,
            sanitize(&file_name)
        ));
        std::fs::copy(source, &staged)?;
        debug!("Staged {} → {}", source.display(), staged.display());
        Ok(staged)
    }

    /// Path of a converted artifact by name, or `None` if the name could
    /// reach outside the output directory.
    pub fn resolve_converted(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('\\') {
            return None;
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.output_dir.join(name)),
            _ => None,
        }
    }

    /// Delete one converted artifact by name. `false` if it was not there,
    /// the name was rejected, or deletion failed.
    pub fn delete_converted(&self, name: &str) -> bool {
        match self.resolve_converted(name) {
            Some(path) => remove_file_best_effort(&path),
            None => {
                warn!("Refusing to delete artifact with unsafe name {:?}", name);
                false
            }
        }
    }
}

/// Milliseconds since the Unix epoch; clocks before 1970 read as zero.
pub fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `report.final.docx` → `report.final`. Directory parts are dropped, a
/// leading-dot name keeps its dot, and an empty result becomes `document`.
pub fn base_name_without_extension(original_name: &str) -> String {
    let last = original_name
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(original_name);
    let stem = match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => last,
    };
    if stem.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        sanitize(stem)
    }
}

/// `{epochMillis}-{originalBaseName}.pdf`
pub fn converted_name(original_name: &str, epoch_millis: u64) -> String {
    format!(
        "{}-{}.pdf",
        epoch_millis,
        base_name_without_extension(original_name)
    )
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() || matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Delete `path`, logging instead of failing. `true` only if a file was removed.
pub fn remove_file_best_effort(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Deleted file: {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Error deleting file {}: {}", path.display(), e);
            false
        }
    }
}

/// Write a new file at `path` through `fill`, all-or-nothing.
///
/// Data goes to a hidden temporary file in the same directory and is renamed
/// into place only after `fill` succeeds. If anything fails the temporary is
/// removed and nothing appears at `path`. An existing file at `path` is never
/// replaced; that case fails with [`io::ErrorKind::AlreadyExists`].
pub(crate) fn persist_with(
    path: &Path,
    fill: impl FnOnce(&mut File) -> io::Result<()>,
) -> Result<(), StrategyError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(|e| StrategyError::io("Failed to create output", path, e))?;

    fill(tmp.as_file_mut())
        .and_then(|()| tmp.as_file_mut().flush())
        .map_err(|e| StrategyError::io("Failed to write output", path, e))?;

    tmp.persist_noclobber(path)
        .map_err(|e| StrategyError::io("Failed to write output", path, e.error))?;
    Ok(())
}

pub(crate) fn persist_bytes(path: &Path, bytes: &[u8]) -> Result<(), StrategyError> {
    persist_with(path, |f| f.write_all(bytes))
}
