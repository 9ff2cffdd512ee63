//! Retention Sweeper: delete files older than the retention window from the
//! managed directories.
//!
//! A sweep lists the direct entries of each directory (non-recursive),
//! computes `age = now − mtime`, and deletes entries whose age is strictly
//! greater than the window. Every entry is handled independently: failures
//! are logged and recorded in the [`SweepSummary`], never propagated.
//!
//! No lock is shared with the dispatcher. In-flight conversions are safe
//! only because they are always far younger than the window; keep
//! `retention_minutes` well above the slowest conversion.

use crate::store::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// `minutes × 60 s`, saturating.
pub fn retention_window(retention_minutes: u64) -> Duration {
    Duration::from_secs(retention_minutes.saturating_mul(60))
}

/// What happened to one directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Older than the window and removed by this sweep.
    Deleted,
    /// Within the window.
    Retained,
    /// Gone before this sweep could remove it (e.g. a concurrent sweep).
    Vanished,
    /// Not a file (subdirectory); never deleted.
    Skipped,
    /// Metadata or deletion failed for another reason.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub path: PathBuf,
    pub outcome: EntryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-entry results of one sweep plus their tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub deleted: usize,
    pub retained: usize,
    pub vanished: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Managed directories that did not exist at sweep time.
    pub missing_dirs: Vec<PathBuf>,
    pub entries: Vec<EntryReport>,
}

impl SweepSummary {
    fn record(&mut self, report: EntryReport) {
        match report.outcome {
            EntryOutcome::Deleted => self.deleted += 1,
            EntryOutcome::Retained => self.retained += 1,
            EntryOutcome::Vanished => self.vanished += 1,
            EntryOutcome::Skipped => self.skipped += 1,
            EntryOutcome::Failed => self.failed += 1,
        }
        self.entries.push(report);
    }

    pub fn scanned(&self) -> usize {
        self.entries.len()
    }
}

/// Sweeps a fixed set of directories. Holds no timer; see
/// [`crate::schedule::SweepScheduler`] for periodic runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweeper {
    dirs: Vec<PathBuf>,
}

impl Sweeper {
    /// Sweep both of the store's directories.
    pub fn new(store: &ArtifactStore) -> Self {
        Self::with_dirs(store.managed_dirs())
    }

    pub fn with_dirs<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Delete files older than `retention_minutes`; returns how many were
    /// actually removed by this call.
    pub fn sweep(&self, retention_minutes: u64) -> usize {
        self.sweep_summary(retention_minutes).deleted
    }

    pub fn sweep_summary(&self, retention_minutes: u64) -> SweepSummary {
        self.sweep_at(retention_window(retention_minutes), SystemTime::now())
    }

    /// Sweep against an explicit clock. An entry survives when
    /// `now − mtime <= retention`; mtimes in the future count as age zero.
    pub fn sweep_at(&self, retention: Duration, now: SystemTime) -> SweepSummary {
        let mut summary = SweepSummary::default();

        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Sweep: {} does not exist, skipping", dir.display());
                    summary.missing_dirs.push(dir.clone());
                    continue;
                }
                Err(e) => {
                    warn!("Sweep: cannot list {}: {}", dir.display(), e);
                    summary.record(EntryReport {
                        path: dir.clone(),
                        outcome: EntryOutcome::Failed,
                        age_ms: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            for entry in entries {
                let report = match entry {
                    Ok(entry) => sweep_entry(&entry, retention, now),
                    Err(e) => {
                        warn!("Sweep: error reading entry in {}: {}", dir.display(), e);
                        EntryReport {
                            path: dir.clone(),
                            outcome: EntryOutcome::Failed,
                            age_ms: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                summary.record(report);
            }
        }

        if summary.deleted > 0 || summary.failed > 0 {
            info!(
                "Sweep complete: {} deleted, {} retained, {} failed",
                summary.deleted, summary.retained, summary.failed
            );
        } else {
            debug!("Sweep complete: nothing to delete ({} retained)", summary.retained);
        }
        summary
    }
}

fn sweep_entry(entry: &DirEntry, retention: Duration, now: SystemTime) -> EntryReport {
    let path = entry.path();

    // Symlinks are judged (and removed) as links, never followed.
    let meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(e) => return failure_or_vanished(path, None, e),
    };
    if meta.is_dir() {
        return EntryReport {
            path,
            outcome: EntryOutcome::Skipped,
            age_ms: None,
            error: None,
        };
    }

    let modified = match meta.modified() {
        Ok(t) => t,
        Err(e) => return failure_or_vanished(path, None, e),
    };
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    let age_ms = Some(age.as_millis() as u64);

    if age <= retention {
        return EntryReport {
            path,
            outcome: EntryOutcome::Retained,
            age_ms,
            error: None,
        };
    }

    match fs::remove_file(&path) {
        Ok(()) => {
            info!("Deleted old file: {}", display_name(&path));
            EntryReport {
                path,
                outcome: EntryOutcome::Deleted,
                age_ms,
                error: None,
            }
        }
        Err(e) => failure_or_vanished(path, age_ms, e),
    }
}

fn failure_or_vanished(path: PathBuf, age_ms: Option<u64>, e: io::Error) -> EntryReport {
    if e.kind() == io::ErrorKind::NotFound {
        debug!("Sweep: {} already gone", path.display());
        return EntryReport {
            path,
            outcome: EntryOutcome::Vanished,
            age_ms,
            error: None,
        };
    }
    warn!("Error deleting file {}: {}", path.display(), e);
    EntryReport {
        path,
        outcome: EntryOutcome::Failed,
        age_ms,
        error: Some(e.to_string()),
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
    use std::fs::File;

    const MINUTE: Duration = Duration::from_secs(60);

    fn write_aged(path: &Path, age: Duration, now: SystemTime) {
        std::fs::write(path, b"x").unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(now - age)
            .unwrap();
    }

    fn store_in(dir: &Path) -> ArtifactStore {
        let store = ArtifactStore::new(dir.join("uploads"), dir.join("converted"));
        store.ensure_dirs().unwrap();
        store
    }

    #[test]
    fn deletes_only_entries_older_than_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let now = SystemTime::now();
        let old_upload = store.staging_dir().join("old.docx");
        let old_pdf = store.output_dir().join("1-old.pdf");
        let fresh_pdf = store.output_dir().join("2-fresh.pdf");
        write_aged(&old_upload, 40 * MINUTE, now);
        write_aged(&old_pdf, 31 * MINUTE, now);
        write_aged(&fresh_pdf, 29 * MINUTE, now);

        let summary = Sweeper::new(&store).sweep_at(30 * MINUTE, now);
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.retained, 1);
        assert!(!old_upload.exists());
        assert!(!old_pdf.exists());
        assert!(fresh_pdf.exists());
    }

    #[test]
    fn boundary_age_is_retained() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let now = SystemTime::now();
        let at_edge = store.output_dir().join("edge.pdf");
        let past_edge = store.output_dir().join("past.pdf");
        write_aged(&at_edge, 30 * MINUTE, now);
        write_aged(&past_edge, 30 * MINUTE + Duration::from_millis(1), now);

        let summary = Sweeper::new(&store).sweep_at(30 * MINUTE, now);
        assert!(at_edge.exists());
        assert!(!past_edge.exists());
        assert_eq!(summary.deleted, 1);
    }

    #[test]
    fn second_sweep_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let now = SystemTime::now();
        write_aged(&store.output_dir().join("a.pdf"), 40 * MINUTE, now);

        let sweeper = Sweeper::new(&store);
        assert_eq!(sweeper.sweep_at(30 * MINUTE, now).deleted, 1);
        let again = sweeper.sweep_at(30 * MINUTE, now);
        assert_eq!(again.deleted, 0);
        assert_eq!(again.scanned(), 0);
    }

    #[test]
    fn missing_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nope-in"), dir.path().join("nope-out"));
        let summary = Sweeper::new(&store).sweep_summary(0);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.missing_dirs.len(), 2);
    }

    #[test]
    fn subdirectories_are_never_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let sub = store.output_dir().join("nested");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("inner.pdf"), b"x").unwrap();

        let future = SystemTime::now() + 24 * 60 * MINUTE;
        let summary = Sweeper::new(&store).sweep_at(Duration::ZERO, future);
        assert_eq!(summary.skipped, 1);
        assert!(sub.join("inner.pdf").exists());
    }

    #[test]
    fn future_mtime_counts_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let now = SystemTime::now();
        let path = store.output_dir().join("skewed.pdf");
        std::fs::write(&path, b"x").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(now + 5 * MINUTE)
            .unwrap();

        let summary = Sweeper::new(&store).sweep_at(Duration::ZERO, now);
        assert_eq!(summary.retained, 1);
        assert_eq!(summary.entries[0].age_ms, Some(0));
        assert!(path.exists());
    }

    #[test]
    fn vanished_entry_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghost.pdf");
        let report = failure_or_vanished(
            path.clone(),
            Some(1),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert_eq!(report.outcome, EntryOutcome::Vanished);
        assert!(report.error.is_none());

        let report = failure_or_vanished(path, None, io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(report.outcome, EntryOutcome::Failed);
        assert!(report.error.is_some());
    }

    #[test]
    fn retention_window_is_minutes() {
        assert_eq!(retention_window(30), Duration::from_secs(1800));
        assert_eq!(retention_window(0), Duration::ZERO);
        assert_eq!(retention_window(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn concurrent_sweeps_delete_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let now = SystemTime::now();
        for i in 0..50 {
            write_aged(&store.output_dir().join(format!("{i}.pdf")), 60 * MINUTE, now);
        }

        let sweeper = Sweeper::new(&store);
        let total: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| sweeper.sweep_at(30 * MINUTE, now).deleted))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(total, 50);
        assert_eq!(std::fs::read_dir(store.output_dir()).unwrap().count(), 0);
    }
}
