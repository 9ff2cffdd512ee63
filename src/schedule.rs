//! Scheduler collaborator: run the [`Sweeper`] on a fixed interval.
//!
//! ```rust,no_run
//! use edgequake_doc2pdf::{ConverterConfig, SweepScheduler};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ConverterConfig::default();
//! let handle = SweepScheduler::from_config(&config).spawn();
//! // ... serve requests ...
//! handle.shutdown().await;
//! # }
//! ```

use crate::config::ConverterConfig;
use crate::store::ArtifactStore;
use crate::sweep::{SweepSummary, Sweeper};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Running totals published after every completed sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub runs: u64,
    pub deleted_total: u64,
    pub last: Option<SweepSummary>,
}

/// Periodic sweep configuration. Call [`SweepScheduler::spawn`] to start.
#[derive(Debug, Clone)]
pub struct SweepScheduler {
    sweeper: Arc<Sweeper>,
    retention_minutes: u64,
    interval: Duration,
    run_immediately: bool,
}

impl SweepScheduler {
    pub fn new(sweeper: Sweeper, retention_minutes: u64, interval: Duration) -> Self {
        Self {
            sweeper: Arc::new(sweeper),
            retention_minutes,
            interval: interval.max(Duration::from_millis(1)),
            run_immediately: false,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(
            Sweeper::new(&ArtifactStore::from_config(config)),
            config.retention_minutes,
            config.sweep_interval(),
        )
    }

    /// Sweep once at startup instead of waiting one full interval.
    pub fn run_immediately(mut self, yes: bool) -> Self {
        self.run_immediately = yes;
        self
    }

    /// Start the sweep loop on the current tokio runtime.
    pub fn spawn(self) -> SweepHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stats_tx, stats_rx) = watch::channel(SchedulerStats::default());
        info!(
            "Starting sweep scheduler (retention: {} minutes, interval: {:?})",
            self.retention_minutes, self.interval
        );
        let task = tokio::spawn(self.run(shutdown_rx, stats_tx));
        SweepHandle {
            shutdown_tx,
            stats_rx,
            task,
        }
    }

    async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        stats_tx: watch::Sender<SchedulerStats>,
    ) {
        let start = if self.run_immediately {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        // A sweep that overruns pushes the next one back instead of bunching.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Sweep scheduler received shutdown");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let sweeper = Arc::clone(&self.sweeper);
            let minutes = self.retention_minutes;
            match tokio::task::spawn_blocking(move || sweeper.sweep_summary(minutes)).await {
                Ok(summary) => {
                    stats_tx.send_modify(|stats| {
                        stats.runs += 1;
                        stats.deleted_total += summary.deleted as u64;
                        stats.last = Some(summary);
                    });
                }
                Err(e) => warn!("Sweep task failed: {}", e),
            }
        }
        info!("Sweep scheduler stopped");
    }
}

/// Handle to a running scheduler. Dropping it without calling
/// [`SweepHandle::shutdown`] also stops the loop at its next wake-up.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown_tx: watch::Sender<bool>,
    stats_rx: watch::Receiver<SchedulerStats>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Latest published stats.
    pub fn stats(&self) -> SchedulerStats {
        self.stats_rx.borrow().clone()
    }

    /// A receiver that wakes on every completed sweep.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStats> {
        self.stats_rx.clone()
    }

    /// Stop the loop and wait for an in-progress sweep to finish.
    pub async fn shutdown(self) -> SchedulerStats {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Sweep scheduler task ended abnormally: {}", e);
        }
        let stats = self.stats_rx.borrow().clone();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::SystemTime;

    fn aged_file(dir: &std::path::Path, name: &str, minutes: u64) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(minutes * 60))
            .unwrap();
        path
    }

    #[tokio::test]
    async fn immediate_run_sweeps_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let old = aged_file(dir.path(), "old.pdf", 45);
        let fresh = aged_file(dir.path(), "fresh.pdf", 1);

        let handle = SweepScheduler::new(
            Sweeper::with_dirs([dir.path()]),
            30,
            Duration::from_secs(3600),
        )
        .run_immediately(true)
        .spawn();

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.runs >= 1).await.unwrap();

        let stats = handle.shutdown().await;
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.deleted_total, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_waits_one_interval() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SweepScheduler::new(
            Sweeper::with_dirs([dir.path()]),
            30,
            Duration::from_secs(600),
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(handle.stats().runs, 0);

        let mut rx = handle.subscribe();
        tokio::time::sleep(Duration::from_secs(2)).await;
        rx.wait_for(|s| s.runs >= 1).await.unwrap();
        assert_eq!(handle.shutdown().await.runs, 1);
    }

    #[tokio::test]
    async fn shutdown_before_first_tick_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let old = aged_file(dir.path(), "old.pdf", 45);
        let handle = SweepScheduler::new(
            Sweeper::with_dirs([dir.path()]),
            30,
            Duration::from_secs(3600),
        )
        .spawn();
        let stats = handle.shutdown().await;
        assert_eq!(stats.runs, 0);
        assert!(old.exists());
    }

    #[test]
    fn from_config_uses_store_dirs() {
        let config = ConverterConfig::builder()
            .staging_dir("/tmp/a")
            .output_dir("/tmp/b")
            .sweep_interval_secs(60)
            .build()
            .unwrap();
        let scheduler = SweepScheduler::from_config(&config);
        assert_eq!(scheduler.interval, Duration::from_secs(60));
        assert_eq!(scheduler.retention_minutes, 30);
        assert_eq!(
            scheduler.sweeper.dirs(),
            &[std::path::PathBuf::from("/tmp/a"), std::path::PathBuf::from("/tmp/b")]
        );
    }
}
