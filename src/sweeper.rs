use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::storage::StorageAreas;

/// Deletes files that have sat in the storage areas longer than the retention
/// window. Runs on a fixed interval until cancelled.
#[derive(Debug, Clone)]
pub struct Sweeper {
    dirs: Vec<PathBuf>,
    retention: Duration,
    interval: Duration,
}

impl Sweeper {
    pub fn new(dirs: Vec<PathBuf>, retention: Duration, interval: Duration) -> Self {
        Self {
            dirs,
            retention,
            interval,
        }
    }

    pub fn from_config(areas: &StorageAreas, cfg: &StorageConfig) -> Self {
        Self::new(
            areas.dirs().iter().map(|d| d.to_path_buf()).collect(),
            cfg.retention(),
            cfg.sweep_interval(),
        )
    }

    /// One pass over every directory as of `now`. Regular files modified more
    /// than the retention window before `now` are removed; failures are logged
    /// and skipped. Returns how many files were deleted.
    pub fn sweep_at(&self, now: SystemTime) -> usize {
        let mut removed = 0;
        for dir in &self.dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot list storage dir");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let Ok(meta) = entry.metadata() else { continue };
                if !meta.is_file() {
                    continue;
                }
                let Ok(modified) = meta.modified() else { continue };
                let expired = now
                    .duration_since(modified)
                    .map(|age| age > self.retention)
                    .unwrap_or(false);
                if !expired {
                    continue;
                }
                let path = entry.path();
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "expired file removed");
                        removed += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove expired file"),
                }
            }
        }
        removed
    }

    /// Run forever on the configured interval; the first pass happens one
    /// interval after start.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.interval.as_secs(),
                retention_secs = self.retention.as_secs(),
                "retention sweeper started"
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("retention sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let sweeper = self.clone();
                        match tokio::task::spawn_blocking(move || sweeper.sweep_at(SystemTime::now())).await {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "retention sweep finished"),
                            Err(e) => warn!(error = %e, "retention sweep task failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod sweeper_tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn sweeper(dir: &tempfile::TempDir) -> (Sweeper, PathBuf, PathBuf) {
        let up = dir.path().join("up");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&up).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        (Sweeper::new(vec![up.clone(), out.clone()], HOUR, HOUR), up, out)
    }

    #[test]
    fn removes_only_files_older_than_retention() {
        let dir = tempfile::tempdir().unwrap();
        let (sweeper, up, out) = sweeper(&dir);
        std::fs::write(up.join("a.pdf"), b"a").unwrap();
        std::fs::write(out.join("b.png"), b"b").unwrap();

        assert_eq!(sweeper.sweep_at(SystemTime::now()), 0);
        assert!(up.join("a.pdf").exists());

        let later = SystemTime::now() + HOUR + Duration::from_secs(60);
        assert_eq!(sweeper.sweep_at(later), 2);
        assert!(!up.join("a.pdf").exists());
        assert!(!out.join("b.png").exists());
    }

    #[test]
    fn leaves_directories_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (sweeper, up, _) = sweeper(&dir);
        std::fs::create_dir(up.join("nested")).unwrap();

        assert_eq!(sweeper.sweep_at(SystemTime::now() + 2 * HOUR), 0);
        assert!(up.join("nested").is_dir());
    }

    #[test]
    fn missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sweeper = Sweeper::new(vec![dir.path().join("gone")], HOUR, HOUR);
        assert_eq!(sweeper.sweep_at(SystemTime::now()), 0);
    }

    #[tokio::test]
    async fn spawned_sweeper_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (sweeper, _, _) = sweeper(&dir);
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_on_its_interval() {
        let dir = tempfile::tempdir().unwrap();
        let up = dir.path().join("up");
        std::fs::create_dir_all(&up).unwrap();
        std::fs::write(up.join("old.txt"), b"x").unwrap();
        let sweeper = Sweeper::new(vec![up.clone()], Duration::ZERO, Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(cancel.clone());

        let mut gone = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !up.join("old.txt").exists() {
                gone = true;
                break;
            }
        }
        cancel.cancel();
        handle.await.unwrap();
        assert!(gone);
    }
}
