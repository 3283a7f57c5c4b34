// Snapshot janitor - removes captured GIFs past their retention age
use crate::application::snapshot_capturer::SnapshotRetention;
use crate::domain::error::PipelineError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct SnapshotJanitor {
    dir: PathBuf,
    max_age: Duration,
}

impl SnapshotJanitor {
    pub fn new(dir: PathBuf, retention_days: u64) -> Self {
        Self { dir, max_age: Duration::from_secs(retention_days * 24 * 60 * 60) }
    }

    async fn remove_older_than(&self, cutoff: SystemTime) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // nothing captured yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_snapshot_file(name) {
                continue;
            }

            let modified = entry.metadata().await?.modified()?;
            if modified < cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(file = %name, "Failed to remove expired snapshot: {}", e),
                }
            }
        }
        Ok(removed)
    }
}

fn is_snapshot_file(name: &str) -> bool {
    name.starts_with("dashboard_") && name.ends_with(".gif")
}

#[async_trait]
impl SnapshotRetention for SnapshotJanitor {
    async fn sweep(&self) -> Result<usize, PipelineError> {
        let cutoff = SystemTime::now().checked_sub(self.max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let removed = self
            .remove_older_than(cutoff)
            .await
            .map_err(|e| PipelineError::Storage(format!("snapshot sweep of {}: {}", self.dir.display(), e)))?;

        if removed > 0 {
            tracing::info!(removed, "Removed expired snapshots");
        }
        Ok(removed)
    }
}
