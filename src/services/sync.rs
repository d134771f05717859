//! Directory sync over the configured sync paths
//!
//! Two entry points: a full pass over every enabled source directory, and a
//! periodic sweep that only looks at files modified since the previous sweep.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{Database, SyncPathRecord};
use crate::media::paths::normpath;
use crate::services::transfer::{FileTransfer, TransferRequest, collect_media_files, place_file};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SyncService {
    db: Database,
    transfer: Arc<dyn FileTransfer>,
    paths: RwLock<Vec<SyncPathRecord>>,
    last_sweep: Mutex<SystemTime>,
}

impl SyncService {
    pub fn new(db: Database, transfer: Arc<dyn FileTransfer>) -> Self {
        Self {
            db,
            transfer,
            paths: RwLock::new(Vec::new()),
            last_sweep: Mutex::new(SystemTime::now()),
        }
    }

    /// Cache the enabled sync paths
    pub async fn reload(&self) -> Result<usize> {
        let paths: Vec<SyncPathRecord> = self
            .db
            .sync_paths()
            .list()
            .await?
            .into_iter()
            .filter(|p| p.enabled)
            .collect();
        let count = paths.len();
        *self.paths.write() = paths;
        debug!(count, "Sync paths loaded");
        Ok(count)
    }

    pub fn paths(&self) -> Vec<SyncPathRecord> {
        self.paths.read().clone()
    }

    /// Process every media file under every enabled source
    pub async fn transfer_all(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for sync_path in self.paths() {
            let source = Path::new(&sync_path.source);
            if !source.is_dir() {
                warn!(source = %sync_path.source, "Sync source does not exist");
                continue;
            }
            info!(source = %sync_path.source, "Syncing directory");
            for file in collect_media_files(source, 0) {
                self.sync_file(&sync_path, &file, &mut report).await;
            }
        }
        info!(
            transferred = report.transferred,
            skipped = report.skipped,
            failed = report.failed,
            "Directory sync finished"
        );
        Ok(report)
    }

    /// Process files modified since the previous sweep
    pub async fn sweep_queue(&self) -> Result<SyncReport> {
        let since = {
            let mut last = self.last_sweep.lock();
            std::mem::replace(&mut *last, SystemTime::now())
        };
        let mut report = SyncReport::default();
        for sync_path in self.paths() {
            let source = Path::new(&sync_path.source);
            if !source.is_dir() {
                continue;
            }
            for file in collect_media_files(source, 0) {
                let modified = std::fs::metadata(&file).and_then(|m| m.modified());
                if modified.is_ok_and(|m| m >= since) {
                    self.sync_file(&sync_path, &file, &mut report).await;
                }
            }
        }
        if report != SyncReport::default() {
            info!(transferred = report.transferred, failed = report.failed, "Queued files processed");
        }
        Ok(report)
    }

    async fn sync_file(&self, sync_path: &SyncPathRecord, file: &Path, report: &mut SyncReport) {
        let file_str = normpath(&file.to_string_lossy());
        match self.sync_file_inner(sync_path, file, &file_str).await {
            Ok(true) => report.transferred += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!(file = %file_str, error = %e, "Sync failed");
                report.failed += 1;
            }
        }
    }

    async fn sync_file_inner(&self, sync_path: &SyncPathRecord, file: &Path, file_str: &str) -> Result<bool> {
        if self.db.blacklist().contains(file_str).await? {
            return Ok(false);
        }
        let dest = sync_path.dest.as_str();
        if self.db.sync_history().contains(file_str, dest).await? {
            return Ok(false);
        }

        let mode = sync_path.rmt_mode();
        if sync_path.rename {
            let mut request = TransferRequest::new(file_str, mode);
            request.target_dir = Some(dest.to_string()).filter(|d| !d.is_empty());
            request.unknown_dir = Some(sync_path.unknown.clone()).filter(|d| !d.is_empty());
            request.source = sync_path.source.clone();
            let outcome = self.transfer.transfer(request).await?;
            if !outcome.success {
                anyhow::bail!(outcome.message);
            }
        } else {
            if dest.is_empty() {
                anyhow::bail!("Sync path {} has no destination", sync_path.source);
            }
            let relative = file.strip_prefix(&sync_path.source).unwrap_or(file);
            let target = Path::new(dest).join(relative);
            if target.exists() {
                return Ok(false);
            }
            place_file(file, &target, mode).await?;
            debug!(src = %file_str, dest = %target.display(), "Raw file synced");
        }

        self.db
            .sync_history()
            .insert(file_str, &sync_path.source, dest)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreateSyncPath;
    use crate::media::RmtMode;
    use crate::services::transfer::TransferOutcome;
    use async_trait::async_trait;

    struct RejectAll;

    #[async_trait]
    impl FileTransfer for RejectAll {
        async fn transfer(&self, _request: TransferRequest) -> Result<TransferOutcome> {
            Ok(TransferOutcome {
                success: false,
                message: "nope".to_string(),
                transferred: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_raw_sync_copies_once() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        let dest = dir.path().join("out");
        std::fs::create_dir_all(src.join("Show")).unwrap();
        std::fs::write(src.join("Show/ep1.mkv"), b"x").unwrap();
        std::fs::write(src.join("Show/ep1.nfo"), b"x").unwrap();

        let db = Database::connect_in_memory().await.unwrap();
        db.sync_paths()
            .insert(CreateSyncPath {
                source: src.display().to_string(),
                dest: Some(dest.display().to_string()),
                unknown: None,
                mode: RmtMode::Copy,
                rename: false,
                enabled: true,
                note: None,
            })
            .await
            .unwrap();

        let service = SyncService::new(db, Arc::new(RejectAll));
        assert_eq!(service.reload().await.unwrap(), 1);

        let report = service.transfer_all().await.unwrap();
        assert_eq!(report.transferred, 1);
        assert!(dest.join("Show/ep1.mkv").exists());
        assert!(!dest.join("Show/ep1.nfo").exists());

        let report = service.transfer_all().await.unwrap();
        assert_eq!(report, SyncReport { transferred: 0, skipped: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_failed_rename_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mkv"), b"x").unwrap();

        let db = Database::connect_in_memory().await.unwrap();
        db.sync_paths()
            .insert(CreateSyncPath {
                source: dir.path().display().to_string(),
                dest: None,
                unknown: None,
                mode: RmtMode::Link,
                rename: true,
                enabled: true,
                note: None,
            })
            .await
            .unwrap();

        let service = SyncService::new(db, Arc::new(RejectAll));
        service.reload().await.unwrap();
        assert_eq!(service.transfer_all().await.unwrap().failed, 1);
    }
}
