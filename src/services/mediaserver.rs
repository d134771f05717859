//! Media server seam and library statistics

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Database, MediaSyncStatisticsRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LibraryCounts {
    pub movie: i64,
    pub tv: i64,
    pub episode: i64,
    pub music: i64,
}

impl LibraryCounts {
    pub fn total(&self) -> i64 {
        self.movie + self.tv
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayActivity {
    pub kind: String,
    pub event: String,
    pub date: String,
}

#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Server name used as the statistics key
    fn name(&self) -> &str;

    /// Scan the server library, `None` when nothing could be read
    async fn sync_library(&self) -> Result<Option<LibraryCounts>>;

    async fn media_counts(&self) -> Result<LibraryCounts>;

    async fn user_count(&self) -> Result<i64>;

    async fn activity_log(&self, limit: usize) -> Result<Vec<PlayActivity>>;

    async fn status(&self) -> bool;
}

/// Used when `media.media_server` is not set
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredMediaServer;

#[async_trait]
impl MediaServer for UnconfiguredMediaServer {
    fn name(&self) -> &str {
        "none"
    }

    async fn sync_library(&self) -> Result<Option<LibraryCounts>> {
        Ok(None)
    }

    async fn media_counts(&self) -> Result<LibraryCounts> {
        Ok(LibraryCounts::default())
    }

    async fn user_count(&self) -> Result<i64> {
        Ok(0)
    }

    async fn activity_log(&self, _limit: usize) -> Result<Vec<PlayActivity>> {
        Ok(Vec::new())
    }

    async fn status(&self) -> bool {
        false
    }
}

/// Runs library syncs and keeps their statistics
#[derive(Clone)]
pub struct MediaSyncService {
    db: Database,
    server: Arc<dyn MediaServer>,
}

impl MediaSyncService {
    pub fn new(db: Database, server: Arc<dyn MediaServer>) -> Self {
        Self { db, server }
    }

    pub fn server(&self) -> &Arc<dyn MediaServer> {
        &self.server
    }

    /// Sync the server library and persist the counts. Returns false when
    /// the server reported nothing.
    pub async fn sync(&self) -> Result<bool> {
        let Some(counts) = self.server.sync_library().await? else {
            warn!(server = self.server.name(), "Media server returned no library data");
            return Ok(false);
        };
        self.db
            .media_sync()
            .save_statistics(self.server.name(), counts.total(), counts.movie, counts.tv)
            .await?;
        info!(
            server = self.server.name(),
            movies = counts.movie,
            tv = counts.tv,
            "Media server library synced"
        );
        Ok(true)
    }

    pub async fn status(&self) -> Result<Option<MediaSyncStatisticsRecord>> {
        self.db.media_sync().latest_statistics(self.server.name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedServer;

    #[async_trait]
    impl MediaServer for FixedServer {
        fn name(&self) -> &str {
            "emby"
        }

        async fn sync_library(&self) -> Result<Option<LibraryCounts>> {
            Ok(Some(LibraryCounts {
                movie: 12,
                tv: 3,
                ..Default::default()
            }))
        }

        async fn media_counts(&self) -> Result<LibraryCounts> {
            Ok(LibraryCounts::default())
        }

        async fn user_count(&self) -> Result<i64> {
            Ok(1)
        }

        async fn activity_log(&self, _limit: usize) -> Result<Vec<PlayActivity>> {
            Ok(Vec::new())
        }

        async fn status(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_sync_persists_statistics() {
        let db = Database::connect_in_memory().await.unwrap();
        let service = MediaSyncService::new(db, Arc::new(FixedServer));
        assert!(service.status().await.unwrap().is_none());
        assert!(service.sync().await.unwrap());

        let stats = service.status().await.unwrap().unwrap();
        assert_eq!((stats.total_count, stats.movie_count, stats.tv_count), (15, 12, 3));
    }

    #[tokio::test]
    async fn test_unconfigured_server_writes_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let service = MediaSyncService::new(db, Arc::new(UnconfiguredMediaServer));
        assert!(!service.sync().await.unwrap());
        assert!(service.status().await.unwrap().is_none());
    }
}
