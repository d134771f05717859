//! Database connection and repositories
//!
//! One repository per table family. Repositories are cheap to construct and
//! share the pool held by [`Database`].

pub mod blacklist;
pub mod custom_words;
pub mod download_settings;
pub mod filter_rules;
pub mod media_sync;
pub mod message_clients;
pub mod rss;
pub mod schema;
pub mod search_results;
pub mod sqlite_helpers;
pub mod sync_paths;
pub mod transfer_history;
pub mod transfer_unknown;
pub mod users;

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;

pub use blacklist::{BlacklistRepository, SyncHistoryRepository};
pub use custom_words::{
    CreateCustomWord, CreateCustomWordGroup, CustomWordGroupRecord, CustomWordRecord,
    CustomWordRepository, WordKind,
};
pub use download_settings::{
    CreateTorrentRemoveTask, DownloadSettingRecord, DownloadSettingRepository,
    SaveDownloadSetting, TorrentRemoveTaskRecord, TorrentRemoveTaskRepository,
};
pub use filter_rules::{FilterGroupRecord, FilterRuleRecord, FilterRuleRepository, SaveFilterRule};
pub use media_sync::{MediaSyncRepository, MediaSyncStatisticsRecord};
pub use message_clients::{CreateMessageClient, MessageClientRecord, MessageClientRepository};
pub use rss::RssRepository;
pub use search_results::{SearchResultRecord, SearchResultRepository};
pub use sync_paths::{CreateSyncPath, SyncPathRecord, SyncPathRepository};
pub use transfer_history::{
    CreateTransferHistory, TransferDayCount, TransferHistoryRecord, TransferHistoryRepository,
};
pub use transfer_unknown::{TransferUnknownRecord, TransferUnknownRepository};
pub use users::{SystemDictRepository, UserRecord, UsersRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    }

    /// Open (creating if needed) the database file and make sure every table exists
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {}", url))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", url))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Single-connection in-memory database with the schema applied
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create missing tables
    pub async fn init_schema(&self) -> Result<()> {
        let result = schema::init_schema(&self.pool).await;
        for err in &result.errors {
            warn!(error = %err, "Schema init error");
        }
        if !result.errors.is_empty() {
            bail!("Schema initialization failed: {}", result.errors.join("; "));
        }
        Ok(())
    }

    /// Drop one of the known tables
    pub async fn drop_table(&self, name: &str) -> Result<()> {
        if !schema::is_known_table(name) {
            bail!("Refusing to drop unknown table {}", name);
        }
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", name))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn transfer_history(&self) -> TransferHistoryRepository {
        TransferHistoryRepository::new(self.pool.clone())
    }

    pub fn transfer_unknown(&self) -> TransferUnknownRepository {
        TransferUnknownRepository::new(self.pool.clone())
    }

    pub fn blacklist(&self) -> BlacklistRepository {
        BlacklistRepository::new(self.pool.clone())
    }

    pub fn sync_history(&self) -> SyncHistoryRepository {
        SyncHistoryRepository::new(self.pool.clone())
    }

    /// Get a sync path repository
    pub fn sync_paths(&self) -> SyncPathRepository {
        SyncPathRepository::new(self.pool.clone())
    }

    /// Get a custom word repository
    pub fn custom_words(&self) -> CustomWordRepository {
        CustomWordRepository::new(self.pool.clone())
    }

    /// Get a filter rule repository
    pub fn filter_rules(&self) -> FilterRuleRepository {
        FilterRuleRepository::new(self.pool.clone())
    }

    pub fn message_clients(&self) -> MessageClientRepository {
        MessageClientRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    pub fn system_dict(&self) -> SystemDictRepository {
        SystemDictRepository::new(self.pool.clone())
    }

    pub fn search_results(&self) -> SearchResultRepository {
        SearchResultRepository::new(self.pool.clone())
    }

    /// Get an RSS repository
    pub fn rss(&self) -> RssRepository {
        RssRepository::new(self.pool.clone())
    }

    pub fn download_settings(&self) -> DownloadSettingRepository {
        DownloadSettingRepository::new(self.pool.clone())
    }

    pub fn torrent_remove_tasks(&self) -> TorrentRemoveTaskRepository {
        TorrentRemoveTaskRepository::new(self.pool.clone())
    }

    pub fn media_sync(&self) -> MediaSyncRepository {
        MediaSyncRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drop_table_rejects_unknown_names() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(db.drop_table("sqlite_master; --").await.is_err());
        db.drop_table("SCHEMA_VERSION").await.unwrap();
        assert!(!schema::table_exists(db.pool(), "SCHEMA_VERSION").await.unwrap());
    }
}
