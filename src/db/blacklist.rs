//! Transfer blacklist and sync history
//!
//! Both tables gate the directory sync: blacklisted paths are never picked
//! up, and a (path, dest) pair in the sync history has already been handled.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::media::paths::normpath;

pub struct BlacklistRepository {
    pool: SqlitePool,
}

impl BlacklistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn contains(&self, path: &str) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(ID) FROM TRANSFER_BLACKLIST WHERE PATH = ?")
                .bind(normpath(path))
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn insert(&self, path: &str) -> Result<bool> {
        if path.is_empty() || self.contains(path).await? {
            return Ok(false);
        }
        sqlx::query("INSERT INTO TRANSFER_BLACKLIST (PATH) VALUES (?)")
            .bind(normpath(path))
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Empty the blacklist and the sync history
    pub async fn truncate(&self) -> Result<()> {
        sqlx::query("DELETE FROM TRANSFER_BLACKLIST")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM SYNC_HISTORY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct SyncHistoryRepository {
    pool: SqlitePool,
}

impl SyncHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn contains(&self, path: &str, dest: &str) -> Result<bool> {
        if path.is_empty() || dest.is_empty() {
            return Ok(false);
        }
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(ID) FROM SYNC_HISTORY WHERE PATH = ? AND DEST = ?")
                .bind(normpath(path))
                .bind(normpath(dest))
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn insert(&self, path: &str, src: &str, dest: &str) -> Result<bool> {
        if path.is_empty() || dest.is_empty() || self.contains(path, dest).await? {
            return Ok(false);
        }
        sqlx::query("INSERT INTO SYNC_HISTORY (PATH, SRC, DEST) VALUES (?, ?, ?)")
            .bind(normpath(path))
            .bind(normpath(src))
            .bind(normpath(dest))
            .execute(&self.pool)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_truncate_clears_both_tables() {
        let db = Database::connect_in_memory().await.unwrap();
        let blacklist = db.blacklist();
        let history = db.sync_history();

        assert!(blacklist.insert("/downloads/bad.mkv").await.unwrap());
        assert!(!blacklist.insert("/downloads//bad.mkv").await.unwrap());
        assert!(history.insert("/downloads/a.mkv", "/downloads", "/library").await.unwrap());
        assert!(!history.insert("/downloads/a.mkv", "/downloads", "").await.unwrap());

        blacklist.truncate().await.unwrap();
        assert!(!blacklist.contains("/downloads/bad.mkv").await.unwrap());
        assert!(!history.contains("/downloads/a.mkv", "/library").await.unwrap());
    }
}
