//! Unidentified-file repository
//!
//! Rows are created when identification fails and flipped to `Y` once the
//! file is transferred.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use super::sqlite_helpers::text;
use super::transfer_history::TransferHistoryRepository;
use crate::media::RmtMode;
use crate::media::paths::normpath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferUnknownRecord {
    pub id: i64,
    pub path: String,
    pub dest: String,
    pub mode: String,
    pub state: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for TransferUnknownRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            path: text(row, "PATH")?,
            dest: text(row, "DEST")?,
            mode: text(row, "MODE")?,
            state: text(row, "STATE")?,
        })
    }
}

impl TransferUnknownRecord {
    pub fn is_processed(&self) -> bool {
        self.state == "Y"
    }
}

pub struct TransferUnknownRepository {
    pool: SqlitePool,
}

impl TransferUnknownRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rows still waiting for identification
    pub async fn list_pending(&self) -> Result<Vec<TransferUnknownRecord>> {
        let rows = sqlx::query_as::<_, TransferUnknownRecord>(
            "SELECT ID, PATH, DEST, MODE, STATE FROM TRANSFER_UNKNOWN WHERE STATE = 'N' ORDER BY ID DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> Result<Option<TransferUnknownRecord>> {
        let row = sqlx::query_as::<_, TransferUnknownRecord>(
            "SELECT ID, PATH, DEST, MODE, STATE FROM TRANSFER_UNKNOWN WHERE ID = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_by_path(&self, path: &str) -> Result<Vec<TransferUnknownRecord>> {
        let rows = sqlx::query_as::<_, TransferUnknownRecord>(
            "SELECT ID, PATH, DEST, MODE, STATE FROM TRANSFER_UNKNOWN WHERE PATH = ?",
        )
        .bind(normpath(path))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(ID) FROM TRANSFER_UNKNOWN WHERE PATH = ?")
                .bind(normpath(path))
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Flip every row for this path to processed
    pub async fn mark_processed(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE TRANSFER_UNKNOWN SET STATE = 'Y' WHERE PATH = ?")
            .bind(normpath(path))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM TRANSFER_UNKNOWN WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Decide whether a failed identification should (re)create an unknown row.
    ///
    /// - no rows for the path: insert
    /// - any row still pending: report true (the caller's insert is then a no-op)
    /// - all processed and a history row exists for the path: false
    /// - all processed without history: stale rows are removed, then true
    pub async fn needs_insert(&self, path: &str) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let path = normpath(path);
        let rows = self.list_by_path(&path).await?;
        if rows.is_empty() {
            return Ok(true);
        }
        if rows.iter().any(|r| !r.is_processed()) {
            return Ok(true);
        }

        let history = TransferHistoryRepository::new(self.pool.clone());
        if history.exists_by_source_full_path(&path).await? {
            return Ok(false);
        }

        debug!(path = %path, "Removing stale processed unknown rows");
        sqlx::query("DELETE FROM TRANSFER_UNKNOWN WHERE PATH = ?")
            .bind(&path)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Record an unidentified file. No-op when a row for the path exists.
    pub async fn insert(&self, path: &str, dest: Option<&str>, mode: RmtMode) -> Result<bool> {
        if path.is_empty() || self.exists(path).await? {
            return Ok(false);
        }
        let dest = dest.map(normpath).unwrap_or_default();
        sqlx::query("INSERT INTO TRANSFER_UNKNOWN (PATH, DEST, MODE, STATE) VALUES (?, ?, ?, 'N')")
            .bind(normpath(path))
            .bind(dest)
            .bind(mode.key())
            .execute(&self.pool)
            .await?;
        Ok(true)
    }
}
