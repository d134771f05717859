//! Transfer history repository
//!
//! One row per completed file transfer. Source and destination are stored as
//! separate directory and file-name columns.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use super::sqlite_helpers::{int, now_timestamp, text, timestamp_days_ago};
use crate::media::paths::{normpath, split_path};
use crate::media::{MediaType, RmtMode};

/// A completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferHistoryRecord {
    pub id: i64,
    pub mode: String,
    pub media_type: String,
    pub category: String,
    pub tmdbid: Option<i64>,
    pub title: String,
    pub year: String,
    pub season_episode: String,
    pub source: String,
    pub source_path: String,
    pub source_filename: String,
    pub dest: String,
    pub dest_path: String,
    pub dest_filename: String,
    pub date: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for TransferHistoryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            mode: text(row, "MODE")?,
            media_type: text(row, "TYPE")?,
            category: text(row, "CATEGORY")?,
            tmdbid: row.try_get("TMDBID")?,
            title: text(row, "TITLE")?,
            year: text(row, "YEAR")?,
            season_episode: text(row, "SEASON_EPISODE")?,
            source: text(row, "SOURCE")?,
            source_path: text(row, "SOURCE_PATH")?,
            source_filename: text(row, "SOURCE_FILENAME")?,
            dest: text(row, "DEST")?,
            dest_path: text(row, "DEST_PATH")?,
            dest_filename: text(row, "DEST_FILENAME")?,
            date: text(row, "DATE")?,
        })
    }
}

impl TransferHistoryRecord {
    /// Full source path
    pub fn source_full_path(&self) -> String {
        crate::media::paths::join(&self.source_path, &self.source_filename)
    }
}

/// Input for recording a transfer
#[derive(Debug, Clone)]
pub struct CreateTransferHistory {
    pub mode: RmtMode,
    /// Where the file came from (sync directory, manual, download client)
    pub source: String,
    pub in_path: String,
    /// Library root the file was placed under
    pub dest: String,
    pub out_path: String,
    pub media_type: MediaType,
    pub category: Option<String>,
    pub tmdbid: Option<i64>,
    pub title: String,
    pub year: Option<String>,
    pub season_episode: Option<String>,
}

/// Per-day transfer count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferDayCount {
    pub media_type: String,
    pub day: String,
    pub count: i64,
}

const SELECT_COLUMNS: &str = "SELECT ID, MODE, TYPE, CATEGORY, TMDBID, TITLE, YEAR, SEASON_EPISODE, SOURCE, SOURCE_PATH, SOURCE_FILENAME, DEST, DEST_PATH, DEST_FILENAME, DATE FROM TRANSFER_HISTORY";

pub struct TransferHistoryRepository {
    pool: SqlitePool,
}

impl TransferHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a transfer. Returns false when nothing was written.
    pub async fn insert(&self, record: CreateTransferHistory) -> Result<bool> {
        if record.title.is_empty() || record.in_path.is_empty() {
            return Ok(false);
        }
        let (source_path, source_filename) = split_path(&normpath(&record.in_path));
        let (dest_path, dest_filename) = if record.out_path.is_empty() {
            (String::new(), String::new())
        } else {
            split_path(&normpath(&record.out_path))
        };

        if self
            .exists(&source_path, &source_filename, &dest_path, &dest_filename)
            .await?
        {
            debug!(path = %record.in_path, "Transfer history already recorded");
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO TRANSFER_HISTORY
                (MODE, TYPE, CATEGORY, TMDBID, TITLE, YEAR, SEASON_EPISODE, SOURCE,
                 SOURCE_PATH, SOURCE_FILENAME, DEST, DEST_PATH, DEST_FILENAME, DATE)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.mode.key())
        .bind(record.media_type.as_str())
        .bind(&record.category)
        .bind(record.tmdbid)
        .bind(&record.title)
        .bind(&record.year)
        .bind(&record.season_episode)
        .bind(&record.source)
        .bind(&source_path)
        .bind(&source_filename)
        .bind(&record.dest)
        .bind(&dest_path)
        .bind(&dest_filename)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// Whether an identical transfer has been recorded. False when any part is empty.
    pub async fn exists(
        &self,
        source_path: &str,
        source_filename: &str,
        dest_path: &str,
        dest_filename: &str,
    ) -> Result<bool> {
        if source_path.is_empty()
            || source_filename.is_empty()
            || dest_path.is_empty()
            || dest_filename.is_empty()
        {
            return Ok(false);
        }
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(ID) FROM TRANSFER_HISTORY
            WHERE SOURCE_PATH = ? AND SOURCE_FILENAME = ? AND DEST_PATH = ? AND DEST_FILENAME = ?
            "#,
        )
        .bind(source_path)
        .bind(source_filename)
        .bind(dest_path)
        .bind(dest_filename)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Whether any transfer was recorded for this source file
    pub async fn exists_by_source_full_path(&self, path: &str) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let (dir, name) = split_path(&normpath(path));
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(ID) FROM TRANSFER_HISTORY WHERE SOURCE_PATH = ? AND SOURCE_FILENAME = ?",
        )
        .bind(&dir)
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Page through history, newest first. Returns (total, rows).
    pub async fn list(
        &self,
        search: Option<&str>,
        page: i64,
        rownum: i64,
    ) -> Result<(i64, Vec<TransferHistoryRecord>)> {
        let page = page.max(1);
        let rownum = rownum.max(1);
        // Page numbers come straight from the request
        let offset = (page - 1).saturating_mul(rownum);

        match search.filter(|s| !s.is_empty()) {
            Some(search) => {
                let pattern = format!("%{}%", search);
                let (total,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(ID) FROM TRANSFER_HISTORY WHERE SOURCE_FILENAME LIKE ? OR TITLE LIKE ?",
                )
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?;
                let rows = sqlx::query_as::<_, TransferHistoryRecord>(&format!(
                    "{} WHERE SOURCE_FILENAME LIKE ? OR TITLE LIKE ? ORDER BY DATE DESC LIMIT ? OFFSET ?",
                    SELECT_COLUMNS
                ))
                .bind(&pattern)
                .bind(&pattern)
                .bind(rownum)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                Ok((total, rows))
            }
            None => {
                let (total,): (i64,) = sqlx::query_as("SELECT COUNT(ID) FROM TRANSFER_HISTORY")
                    .fetch_one(&self.pool)
                    .await?;
                let rows = sqlx::query_as::<_, TransferHistoryRecord>(&format!(
                    "{} ORDER BY DATE DESC LIMIT ? OFFSET ?",
                    SELECT_COLUMNS
                ))
                .bind(rownum)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                Ok((total, rows))
            }
        }
    }

    /// Get one record by id
    pub async fn get(&self, id: i64) -> Result<Option<TransferHistoryRecord>> {
        let record = sqlx::query_as::<_, TransferHistoryRecord>(&format!(
            "{} WHERE ID = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Delete one record
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM TRANSFER_HISTORY WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transfers per (type, day) over the last `days` days
    pub async fn statistics(&self, days: i64) -> Result<Vec<TransferDayCount>> {
        let since = timestamp_days_ago(days);
        let rows = sqlx::query(
            r#"
            SELECT TYPE, SUBSTR(DATE, 1, 10) AS DAY, COUNT(ID) AS CNT
            FROM TRANSFER_HISTORY
            WHERE DATE > ?
            GROUP BY TYPE, SUBSTR(DATE, 1, 10)
            ORDER BY DAY
            "#,
        )
        .bind(&since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TransferDayCount {
                    media_type: text(row, "TYPE")?,
                    day: text(row, "DAY")?,
                    count: int(row, "CNT")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn record(in_path: &str, out_path: &str) -> CreateTransferHistory {
        CreateTransferHistory {
            mode: RmtMode::Link,
            source: "/downloads".to_string(),
            in_path: in_path.to_string(),
            dest: "/library/tv".to_string(),
            out_path: out_path.to_string(),
            media_type: MediaType::Tv,
            category: None,
            tmdbid: Some(1234),
            title: "Chicago Fire".to_string(),
            year: Some("2012".to_string()),
            season_episode: Some("S14E08".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_dedupes_and_lists() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.transfer_history();

        let r = record(
            "/downloads//Chicago.Fire.S14E08.mkv",
            "/library/tv/Chicago Fire (2012)/Season 14/Chicago Fire - S14E08.mkv",
        );
        assert!(repo.insert(r.clone()).await.unwrap());
        assert!(!repo.insert(r).await.unwrap());

        let (total, rows) = repo.list(None, 1, 30).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].source_path, "/downloads");
        assert_eq!(rows[0].source_filename, "Chicago.Fire.S14E08.mkv");
        assert_eq!(rows[0].mode, "link");

        let (total, _) = repo.list(Some("Chicago"), 1, 30).await.unwrap();
        assert_eq!(total, 1);
        let (total, _) = repo.list(Some("Nothing"), 1, 30).await.unwrap();
        assert_eq!(total, 0);

        assert!(
            repo.exists_by_source_full_path("/downloads/Chicago.Fire.S14E08.mkv")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_huge_page_is_empty() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.transfer_history();
        repo.insert(record("/downloads/a.mkv", "/library/a.mkv")).await.unwrap();

        let (total, rows) = repo.list(None, i64::MAX / 2, 30).await.unwrap();
        assert_eq!(total, 1);
        assert!(rows.is_empty());
        let (_, rows) = repo.list(Some("Chicago"), i64::MAX, i64::MAX).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_insert_without_identity_is_noop() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.transfer_history();
        let mut r = record("/downloads/a.mkv", "/library/a.mkv");
        r.title = String::new();
        assert!(!repo.insert(r).await.unwrap());
        assert!(!repo.exists("", "a.mkv", "/library", "a.mkv").await.unwrap());
    }

    #[tokio::test]
    async fn test_statistics_groups_by_day() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.transfer_history();
        repo.insert(record("/downloads/a.mkv", "/library/a.mkv")).await.unwrap();
        repo.insert(record("/downloads/b.mkv", "/library/b.mkv")).await.unwrap();

        let stats = repo.statistics(30).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].media_type, "tv");
        assert_eq!(stats[0].count, 2);
    }
}
