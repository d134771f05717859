//! Directory sync path configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{bool_to_int, int, int_to_bool, text};
use crate::media::RmtMode;
use crate::media::paths::normpath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPathRecord {
    pub id: i64,
    pub source: String,
    pub dest: String,
    pub unknown: String,
    pub mode: String,
    pub rename: bool,
    pub enabled: bool,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SyncPathRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            source: text(row, "SOURCE")?,
            dest: text(row, "DEST")?,
            unknown: text(row, "UNKNOWN")?,
            mode: text(row, "MODE")?,
            rename: int_to_bool(int(row, "RENAME")? as i32),
            enabled: int_to_bool(int(row, "ENABLED")? as i32),
            note: text(row, "NOTE")?,
        })
    }
}

impl SyncPathRecord {
    /// Parsed mode, defaulting to copy for unrecognized values
    pub fn rmt_mode(&self) -> RmtMode {
        RmtMode::parse(&self.mode).unwrap_or(RmtMode::Copy)
    }
}

#[derive(Debug, Clone)]
pub struct CreateSyncPath {
    pub source: String,
    pub dest: Option<String>,
    pub unknown: Option<String>,
    pub mode: RmtMode,
    pub rename: bool,
    pub enabled: bool,
    pub note: Option<String>,
}

const SELECT_COLUMNS: &str =
    "SELECT ID, SOURCE, DEST, UNKNOWN, MODE, RENAME, ENABLED, NOTE FROM CONFIG_SYNC_PATHS";

pub struct SyncPathRepository {
    pool: SqlitePool,
}

impl SyncPathRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, path: CreateSyncPath) -> Result<i64> {
        insert_row(&self.pool, &path).await
    }

    /// Store a sync path in one transaction: the row being edited is
    /// removed and, for an enabled path, every row sharing its source is
    /// disabled first
    pub async fn save(&self, replacing: Option<i64>, path: CreateSyncPath) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        if let Some(id) = replacing {
            sqlx::query("DELETE FROM CONFIG_SYNC_PATHS WHERE ID = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        if path.enabled {
            sqlx::query("UPDATE CONFIG_SYNC_PATHS SET ENABLED = 0 WHERE SOURCE = ?")
                .bind(normpath(&path.source))
                .execute(&mut *tx)
                .await?;
        }
        let id = insert_row(&mut *tx, &path).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM CONFIG_SYNC_PATHS WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self) -> Result<Vec<SyncPathRecord>> {
        let rows = sqlx::query_as::<_, SyncPathRecord>(&format!("{} ORDER BY ID", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> Result<Option<SyncPathRecord>> {
        let row = sqlx::query_as::<_, SyncPathRecord>(&format!("{} WHERE ID = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn set_rename(&self, id: i64, rename: bool) -> Result<()> {
        sqlx::query("UPDATE CONFIG_SYNC_PATHS SET RENAME = ? WHERE ID = ?")
            .bind(bool_to_int(rename))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE CONFIG_SYNC_PATHS SET ENABLED = ? WHERE ID = ?")
            .bind(bool_to_int(enabled))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set the enabled flag on every row sharing a source
    pub async fn set_enabled_by_source(&self, source: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE CONFIG_SYNC_PATHS SET ENABLED = ? WHERE SOURCE = ?")
            .bind(bool_to_int(enabled))
            .bind(normpath(source))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Enable one row and disable its siblings with the same source
    pub async fn enable_exclusive(&self, id: i64) -> Result<bool> {
        let Some(row) = self.get(id).await? else {
            return Ok(false);
        };
        self.set_enabled_by_source(&row.source, false).await?;
        self.set_enabled(id, true).await?;
        Ok(true)
    }
}

async fn insert_row<'e, E>(executor: E, path: &CreateSyncPath) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO CONFIG_SYNC_PATHS (SOURCE, DEST, UNKNOWN, MODE, RENAME, ENABLED, NOTE)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(normpath(&path.source))
    .bind(path.dest.as_deref().filter(|d| !d.is_empty()).map(normpath))
    .bind(path.unknown.as_deref().filter(|d| !d.is_empty()).map(normpath))
    .bind(path.mode.key())
    .bind(bool_to_int(path.rename))
    .bind(bool_to_int(path.enabled))
    .bind(&path.note)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn path(source: &str, dest: &str, enabled: bool) -> CreateSyncPath {
        CreateSyncPath {
            source: source.to_string(),
            dest: Some(dest.to_string()),
            unknown: None,
            mode: RmtMode::Link,
            rename: true,
            enabled,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_enable_disables_siblings() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.sync_paths();

        let a = repo.insert(path("/downloads", "/library/a", true)).await.unwrap();
        let b = repo.insert(path("/downloads/", "/library/b", false)).await.unwrap();
        let other = repo.insert(path("/inbox", "/library/c", true)).await.unwrap();

        assert!(repo.enable_exclusive(b).await.unwrap());

        let rows = repo.list().await.unwrap();
        let enabled: Vec<i64> = rows.iter().filter(|r| r.enabled).map(|r| r.id).collect();
        assert_eq!(enabled, vec![b, other]);
        assert!(!repo.get(a).await.unwrap().unwrap().enabled);
        assert_eq!(repo.get(b).await.unwrap().unwrap().source, "/downloads");
    }

    #[tokio::test]
    async fn test_set_rename() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.sync_paths();
        let id = repo.insert(path("/downloads", "/library", true)).await.unwrap();
        repo.set_rename(id, false).await.unwrap();
        let row = repo.get(id).await.unwrap().unwrap();
        assert!(!row.rename);
        assert_eq!(row.rmt_mode(), RmtMode::Link);
    }

    #[tokio::test]
    async fn test_save_replaces_row_and_disables_siblings() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.sync_paths();
        let old = repo.insert(path("/downloads", "/library/a", true)).await.unwrap();
        let sibling = repo.insert(path("/downloads", "/library/b", true)).await.unwrap();

        let new = repo.save(Some(old), path("/downloads", "/library/c", true)).await.unwrap();

        let rows = repo.list().await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![sibling, new]);
        assert!(!repo.get(sibling).await.unwrap().unwrap().enabled);
        assert!(repo.get(new).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_edited_row() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.sync_paths();
        let old = repo.insert(path("/downloads", "/library/a", true)).await.unwrap();

        // The insert is aborted after the delete already ran
        sqlx::query(
            "CREATE TRIGGER reject_inbox BEFORE INSERT ON CONFIG_SYNC_PATHS \
             WHEN NEW.SOURCE = '/inbox' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();
        assert!(repo.save(Some(old), path("/inbox", "/library/b", true)).await.is_err());

        let row = repo.get(old).await.unwrap().unwrap();
        assert!(row.enabled);
        assert_eq!(row.dest, "/library/a");
    }
}
