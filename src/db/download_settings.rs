//! Download client presets and automatic torrent-removal tasks

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use super::sqlite_helpers::{bool_to_int, int, int_to_bool, text, to_json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettingRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub tags: String,
    pub content_layout: i64,
    pub is_paused: i64,
    pub upload_limit: i64,
    pub download_limit: i64,
    /// Share ratio times 100
    pub ratio_limit: i64,
    pub seeding_time_limit: i64,
    pub downloader: String,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for DownloadSettingRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "NAME")?,
            category: text(row, "CATEGORY")?,
            tags: text(row, "TAGS")?,
            content_layout: int(row, "CONTENT_LAYOUT")?,
            is_paused: int(row, "IS_PAUSED")?,
            upload_limit: int(row, "UPLOAD_LIMIT")?,
            download_limit: int(row, "DOWNLOAD_LIMIT")?,
            ratio_limit: int(row, "RATIO_LIMIT")?,
            seeding_time_limit: int(row, "SEEDING_TIME_LIMIT")?,
            downloader: text(row, "DOWNLOADER")?,
            note: text(row, "NOTE")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveDownloadSetting {
    pub id: Option<i64>,
    pub name: String,
    pub category: String,
    pub tags: String,
    pub content_layout: i64,
    pub is_paused: i64,
    pub upload_limit: f64,
    pub download_limit: f64,
    pub ratio_limit: f64,
    pub seeding_time_limit: f64,
    pub downloader: String,
}

/// Stored integer form of a share ratio: round to two places, times 100
pub fn ratio_to_stored(ratio: f64) -> i64 {
    ((ratio * 100.0).round() / 100.0 * 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentRemoveTaskRecord {
    pub id: i64,
    pub name: String,
    pub action: i64,
    pub interval: i64,
    pub enabled: bool,
    pub samedata: bool,
    pub onlynastool: bool,
    pub downloader: String,
    pub config: Value,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for TorrentRemoveTaskRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "NAME")?,
            action: int(row, "ACTION")?,
            interval: int(row, "INTERVAL")?,
            enabled: int_to_bool(int(row, "ENABLED")? as i32),
            samedata: int_to_bool(int(row, "SAMEDATA")? as i32),
            onlynastool: int_to_bool(int(row, "ONLYNASTOOL")? as i32),
            downloader: text(row, "DOWNLOADER")?,
            config: serde_json::from_str(&text(row, "CONFIG")?).unwrap_or(Value::Null),
            note: text(row, "NOTE")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTorrentRemoveTask {
    pub name: String,
    pub action: i64,
    pub interval: i64,
    pub enabled: bool,
    pub samedata: bool,
    pub onlynastool: bool,
    pub downloader: String,
    pub config: Value,
    pub note: Option<String>,
}

const SETTING_COLUMNS: &str = "SELECT ID, NAME, CATEGORY, TAGS, CONTENT_LAYOUT, IS_PAUSED, UPLOAD_LIMIT, DOWNLOAD_LIMIT, RATIO_LIMIT, SEEDING_TIME_LIMIT, DOWNLOADER, NOTE FROM DOWNLOAD_SETTING";
const TASK_COLUMNS: &str = "SELECT ID, NAME, ACTION, INTERVAL, ENABLED, SAMEDATA, ONLYNASTOOL, DOWNLOADER, CONFIG, NOTE FROM TORRENT_REMOVE_TASK";

pub struct DownloadSettingRepository {
    pool: SqlitePool,
}

impl DownloadSettingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, id: Option<i64>) -> Result<Vec<DownloadSettingRecord>> {
        let rows = match id {
            Some(id) => {
                sqlx::query_as::<_, DownloadSettingRecord>(&format!("{} WHERE ID = ?", SETTING_COLUMNS))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, DownloadSettingRecord>(&format!("{} ORDER BY ID", SETTING_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM DOWNLOAD_SETTING WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update when an id is given, insert otherwise
    pub async fn save(&self, setting: SaveDownloadSetting) -> Result<i64> {
        let ratio = ratio_to_stored(setting.ratio_limit);
        match setting.id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE DOWNLOAD_SETTING
                    SET NAME = ?, CATEGORY = ?, TAGS = ?, CONTENT_LAYOUT = ?, IS_PAUSED = ?, UPLOAD_LIMIT = ?,
                        DOWNLOAD_LIMIT = ?, RATIO_LIMIT = ?, SEEDING_TIME_LIMIT = ?, DOWNLOADER = ?
                    WHERE ID = ?
                    "#,
                )
                .bind(&setting.name)
                .bind(&setting.category)
                .bind(&setting.tags)
                .bind(setting.content_layout)
                .bind(setting.is_paused)
                .bind(setting.upload_limit as i64)
                .bind(setting.download_limit as i64)
                .bind(ratio)
                .bind(setting.seeding_time_limit as i64)
                .bind(&setting.downloader)
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok(id)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO DOWNLOAD_SETTING
                        (NAME, CATEGORY, TAGS, CONTENT_LAYOUT, IS_PAUSED, UPLOAD_LIMIT, DOWNLOAD_LIMIT,
                         RATIO_LIMIT, SEEDING_TIME_LIMIT, DOWNLOADER)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&setting.name)
                .bind(&setting.category)
                .bind(&setting.tags)
                .bind(setting.content_layout)
                .bind(setting.is_paused)
                .bind(setting.upload_limit as i64)
                .bind(setting.download_limit as i64)
                .bind(ratio)
                .bind(setting.seeding_time_limit as i64)
                .bind(&setting.downloader)
                .execute(&self.pool)
                .await?;
                Ok(result.last_insert_rowid())
            }
        }
    }
}

pub struct TorrentRemoveTaskRepository {
    pool: SqlitePool,
}

impl TorrentRemoveTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, id: Option<i64>) -> Result<Vec<TorrentRemoveTaskRecord>> {
        let rows = match id {
            Some(id) => {
                sqlx::query_as::<_, TorrentRemoveTaskRecord>(&format!("{} WHERE ID = ?", TASK_COLUMNS))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, TorrentRemoveTaskRecord>(&format!("{} ORDER BY NAME", TASK_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM TORRENT_REMOVE_TASK WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert(&self, task: CreateTorrentRemoveTask) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO TORRENT_REMOVE_TASK
                (NAME, ACTION, INTERVAL, ENABLED, SAMEDATA, ONLYNASTOOL, DOWNLOADER, CONFIG, NOTE)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.name)
        .bind(task.action)
        .bind(task.interval)
        .bind(bool_to_int(task.enabled))
        .bind(bool_to_int(task.samedata))
        .bind(bool_to_int(task.onlynastool))
        .bind(&task.downloader)
        .bind(to_json(&task.config))
        .bind(&task.note)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_ratio_to_stored() {
        assert_eq!(ratio_to_stored(1.5), 150);
        assert_eq!(ratio_to_stored(1.456), 146);
        assert_eq!(ratio_to_stored(0.0), 0);
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.download_settings();
        let id = repo
            .save(SaveDownloadSetting {
                name: "default".to_string(),
                ratio_limit: 1.5,
                ..Default::default()
            })
            .await
            .unwrap();
        repo.save(SaveDownloadSetting {
            id: Some(id),
            name: "renamed".to_string(),
            ratio_limit: 2.0,
            ..Default::default()
        })
        .await
        .unwrap();

        let rows = repo.list(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "renamed");
        assert_eq!(rows[0].ratio_limit, 200);
    }

    #[tokio::test]
    async fn test_remove_tasks_sorted_by_name() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.torrent_remove_tasks();
        for name in ["zeta", "alpha"] {
            repo.insert(CreateTorrentRemoveTask {
                name: name.to_string(),
                enabled: true,
                config: serde_json::json!({"ratio": 2}),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        let rows = repo.list(None).await.unwrap();
        assert_eq!(rows[0].name, "alpha");
        assert_eq!(rows[0].config["ratio"], 2);
    }
}
