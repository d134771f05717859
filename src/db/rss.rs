//! RSS bookkeeping: seen torrents, subscription history, user RSS tasks and parsers

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;

use super::sqlite_helpers::{int, now_timestamp, text, to_json};

// ============================================================================
// Records
// ============================================================================

/// Minimal identity of a processed RSS item
#[derive(Debug, Clone, Default)]
pub struct CreateRssTorrent {
    pub torrent_name: String,
    pub enclosure: String,
    pub media_type: String,
    pub title: String,
    pub year: String,
    pub season: String,
    pub episode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssHistoryRecord {
    pub id: i64,
    pub kind: String,
    pub rssid: String,
    pub name: String,
    pub year: String,
    pub tmdbid: String,
    pub season: String,
    pub image: String,
    pub desc: String,
    pub total: i64,
    pub start: i64,
    pub finish_time: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for RssHistoryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            kind: text(row, "TYPE")?,
            rssid: text(row, "RSSID")?,
            name: text(row, "NAME")?,
            year: text(row, "YEAR")?,
            tmdbid: text(row, "TMDBID")?,
            season: text(row, "SEASON")?,
            image: text(row, "IMAGE")?,
            desc: text(row, "DESC")?,
            total: int(row, "TOTAL")?,
            start: int(row, "START")?,
            finish_time: text(row, "FINISH_TIME")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateRssHistory {
    pub rssid: String,
    pub kind: String,
    pub name: String,
    pub year: String,
    pub tmdbid: String,
    pub image: String,
    pub desc: String,
    pub season: Option<String>,
    pub total: Option<i64>,
    pub start: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRssTaskRecord {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub parser: String,
    pub interval: String,
    pub uses: String,
    pub include: String,
    pub exclude: String,
    pub filter: String,
    pub update_time: String,
    pub process_count: i64,
    pub state: String,
    pub save_path: String,
    pub download_setting: String,
    pub recognization: String,
    pub over_edition: i64,
    pub sites: Value,
    pub filter_args: Value,
    pub mediainfos: Vec<Value>,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for UserRssTaskRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let json_col = |col: &str| -> sqlx::Result<Value> {
            Ok(serde_json::from_str(&text(row, col)?).unwrap_or(Value::Null))
        };
        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "NAME")?,
            address: text(row, "ADDRESS")?,
            parser: text(row, "PARSER")?,
            interval: text(row, "INTERVAL")?,
            uses: text(row, "USES")?,
            include: text(row, "INCLUDE")?,
            exclude: text(row, "EXCLUDE")?,
            filter: text(row, "FILTER")?,
            update_time: text(row, "UPDATE_TIME")?,
            process_count: int(row, "PROCESS_COUNT")?,
            state: text(row, "STATE")?,
            save_path: text(row, "SAVE_PATH")?,
            download_setting: text(row, "DOWNLOAD_SETTING")?,
            recognization: text(row, "RECOGNIZATION")?,
            over_edition: int(row, "OVER_EDITION")?,
            sites: json_col("SITES")?,
            filter_args: json_col("FILTER_ARGS")?,
            mediainfos: super::sqlite_helpers::json_to_vec(&text(row, "MEDIAINFOS")?),
            note: text(row, "NOTE")?,
        })
    }
}

/// Fields for creating or updating a user RSS task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveUserRssTask {
    pub id: Option<i64>,
    pub name: String,
    pub address: String,
    pub parser: String,
    pub interval: String,
    pub uses: String,
    pub include: String,
    pub exclude: String,
    pub filter_rule: String,
    pub state: String,
    pub save_path: String,
    pub download_setting: String,
    pub recognization: String,
    pub over_edition: i64,
    pub sites: Value,
    pub filter_args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssParserRecord {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub format: String,
    pub params: String,
    pub note: String,
    pub sysdef: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for RssParserRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "NAME")?,
            kind: text(row, "TYPE")?,
            format: text(row, "FORMAT")?,
            params: text(row, "PARAMS")?,
            note: text(row, "NOTE")?,
            sysdef: text(row, "SYSDEF")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveRssParser {
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub params: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRssTaskHistoryRecord {
    pub id: i64,
    pub task_id: String,
    pub title: String,
    pub downloader: String,
    pub date: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for UserRssTaskHistoryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            task_id: text(row, "TASK_ID")?,
            title: text(row, "TITLE")?,
            downloader: text(row, "DOWNLOADER")?,
            date: text(row, "DATE")?,
        })
    }
}

const HISTORY_COLUMNS: &str = r#"SELECT ID, TYPE, RSSID, NAME, YEAR, TMDBID, SEASON, IMAGE, "DESC", TOTAL, START, FINISH_TIME FROM RSS_HISTORY"#;
const TASK_COLUMNS: &str = "SELECT ID, NAME, ADDRESS, PARSER, INTERVAL, USES, INCLUDE, EXCLUDE, FILTER, UPDATE_TIME, PROCESS_COUNT, STATE, SAVE_PATH, DOWNLOAD_SETTING, RECOGNIZATION, OVER_EDITION, SITES, FILTER_ARGS, MEDIAINFOS, NOTE FROM CONFIG_USER_RSS";
const PARSER_COLUMNS: &str =
    "SELECT ID, NAME, TYPE, FORMAT, PARAMS, NOTE, SYSDEF FROM CONFIG_RSS_PARSER";

// ============================================================================
// Repository
// ============================================================================

pub struct RssRepository {
    pool: SqlitePool,
}

impl RssRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Seen torrents
    // ========================================================================

    /// Whether an RSS item was already handled. Items without a link count as seen.
    pub async fn is_torrent_seen(&self, enclosure: &str) -> Result<bool> {
        if enclosure.is_empty() {
            return Ok(true);
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(ID) FROM RSS_TORRENTS WHERE ENCLOSURE = ?")
            .bind(enclosure)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Seen check for user RSS tasks: by link when present, else by name
    pub async fn is_userrss_finished(&self, torrent_name: &str, enclosure: &str) -> Result<bool> {
        if torrent_name.is_empty() && enclosure.is_empty() {
            return Ok(true);
        }
        let (count,): (i64,) = if !enclosure.is_empty() {
            sqlx::query_as("SELECT COUNT(ID) FROM RSS_TORRENTS WHERE ENCLOSURE = ?")
                .bind(enclosure)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT COUNT(ID) FROM RSS_TORRENTS WHERE TORRENT_NAME = ?")
                .bind(torrent_name)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count > 0)
    }

    pub async fn insert_torrent(&self, torrent: CreateRssTorrent) -> Result<()> {
        sqlx::query(
            "INSERT INTO RSS_TORRENTS (TORRENT_NAME, ENCLOSURE, TYPE, TITLE, YEAR, SEASON, EPISODE) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&torrent.torrent_name)
        .bind(&torrent.enclosure)
        .bind(&torrent.media_type)
        .bind(&torrent.title)
        .bind(&torrent.year)
        .bind(&torrent.season)
        .bind(&torrent.episode)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_simple(&self, title: &str, enclosure: &str) -> Result<()> {
        sqlx::query("INSERT INTO RSS_TORRENTS (TORRENT_NAME, ENCLOSURE) VALUES (?, ?)")
            .bind(title)
            .bind(enclosure)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_simple(&self, title: &str, enclosure: Option<&str>) -> Result<()> {
        match enclosure.filter(|e| !e.is_empty()) {
            Some(enclosure) => {
                sqlx::query("DELETE FROM RSS_TORRENTS WHERE TORRENT_NAME = ? AND ENCLOSURE = ?")
                    .bind(title)
                    .bind(enclosure)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM RSS_TORRENTS WHERE TORRENT_NAME = ?")
                    .bind(title)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Subscription history
    // ========================================================================

    /// One entry by id, entries of a type, or everything; newest first
    pub async fn list_history(&self, kind: Option<&str>, id: Option<i64>) -> Result<Vec<RssHistoryRecord>> {
        let rows = if let Some(id) = id {
            sqlx::query_as::<_, RssHistoryRecord>(&format!("{} WHERE ID = ?", HISTORY_COLUMNS))
                .bind(id)
                .fetch_all(&self.pool)
                .await?
        } else if let Some(kind) = kind {
            sqlx::query_as::<_, RssHistoryRecord>(&format!(
                "{} WHERE TYPE = ? ORDER BY FINISH_TIME DESC",
                HISTORY_COLUMNS
            ))
            .bind(kind)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, RssHistoryRecord>(&format!("{} ORDER BY FINISH_TIME DESC", HISTORY_COLUMNS))
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }

    pub async fn history_exists(&self, rssid: &str) -> Result<bool> {
        if rssid.is_empty() {
            return Ok(false);
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(ID) FROM RSS_HISTORY WHERE RSSID = ?")
            .bind(rssid)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn insert_history(&self, history: CreateRssHistory) -> Result<bool> {
        if self.history_exists(&history.rssid).await? {
            return Ok(false);
        }
        sqlx::query(
            r#"
            INSERT INTO RSS_HISTORY (TYPE, RSSID, NAME, YEAR, TMDBID, SEASON, IMAGE, "DESC", TOTAL, START, FINISH_TIME)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&history.kind)
        .bind(&history.rssid)
        .bind(&history.name)
        .bind(&history.year)
        .bind(&history.tmdbid)
        .bind(&history.season)
        .bind(&history.image)
        .bind(&history.desc)
        .bind(history.total)
        .bind(history.start)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    pub async fn delete_history(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM RSS_HISTORY WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // User RSS tasks
    // ========================================================================

    pub async fn list_tasks(&self, id: Option<i64>) -> Result<Vec<UserRssTaskRecord>> {
        let rows = match id {
            Some(id) => {
                sqlx::query_as::<_, UserRssTaskRecord>(&format!("{} WHERE ID = ?", TASK_COLUMNS))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, UserRssTaskRecord>(&format!("{} ORDER BY STATE DESC", TASK_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn delete_task(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM CONFIG_USER_RSS WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Add to the processed counter and touch UPDATE_TIME
    pub async fn bump_task_count(&self, id: i64, count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE CONFIG_USER_RSS SET PROCESS_COUNT = IFNULL(PROCESS_COUNT, 0) + ?, UPDATE_TIME = ? WHERE ID = ?",
        )
        .bind(count)
        .bind(now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the task with the given id if it exists, otherwise insert
    pub async fn save_task(&self, item: SaveUserRssTask) -> Result<i64> {
        let existing = match item.id {
            Some(id) => self.list_tasks(Some(id)).await?.into_iter().next(),
            None => None,
        };
        let now = now_timestamp();
        match existing {
            Some(task) => {
                sqlx::query(
                    r#"
                    UPDATE CONFIG_USER_RSS
                    SET NAME = ?, ADDRESS = ?, PARSER = ?, INTERVAL = ?, USES = ?, INCLUDE = ?, EXCLUDE = ?,
                        FILTER = ?, UPDATE_TIME = ?, STATE = ?, SAVE_PATH = ?, DOWNLOAD_SETTING = ?,
                        RECOGNIZATION = ?, OVER_EDITION = ?, SITES = ?, FILTER_ARGS = ?, NOTE = ''
                    WHERE ID = ?
                    "#,
                )
                .bind(&item.name)
                .bind(&item.address)
                .bind(&item.parser)
                .bind(&item.interval)
                .bind(&item.uses)
                .bind(&item.include)
                .bind(&item.exclude)
                .bind(&item.filter_rule)
                .bind(&now)
                .bind(&item.state)
                .bind(&item.save_path)
                .bind(&item.download_setting)
                .bind(&item.recognization)
                .bind(item.over_edition)
                .bind(to_json(&item.sites))
                .bind(to_json(&item.filter_args))
                .bind(task.id)
                .execute(&self.pool)
                .await?;
                Ok(task.id)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO CONFIG_USER_RSS
                        (NAME, ADDRESS, PARSER, INTERVAL, USES, INCLUDE, EXCLUDE, FILTER, UPDATE_TIME, STATE,
                         SAVE_PATH, DOWNLOAD_SETTING, RECOGNIZATION, OVER_EDITION, SITES, FILTER_ARGS, PROCESS_COUNT)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                    "#,
                )
                .bind(&item.name)
                .bind(&item.address)
                .bind(&item.parser)
                .bind(&item.interval)
                .bind(&item.uses)
                .bind(&item.include)
                .bind(&item.exclude)
                .bind(&item.filter_rule)
                .bind(&now)
                .bind(&item.state)
                .bind(&item.save_path)
                .bind(&item.download_setting)
                .bind(&item.recognization)
                .bind(item.over_edition)
                .bind(to_json(&item.sites))
                .bind(to_json(&item.filter_args))
                .execute(&self.pool)
                .await?;
                Ok(result.last_insert_rowid())
            }
        }
    }

    /// Remember a media identity matched by a task; (tmdbid, season) pairs are kept unique
    pub async fn add_task_media(&self, id: i64, tmdbid: &str, season: i64, title: &str) -> Result<bool> {
        let Some(task) = self.list_tasks(Some(id)).await?.into_iter().next() else {
            return Ok(false);
        };
        let mut mediainfos = task.mediainfos;
        let exists = mediainfos.iter().any(|m| {
            m.get("id").and_then(Value::as_str) == Some(tmdbid)
                && m.get("season").and_then(Value::as_i64) == Some(season)
        });
        if exists {
            return Ok(false);
        }
        mediainfos.push(json!({
            "id": tmdbid,
            "rssid": "",
            "season": season,
            "name": title,
        }));
        sqlx::query("UPDATE CONFIG_USER_RSS SET MEDIAINFOS = ? WHERE ID = ?")
            .bind(to_json(&mediainfos))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    // ========================================================================
    // Parsers
    // ========================================================================

    pub async fn list_parsers(&self, id: Option<i64>) -> Result<Vec<RssParserRecord>> {
        let rows = match id {
            Some(id) => {
                sqlx::query_as::<_, RssParserRecord>(&format!("{} WHERE ID = ?", PARSER_COLUMNS))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, RssParserRecord>(&format!("{} ORDER BY ID", PARSER_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn delete_parser(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM CONFIG_RSS_PARSER WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_parser(&self, item: SaveRssParser) -> Result<i64> {
        if let Some(id) = item.id
            && !self.list_parsers(Some(id)).await?.is_empty()
        {
            sqlx::query("UPDATE CONFIG_RSS_PARSER SET NAME = ?, TYPE = ?, FORMAT = ?, PARAMS = ? WHERE ID = ?")
                .bind(&item.name)
                .bind(&item.kind)
                .bind(&item.format)
                .bind(&item.params)
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(id);
        }
        let result = sqlx::query("INSERT INTO CONFIG_RSS_PARSER (NAME, TYPE, FORMAT, PARAMS) VALUES (?, ?, ?, ?)")
            .bind(&item.name)
            .bind(&item.kind)
            .bind(&item.format)
            .bind(&item.params)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    // ========================================================================
    // Task download history
    // ========================================================================

    pub async fn insert_task_history(&self, task_id: &str, title: &str, downloader: &str) -> Result<()> {
        sqlx::query("INSERT INTO USERRSS_TASK_HISTORY (TASK_ID, TITLE, DOWNLOADER, DATE) VALUES (?, ?, ?, ?)")
            .bind(task_id)
            .bind(title)
            .bind(downloader)
            .bind(now_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_task_history(&self, task_id: &str) -> Result<Vec<UserRssTaskHistoryRecord>> {
        if task_id.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserRssTaskHistoryRecord>(
            "SELECT ID, TASK_ID, TITLE, DOWNLOADER, DATE FROM USERRSS_TASK_HISTORY WHERE TASK_ID = ? ORDER BY DATE DESC, ID DESC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_seen_torrents() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.rss();
        assert!(repo.is_torrent_seen("").await.unwrap());
        assert!(!repo.is_torrent_seen("https://t/1").await.unwrap());

        repo.insert_simple("Show S01E01", "https://t/1").await.unwrap();
        assert!(repo.is_torrent_seen("https://t/1").await.unwrap());
        assert!(repo.is_userrss_finished("Show S01E01", "").await.unwrap());

        repo.delete_simple("Show S01E01", None).await.unwrap();
        assert!(!repo.is_torrent_seen("https://t/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_history_dedupes_by_rssid() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.rss();
        let history = CreateRssHistory {
            rssid: "tv-1".to_string(),
            kind: "TV".to_string(),
            name: "Show".to_string(),
            ..Default::default()
        };
        assert!(repo.insert_history(history.clone()).await.unwrap());
        assert!(!repo.insert_history(history).await.unwrap());
        assert_eq!(repo.list_history(Some("TV"), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_task_upsert_and_media() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.rss();
        let id = repo
            .save_task(SaveUserRssTask {
                name: "feed".to_string(),
                state: "Y".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let same = repo
            .save_task(SaveUserRssTask {
                id: Some(id),
                name: "renamed".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(id, same);

        assert!(repo.add_task_media(id, "100", 1, "Show").await.unwrap());
        assert!(!repo.add_task_media(id, "100", 1, "Show").await.unwrap());
        repo.bump_task_count(id, 3).await.unwrap();

        let task = repo.list_tasks(Some(id)).await.unwrap().remove(0);
        assert_eq!(task.name, "renamed");
        assert_eq!(task.process_count, 3);
        assert_eq!(task.mediainfos.len(), 1);
    }

    #[tokio::test]
    async fn test_full_torrent_record_counts_as_seen() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.rss();
        repo.insert_torrent(CreateRssTorrent {
            torrent_name: "Movie.2021.1080p".to_string(),
            enclosure: "https://t/9".to_string(),
            media_type: "MOV".to_string(),
            title: "Movie".to_string(),
            year: "2021".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(repo.is_torrent_seen("https://t/9").await.unwrap());
    }

    #[tokio::test]
    async fn test_parser_upsert_and_delete() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.rss();
        let before = repo.list_parsers(None).await.unwrap().len();

        let id = repo
            .save_parser(SaveRssParser {
                name: "custom".to_string(),
                kind: "XML".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let same = repo
            .save_parser(SaveRssParser {
                id: Some(id),
                name: "custom json".to_string(),
                kind: "JSON".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(id, same);
        let parser = repo.list_parsers(Some(id)).await.unwrap().remove(0);
        assert_eq!(parser.kind, "JSON");

        repo.delete_parser(id).await.unwrap();
        assert_eq!(repo.list_parsers(None).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_task_history_and_delete() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.rss();
        let id = repo
            .save_task(SaveUserRssTask {
                name: "feed".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let task_id = id.to_string();
        repo.insert_task_history(&task_id, "first", "qbittorrent").await.unwrap();
        repo.insert_task_history(&task_id, "second", "qbittorrent").await.unwrap();
        let history = repo.list_task_history(&task_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].title, "second");
        assert!(repo.list_task_history("").await.unwrap().is_empty());

        repo.delete_task(id).await.unwrap();
        assert!(repo.list_tasks(Some(id)).await.unwrap().is_empty());
    }
}
