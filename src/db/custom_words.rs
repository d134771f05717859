//! Custom words and their groups
//!
//! Words rewrite release names before identification. Group `-1` is the
//! general group that applies to every title.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{bool_to_int, int, int_to_bool, text};

/// General group id
pub const GENERAL_GROUP_ID: i64 = -1;
/// Season value meaning "any season"
pub const ANY_SEASON: i64 = -2;

/// Word behavior, stored as TYPE 1..=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum WordKind {
    Block,
    Replace,
    ReplaceOffset,
    Offset,
}

impl WordKind {
    pub fn code(&self) -> i64 {
        match self {
            WordKind::Block => 1,
            WordKind::Replace => 2,
            WordKind::ReplaceOffset => 3,
            WordKind::Offset => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(WordKind::Block),
            2 => Some(WordKind::Replace),
            3 => Some(WordKind::ReplaceOffset),
            4 => Some(WordKind::Offset),
            _ => None,
        }
    }

    /// Whether an offset expression is part of the word
    pub fn has_offset(&self) -> bool {
        matches!(self, WordKind::ReplaceOffset | WordKind::Offset)
    }
}

impl From<WordKind> for i64 {
    fn from(kind: WordKind) -> Self {
        kind.code()
    }
}

impl TryFrom<i64> for WordKind {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        WordKind::from_code(code).ok_or_else(|| format!("invalid word type {}", code))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomWordRecord {
    pub id: i64,
    pub replaced: String,
    pub replace: String,
    pub front: String,
    pub back: String,
    pub offset: String,
    pub kind: i64,
    pub group_id: i64,
    pub season: i64,
    pub enabled: bool,
    pub regex: bool,
    pub help: String,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CustomWordRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            replaced: text(row, "REPLACED")?,
            replace: text(row, "REPLACE")?,
            front: text(row, "FRONT")?,
            back: text(row, "BACK")?,
            offset: text(row, "OFFSET")?,
            kind: int(row, "TYPE")?,
            group_id: int(row, "GROUP_ID")?,
            season: int(row, "SEASON")?,
            enabled: int_to_bool(int(row, "ENABLED")? as i32),
            regex: int_to_bool(int(row, "REGEX")? as i32),
            help: text(row, "HELP")?,
            note: text(row, "NOTE")?,
        })
    }
}

impl CustomWordRecord {
    pub fn word_kind(&self) -> Option<WordKind> {
        WordKind::from_code(self.kind)
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomWord {
    pub replaced: String,
    pub replace: String,
    pub front: String,
    pub back: String,
    pub offset: String,
    pub kind: WordKind,
    pub group_id: i64,
    pub season: i64,
    pub enabled: bool,
    pub regex: bool,
    pub help: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomWordGroupRecord {
    pub id: i64,
    pub title: String,
    pub year: String,
    /// 1 movie, 2 tv
    pub kind: i64,
    pub tmdbid: i64,
    pub season_count: i64,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CustomWordGroupRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            title: text(row, "TITLE")?,
            year: text(row, "YEAR")?,
            kind: int(row, "TYPE")?,
            tmdbid: int(row, "TMDBID")?,
            season_count: int(row, "SEASON_COUNT")?,
            note: text(row, "NOTE")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomWordGroup {
    pub title: String,
    pub year: String,
    pub kind: i64,
    pub tmdbid: i64,
    pub season_count: i64,
    pub note: Option<String>,
}

const WORD_COLUMNS: &str = "SELECT ID, REPLACED, REPLACE, FRONT, BACK, OFFSET, TYPE, GROUP_ID, SEASON, ENABLED, REGEX, HELP, NOTE FROM CUSTOM_WORDS";
const GROUP_COLUMNS: &str =
    "SELECT ID, TITLE, YEAR, TYPE, TMDBID, SEASON_COUNT, NOTE FROM CUSTOM_WORD_GROUPS";

pub struct CustomWordRepository {
    pool: SqlitePool,
}

impl CustomWordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Words
    // ========================================================================

    pub async fn insert(&self, word: CreateCustomWord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO CUSTOM_WORDS
                (REPLACED, REPLACE, FRONT, BACK, OFFSET, TYPE, GROUP_ID, SEASON, ENABLED, REGEX, HELP, NOTE)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&word.replaced)
        .bind(&word.replace)
        .bind(&word.front)
        .bind(&word.back)
        .bind(&word.offset)
        .bind(word.kind.code())
        .bind(word.group_id)
        .bind(word.season)
        .bind(bool_to_int(word.enabled))
        .bind(bool_to_int(word.regex))
        .bind(&word.help)
        .bind(&word.note)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM CUSTOM_WORDS WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE CUSTOM_WORDS SET ENABLED = ? WHERE ID = ?")
            .bind(bool_to_int(enabled))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<CustomWordRecord>> {
        let row = sqlx::query_as::<_, CustomWordRecord>(&format!("{} WHERE ID = ?", WORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_by_group(&self, group_id: i64) -> Result<Vec<CustomWordRecord>> {
        let rows = sqlx::query_as::<_, CustomWordRecord>(&format!(
            "{} WHERE GROUP_ID = ? ORDER BY ID",
            WORD_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_enabled(&self) -> Result<Vec<CustomWordRecord>> {
        let rows = sqlx::query_as::<_, CustomWordRecord>(&format!(
            "{} WHERE ENABLED = 1 ORDER BY ID",
            WORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Filter by type and optionally the enabled and regex flags
    pub async fn list_by_kind(
        &self,
        kind: WordKind,
        enabled: Option<bool>,
        regex: Option<bool>,
    ) -> Result<Vec<CustomWordRecord>> {
        let mut sql = format!("{} WHERE TYPE = ?", WORD_COLUMNS);
        if enabled.is_some() {
            sql.push_str(" AND ENABLED = ?");
        }
        if regex.is_some() {
            sql.push_str(" AND REGEX = ?");
        }
        sql.push_str(" ORDER BY ID");

        let mut query = sqlx::query_as::<_, CustomWordRecord>(&sql).bind(kind.code());
        if let Some(enabled) = enabled {
            query = query.bind(bool_to_int(enabled));
        }
        if let Some(regex) = regex {
            query = query.bind(bool_to_int(regex));
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<CustomWordRecord>> {
        let rows = sqlx::query_as::<_, CustomWordRecord>(&format!(
            "{} ORDER BY GROUP_ID, ID",
            WORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Whether a word with the same `replaced`, or the same `front`+`back`, exists
    pub async fn exists(
        &self,
        replaced: Option<&str>,
        front: Option<&str>,
        back: Option<&str>,
    ) -> Result<bool> {
        let count: (i64,) = if let Some(replaced) = replaced.filter(|r| !r.is_empty()) {
            sqlx::query_as("SELECT COUNT(ID) FROM CUSTOM_WORDS WHERE REPLACED = ?")
                .bind(replaced)
                .fetch_one(&self.pool)
                .await?
        } else if front.is_some_and(|f| !f.is_empty()) || back.is_some_and(|b| !b.is_empty()) {
            sqlx::query_as(
                "SELECT COUNT(ID) FROM CUSTOM_WORDS WHERE IFNULL(FRONT, '') = ? AND IFNULL(BACK, '') = ?",
            )
            .bind(front.unwrap_or_default())
            .bind(back.unwrap_or_default())
            .fetch_one(&self.pool)
            .await?
        } else {
            return Ok(false);
        };
        Ok(count.0 > 0)
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub async fn insert_group(&self, group: CreateCustomWordGroup) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO CUSTOM_WORD_GROUPS (TITLE, YEAR, TYPE, TMDBID, SEASON_COUNT, NOTE) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&group.title)
        .bind(&group.year)
        .bind(group.kind)
        .bind(group.tmdbid)
        .bind(group.season_count)
        .bind(&group.note)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Delete a group together with its words
    pub async fn delete_group(&self, group_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM CUSTOM_WORDS WHERE GROUP_ID = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM CUSTOM_WORD_GROUPS WHERE ID = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_group(&self, group_id: i64) -> Result<Option<CustomWordGroupRecord>> {
        let row = sqlx::query_as::<_, CustomWordGroupRecord>(&format!(
            "{} WHERE ID = ?",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_group(&self, tmdbid: i64, kind: i64) -> Result<Option<CustomWordGroupRecord>> {
        let row = sqlx::query_as::<_, CustomWordGroupRecord>(&format!(
            "{} WHERE TMDBID = ? AND TYPE = ?",
            GROUP_COLUMNS
        ))
        .bind(tmdbid)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_groups(&self) -> Result<Vec<CustomWordGroupRecord>> {
        let rows = sqlx::query_as::<_, CustomWordGroupRecord>(&format!("{} ORDER BY ID", GROUP_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn group_exists(&self, tmdbid: i64, kind: i64) -> Result<bool> {
        Ok(self.find_group(tmdbid, kind).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn word(replaced: &str, kind: WordKind, group_id: i64) -> CreateCustomWord {
        CreateCustomWord {
            replaced: replaced.to_string(),
            replace: String::new(),
            front: String::new(),
            back: String::new(),
            offset: String::new(),
            kind,
            group_id,
            season: ANY_SEASON,
            enabled: true,
            regex: false,
            help: String::new(),
            note: String::new(),
        }
    }

    #[tokio::test]
    async fn test_word_crud_and_exists() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.custom_words();

        let id = repo.insert(word("HDTVrip", WordKind::Block, GENERAL_GROUP_ID)).await.unwrap();
        assert!(repo.exists(Some("HDTVrip"), None, None).await.unwrap());
        assert!(!repo.exists(None, None, None).await.unwrap());

        let mut offset = word("", WordKind::Offset, GENERAL_GROUP_ID);
        offset.front = "第".to_string();
        offset.back = "集".to_string();
        offset.offset = "EP-12".to_string();
        repo.insert(offset).await.unwrap();
        assert!(repo.exists(None, Some("第"), Some("集")).await.unwrap());

        repo.set_enabled(id, false).await.unwrap();
        assert_eq!(repo.list_enabled().await.unwrap().len(), 1);
        assert_eq!(
            repo.list_by_kind(WordKind::Block, Some(false), None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_group_removes_words() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.custom_words();

        let gid = repo
            .insert_group(CreateCustomWordGroup {
                title: "Chicago Fire".to_string(),
                year: "2012".to_string(),
                kind: 2,
                tmdbid: 44006,
                season_count: 14,
                note: None,
            })
            .await
            .unwrap();
        repo.insert(word("CF", WordKind::Replace, gid)).await.unwrap();
        assert!(repo.group_exists(44006, 2).await.unwrap());
        assert_eq!(repo.list_by_group(gid).await.unwrap().len(), 1);

        repo.delete_group(gid).await.unwrap();
        assert!(repo.get_group(gid).await.unwrap().is_none());
        assert!(repo.list_all().await.unwrap().is_empty());
    }
}
