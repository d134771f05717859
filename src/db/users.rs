//! Web users and the system key/value dictionary

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::text;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub pris: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for UserRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "NAME")?,
            password: text(row, "PASSWORD")?,
            pris: text(row, "PRIS")?,
        })
    }
}

pub struct UsersRepository {
    pool: SqlitePool,
}

impl UsersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRecord>(
            "SELECT ID, NAME, PASSWORD, PRIS FROM CONFIG_USERS ORDER BY ID",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some())
    }

    pub async fn get(&self, name: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT ID, NAME, PASSWORD, PRIS FROM CONFIG_USERS WHERE NAME = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Create a user. Returns false when the name is taken.
    pub async fn insert(&self, name: &str, password_hash: &str, pris: &str) -> Result<bool> {
        if name.is_empty() || self.exists(name).await? {
            return Ok(false);
        }
        sqlx::query("INSERT INTO CONFIG_USERS (NAME, PASSWORD, PRIS) VALUES (?, ?, ?)")
            .bind(name)
            .bind(password_hash)
            .bind(pris)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM CONFIG_USERS WHERE NAME = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct SystemDictRepository {
    pool: SqlitePool,
}

impl SystemDictRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite a value
    pub async fn set(&self, kind: &str, key: &str, value: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE SYSTEM_DICT SET VALUE = ? WHERE TYPE = ? AND KEY = ?")
            .bind(value)
            .bind(kind)
            .bind(key)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO SYSTEM_DICT (TYPE, KEY, VALUE) VALUES (?, ?, ?)")
                .bind(kind)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn get(&self, kind: &str, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT VALUE FROM SYSTEM_DICT WHERE TYPE = ? AND KEY = ?")
            .bind(kind)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(text(&row, "VALUE")?),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_users_dedupe() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.users();
        assert!(repo.insert("alice", "[hash]x", "history,setting").await.unwrap());
        assert!(!repo.insert("alice", "[hash]y", "").await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.delete("alice").await.unwrap());
        assert!(!repo.exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_system_dict_upsert() {
        let db = Database::connect_in_memory().await.unwrap();
        let dict = db.system_dict();
        dict.set("CustomScript", "javascript", "a()").await.unwrap();
        dict.set("CustomScript", "javascript", "b()").await.unwrap();
        assert_eq!(
            dict.get("CustomScript", "javascript").await.unwrap().as_deref(),
            Some("b()")
        );
        assert_eq!(dict.get("CustomScript", "css").await.unwrap(), None);
    }
}
