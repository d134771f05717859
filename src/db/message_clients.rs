//! Notification client configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{bool_to_int, int, int_to_bool, json_to_vec, text, vec_to_json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageClientRecord {
    pub id: i64,
    pub name: String,
    pub kind: String,
    /// Channel-specific settings as a JSON object
    pub config: serde_json::Value,
    pub switchs: Vec<String>,
    pub interactive: bool,
    pub enabled: bool,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MessageClientRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let config = text(row, "CONFIG")?;
        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "NAME")?,
            kind: text(row, "TYPE")?,
            config: serde_json::from_str(&config).unwrap_or(serde_json::Value::Null),
            switchs: json_to_vec(&text(row, "SWITCHS")?),
            interactive: int_to_bool(int(row, "INTERACTIVE")? as i32),
            enabled: int_to_bool(int(row, "ENABLED")? as i32),
            note: text(row, "NOTE")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateMessageClient {
    pub name: String,
    pub kind: String,
    pub config: serde_json::Value,
    pub switchs: Vec<String>,
    pub interactive: bool,
    pub enabled: bool,
    pub note: Option<String>,
}

const SELECT_COLUMNS: &str =
    "SELECT ID, NAME, TYPE, CONFIG, SWITCHS, INTERACTIVE, ENABLED, NOTE FROM MESSAGE_CLIENT";

pub struct MessageClientRepository {
    pool: SqlitePool,
}

impl MessageClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<MessageClientRecord>> {
        let rows = sqlx::query_as::<_, MessageClientRecord>(&format!("{} ORDER BY TYPE", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> Result<Option<MessageClientRecord>> {
        let row = sqlx::query_as::<_, MessageClientRecord>(&format!("{} WHERE ID = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn insert(&self, client: CreateMessageClient) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO MESSAGE_CLIENT (NAME, TYPE, CONFIG, SWITCHS, INTERACTIVE, ENABLED, NOTE)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&client.name)
        .bind(&client.kind)
        .bind(client.config.to_string())
        .bind(vec_to_json(&client.switchs))
        .bind(bool_to_int(client.interactive))
        .bind(bool_to_int(client.enabled))
        .bind(&client.note)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM MESSAGE_CLIENT WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_interactive(&self, id: i64, interactive: bool) -> Result<()> {
        sqlx::query("UPDATE MESSAGE_CLIENT SET INTERACTIVE = ? WHERE ID = ?")
            .bind(bool_to_int(interactive))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE MESSAGE_CLIENT SET ENABLED = ? WHERE ID = ?")
            .bind(bool_to_int(enabled))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clear the interactive flag on every client of a channel type
    pub async fn clear_interactive(&self, kind: &str) -> Result<()> {
        sqlx::query("UPDATE MESSAGE_CLIENT SET INTERACTIVE = 0 WHERE TYPE = ?")
            .bind(kind)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    fn client(name: &str, kind: &str) -> CreateMessageClient {
        CreateMessageClient {
            name: name.to_string(),
            kind: kind.to_string(),
            config: json!({"token": "abc"}),
            switchs: vec!["transfer_finished".to_string()],
            interactive: true,
            enabled: true,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_clear_interactive_only_touches_type() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.message_clients();
        let tg = repo.insert(client("tg", "telegram")).await.unwrap();
        let wx = repo.insert(client("wx", "wechat")).await.unwrap();

        repo.clear_interactive("telegram").await.unwrap();
        assert!(!repo.get(tg).await.unwrap().unwrap().interactive);
        let wechat = repo.get(wx).await.unwrap().unwrap();
        assert!(wechat.interactive);
        assert_eq!(wechat.config["token"], "abc");
        assert_eq!(wechat.switchs, vec!["transfer_finished"]);

        let kinds: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec!["telegram", "wechat"]);
    }
}
