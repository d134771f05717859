//! Filter rule groups and rules
//!
//! GROUP_ID and PRIORITY are stored as text; rules are ordered by the
//! integer value of PRIORITY.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{bool_to_yn, text, yn_to_bool};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroupRecord {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for FilterGroupRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let is_default: Option<String> = row.try_get("IS_DEFAULT")?;
        Ok(Self {
            id: row.try_get("ID")?,
            name: text(row, "GROUP_NAME")?,
            is_default: yn_to_bool(is_default.as_deref()),
            note: text(row, "NOTE")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRuleRecord {
    pub id: i64,
    pub group_id: String,
    pub name: String,
    pub priority: String,
    pub include: String,
    pub exclude: String,
    pub size_limit: String,
    pub note: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for FilterRuleRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            group_id: text(row, "GROUP_ID")?,
            name: text(row, "ROLE_NAME")?,
            priority: text(row, "PRIORITY")?,
            include: text(row, "INCLUDE")?,
            exclude: text(row, "EXCLUDE")?,
            size_limit: text(row, "SIZE_LIMIT")?,
            note: text(row, "NOTE")?,
        })
    }
}

/// Rule fields for insert or update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveFilterRule {
    pub group_id: i64,
    pub name: String,
    pub priority: String,
    pub include: String,
    pub exclude: String,
    pub size_limit: String,
    pub note: String,
}

const GROUP_COLUMNS: &str = "SELECT ID, GROUP_NAME, IS_DEFAULT, NOTE FROM CONFIG_FILTER_GROUP";
const RULE_COLUMNS: &str = "SELECT ID, GROUP_ID, ROLE_NAME, PRIORITY, INCLUDE, EXCLUDE, SIZE_LIMIT, NOTE FROM CONFIG_FILTER_RULES";

pub struct FilterRuleRepository {
    pool: SqlitePool,
}

impl FilterRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_groups(&self) -> Result<Vec<FilterGroupRecord>> {
        let rows = sqlx::query_as::<_, FilterGroupRecord>(&format!("{} ORDER BY ID", GROUP_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_group(&self, id: i64) -> Result<Option<FilterGroupRecord>> {
        let row = sqlx::query_as::<_, FilterGroupRecord>(&format!("{} WHERE ID = ?", GROUP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Rules of one group, or of every group, by group then priority
    pub async fn list_rules(&self, group_id: Option<i64>) -> Result<Vec<FilterRuleRecord>> {
        let rows = match group_id {
            Some(gid) => {
                sqlx::query_as::<_, FilterRuleRecord>(&format!(
                    "{} WHERE GROUP_ID = ? ORDER BY CAST(PRIORITY AS INTEGER)",
                    RULE_COLUMNS
                ))
                .bind(gid.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, FilterRuleRecord>(&format!(
                    "{} ORDER BY GROUP_ID, CAST(PRIORITY AS INTEGER)",
                    RULE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Create a group, or update the default flag of an existing one with the same name
    pub async fn add_group(&self, name: &str, default: bool) -> Result<i64> {
        if default {
            sqlx::query("UPDATE CONFIG_FILTER_GROUP SET IS_DEFAULT = 'N'")
                .execute(&self.pool)
                .await?;
        }
        if let Some(id) = self.group_id_by_name(name).await? {
            sqlx::query("UPDATE CONFIG_FILTER_GROUP SET IS_DEFAULT = ? WHERE ID = ?")
                .bind(bool_to_yn(default))
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(id);
        }
        let result = sqlx::query("INSERT INTO CONFIG_FILTER_GROUP (GROUP_NAME, IS_DEFAULT) VALUES (?, ?)")
            .bind(name)
            .bind(bool_to_yn(default))
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Recreate a group under a fixed id, replacing whatever holds that id
    pub async fn restore_group(&self, id: i64, name: &str, default: bool) -> Result<()> {
        if default {
            sqlx::query("UPDATE CONFIG_FILTER_GROUP SET IS_DEFAULT = 'N'")
                .execute(&self.pool)
                .await?;
        }
        sqlx::query("INSERT OR REPLACE INTO CONFIG_FILTER_GROUP (ID, GROUP_NAME, IS_DEFAULT) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(bool_to_yn(default))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn group_id_by_name(&self, name: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT ID FROM CONFIG_FILTER_GROUP WHERE GROUP_NAME = ? ORDER BY ID LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Make one group the default and clear the flag on every other
    pub async fn set_default_group(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE CONFIG_FILTER_GROUP SET IS_DEFAULT = CASE WHEN ID = ? THEN 'Y' ELSE 'N' END")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a group together with its rules
    pub async fn delete_group(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM CONFIG_FILTER_RULES WHERE GROUP_ID = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM CONFIG_FILTER_GROUP WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_rule(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM CONFIG_FILTER_RULES WHERE ID = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update the rule with `id`, or insert a new one
    pub async fn save_rule(&self, rule: SaveFilterRule, id: Option<i64>) -> Result<i64> {
        match id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE CONFIG_FILTER_RULES
                    SET GROUP_ID = ?, ROLE_NAME = ?, PRIORITY = ?, INCLUDE = ?, EXCLUDE = ?, SIZE_LIMIT = ?, NOTE = ?
                    WHERE ID = ?
                    "#,
                )
                .bind(rule.group_id.to_string())
                .bind(&rule.name)
                .bind(&rule.priority)
                .bind(&rule.include)
                .bind(&rule.exclude)
                .bind(&rule.size_limit)
                .bind(&rule.note)
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok(id)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO CONFIG_FILTER_RULES (GROUP_ID, ROLE_NAME, PRIORITY, INCLUDE, EXCLUDE, SIZE_LIMIT, NOTE)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(rule.group_id.to_string())
                .bind(&rule.name)
                .bind(&rule.priority)
                .bind(&rule.include)
                .bind(&rule.exclude)
                .bind(&rule.size_limit)
                .bind(&rule.note)
                .execute(&self.pool)
                .await?;
                Ok(result.last_insert_rowid())
            }
        }
    }
}
