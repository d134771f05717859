//! Media server library statistics

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{int, now_timestamp, text};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSyncStatisticsRecord {
    pub server: String,
    pub total_count: i64,
    pub movie_count: i64,
    pub tv_count: i64,
    pub update_time: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MediaSyncStatisticsRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            server: text(row, "SERVER")?,
            total_count: int(row, "TOTAL_COUNT")?,
            movie_count: int(row, "MOVIE_COUNT")?,
            tv_count: int(row, "TV_COUNT")?,
            update_time: text(row, "UPDATE_TIME")?,
        })
    }
}

pub struct MediaSyncRepository {
    pool: SqlitePool,
}

impl MediaSyncRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the statistics for a server
    pub async fn save_statistics(&self, server: &str, total: i64, movie: i64, tv: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM MEDIASYNC_STATISTICS WHERE SERVER = ?")
            .bind(server)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO MEDIASYNC_STATISTICS (SERVER, TOTAL_COUNT, MOVIE_COUNT, TV_COUNT, UPDATE_TIME) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(server)
        .bind(total)
        .bind(movie)
        .bind(tv)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn latest_statistics(&self, server: &str) -> Result<Option<MediaSyncStatisticsRecord>> {
        let row = sqlx::query_as::<_, MediaSyncStatisticsRecord>(
            r#"
            SELECT SERVER, TOTAL_COUNT, MOVIE_COUNT, TV_COUNT, UPDATE_TIME
            FROM MEDIASYNC_STATISTICS WHERE SERVER = ?
            ORDER BY UPDATE_TIME DESC LIMIT 1
            "#,
        )
        .bind(server)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_statistics_replaced_per_server() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.media_sync();
        repo.save_statistics("jellyfin", 10, 6, 4).await.unwrap();
        repo.save_statistics("jellyfin", 12, 7, 5).await.unwrap();

        let stats = repo.latest_statistics("jellyfin").await.unwrap().unwrap();
        assert_eq!(stats.total_count, 12);
        assert!(repo.latest_statistics("plex").await.unwrap().is_none());
    }
}
