//! Cached search results shown on the search page

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{int, text};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResultRecord {
    #[serde(default)]
    pub id: i64,
    pub torrent_name: String,
    pub enclosure: String,
    pub description: String,
    pub media_type: String,
    pub title: String,
    pub year: String,
    pub season: String,
    pub episode: String,
    pub es_string: String,
    pub vote: String,
    pub image: String,
    pub poster: String,
    pub tmdbid: String,
    pub overview: String,
    pub res_type: String,
    pub res_order: String,
    pub size: i64,
    pub seeders: i64,
    pub peers: i64,
    pub site: String,
    pub site_order: String,
    pub pageurl: String,
    pub otherinfo: String,
    pub upload_volume_factor: f64,
    pub download_volume_factor: f64,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SearchResultRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("ID")?,
            torrent_name: text(row, "TORRENT_NAME")?,
            enclosure: text(row, "ENCLOSURE")?,
            description: text(row, "DESCRIPTION")?,
            media_type: text(row, "TYPE")?,
            title: text(row, "TITLE")?,
            year: text(row, "YEAR")?,
            season: text(row, "SEASON")?,
            episode: text(row, "EPISODE")?,
            es_string: text(row, "ES_STRING")?,
            vote: text(row, "VOTE")?,
            image: text(row, "IMAGE")?,
            poster: text(row, "POSTER")?,
            tmdbid: text(row, "TMDBID")?,
            overview: text(row, "OVERVIEW")?,
            res_type: text(row, "RES_TYPE")?,
            res_order: text(row, "RES_ORDER")?,
            size: int(row, "SIZE")?,
            seeders: int(row, "SEEDERS")?,
            peers: int(row, "PEERS")?,
            site: text(row, "SITE")?,
            site_order: text(row, "SITE_ORDER")?,
            pageurl: text(row, "PAGEURL")?,
            otherinfo: text(row, "OTHERINFO")?,
            upload_volume_factor: row
                .try_get::<Option<f64>, _>("UPLOAD_VOLUME_FACTOR")?
                .unwrap_or(1.0),
            download_volume_factor: row
                .try_get::<Option<f64>, _>("DOWNLOAD_VOLUME_FACTOR")?
                .unwrap_or(1.0),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT ID, TORRENT_NAME, ENCLOSURE, DESCRIPTION, TYPE, TITLE, YEAR, SEASON, EPISODE,
           ES_STRING, VOTE, IMAGE, POSTER, TMDBID, OVERVIEW, RES_TYPE, RES_ORDER, SIZE,
           SEEDERS, PEERS, SITE, SITE_ORDER, PAGEURL, OTHERINFO, UPLOAD_VOLUME_FACTOR,
           DOWNLOAD_VOLUME_FACTOR
    FROM SEARCH_RESULT_INFO"#;

pub struct SearchResultRepository {
    pool: SqlitePool,
}

impl SearchResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a batch of results in one transaction
    pub async fn insert_many(&self, results: &[SearchResultRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for r in results {
            sqlx::query(
                r#"
                INSERT INTO SEARCH_RESULT_INFO
                    (TORRENT_NAME, ENCLOSURE, DESCRIPTION, TYPE, TITLE, YEAR, SEASON, EPISODE,
                     ES_STRING, VOTE, IMAGE, POSTER, TMDBID, OVERVIEW, RES_TYPE, RES_ORDER, SIZE,
                     SEEDERS, PEERS, SITE, SITE_ORDER, PAGEURL, OTHERINFO, UPLOAD_VOLUME_FACTOR,
                     DOWNLOAD_VOLUME_FACTOR)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.torrent_name)
            .bind(&r.enclosure)
            .bind(&r.description)
            .bind(&r.media_type)
            .bind(&r.title)
            .bind(&r.year)
            .bind(&r.season)
            .bind(&r.episode)
            .bind(&r.es_string)
            .bind(&r.vote)
            .bind(&r.image)
            .bind(&r.poster)
            .bind(&r.tmdbid)
            .bind(&r.overview)
            .bind(&r.res_type)
            .bind(&r.res_order)
            .bind(r.size)
            .bind(r.seeders)
            .bind(r.peers)
            .bind(&r.site)
            .bind(&r.site_order)
            .bind(&r.pageurl)
            .bind(&r.otherinfo)
            .bind(r.upload_volume_factor)
            .bind(r.download_volume_factor)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(results.len())
    }

    pub async fn get(&self, id: i64) -> Result<Option<SearchResultRecord>> {
        let row = sqlx::query_as::<_, SearchResultRecord>(&format!("{} WHERE ID = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list(&self) -> Result<Vec<SearchResultRecord>> {
        let rows = sqlx::query_as::<_, SearchResultRecord>(&format!("{} ORDER BY ID", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM SEARCH_RESULT_INFO")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_insert_many_and_clear() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.search_results();
        let results = vec![
            SearchResultRecord {
                torrent_name: "Show.S01E01.1080p".to_string(),
                size: 1_500_000_000,
                upload_volume_factor: 1.0,
                download_volume_factor: 0.0,
                ..Default::default()
            },
            SearchResultRecord {
                torrent_name: "Show.S01E02.1080p".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(repo.insert_many(&results).await.unwrap(), 2);

        let rows = repo.list().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].download_volume_factor, 0.0);
        assert!(repo.get(rows[1].id).await.unwrap().is_some());

        repo.clear().await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }
}
