//! Metadata provider seam
//!
//! Identification against TMDB lives behind [`MetadataProvider`]. The service
//! ships with [`UnconfiguredMetadata`], which knows nothing; a real provider
//! is plugged in by whoever embeds the crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::{MediaType, MetaInfo};
use crate::services::words::WordsOutcome;

/// Provider-side record of a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbInfo {
    pub id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<String>,
    pub overview: Option<String>,
    pub poster: Option<String>,
    pub season_count: Option<i64>,
}

impl TmdbInfo {
    pub fn link(&self) -> String {
        let kind = match self.media_type {
            MediaType::Movie => "movie",
            MediaType::Tv | MediaType::Anime => "tv",
        };
        format!("https://www.themoviedb.org/{}/{}", kind, self.id)
    }
}

/// A parsed name, optionally enriched by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub meta: MetaInfo,
    pub tmdb: Option<TmdbInfo>,
    pub category: Option<String>,
    pub part: Option<String>,
    pub audio_codec: Option<String>,
    pub ignored_words: Vec<String>,
    pub replaced_words: Vec<String>,
    pub offset_words: Vec<String>,
}

impl MediaInfo {
    /// Parse a release name after it has been rewritten by the words engine
    pub fn from_words(original: &str, words: WordsOutcome) -> Self {
        let mut meta = MetaInfo::parse(&words.title);
        meta.original_name = original.to_string();
        Self {
            meta,
            ignored_words: words.ignored,
            replaced_words: words.replaced,
            offset_words: words.offset,
            ..Default::default()
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.tmdb
            .as_ref()
            .map(|t| t.media_type)
            .unwrap_or_else(|| self.meta.media_type())
    }

    pub fn title(&self) -> &str {
        self.tmdb
            .as_ref()
            .map(|t| t.title.as_str())
            .unwrap_or(&self.meta.title)
    }

    pub fn year(&self) -> Option<String> {
        self.tmdb
            .as_ref()
            .and_then(|t| t.year.clone())
            .or_else(|| self.meta.year.map(|y| y.to_string()))
    }

    /// Flat view used by the name test page
    pub fn to_test_view(&self) -> serde_json::Value {
        let media_type = match self.media_type() {
            MediaType::Movie => "Movie",
            MediaType::Tv => "TV",
            MediaType::Anime => "Anime",
        };
        serde_json::json!({
            "type": media_type,
            "name": self.meta.title,
            "title": self.title(),
            "year": self.year().unwrap_or_default(),
            "season_episode": self.meta.season_episode_string(),
            "part": self.part.clone().unwrap_or_default(),
            "tmdbid": self.tmdb.as_ref().map(|t| t.id.to_string()).unwrap_or_default(),
            "tmdblink": self.tmdb.as_ref().map(TmdbInfo::link).unwrap_or_default(),
            "category": self.category.clone().unwrap_or_default(),
            "restype": self.meta.source.clone().unwrap_or_default(),
            "pix": self.meta.resolution.clone().unwrap_or_default(),
            "team": self.meta.release_group.clone().unwrap_or_default(),
            "video_codec": self.meta.codec.clone().unwrap_or_default(),
            "audio_codec": self.audio_codec.clone().unwrap_or_default(),
            "org_string": self.meta.original_name,
            "ignored_words": self.ignored_words,
            "replaced_words": self.replaced_words,
            "offset_words": self.offset_words,
        })
    }
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Look up a title by provider id
    async fn get_tmdb_info(&self, media_type: MediaType, tmdbid: i64) -> Result<Option<TmdbInfo>>;

    /// Identify a parsed name
    async fn recognize(&self, info: &MediaInfo) -> Result<Option<TmdbInfo>>;

    /// Free-text search
    async fn search(&self, keyword: &str, source: Option<&str>) -> Result<Vec<TmdbInfo>>;

    /// Whether the provider is reachable
    async fn status(&self) -> bool;
}

/// Provider used when no metadata source is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredMetadata;

#[async_trait]
impl MetadataProvider for UnconfiguredMetadata {
    async fn get_tmdb_info(&self, _media_type: MediaType, _tmdbid: i64) -> Result<Option<TmdbInfo>> {
        Ok(None)
    }

    async fn recognize(&self, _info: &MediaInfo) -> Result<Option<TmdbInfo>> {
        Ok(None)
    }

    async fn search(&self, _keyword: &str, _source: Option<&str>) -> Result<Vec<TmdbInfo>> {
        Ok(Vec::new())
    }

    async fn status(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_view_without_provider() {
        let words = WordsOutcome {
            title: "The.Matrix.1999.1080p.BluRay.x264-GRP".to_string(),
            ignored: vec!["REPACK".to_string()],
            ..Default::default()
        };
        let info = MediaInfo::from_words("The.Matrix.1999.REPACK.1080p.BluRay.x264-GRP", words);
        let view = info.to_test_view();
        assert_eq!(view["type"], "Movie");
        assert_eq!(view["title"], "The Matrix");
        assert_eq!(view["year"], "1999");
        assert_eq!(view["pix"], "1080p");
        assert_eq!(view["team"], "GRP");
        assert_eq!(view["tmdbid"], "");
        assert_eq!(view["ignored_words"][0], "REPACK");
        assert_eq!(view["org_string"], "The.Matrix.1999.REPACK.1080p.BluRay.x264-GRP");
    }

    #[test]
    fn test_provider_fields_take_precedence() {
        let mut info = MediaInfo::from_words("x", WordsOutcome {
            title: "Shogun S01E02".to_string(),
            ..Default::default()
        });
        info.tmdb = Some(TmdbInfo {
            id: 126308,
            media_type: MediaType::Tv,
            title: "Shōgun".to_string(),
            year: Some("2024".to_string()),
            overview: None,
            poster: None,
            season_count: Some(1),
        });
        assert_eq!(info.title(), "Shōgun");
        assert_eq!(info.year().as_deref(), Some("2024"));
        assert_eq!(info.to_test_view()["tmdblink"], "https://www.themoviedb.org/tv/126308");
    }

    #[tokio::test]
    async fn test_unconfigured_returns_nothing() {
        let provider = UnconfiguredMetadata;
        assert!(provider.get_tmdb_info(MediaType::Movie, 603).await.unwrap().is_none());
        assert!(provider.search("matrix", None).await.unwrap().is_empty());
        assert!(!provider.status().await);
    }
}
