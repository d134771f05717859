//! Subtitle provider seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A video to fetch subtitles for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleItem {
    pub file: String,
    pub name: String,
    #[serde(default)]
    pub tmdbid: Option<i64>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
}

#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Returns whether anything was downloaded and a message for the user
    async fn download(&self, items: &[SubtitleItem]) -> (bool, String);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredSubtitles;

#[async_trait]
impl SubtitleProvider for UnconfiguredSubtitles {
    async fn download(&self, items: &[SubtitleItem]) -> (bool, String) {
        if items.is_empty() {
            return (false, "no files selected".to_string());
        }
        (false, "no subtitle provider configured".to_string())
    }
}
