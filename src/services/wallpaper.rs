//! Login page wallpaper from the Bing daily image

use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const BING_BASE: &str = "https://cn.bing.com";
const BING_ENDPOINT: &str = "https://cn.bing.com/HPImageArchive.aspx?format=js&idx=0&n=1";

#[derive(Debug, Deserialize)]
struct BingResponse {
    #[serde(default)]
    images: Vec<BingImage>,
}

#[derive(Debug, Deserialize)]
struct BingImage {
    url: String,
}

/// Absolute image url from a Bing archive response body
fn parse_bing(body: &str) -> Result<Option<String>> {
    let response: BingResponse = serde_json::from_str(body).context("Invalid Bing response")?;
    Ok(response.images.into_iter().next().map(|img| {
        if img.url.starts_with("http") {
            img.url
        } else {
            format!("{}{}", BING_BASE, img.url)
        }
    }))
}

pub struct WallpaperService {
    client: Client,
    url: RwLock<Option<String>>,
}

impl WallpaperService {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: RwLock::new(None),
        })
    }

    pub fn current(&self) -> Option<String> {
        self.url.read().clone()
    }

    /// Fetch today's image url and keep it
    pub async fn refresh(&self) -> Result<Option<String>> {
        let body = self
            .client
            .get(BING_ENDPOINT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let url = parse_bing(&body)?;
        if let Some(url) = &url {
            debug!(url = %url, "Wallpaper refreshed");
            *self.url.write() = Some(url.clone());
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bing() {
        let body = r#"{"images":[{"url":"/th?id=OHR.Sample_1920x1080.jpg","title":"x"}]}"#;
        assert_eq!(
            parse_bing(body).unwrap().as_deref(),
            Some("https://cn.bing.com/th?id=OHR.Sample_1920x1080.jpg")
        );
        assert_eq!(parse_bing(r#"{"images":[]}"#).unwrap(), None);
        assert!(parse_bing("not json").is_err());
    }
}
