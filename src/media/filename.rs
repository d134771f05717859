//! Release-name parser
//!
//! Parses names like:
//! - "Chicago.Fire.S14E08.1080p.WEB.h264-ETHEL.mkv"
//! - "The.Matrix.1999.2160p.UHD.BluRay.x265-GROUP.mkv"
//! - "Some Show 1x05 720p"

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MediaType;

static SXXEXX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\bS(\d{1,2})\s*E(\d{1,4})\b").unwrap());
static NXNN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\b(\d{1,2})x(\d{2,3})\b").unwrap());
static SEASON_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\b(?:S|Season\s*)(\d{1,2})\b").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());
static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(2160p|1080p|1080i|720p|480p|4K|UHD)\b").unwrap());
static GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)$").unwrap());
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static BRACKETS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[【(（].*?[\]】)）]").unwrap());

/// Identification fields recovered from a file or release name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub codec: Option<String>,
    pub release_group: Option<String>,
    pub original_name: String,
}

impl MetaInfo {
    /// Parse a file name (extension is stripped when it is a known media or subtitle type)
    pub fn parse(name: &str) -> Self {
        let stem = strip_known_extension(name);
        let mut info = MetaInfo {
            original_name: name.to_string(),
            ..Default::default()
        };

        if let Some(caps) = GROUP_RE.captures(stem) {
            info.release_group = Some(caps[1].to_string());
        }

        let cleaned = stem.replace(['.', '_'], " ");
        let cleaned = BRACKETS_RE.replace_all(&cleaned, " ");
        let cleaned = SPACES_RE.replace_all(cleaned.trim(), " ").to_string();

        let mut title_part: Option<String> = None;
        if let Some(caps) = SXXEXX_RE.captures(&cleaned) {
            title_part = Some(caps[1].to_string());
            info.season = caps[2].parse().ok();
            info.episode = caps[3].parse().ok();
        } else if let Some(caps) = NXNN_RE.captures(&cleaned) {
            title_part = Some(caps[1].to_string());
            info.season = caps[2].parse().ok();
            info.episode = caps[3].parse().ok();
        } else if let Some(caps) = SEASON_ONLY_RE.captures(&cleaned) {
            title_part = Some(caps[1].to_string());
            info.season = caps[2].parse().ok();
        }

        if let Some(caps) = YEAR_RE.captures(&cleaned) {
            info.year = caps[1].parse().ok();
            if title_part.is_none() {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                title_part = Some(cleaned[..start].to_string());
            }
        }

        if title_part.as_deref().is_none_or(|t| t.trim().is_empty()) {
            let cut = RESOLUTION_RE
                .find(&cleaned)
                .map(|m| m.start())
                .unwrap_or(cleaned.len());
            title_part = Some(cleaned[..cut].to_string());
        }

        info.title = clean_title(title_part.as_deref().unwrap_or_default());
        info.resolution = RESOLUTION_RE.captures(&cleaned).map(|c| {
            match c[1].to_uppercase().as_str() {
                "4K" | "UHD" => "2160p".to_string(),
                _ => c[1].to_lowercase(),
            }
        });
        info.source = parse_source(&cleaned);
        info.codec = parse_codec(&cleaned);

        debug!(
            name = name,
            title = %info.title,
            season = ?info.season,
            episode = ?info.episode,
            "Parsed release name"
        );

        info
    }

    /// Guess the category from the parsed fields
    pub fn media_type(&self) -> MediaType {
        if self.season.is_some() || self.episode.is_some() {
            MediaType::Tv
        } else {
            MediaType::Movie
        }
    }

    /// `S01`, or empty when no season was found
    pub fn season_string(&self) -> String {
        self.season.map(|s| format!("S{:02}", s)).unwrap_or_default()
    }

    /// `E05`, or empty when no episode was found
    pub fn episode_string(&self) -> String {
        self.episode.map(|e| format!("E{:02}", e)).unwrap_or_default()
    }

    /// `S01E05`, `S01` or empty
    pub fn season_episode_string(&self) -> String {
        format!("{}{}", self.season_string(), self.episode_string())
    }
}

/// Episode locator supplied by the user for oddly named releases.
///
/// The format is a file-name template with `{ep}` where the episode number
/// sits, e.g. `[Group] Title - {ep} [1080p].mkv`. A `*` matches anything.
#[derive(Debug, Clone)]
pub struct EpisodeFormat {
    pattern: Regex,
    offset: i64,
}

impl EpisodeFormat {
    pub fn new(format: &str, offset: Option<i64>) -> anyhow::Result<Self> {
        if !format.contains("{ep}") {
            anyhow::bail!("Episode format must contain {{ep}}");
        }
        let mut pattern = String::from("^");
        for (i, part) in format.split("{ep}").enumerate() {
            if i > 0 {
                pattern.push_str(r"(\d{1,4})");
            }
            let escaped: Vec<String> = part.split('*').map(regex::escape).collect();
            pattern.push_str(&escaped.join(".*?"));
        }
        pattern.push('$');
        Ok(Self {
            pattern: Regex::new(&pattern)?,
            offset: offset.unwrap_or(0),
        })
    }

    /// Episode number for a file name, with the offset applied
    pub fn episode(&self, file_name: &str) -> Option<u32> {
        let caps = self.pattern.captures(file_name)?;
        let ep: i64 = caps.get(1)?.as_str().parse().ok()?;
        u32::try_from(ep + self.offset).ok()
    }
}

fn strip_known_extension(name: &str) -> &str {
    let ext = super::extension_of(name);
    if !ext.is_empty()
        && (super::MEDIA_EXTENSIONS.contains(&ext.as_str())
            || super::SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
    {
        &name[..name.len() - ext.len()]
    } else {
        name
    }
}

fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches(['-', ' ']);
    SPACES_RE.replace_all(trimmed, " ").trim().to_string()
}

fn parse_source(name: &str) -> Option<String> {
    let upper = name.to_uppercase();
    let source = if upper.contains("BLURAY") || upper.contains("BLU-RAY") || upper.contains("BDRIP") {
        "BluRay"
    } else if upper.contains("WEB-DL") || upper.contains("WEBDL") {
        "WEB-DL"
    } else if upper.contains("WEBRIP") {
        "WEBRip"
    } else if upper.contains("HDTV") {
        "HDTV"
    } else if upper.contains("REMUX") {
        "Remux"
    } else {
        return None;
    };
    Some(source.to_string())
}

fn parse_codec(name: &str) -> Option<String> {
    let upper = name.to_uppercase();
    let codec = if upper.contains("X265") || upper.contains("H265") || upper.contains("H 265") || upper.contains("HEVC") {
        "HEVC"
    } else if upper.contains("X264") || upper.contains("H264") || upper.contains("H 264") || upper.contains("AVC") {
        "H.264"
    } else if upper.contains("AV1") {
        "AV1"
    } else {
        return None;
    };
    Some(codec.to_string())
}
