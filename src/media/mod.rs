//! Media classification, transfer modes and file-type tables

pub mod filename;
pub mod organizer;
pub mod paths;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use filename::MetaInfo;
pub use organizer::MediaOrganizer;

/// Video container extensions handled by transfers and directory sweeps
pub const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".ts", ".iso", ".rmvb", ".avi", ".mov", ".mpeg", ".mpg", ".wmv", ".3gp",
    ".asf", ".m4v", ".flv", ".m2ts", ".strm",
];

/// Subtitle extensions carried along with their video
pub const SUBTITLE_EXTENSIONS: &[&str] = &[".srt", ".ass", ".ssa"];

/// Lower-cased extension of a path including the leading dot, or empty
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Whether the path names a video file
pub fn is_media_file(path: &str) -> bool {
    MEDIA_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Whether the path names a subtitle file
pub fn is_subtitle_file(path: &str) -> bool {
    SUBTITLE_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Broad media category used for library placement and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Anime,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Anime => "anime",
        }
    }

    /// Classify a loosely typed request value. Unrecognized values fall back to anime.
    pub fn from_request(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("MOV") | Some("电影") | Some("movie") | Some("Movie") => MediaType::Movie,
            Some("TV") | Some("电视剧") | Some("tv") | Some("Tv") => MediaType::Tv,
            _ => MediaType::Anime,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            "anime" => Ok(MediaType::Anime),
            other => Err(anyhow::anyhow!("Unknown media type: {}", other)),
        }
    }
}

/// File placement strategy for a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RmtMode {
    Copy,
    Link,
    Softlink,
    Move,
    Rclone,
    RcloneCopy,
    Minio,
    MinioCopy,
}

impl RmtMode {
    pub const ALL: &'static [RmtMode] = &[
        RmtMode::Copy,
        RmtMode::Link,
        RmtMode::Softlink,
        RmtMode::Move,
        RmtMode::Rclone,
        RmtMode::RcloneCopy,
        RmtMode::Minio,
        RmtMode::MinioCopy,
    ];

    /// Modes available without remote-storage tooling
    pub const LITE: &'static [RmtMode] = &[
        RmtMode::Copy,
        RmtMode::Link,
        RmtMode::Softlink,
        RmtMode::Move,
    ];

    /// Stored key (`MODE` columns and request payloads)
    pub fn key(&self) -> &'static str {
        match self {
            RmtMode::Copy => "copy",
            RmtMode::Link => "link",
            RmtMode::Softlink => "softlink",
            RmtMode::Move => "move",
            RmtMode::Rclone => "rclone",
            RmtMode::RcloneCopy => "rclonecopy",
            RmtMode::Minio => "minio",
            RmtMode::MinioCopy => "miniocopy",
        }
    }

    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            RmtMode::Copy => "Copy",
            RmtMode::Link => "Hardlink",
            RmtMode::Softlink => "Symlink",
            RmtMode::Move => "Move",
            RmtMode::Rclone => "Rclone move",
            RmtMode::RcloneCopy => "Rclone copy",
            RmtMode::Minio => "MinIO move",
            RmtMode::MinioCopy => "MinIO copy",
        }
    }

    /// Parse a stored key or display name
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        RmtMode::ALL
            .iter()
            .copied()
            .find(|m| m.key().eq_ignore_ascii_case(value) || m.label() == value)
    }
}

impl fmt::Display for RmtMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_request() {
        assert_eq!(MediaType::from_request(Some("MOV")), MediaType::Movie);
        assert_eq!(MediaType::from_request(Some("电影")), MediaType::Movie);
        assert_eq!(MediaType::from_request(Some("TV")), MediaType::Tv);
        assert_eq!(MediaType::from_request(Some("电视剧")), MediaType::Tv);
        assert_eq!(MediaType::from_request(Some("ANI")), MediaType::Anime);
        assert_eq!(MediaType::from_request(None), MediaType::Anime);
    }

    #[test]
    fn test_rmt_mode_parse() {
        assert_eq!(RmtMode::parse("link"), Some(RmtMode::Link));
        assert_eq!(RmtMode::parse("Hardlink"), Some(RmtMode::Link));
        assert_eq!(RmtMode::parse("RcloneCopy"), Some(RmtMode::RcloneCopy));
        assert_eq!(RmtMode::parse("teleport"), None);
    }

    #[test]
    fn test_extension_tables() {
        assert!(is_media_file("/downloads/Show.S01E01.MKV"));
        assert!(!is_media_file("/downloads/Show.S01E01.nfo"));
        assert!(is_subtitle_file("a.chs.ass"));
        assert_eq!(extension_of("noext"), "");
    }
}
