//! Typed mutations of the settings document
//!
//! Dotted keys such as `app.login_password` arrive from the web form. They are
//! parsed into a [`SettingKey`] once and every later step works on the enum.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};

use super::settings::{
    AppSettings, Extra, LaboratorySection, PathList, Proxies, SecuritySection,
};
use crate::services::auth::{HASH_PREFIX, hash_password};

/// Default admin password stored when the form submits an empty one
pub const DEFAULT_PASSWORD: &str = "password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingKey {
    AppLogType,
    AppLogPath,
    AppLogServer,
    AppWebPort,
    AppLoginUser,
    AppLoginPassword,
    AppSslCert,
    AppSslKey,
    AppTmdbKey,
    AppMatchMode,
    AppProxies,
    AppWallpaper,
    MediaServer,
    MediaMoviePath,
    MediaTvPath,
    MediaAnimePath,
    MediaUnknownPath,
    MediaCategory,
    MediaSyncInterval,
    SecurityApiKey,
    LaboratorySearchKeyword,
    LaboratoryTmdbCacheExpire,
    LaboratorySearchEnTitle,
    LaboratoryChromeBrowser,
    /// A key the document does not model, stored in the section's extra map
    Extra { section: String, path: Vec<String> },
}

impl SettingKey {
    /// Parse `section.field[.sub]`
    pub fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
            bail!("Unsupported setting key: {}", key);
        }

        let typed = match (parts[0], parts[1]) {
            ("app", "logtype") => Some(Self::AppLogType),
            ("app", "logpath") => Some(Self::AppLogPath),
            ("app", "logserver") => Some(Self::AppLogServer),
            ("app", "web_port") => Some(Self::AppWebPort),
            ("app", "login_user") => Some(Self::AppLoginUser),
            ("app", "login_password") => Some(Self::AppLoginPassword),
            ("app", "ssl_cert") => Some(Self::AppSslCert),
            ("app", "ssl_key") => Some(Self::AppSslKey),
            ("app", "rmt_tmdbkey") => Some(Self::AppTmdbKey),
            ("app", "rmt_match_mode") => Some(Self::AppMatchMode),
            ("app", "proxies") => Some(Self::AppProxies),
            ("app", "wallpaper") => Some(Self::AppWallpaper),
            ("media", "media_server") => Some(Self::MediaServer),
            ("media", "movie_path") => Some(Self::MediaMoviePath),
            ("media", "tv_path") => Some(Self::MediaTvPath),
            ("media", "anime_path") => Some(Self::MediaAnimePath),
            ("media", "unknown_path") => Some(Self::MediaUnknownPath),
            ("media", "category") => Some(Self::MediaCategory),
            ("media", "mediasync_interval") => Some(Self::MediaSyncInterval),
            ("security", "api_key") => Some(Self::SecurityApiKey),
            ("laboratory", "search_keyword") => Some(Self::LaboratorySearchKeyword),
            ("laboratory", "tmdb_cache_expire") => Some(Self::LaboratoryTmdbCacheExpire),
            ("laboratory", "search_en_title") => Some(Self::LaboratorySearchEnTitle),
            ("laboratory", "chrome_browser") => Some(Self::LaboratoryChromeBrowser),
            _ => None,
        };

        match typed {
            Some(_) if parts.len() == 3 => bail!("Setting {} has no sub keys", key),
            Some(k) => Ok(k),
            None => Ok(Self::Extra {
                section: parts[0].to_string(),
                path: parts[1..].iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

impl FromStr for SettingKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AppLogType => "app.logtype",
            Self::AppLogPath => "app.logpath",
            Self::AppLogServer => "app.logserver",
            Self::AppWebPort => "app.web_port",
            Self::AppLoginUser => "app.login_user",
            Self::AppLoginPassword => "app.login_password",
            Self::AppSslCert => "app.ssl_cert",
            Self::AppSslKey => "app.ssl_key",
            Self::AppTmdbKey => "app.rmt_tmdbkey",
            Self::AppMatchMode => "app.rmt_match_mode",
            Self::AppProxies => "app.proxies",
            Self::AppWallpaper => "app.wallpaper",
            Self::MediaServer => "media.media_server",
            Self::MediaMoviePath => "media.movie_path",
            Self::MediaTvPath => "media.tv_path",
            Self::MediaAnimePath => "media.anime_path",
            Self::MediaUnknownPath => "media.unknown_path",
            Self::MediaCategory => "media.category",
            Self::MediaSyncInterval => "media.mediasync_interval",
            Self::SecurityApiKey => "security.api_key",
            Self::LaboratorySearchKeyword => "laboratory.search_keyword",
            Self::LaboratoryTmdbCacheExpire => "laboratory.tmdb_cache_expire",
            Self::LaboratorySearchEnTitle => "laboratory.search_en_title",
            Self::LaboratoryChromeBrowser => "laboratory.chrome_browser",
            Self::Extra { section, path } => {
                return write!(f, "{}.{}", section, path.join("."));
            }
        };
        f.write_str(s)
    }
}

/// Library directory lists editable from the directory page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKey {
    MoviePath,
    TvPath,
    AnimePath,
    UnknownPath,
}

impl DirectoryKey {
    pub fn parse(key: &str) -> Result<Self> {
        match key {
            "media.movie_path" | "movie_path" => Ok(Self::MoviePath),
            "media.tv_path" | "tv_path" => Ok(Self::TvPath),
            "media.anime_path" | "anime_path" => Ok(Self::AnimePath),
            "media.unknown_path" | "unknown_path" => Ok(Self::UnknownPath),
            other => Err(anyhow!("Unsupported directory key: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOp {
    Add(String),
    Sub(String),
    Set { old: String, new: String },
}

impl DirectoryOp {
    /// Build from the form's `oper` plus value fields
    pub fn parse(oper: &str, value: &str, replace_value: Option<&str>) -> Result<Self> {
        match oper {
            "add" => Ok(Self::Add(value.to_string())),
            "sub" => Ok(Self::Sub(value.to_string())),
            "set" => Ok(Self::Set {
                old: replace_value.unwrap_or_default().to_string(),
                new: value.to_string(),
            }),
            other => Err(anyhow!("Unsupported directory operation: {}", other)),
        }
    }
}

/// Text form of a submitted value; null and empty strings are "unset"
pub fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn json_bool(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        JsonValue::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        _ => false,
    }
}

fn json_paths(value: &JsonValue) -> Option<PathList> {
    match value {
        JsonValue::Array(items) => {
            let paths: Vec<String> = items.iter().filter_map(json_text).collect();
            (!paths.is_empty()).then_some(PathList::Many(paths))
        }
        other => json_text(other).map(PathList::One),
    }
}

/// `[hash]` form of a submitted password
pub fn stored_password(value: Option<&str>) -> Result<String> {
    match value.filter(|v| !v.is_empty()) {
        Some(v) if v.starts_with(HASH_PREFIX) => Ok(v.to_string()),
        Some(v) => Ok(format!("{}{}", HASH_PREFIX, hash_password(v)?)),
        None => Ok(format!("{}{}", HASH_PREFIX, hash_password(DEFAULT_PASSWORD)?)),
    }
}

/// Proxy urls get an `http://` scheme unless one is present
pub fn normalize_proxy(value: &str) -> String {
    if value.starts_with("http") || value.starts_with("sock") {
        value.to_string()
    } else {
        format!("http://{}", value)
    }
}

fn set_nested(map: &mut Extra, path: &[String], value: Value) {
    match path.split_first() {
        None => {}
        Some((leaf, [])) => {
            map.insert(leaf.clone(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.clone())
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            if let Value::Mapping(inner) = entry {
                set_in_mapping(inner, rest, value);
            }
        }
    }
}

fn set_in_mapping(map: &mut Mapping, path: &[String], value: Value) {
    match path.split_first() {
        None => {}
        Some((leaf, [])) => {
            map.insert(Value::from(leaf.as_str()), value);
        }
        Some((head, rest)) => {
            let key = Value::from(head.as_str());
            if !map.get(&key).is_some_and(Value::is_mapping) {
                map.insert(key.clone(), Value::Mapping(Mapping::new()));
            }
            if let Some(Value::Mapping(inner)) = map.get_mut(&key) {
                set_in_mapping(inner, rest, value);
            }
        }
    }
}

fn normalize_dir(value: &str) -> String {
    value.replace('\\', "/")
}

/// Part before the `@` suffix, compared with forward slashes
fn dir_identity(value: &str) -> String {
    normalize_dir(value.split('@').next().unwrap_or_default())
}

impl AppSettings {
    /// Apply one submitted form value
    pub fn apply(&mut self, key: &SettingKey, value: &JsonValue) -> Result<()> {
        let text = json_text(value);
        match key {
            SettingKey::AppLogType => self.app.logtype = text,
            SettingKey::AppLogPath => self.app.logpath = text,
            SettingKey::AppLogServer => self.app.logserver = text,
            SettingKey::AppWebPort => {
                self.app.web_port = match text {
                    Some(t) => Some(t.trim().parse().map_err(|_| anyhow!("Invalid web port: {}", t))?),
                    None => None,
                }
            }
            SettingKey::AppLoginUser => self.app.login_user = text,
            SettingKey::AppLoginPassword => {
                self.app.login_password = Some(stored_password(text.as_deref())?)
            }
            SettingKey::AppSslCert => self.app.ssl_cert = text,
            SettingKey::AppSslKey => self.app.ssl_key = text,
            SettingKey::AppTmdbKey => self.app.rmt_tmdbkey = text,
            SettingKey::AppMatchMode => self.app.rmt_match_mode = text,
            SettingKey::AppProxies => {
                let proxy = text.map(|t| normalize_proxy(&t));
                self.app.proxies = Some(Proxies {
                    http: proxy.clone(),
                    https: proxy,
                });
            }
            SettingKey::AppWallpaper => self.app.wallpaper = text,
            SettingKey::MediaServer => self.media.media_server = text,
            SettingKey::MediaMoviePath => self.media.movie_path = json_paths(value),
            SettingKey::MediaTvPath => self.media.tv_path = json_paths(value),
            SettingKey::MediaAnimePath => self.media.anime_path = json_paths(value),
            SettingKey::MediaUnknownPath => self.media.unknown_path = json_paths(value),
            SettingKey::MediaCategory => self.media.category = text,
            SettingKey::MediaSyncInterval => {
                self.media.mediasync_interval = text.map(Value::from);
            }
            SettingKey::SecurityApiKey => {
                self.security.get_or_insert_with(SecuritySection::default).api_key = text;
            }
            SettingKey::LaboratorySearchKeyword => {
                self.laboratory_mut().search_keyword = json_bool(value)
            }
            SettingKey::LaboratoryTmdbCacheExpire => {
                self.laboratory_mut().tmdb_cache_expire = json_bool(value)
            }
            SettingKey::LaboratorySearchEnTitle => {
                self.laboratory_mut().search_en_title = json_bool(value)
            }
            SettingKey::LaboratoryChromeBrowser => {
                self.laboratory_mut().chrome_browser = json_bool(value)
            }
            SettingKey::Extra { section, path } => {
                let value = serde_yaml::to_value(value)?;
                self.apply_extra(section, path, value);
            }
        }
        Ok(())
    }

    fn laboratory_mut(&mut self) -> &mut LaboratorySection {
        self.laboratory.get_or_insert_with(LaboratorySection::default)
    }

    fn apply_extra(&mut self, section: &str, path: &[String], value: Value) {
        match section {
            "app" => set_nested(&mut self.app.extra, path, value),
            "media" => set_nested(&mut self.media.extra, path, value),
            "security" => set_nested(
                &mut self.security.get_or_insert_with(SecuritySection::default).extra,
                path,
                value,
            ),
            "laboratory" => set_nested(&mut self.laboratory_mut().extra, path, value),
            "sync" => set_nested(&mut self.sync.extra, path, value),
            "message" => set_nested(&mut self.message.extra, path, value),
            "scraper_nfo" => set_in_mapping(
                self.scraper_nfo.get_or_insert_with(Mapping::new),
                path,
                value,
            ),
            "scraper_pic" => set_in_mapping(
                self.scraper_pic.get_or_insert_with(Mapping::new),
                path,
                value,
            ),
            other => {
                let mut full = Vec::with_capacity(path.len() + 1);
                full.push(other.to_string());
                full.extend(path.iter().cloned());
                set_nested(&mut self.extra, &full, value);
            }
        }
    }

    fn directory_mut(&mut self, key: DirectoryKey) -> &mut Option<PathList> {
        match key {
            DirectoryKey::MoviePath => &mut self.media.movie_path,
            DirectoryKey::TvPath => &mut self.media.tv_path,
            DirectoryKey::AnimePath => &mut self.media.anime_path,
            DirectoryKey::UnknownPath => &mut self.media.unknown_path,
        }
    }

    /// Add, remove or replace one entry of a library directory list
    pub fn apply_directory(&mut self, key: DirectoryKey, op: &DirectoryOp) {
        let slot = self.directory_mut(key);
        let mut paths = slot.as_ref().map(PathList::to_vec).unwrap_or_default();

        let remove = |paths: &mut Vec<String>, target: &str| {
            let target = dir_identity(target);
            paths.retain(|p| dir_identity(p) != target);
        };

        match op {
            DirectoryOp::Add(value) => {
                if !value.is_empty() {
                    paths.push(normalize_dir(value));
                }
            }
            DirectoryOp::Sub(value) => remove(&mut paths, value),
            DirectoryOp::Set { old, new } => {
                remove(&mut paths, old);
                if !new.is_empty() {
                    paths.push(normalize_dir(new));
                }
            }
        }

        *slot = if paths.is_empty() {
            None
        } else {
            Some(PathList::Many(paths))
        };
    }
}
