//! The YAML settings document
//!
//! Only the fields the service reads are typed. Every section carries a
//! flattened map so that keys written by older versions, or by hand, survive
//! a load/save cycle untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::info;

/// Keys of a section that are not modelled
pub type Extra = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub media: MediaSection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraper_nfo: Option<Mapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraper_pic: Option<Mapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laboratory: Option<LaboratorySection>,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub message: MessageSection,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxies {
    pub http: Option<String>,
    pub https: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logserver: Option<String>,
    /// Accepts `3000` as well as `"3000"`
    #[serde(
        default,
        deserialize_with = "lenient_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub web_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_user: Option<String>,
    /// Stored as `[hash]<bcrypt>` once upgraded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmt_tmdbkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmt_match_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Proxies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallpaper: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A directory setting written either as a single string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathList {
    One(String),
    Many(Vec<String>),
}

impl PathList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            PathList::One(s) if s.is_empty() => Vec::new(),
            PathList::One(s) => vec![s.clone()],
            PathList::Many(v) => v.iter().filter(|s| !s.is_empty()).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_vec().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_path: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_path: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anime_path: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_path: Option<PathList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Hours between media server syncs; integer or numeric string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediasync_interval: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaboratorySection {
    #[serde(default)]
    pub search_keyword: bool,
    #[serde(default = "default_true")]
    pub tmdb_cache_expire: bool,
    #[serde(default = "default_true")]
    pub search_en_title: bool,
    #[serde(default)]
    pub chrome_browser: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for LaboratorySection {
    fn default() -> Self {
        Self {
            search_keyword: false,
            tmdb_cache_expire: true,
            search_en_title: true,
            chrome_browser: false,
            extra: Extra::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageSection {
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_true() -> bool {
    true
}

fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl AppSettings {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Failed to parse settings document")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize settings document")
    }

    /// Configured proxy for outbound requests to metadata sites
    pub fn proxy(&self) -> Option<&str> {
        self.app
            .proxies
            .as_ref()
            .and_then(|p| p.https.as_deref().or(p.http.as_deref()))
            .filter(|p| !p.is_empty())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.security
            .as_ref()
            .and_then(|s| s.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }

    pub fn web_port(&self) -> u16 {
        self.app.web_port.unwrap_or(3000)
    }

    /// Every configured library directory, movie, tv and anime in that order
    pub fn library_paths(&self) -> Vec<String> {
        [&self.media.movie_path, &self.media.tv_path, &self.media.anime_path]
            .into_iter()
            .flatten()
            .flat_map(PathList::to_vec)
            .collect()
    }
}

/// The settings document shared across the service
pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Read the document; a missing file yields the defaults
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            AppSettings::from_yaml(&text)?
        } else {
            info!(path = %path.display(), "Settings document not found, using defaults");
            AppSettings::default()
        };
        Ok(Self::new(path, settings))
    }

    pub fn new(path: impl Into<PathBuf>, settings: AppSettings) -> Self {
        Self {
            path: path.into(),
            inner: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> AppSettings {
        self.inner.read().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut AppSettings) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn replace(&self, settings: AppSettings) {
        *self.inner.write() = settings;
    }

    /// Write the current document to disk
    pub fn save(&self) -> Result<()> {
        let text = self.inner.read().to_yaml()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
app:
  web_port: "3001"
  login_user: admin
  theme: dark
media:
  movie_path: /data/movies
  tv_path:
    - /data/tv
    - /data/tv2
pt:
  ptsignin_cron: "08:00"
"#;

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let settings = AppSettings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.app.web_port, Some(3001));
        assert_eq!(settings.app.extra["theme"], Value::from("dark"));
        assert!(settings.extra.contains_key("pt"));

        let again = AppSettings::from_yaml(&settings.to_yaml().unwrap()).unwrap();
        assert_eq!(again.app.extra["theme"], Value::from("dark"));
        assert_eq!(
            again.extra["pt"]["ptsignin_cron"],
            Value::from("08:00")
        );
    }

    #[test]
    fn test_path_list_accepts_string_or_list() {
        let settings = AppSettings::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            settings.library_paths(),
            vec!["/data/movies", "/data/tv", "/data/tv2"]
        );
        assert!(settings.security.is_none());
        assert!(settings.laboratory.is_none());
    }

    #[test]
    fn test_store_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");
        let store = SettingsStore::load(&path).unwrap();
        store.update(|s| s.app.login_user = Some("root".to_string()));
        store.save().unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().app.login_user.as_deref(), Some("root"));
    }
}
