//! System, settings and file-manager actions

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use super::prelude::*;
use super::transfer::log_file_delete;
use crate::config::setters::{json_text, stored_password};
use crate::config::{DirectoryKey, DirectoryOp, SettingKey};
use crate::media::paths::normpath;
use crate::services::MediaInfo;
use crate::services::auth::hash_password;
use crate::services::message::render_message_html;
use crate::services::subtitle::SubtitleItem;
use crate::services::system::{PathFilter, delete_media_file, find_hardlinks, list_sub_path, unpack_backup};

/// Hosts `net_test` may reach
pub const NET_TEST_TARGETS: &[&str] = &[
    "www.themoviedb.org",
    "api.themoviedb.org",
    "api.tmdb.org",
    "image.tmdb.org",
    "webservice.fanart.tv",
    "api.telegram.org",
    "qyapi.weixin.qq.com",
    "www.opensubtitles.org",
];

/// Hosts reached through the configured proxy
const PROXIED_MARKERS: &[&str] = &["themoviedb", "telegram", "fanart", "tmdb"];

const PROGRESS_PLACEHOLDER: &str = "processing...";

#[derive(Debug, Deserialize)]
pub struct LoggingRequest {
    #[serde(default, deserialize_with = "params::flag")]
    pub refresh_new: bool,
}

/// `update_config` posts a flat map of dotted keys plus an optional `test` flag
#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDirectoryRequest {
    #[serde(default)]
    pub oper: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub replace_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    #[serde(default)]
    pub target: String,
}

/// What `test_connection` checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Metadata,
    MediaServer,
    Message(String),
}

impl ConnectionTarget {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "metadata" => Some(Self::Metadata),
            "mediaserver" => Some(Self::MediaServer),
            other => other
                .strip_prefix("message:")
                .filter(|kind| !kind.is_empty())
                .map(|kind| Self::Message(kind.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserManagerRequest {
    #[serde(default)]
    pub oper: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "params::string_list")]
    pub pris: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshMessageRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub lst_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshProcessRequest {
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct CacheKeyRequest {
    #[serde(default)]
    pub cache_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ModifyCacheRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
}

/// The page sends the bare host; `{target}` is accepted too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NetTestRequest {
    Host(String),
    Target { target: String },
}

impl NetTestRequest {
    fn host(&self) -> &str {
        match self {
            NetTestRequest::Host(host) | NetTestRequest::Target { target: host } => host,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RestoreBackupRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubPathRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub dir: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameFileRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FilesRequest {
    #[serde(default, deserialize_with = "params::string_list")]
    pub files: Vec<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubtitleRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomMessageRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "params::id_list")]
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserScriptRequest {
    #[serde(default)]
    pub javascript: Option<String>,
    #[serde(default)]
    pub css: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SystemConfigRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// `https://` url requested for a target host
fn net_test_url(host: &str) -> String {
    let path = match host {
        "image.tmdb.org" => "/t/p/w500/wwemzKWzjKYJFfCeiB57q3r4Bcm.png",
        "qyapi.weixin.qq.com" => "/cgi-bin/message/send",
        _ => "",
    };
    format!("https://{}{}", host, path)
}

/// Directory searched for hardlinks when the page gives none: the first
/// level below the root shared by every file
fn hardlink_search_dir(files: &[String]) -> Option<String> {
    let first = files.first()?;
    let top = first.trim_start_matches('/').split('/').next()?;
    if top.is_empty() {
        return None;
    }
    let prefix = format!("/{}", top);
    files
        .iter()
        .all(|f| f == &prefix || f.starts_with(&format!("{}/", prefix)))
        .then_some(prefix)
}

impl WebActions {
    pub(super) fn logging(&self, req: LoggingRequest) -> ActionResult {
        Ok(ActionReply::ok().field("loglist", self.log_buffer.lines(req.refresh_new)))
    }

    pub(super) fn restart(&self) -> ActionResult {
        info!("Restart requested, shutting down");
        self.shutdown.cancel();
        Ok(ActionReply::ok())
    }

    /// Forget the recorded schema version; it is written again on the next start
    pub(super) async fn reset_db_version(&self) -> ActionResult {
        match self.db.drop_table("SCHEMA_VERSION").await {
            Ok(()) => Ok(ActionReply::ok()),
            Err(e) => {
                error!(error = %e, "Failed to reset schema version");
                Ok(ActionReply::with_code(1).msg(e.to_string()))
            }
        }
    }

    pub(super) fn logout(&self, session: Option<&str>) -> ActionResult {
        if let Some(token) = session
            && self.sessions.revoke(token)
        {
            debug!("Session revoked");
        }
        Ok(ActionReply::ok())
    }

    pub(super) async fn update_config(&self, req: UpdateConfigRequest) -> ActionResult {
        let mut test = false;
        let mut changes = Vec::with_capacity(req.values.len());
        for (key, value) in req.values {
            if key == "test" {
                test = params::to_bool(&value);
                continue;
            }
            let key = SettingKey::parse(&key).map_err(|e| ActionError::invalid(e.to_string()))?;
            changes.push((key, value));
        }

        // bcrypt is slow; hash before any settings lock is taken
        for (key, value) in changes.iter_mut() {
            if *key == SettingKey::AppLoginPassword {
                let text = json_text(value);
                let stored = tokio::task::spawn_blocking(move || stored_password(text.as_deref()))
                    .await
                    .map_err(anyhow::Error::from)??;
                *value = Value::String(stored);
            }
        }

        // Nothing is applied unless every key is accepted
        let mut settings = self.settings.snapshot();
        changes
            .iter()
            .try_for_each(|(key, value)| settings.apply(key, value))
            .map_err(|e| ActionError::invalid(e.to_string()))?;
        self.settings.replace(settings);

        if !test {
            self.settings.save()?;
            info!(keys = changes.len(), "Settings saved");
        }
        Ok(ActionReply::ok())
    }

    pub(super) fn update_directory(&self, req: UpdateDirectoryRequest) -> ActionResult {
        let key = DirectoryKey::parse(&req.key).map_err(|e| ActionError::invalid(e.to_string()))?;
        let value = req.value.unwrap_or_default();
        let op = DirectoryOp::parse(&req.oper, &value, req.replace_value.as_deref())
            .map_err(|e| ActionError::invalid(e.to_string()))?;
        self.settings.update(|settings| settings.apply_directory(key, &op));
        self.settings.save()?;
        Ok(ActionReply::ok())
    }

    pub(super) async fn test_connection(&self, req: TestConnectionRequest) -> ActionResult {
        let Some(target) = ConnectionTarget::parse(&req.target) else {
            return Err(ActionError::invalid(format!("unknown target {}", req.target)));
        };
        let ok = match &target {
            ConnectionTarget::Metadata => self.metadata.status().await,
            ConnectionTarget::MediaServer => self.media_sync.server().status().await,
            ConnectionTarget::Message(kind) => {
                let config = self
                    .messages
                    .clients()
                    .into_iter()
                    .find(|c| &c.kind == kind)
                    .map(|c| c.config)
                    .unwrap_or_else(|| json!({}));
                self.messages.status(kind, &config).await
            }
        };
        debug!(target = %req.target, ok, "Connection tested");
        Ok(ActionReply::with_code(if ok { 0 } else { 1 }))
    }

    pub(super) async fn user_manager(&self, req: UserManagerRequest) -> ActionResult {
        let users = self.db.users();
        let done = match req.oper.as_str() {
            "add" => {
                if req.name.is_empty() {
                    return Err(ActionError::invalid("user name is required"));
                }
                let hash = hash_password(req.password.as_deref().unwrap_or_default())?;
                users.insert(&req.name, &hash, &req.pris.join(",")).await?
            }
            _ => users.delete(&req.name).await?,
        };
        if done {
            info!(user = %req.name, oper = %req.oper, "User updated");
            Ok(ActionReply::ok())
        } else {
            Ok(ActionReply::with_code(-1).msg("operation failed"))
        }
    }

    pub(super) fn refresh_message(&self, req: RefreshMessageRequest) -> ActionResult {
        let messages = self.message_center.list(req.lst_time.as_deref());
        let lst_time = messages.first().map(|m| m.time.clone()).or(req.lst_time);
        let html: Vec<String> = messages.iter().rev().map(render_message_html).collect();
        Ok(ActionReply::ok().field("message", html).field("lst_time", lst_time))
    }

    pub(super) fn refresh_process(&self, req: RefreshProcessRequest) -> ActionResult {
        match self.progress.get(&req.kind) {
            Some(progress) => Ok(ActionReply::ok()
                .field("value", progress.value)
                .field("text", progress.text)),
            None => Ok(ActionReply::with_code(1)
                .field("value", 0)
                .field("text", PROGRESS_PLACEHOLDER)),
        }
    }

    pub(super) fn delete_tmdb_cache(&self, req: CacheKeyRequest) -> ActionResult {
        if self.meta_cache.delete(&req.cache_key) {
            self.meta_cache.save(false)?;
            Ok(ActionReply::ok())
        } else {
            Ok(ActionReply::with_code(1).msg("cache entry not found"))
        }
    }

    pub(super) fn modify_tmdb_cache(&self, req: ModifyCacheRequest) -> ActionResult {
        if self.meta_cache.modify_title(&req.key, &req.title) {
            self.meta_cache.save(true)?;
        }
        Ok(ActionReply::ok())
    }

    pub(super) fn clear_tmdb_cache(&self) -> ActionResult {
        match self.meta_cache.clear_and_remove() {
            Ok(()) => Ok(ActionReply::ok()),
            Err(e) => {
                error!(error = %e, "Failed to clear metadata cache");
                Ok(ActionReply::ok().msg(e.to_string()))
            }
        }
    }

    pub(super) async fn net_test(&self, req: NetTestRequest) -> ActionResult {
        let host = req.host();
        if !NET_TEST_TARGETS.contains(&host) {
            return Err(ActionError::invalid(format!("{} is not a test target", host)));
        }
        let url = net_test_url(host);

        let proxy = self.settings.snapshot().proxy().map(str::to_string);
        let client = match proxy.filter(|_| PROXIED_MARKERS.iter().any(|m| host.contains(m))) {
            Some(proxy) => reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .proxy(reqwest::Proxy::all(&proxy).map_err(|e| ActionError::invalid(e.to_string()))?)
                .build()
                .map_err(anyhow::Error::from)?,
            None => self.http.clone(),
        };

        let started = Instant::now();
        let res = match client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url = %url, error = %e, "Network test failed");
                false
            }
        };
        let elapsed = started.elapsed().as_millis();
        Ok(ActionReply::ok()
            .field("res", res)
            .field("time", format!("{} ms", elapsed)))
    }

    pub(super) fn restory_backup(&self, req: RestoreBackupRequest) -> ActionResult {
        let Some(name) = req.file_name else {
            return Err(ActionError::failed("file does not exist"));
        };
        let archive = Path::new(&self.config.temp_path).join(&name);
        let result = unpack_backup(&archive, &self.config.config_dir());
        if archive.exists()
            && let Err(e) = std::fs::remove_file(&archive)
        {
            warn!(file = %archive.display(), error = %e, "Failed to remove backup archive");
        }
        match result {
            Ok(count) => {
                info!(files = count, "Backup restored");
                Ok(ActionReply::ok().msg(""))
            }
            Err(e) => {
                error!(error = format!("{:#}", e), "Failed to restore backup");
                Err(ActionError::failed(e.to_string()))
            }
        }
    }

    pub(super) fn start_mediasync(&self) -> ActionResult {
        let media_sync = self.media_sync.clone();
        let progress = self.progress.clone();
        tokio::spawn(async move {
            progress.start("mediasync");
            if let Err(e) = media_sync.sync().await {
                error!(error = %e, "Media server sync failed");
            }
            progress.end("mediasync");
        });
        Ok(ActionReply::ok())
    }

    pub(super) async fn mediasync_state(&self) -> ActionResult {
        let text = match self.media_sync.status().await? {
            Some(status) => format!(
                "movies: {}, tv: {}, synced at: {}",
                status.movie_count, status.tv_count, status.update_time
            ),
            None => "not synced".to_string(),
        };
        Ok(ActionReply::ok().field("text", text))
    }

    pub(super) fn get_sub_path(&self, req: SubPathRequest) -> ActionResult {
        let filter = PathFilter::parse(req.filter.as_deref());
        match list_sub_path(req.dir.as_deref(), filter) {
            Ok(entries) => Ok(ActionReply::ok().field("count", entries.len()).field("data", entries)),
            Err(e) => {
                warn!(dir = ?req.dir, error = %e, "Failed to list directory");
                Ok(ActionReply::with_code(-1)
                    .msg(e.to_string())
                    .field("count", 0)
                    .field("data", Vec::<Value>::new()))
            }
        }
    }

    pub(super) fn rename_file(&self, req: RenameFileRequest) -> ActionResult {
        if req.path.is_empty() || req.name.is_empty() {
            return Ok(ActionReply::ok());
        }
        let from = Path::new(&req.path);
        let to = from.parent().unwrap_or_else(|| Path::new("/")).join(&req.name);
        std::fs::rename(from, &to).map_err(|e| ActionError::invalid(e.to_string()))?;
        info!(from = %req.path, to = %to.display(), "File renamed");
        Ok(ActionReply::ok())
    }

    pub(super) fn delete_files(&self, req: FilesRequest) -> ActionResult {
        for file in &req.files {
            let file = normpath(file);
            let path = Path::new(&file);
            let dir = path.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            log_file_delete(delete_media_file(&dir, &name));
        }
        Ok(ActionReply::ok())
    }

    pub(super) async fn download_subtitle(&self, req: SubtitleRequest) -> ActionResult {
        let words = self.words.process(&req.name, None);
        let mut media = MediaInfo::from_words(&req.name, words);
        media.tmdb = self.metadata.recognize(&media).await?;
        let Some(tmdb) = media.tmdb.as_ref() else {
            return Err(ActionError::invalid(format!("{}: no TMDB info", req.name)));
        };

        let file = Path::new(&req.path).with_extension("").to_string_lossy().to_string();
        let item = SubtitleItem {
            file,
            name: tmdb.title.clone(),
            tmdbid: Some(tmdb.id),
            season: media.meta.season,
            episode: media.meta.episode,
        };
        let (success, message) = self.subtitles.download(&[item]).await;
        Ok(ActionReply::with_code(if success { 0 } else { -1 }).msg(message))
    }

    pub(super) fn find_hardlinks(&self, req: FilesRequest) -> ActionResult {
        if req.files.is_empty() {
            return Ok(ActionReply::ok().field("data", json!({})));
        }
        let Some(dir) = req.dir.or_else(|| hardlink_search_dir(&req.files)) else {
            return Ok(ActionReply::ok().field("data", json!({})));
        };

        let mut links = BTreeMap::new();
        for file in &req.files {
            let path = Path::new(file);
            let found = find_hardlinks(path, Path::new(&dir)).map_err(|e| {
                error!(file = %file, error = %e, "Hardlink search failed");
                ActionError::failed(e.to_string())
            })?;
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            links.insert(name, found);
        }
        Ok(ActionReply::ok().field("data", links))
    }

    pub(super) async fn send_custom_message(&self, req: CustomMessageRequest) -> ActionResult {
        let ids = (!req.ids.is_empty()).then_some(req.ids.as_slice());
        let deliveries = self
            .messages
            .send_custom_message(ids, &req.title, req.text.as_deref().unwrap_or_default(), req.image.as_deref())
            .await;
        Ok(ActionReply::ok().field("result", deliveries))
    }

    pub(super) async fn save_user_script(&self, req: UserScriptRequest) -> ActionResult {
        let dict = self.db.system_dict();
        dict.set("CustomScript", "javascript", req.javascript.as_deref().unwrap_or_default())
            .await?;
        dict.set("CustomScript", "css", req.css.as_deref().unwrap_or_default())
            .await?;
        Ok(ActionReply::ok().msg("saved"))
    }

    pub(super) async fn set_system_config(&self, req: SystemConfigRequest) -> ActionResult {
        let Some(key) = req.key else {
            return Err(ActionError::failed("key is required"));
        };
        let value = match req.value {
            Value::Null => return Err(ActionError::failed("value is required")),
            Value::String(s) if s.is_empty() => return Err(ActionError::failed("value is required")),
            Value::String(s) => s,
            other => other.to_string(),
        };
        self.db.system_dict().set("SystemConfig", &key, &value).await?;
        Ok(ActionReply::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connection_target_parse() {
        assert_eq!(ConnectionTarget::parse("metadata"), Some(ConnectionTarget::Metadata));
        assert_eq!(
            ConnectionTarget::parse("message:telegram"),
            Some(ConnectionTarget::Message("telegram".to_string()))
        );
        assert_eq!(ConnectionTarget::parse("message:"), None);
        assert_eq!(ConnectionTarget::parse("app.mediaserver|Emby"), None);
    }

    #[test]
    fn test_net_test_urls() {
        assert_eq!(net_test_url("api.tmdb.org"), "https://api.tmdb.org");
        assert_eq!(
            net_test_url("qyapi.weixin.qq.com"),
            "https://qyapi.weixin.qq.com/cgi-bin/message/send"
        );
    }

    #[test]
    fn test_net_test_request_shapes() {
        let bare: NetTestRequest = serde_json::from_value(json!("api.tmdb.org")).unwrap();
        assert_eq!(bare.host(), "api.tmdb.org");
        let wrapped: NetTestRequest = serde_json::from_value(json!({"target": "image.tmdb.org"})).unwrap();
        assert_eq!(wrapped.host(), "image.tmdb.org");
    }

    #[test]
    fn test_hardlink_search_dir() {
        let files = vec!["/media/movies/a.mkv".to_string(), "/media/tv/b.mkv".to_string()];
        assert_eq!(hardlink_search_dir(&files), Some("/media".to_string()));
        let mixed = vec!["/media/a.mkv".to_string(), "/downloads/b.mkv".to_string()];
        assert_eq!(hardlink_search_dir(&mixed), None);
    }
}
