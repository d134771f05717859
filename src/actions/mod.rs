//! Web action dispatch
//!
//! The admin page posts `{cmd, data}` pairs. `cmd` is parsed once into a
//! [`Command`], `data` is decoded into the handler's request struct, and the
//! handler's [`ActionReply`] (or [`ActionError`]) is rendered into the
//! `{code, msg, ...}` object the page expects. The same handlers back the
//! api-key endpoint through [`WebActions::api_action`].

pub mod error;
pub mod params;

mod filters;
mod messages;
mod queries;
mod sync_paths;
mod system;
mod transfer;
mod words;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::{Config, SettingsStore};
use crate::db::Database;
use crate::services::logging::LogBuffer;
use crate::services::mediaserver::{MediaServer, MediaSyncService, UnconfiguredMediaServer};
use crate::services::message::{MessageCenter, MessageChannel, MessageService, UnconfiguredChannel};
use crate::services::meta_cache::MetaCache;
use crate::services::metadata::{MetadataProvider, UnconfiguredMetadata};
use crate::services::subtitle::{SubtitleProvider, UnconfiguredSubtitles};
use crate::services::transfer::{FileTransfer, LocalFileTransfer};
use crate::services::{ProgressRegistry, RuleFilter, SessionStore, SyncService, WordsEngine};

pub use error::ActionError;

pub type ActionResult = std::result::Result<ActionReply, ActionError>;

macro_rules! define_commands {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Every action the web page can request
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Command {
            $($variant),+
        }

        impl Command {
            pub const ALL: &'static [Command] = &[$(Command::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Command::$variant => $name),+
                }
            }
        }

        impl FromStr for Command {
            type Err = ActionError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Command::$variant),)+
                    _ => Err(ActionError::Unauthorized),
                }
            }
        }
    };
}

define_commands! {
    Sch => "sch",
    DelUnknownPath => "del_unknown_path",
    Rename => "rename",
    RenameUdf => "rename_udf",
    DeleteHistory => "delete_history",
    Logging => "logging",
    Restart => "restart",
    ResetDbVersion => "reset_db_version",
    Logout => "logout",
    UpdateConfig => "update_config",
    UpdateDirectory => "update_directory",
    AddOrEditSyncPath => "add_or_edit_sync_path",
    GetSyncPath => "get_sync_path",
    DeleteSyncPath => "delete_sync_path",
    CheckSyncPath => "check_sync_path",
    ReIdentification => "re_identification",
    TestConnection => "test_connection",
    UserManager => "user_manager",
    RefreshMessage => "refresh_message",
    DeleteTmdbCache => "delete_tmdb_cache",
    ModifyTmdbCache => "modify_tmdb_cache",
    TruncateBlacklist => "truncate_blacklist",
    NameTest => "name_test",
    RuleTest => "rule_test",
    NetTest => "net_test",
    AddFilterGroup => "add_filtergroup",
    RestoreFilterGroup => "restore_filtergroup",
    SetDefaultFilterGroup => "set_default_filtergroup",
    DelFilterGroup => "del_filtergroup",
    AddFilterRule => "add_filterrule",
    DelFilterRule => "del_filterrule",
    FilterRuleDetail => "filterrule_detail",
    ClearTmdbCache => "clear_tmdb_cache",
    RefreshProcess => "refresh_process",
    RestoryBackup => "restory_backup",
    StartMediaSync => "start_mediasync",
    MediaSyncState => "mediasync_state",
    AddCustomWordGroup => "add_custom_word_group",
    DeleteCustomWordGroup => "delete_custom_word_group",
    AddOrEditCustomWord => "add_or_edit_custom_word",
    GetCustomWord => "get_custom_word",
    DeleteCustomWord => "delete_custom_word",
    CheckCustomWords => "check_custom_words",
    ExportCustomWords => "export_custom_words",
    AnalyseImportCustomWordsCode => "analyse_import_custom_words_code",
    ImportCustomWords => "import_custom_words",
    ShareFilterGroup => "share_filtergroup",
    ImportFilterGroup => "import_filtergroup",
    SearchMediaInfos => "search_media_infos",
    GetSubPath => "get_sub_path",
    RenameFile => "rename_file",
    DeleteFiles => "delete_files",
    DownloadSubtitle => "download_subtitle",
    UpdateMessageClient => "update_message_client",
    DeleteMessageClient => "delete_message_client",
    CheckMessageClient => "check_message_client",
    GetMessageClient => "get_message_client",
    TestMessageClient => "test_message_client",
    FindHardlinks => "find_hardlinks",
    SendCustomMessage => "send_custom_message",
    SaveUserScript => "save_user_script",
    SetSystemConfig => "set_system_config",
    GetTransferHistory => "get_transfer_history",
    GetUnknownList => "get_unknown_list",
    GetCustomWords => "get_customwords",
    GetDirectorySync => "get_directorysync",
    GetUsers => "get_users",
    GetFilterRules => "get_filterrules",
    GetTransferStatistics => "get_transfer_statistics",
    GetLibrarySpaceSize => "get_library_spacesize",
    GetLibraryMediaCount => "get_library_mediacount",
    GetLibraryPlayHistory => "get_library_playhistory",
    GetRmtModes => "get_rmt_modes",
}

/// Successful action result: a code, an optional message and extra fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionReply {
    code: i64,
    msg: Option<String>,
    fields: Map<String, Value>,
}

impl ActionReply {
    pub fn ok() -> Self {
        Self::default()
    }

    /// A reply that carries a non-zero code without being an error
    pub fn with_code(code: i64) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn into_value(self) -> Value {
        let mut out = Map::new();
        out.insert("code".to_string(), Value::from(self.code));
        if let Some(msg) = self.msg {
            out.insert("msg".to_string(), Value::from(msg));
        }
        out.extend(self.fields);
        Value::Object(out)
    }
}

/// Reply shape of the api-key endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiEnvelope {
    pub code: i64,
    pub success: bool,
    pub message: String,
    pub data: Value,
}

impl ApiEnvelope {
    /// Wrap a rendered action reply. `retcode`/`retmsg` are accepted as
    /// aliases of `code`/`msg`; every other key moves into `data`.
    pub fn from_reply(reply: Value) -> Self {
        let Value::Object(mut fields) = reply else {
            return Self {
                code: -1,
                success: false,
                message: "service error, no result returned".to_string(),
                data: Value::Null,
            };
        };
        let code = fields
            .remove("code")
            .or_else(|| fields.remove("retcode"))
            .and_then(|c| c.as_i64())
            .unwrap_or(0);
        let message = fields
            .remove("msg")
            .or_else(|| fields.remove("retmsg"))
            .and_then(|m| m.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            code,
            success: code == 0,
            message,
            data: Value::Object(fields),
        }
    }
}

/// External collaborators; every one defaults to its unconfigured stand-in
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataProvider>,
    pub media_server: Arc<dyn MediaServer>,
    pub channel: Arc<dyn MessageChannel>,
    pub subtitles: Arc<dyn SubtitleProvider>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            metadata: Arc::new(UnconfiguredMetadata),
            media_server: Arc::new(UnconfiguredMediaServer),
            channel: Arc::new(UnconfiguredChannel),
            subtitles: Arc::new(UnconfiguredSubtitles),
        }
    }
}

/// Handlers for every [`Command`] plus the services they share
pub struct WebActions {
    pub db: Database,
    pub config: Arc<Config>,
    pub settings: Arc<SettingsStore>,
    pub words: Arc<WordsEngine>,
    pub filter: Arc<RuleFilter>,
    pub sync: Arc<SyncService>,
    pub messages: Arc<MessageService>,
    pub message_center: Arc<MessageCenter>,
    pub meta_cache: Arc<MetaCache>,
    pub progress: Arc<ProgressRegistry>,
    pub log_buffer: LogBuffer,
    pub transfer: Arc<dyn FileTransfer>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub media_sync: MediaSyncService,
    pub subtitles: Arc<dyn SubtitleProvider>,
    pub sessions: Arc<SessionStore>,
    pub shutdown: CancellationToken,
    http: reqwest::Client,
}

impl WebActions {
    pub fn new(
        db: Database,
        config: Arc<Config>,
        settings: Arc<SettingsStore>,
        collaborators: Collaborators,
        log_buffer: LogBuffer,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let words = Arc::new(WordsEngine::new());
        let transfer: Arc<dyn FileTransfer> = Arc::new(LocalFileTransfer::new(
            db.clone(),
            settings.clone(),
            collaborators.metadata.clone(),
            words.clone(),
        ));
        let sync = Arc::new(SyncService::new(db.clone(), transfer.clone()));
        let meta_cache = Arc::new(MetaCache::load(std::path::Path::new(&config.meta_cache_path)));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            media_sync: MediaSyncService::new(db.clone(), collaborators.media_server),
            db,
            config,
            settings,
            words,
            filter: Arc::new(RuleFilter::new()),
            sync,
            messages: Arc::new(MessageService::new(collaborators.channel)),
            message_center: Arc::new(MessageCenter::new()),
            meta_cache,
            progress: Arc::new(ProgressRegistry::new()),
            log_buffer,
            transfer,
            metadata: collaborators.metadata,
            subtitles: collaborators.subtitles,
            sessions: Arc::new(SessionStore::default()),
            shutdown,
            http,
        })
    }

    /// Load every database-backed cache
    pub async fn reload_caches(&self) -> Result<()> {
        let words = self.words.reload(&self.db).await?;
        self.filter.reload(&self.db).await?;
        let sync_paths = self.sync.reload().await?;
        let clients = self.messages.reload(&self.db).await?;
        debug!(words, sync_paths, clients, "Caches loaded");
        Ok(())
    }

    /// Run a command by name and render the page reply
    pub async fn action(&self, name: &str, data: Value) -> Value {
        self.action_as(name, data, None).await
    }

    /// Like [`action`](Self::action), for a caller holding a session token
    pub async fn action_as(&self, name: &str, data: Value, session: Option<&str>) -> Value {
        let result = match Command::from_str(name) {
            Ok(command) => self.dispatch(command, data, session).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(reply) => reply.into_value(),
            Err(e) => {
                if let ActionError::Internal(inner) = &e {
                    error!(command = name, error = format!("{:#}", inner), "Action failed");
                } else {
                    debug!(command = name, error = %e, "Action rejected");
                }
                serde_json::json!({ "code": e.code(), "msg": e.to_string() })
            }
        }
    }

    pub async fn api_action(&self, name: &str, data: Value) -> ApiEnvelope {
        ApiEnvelope::from_reply(self.action(name, data).await)
    }

    async fn dispatch(&self, command: Command, data: Value, session: Option<&str>) -> ActionResult {
        debug!(command = command.as_str(), "Dispatching action");
        match command {
            Command::Sch => self.sch(decode(data)?).await,
            Command::DelUnknownPath => self.del_unknown_path(decode(data)?).await,
            Command::Rename => self.rename(decode(data)?).await,
            Command::RenameUdf => self.rename_udf(decode(data)?).await,
            Command::DeleteHistory => self.delete_history(decode(data)?).await,
            Command::ReIdentification => self.re_identification(decode(data)?).await,
            Command::TruncateBlacklist => self.truncate_blacklist().await,

            Command::Logging => self.logging(decode(data)?),
            Command::Restart => self.restart(),
            Command::ResetDbVersion => self.reset_db_version().await,
            Command::Logout => self.logout(session),
            Command::UpdateConfig => self.update_config(decode(data)?).await,
            Command::UpdateDirectory => self.update_directory(decode(data)?),
            Command::TestConnection => self.test_connection(decode(data)?).await,
            Command::UserManager => self.user_manager(decode(data)?).await,
            Command::RefreshMessage => self.refresh_message(decode(data)?),
            Command::RefreshProcess => self.refresh_process(decode(data)?),
            Command::DeleteTmdbCache => self.delete_tmdb_cache(decode(data)?),
            Command::ModifyTmdbCache => self.modify_tmdb_cache(decode(data)?),
            Command::ClearTmdbCache => self.clear_tmdb_cache(),
            Command::NetTest => self.net_test(decode(data)?).await,
            Command::RestoryBackup => self.restory_backup(decode(data)?),
            Command::StartMediaSync => self.start_mediasync(),
            Command::MediaSyncState => self.mediasync_state().await,
            Command::GetSubPath => self.get_sub_path(decode(data)?),
            Command::RenameFile => self.rename_file(decode(data)?),
            Command::DeleteFiles => self.delete_files(decode(data)?),
            Command::DownloadSubtitle => self.download_subtitle(decode(data)?).await,
            Command::FindHardlinks => self.find_hardlinks(decode(data)?),
            Command::SendCustomMessage => self.send_custom_message(decode(data)?).await,
            Command::SaveUserScript => self.save_user_script(decode(data)?).await,
            Command::SetSystemConfig => self.set_system_config(decode(data)?).await,

            Command::AddOrEditSyncPath => self.add_or_edit_sync_path(decode(data)?).await,
            Command::GetSyncPath => self.get_sync_path(decode(data)?).await,
            Command::DeleteSyncPath => self.delete_sync_path(decode(data)?).await,
            Command::CheckSyncPath => self.check_sync_path(decode(data)?).await,

            Command::AddFilterGroup => self.add_filtergroup(decode(data)?).await,
            Command::RestoreFilterGroup => self.restore_filtergroup(decode(data)?).await,
            Command::SetDefaultFilterGroup => self.set_default_filtergroup(decode(data)?).await,
            Command::DelFilterGroup => self.del_filtergroup(decode(data)?).await,
            Command::AddFilterRule => self.add_filterrule(decode(data)?).await,
            Command::DelFilterRule => self.del_filterrule(decode(data)?).await,
            Command::FilterRuleDetail => self.filterrule_detail(decode(data)?),
            Command::ShareFilterGroup => self.share_filtergroup(decode(data)?).await,
            Command::ImportFilterGroup => self.import_filtergroup(decode(data)?).await,

            Command::AddCustomWordGroup => self.add_custom_word_group(decode(data)?).await,
            Command::DeleteCustomWordGroup => self.delete_custom_word_group(decode(data)?).await,
            Command::AddOrEditCustomWord => self.add_or_edit_custom_word(decode(data)?).await,
            Command::GetCustomWord => self.get_custom_word(decode(data)?).await,
            Command::DeleteCustomWord => self.delete_custom_word(decode(data)?).await,
            Command::CheckCustomWords => self.check_custom_words(decode(data)?).await,
            Command::ExportCustomWords => self.export_custom_words(decode(data)?).await,
            Command::AnalyseImportCustomWordsCode => self.analyse_import_custom_words_code(decode(data)?),
            Command::ImportCustomWords => self.import_custom_words(decode(data)?).await,

            Command::UpdateMessageClient => self.update_message_client(decode(data)?).await,
            Command::DeleteMessageClient => self.delete_message_client(decode(data)?).await,
            Command::CheckMessageClient => self.check_message_client(decode(data)?).await,
            Command::GetMessageClient => self.get_message_client(decode(data)?),
            Command::TestMessageClient => self.test_message_client(decode(data)?).await,

            Command::NameTest => self.name_test(decode(data)?).await,
            Command::RuleTest => self.rule_test(decode(data)?),
            Command::SearchMediaInfos => self.search_media_infos(decode(data)?).await,
            Command::GetTransferHistory => self.get_transfer_history(decode(data)?).await,
            Command::GetUnknownList => self.get_unknown_list().await,
            Command::GetCustomWords => self.get_customwords().await,
            Command::GetDirectorySync => self.get_directorysync().await,
            Command::GetUsers => self.get_users().await,
            Command::GetFilterRules => self.get_filterrules(),
            Command::GetTransferStatistics => self.get_transfer_statistics().await,
            Command::GetLibrarySpaceSize => self.get_library_spacesize(),
            Command::GetLibraryMediaCount => self.get_library_mediacount().await,
            Command::GetLibraryPlayHistory => self.get_library_playhistory().await,
            Command::GetRmtModes => self.get_rmt_modes(),
        }
    }
}

/// Decode a payload into a request struct. A missing payload decodes as an
/// empty object so all-optional requests accept it.
fn decode<T: DeserializeOwned>(data: Value) -> std::result::Result<T, ActionError> {
    let data = if data.is_null() {
        Value::Object(Map::new())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| ActionError::invalid(format!("invalid request: {}", e)))
}

pub(crate) mod prelude {
    pub(crate) use std::sync::Arc;

    pub(crate) use serde::Deserialize;
    pub(crate) use serde_json::{Value, json};
    pub(crate) use tracing::{debug, error, info, warn};

    pub(crate) use super::params;
    pub(crate) use super::{ActionError, ActionReply, ActionResult, WebActions};
    pub(crate) use crate::db::*;
    pub(crate) use crate::media::{MediaType, RmtMode};
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::from_str(command.as_str()).ok(), Some(*command));
        }
        assert!(Command::from_str("drop_everything").is_err());
    }

    #[test]
    fn test_reply_rendering() {
        let reply = ActionReply::ok().msg("done").field("count", 3);
        assert_eq!(reply.into_value(), json!({"code": 0, "msg": "done", "count": 3}));
        assert_eq!(ActionReply::with_code(1).into_value(), json!({"code": 1}));
    }

    #[test]
    fn test_api_envelope() {
        let envelope = ApiEnvelope::from_reply(json!({"retcode": 2, "retmsg": "bad", "item": "x"}));
        assert_eq!(envelope.code, 2);
        assert!(!envelope.success);
        assert_eq!(envelope.message, "bad");
        assert_eq!(envelope.data, json!({"item": "x"}));

        let envelope = ApiEnvelope::from_reply(json!({"result": [1]}));
        assert!(envelope.success);
        assert_eq!(envelope.code, 0);
        assert_eq!(envelope.message, "");

        assert!(!ApiEnvelope::from_reply(Value::Null).success);
    }

    #[test]
    fn test_decode_null_as_empty() {
        #[derive(serde::Deserialize)]
        struct Empty {
            #[serde(default)]
            name: Option<String>,
        }
        let decoded: Empty = decode(Value::Null).unwrap();
        assert_eq!(decoded.name, None);
        assert!(decode::<Empty>(json!([1, 2])).is_err());
    }
}
