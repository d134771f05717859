//! One-time migration of older settings documents
//!
//! Fills in sections introduced after the first release and moves settings
//! that now live in the database (custom words, sync directories, message
//! clients) out of the YAML document.

use anyhow::Result;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use serde_yaml::{Mapping, Value};
use tracing::{error, info, warn};

use super::setters::stored_password;
use super::settings::{AppSettings, LaboratorySection, SecuritySection};
use crate::db::custom_words::{ANY_SEASON, GENERAL_GROUP_ID};
use crate::db::{CreateCustomWord, CreateMessageClient, CreateSyncPath, Database, WordKind};
use crate::media::RmtMode;
use crate::media::paths::normpath;
use crate::services::auth::HASH_PREFIX;

/// Switches migrated from the legacy `message.switch` block, in order
const LEGACY_SWITCHES: &[&str] = &[
    "download_start",
    "download_fail",
    "transfer_finished",
    "transfer_fail",
    "rss_added",
    "rss_finished",
    "site_signin",
];

/// Switches every migrated client gets once a legacy switch block exists
const IMPLIED_SWITCHES: &[&str] = &[
    "site_message",
    "brushtask_added",
    "brushtask_remove",
    "mediaserver_message",
];

const LEGACY_MESSAGE_KEYS: &[&str] = &[
    "msg_channel",
    "switch",
    "wechat",
    "telegram",
    "serverchan",
    "bark",
    "pushplus",
    "iyuu",
];

fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn yaml_map(pairs: &[(&str, Value)]) -> Value {
    let mut map = Mapping::new();
    for (k, v) in pairs {
        map.insert(Value::from(*k), v.clone());
    }
    Value::Mapping(map)
}

fn allow_ip(ipv4: &str, ipv6: &str) -> Value {
    yaml_map(&[("ipv4", Value::from(ipv4)), ("ipv6", Value::from(ipv6))])
}

fn flags(names: &[(&str, bool)]) -> Value {
    let pairs: Vec<(&str, Value)> = names.iter().map(|(k, v)| (*k, Value::Bool(*v))).collect();
    yaml_map(&pairs)
}

fn default_scraper_nfo() -> Mapping {
    let mut map = Mapping::new();
    map.insert(
        Value::from("movie"),
        flags(&[("basic", true), ("credits", true), ("credits_chinese", false)]),
    );
    map.insert(
        Value::from("tv"),
        flags(&[
            ("basic", true),
            ("credits", true),
            ("credits_chinese", false),
            ("season_basic", true),
            ("episode_basic", true),
            ("episode_credits", true),
        ]),
    );
    map
}

fn default_scraper_pic() -> Mapping {
    let mut map = Mapping::new();
    map.insert(
        Value::from("movie"),
        flags(&[
            ("poster", true),
            ("backdrop", true),
            ("background", true),
            ("logo", true),
            ("disc", true),
            ("banner", true),
            ("thumb", true),
        ]),
    );
    map.insert(
        Value::from("tv"),
        flags(&[
            ("poster", true),
            ("backdrop", true),
            ("background", true),
            ("logo", true),
            ("clearart", true),
            ("banner", true),
            ("thumb", true),
            ("season_poster", true),
            ("season_banner", true),
            ("season_thumb", true),
        ]),
    );
    map
}

fn yaml_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

/// Run every migration step. Returns whether the document changed and must be saved.
pub async fn upgrade_settings(settings: &mut AppSettings, db: &Database) -> Result<bool> {
    let mut changed = upgrade_document(settings)?;

    match migrate_words(settings, db).await {
        Ok(c) => changed |= c,
        Err(e) => error!(error = %e, "Failed to migrate legacy custom words"),
    }
    match migrate_sync_paths(settings, db).await {
        Ok(c) => changed |= c,
        Err(e) => error!(error = %e, "Failed to migrate legacy sync directories"),
    }
    match migrate_message_clients(settings, db).await {
        Ok(c) => changed |= c,
        Err(e) => error!(error = %e, "Failed to migrate legacy message settings"),
    }

    if changed {
        info!("Settings document upgraded");
    }
    Ok(changed)
}

/// Defaults and key rewrites that touch only the document
fn upgrade_document(settings: &mut AppSettings) -> Result<bool> {
    let mut changed = false;

    let password = settings.app.login_password.as_deref().filter(|p| !p.is_empty());
    if !password.is_some_and(|p| p.starts_with(HASH_PREFIX)) {
        settings.app.login_password = Some(stored_password(password)?);
        changed = true;
    }

    if settings.laboratory.is_none() {
        settings.laboratory = Some(LaboratorySection::default());
        changed = true;
    }

    if settings.security.is_none() {
        let mut section = SecuritySection::default();
        section.extra.insert(
            "media_server_webhook_allow_ip".to_string(),
            allow_ip("0.0.0.0/0", "::/0"),
        );
        section.extra.insert(
            "telegram_webhook_allow_ip".to_string(),
            allow_ip("127.0.0.1", "::/0"),
        );
        settings.security = Some(section);
        changed = true;
    }
    let security = settings.security.get_or_insert_with(SecuritySection::default);

    let has_synology = security
        .extra
        .get("synology_webhook_allow_ip")
        .is_some_and(|v| !v.is_null());
    if !has_synology {
        security.extra.insert(
            "synology_webhook_allow_ip".to_string(),
            allow_ip("127.0.0.1", "::/0"),
        );
        changed = true;
    }

    if security.api_key.as_deref().unwrap_or_default().is_empty() {
        let legacy = yaml_str(security.extra.get("subscribe_token"));
        security.api_key = Some(legacy.unwrap_or_else(|| random_key(16)));
        security.extra.remove("subscribe_token");
        changed = true;
    }

    if settings.scraper_nfo.as_ref().is_none_or(Mapping::is_empty) {
        settings.scraper_nfo = Some(default_scraper_nfo());
        changed = true;
    }
    if settings.scraper_pic.as_ref().is_none_or(Mapping::is_empty) {
        settings.scraper_pic = Some(default_scraper_pic());
        changed = true;
    }

    Ok(changed)
}

fn legacy_word(
    kind: WordKind,
    replaced: &str,
    replace: &str,
    front: &str,
    back: &str,
    offset: &str,
) -> CreateCustomWord {
    CreateCustomWord {
        replaced: replaced.to_string(),
        replace: replace.to_string(),
        front: front.to_string(),
        back: back.to_string(),
        offset: offset.to_string(),
        kind,
        group_id: GENERAL_GROUP_ID,
        season: ANY_SEASON,
        enabled: true,
        regex: true,
        help: String::new(),
        note: String::new(),
    }
}

/// `laboratory.{ignored,replaced,offset}_words` into CUSTOM_WORDS
async fn migrate_words(settings: &mut AppSettings, db: &Database) -> Result<bool> {
    let Some(lab) = settings.laboratory.as_mut() else {
        return Ok(false);
    };
    let repo = db.custom_words();
    let mut changed = false;

    if let Some(words) = yaml_str(lab.extra.get("ignored_words")) {
        for word in words.split("||").filter(|w| !w.is_empty()) {
            if !repo.exists(Some(word), None, None).await? {
                repo.insert(legacy_word(WordKind::Block, word, "", "", "", "0")).await?;
            }
        }
        lab.extra.remove("ignored_words");
        changed = true;
    }

    if let Some(words) = yaml_str(lab.extra.get("replaced_words")) {
        for word in words.split("||").filter(|w| !w.is_empty()) {
            let mut parts = word.splitn(2, '@');
            let replaced = parts.next().unwrap_or_default();
            let replace = parts.next().unwrap_or_default();
            if !repo.exists(Some(replaced), None, None).await? {
                repo.insert(legacy_word(WordKind::Replace, replaced, replace, "", "", "0"))
                    .await?;
            }
        }
        lab.extra.remove("replaced_words");
        changed = true;
    }

    if let Some(words) = yaml_str(lab.extra.get("offset_words")) {
        for word in words.split("||").filter(|w| !w.is_empty()) {
            let parts: Vec<&str> = word.split('@').collect();
            let [front, back, offset, ..] = parts.as_slice() else {
                warn!(word, "Skipping malformed legacy offset word");
                continue;
            };
            if !repo.exists(None, Some(*front), Some(*back)).await? {
                repo.insert(legacy_word(WordKind::Offset, "", "", front, back, offset))
                    .await?;
            }
        }
        lab.extra.remove("offset_words");
        changed = true;
    }

    Ok(changed)
}

/// Strip one wrapping character pair, as in `#...#` or `[...]`
fn unwrap_marker(item: &str) -> &str {
    let mut chars = item.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

/// `sync.sync_path` into CONFIG_SYNC_PATHS
async fn migrate_sync_paths(settings: &mut AppSettings, db: &Database) -> Result<bool> {
    let Some(legacy) = settings.sync.extra.get("sync_path").cloned() else {
        return Ok(false);
    };
    let default_mode = yaml_str(settings.sync.extra.get("sync_mod"));
    let repo = db.sync_paths();

    match &legacy {
        Value::Sequence(items) => {
            for item in items.iter().filter_map(Value::as_str) {
                let mut item = item;
                let mut enabled = true;
                let mut rename = true;
                if item.starts_with('#') {
                    enabled = false;
                    item = unwrap_marker(item);
                }
                if item.starts_with('[') {
                    rename = false;
                    item = unwrap_marker(item);
                }

                let config_items: Vec<&str> = item.split('@').collect();
                let mode_text = if config_items.len() > 1 {
                    config_items.last().map(|m| m.to_string())
                } else {
                    default_mode.clone()
                };
                let Some(mode_text) = mode_text.filter(|m| !m.is_empty()) else {
                    continue;
                };
                let Some(mode) = RmtMode::parse(&mode_text) else {
                    warn!(mode = %mode_text, "Skipping sync directory with unknown transfer mode");
                    continue;
                };

                let paths: Vec<&str> = config_items[0].split('|').collect();
                let source = paths.first().copied().unwrap_or_default();
                if source.is_empty() {
                    continue;
                }
                let source = normpath(source);
                let dest = paths.get(1).filter(|p| !p.is_empty()).map(|p| normpath(p));
                let unknown = paths.get(2).filter(|p| !p.is_empty()).map(|p| normpath(p));

                if enabled {
                    repo.set_enabled_by_source(&source, false).await?;
                }
                repo.insert(CreateSyncPath {
                    source,
                    dest,
                    unknown,
                    mode,
                    rename,
                    enabled,
                    note: None,
                })
                .await?;
            }
        }
        Value::String(source) if !source.is_empty() => {
            let mode = default_mode
                .as_deref()
                .and_then(RmtMode::parse)
                .unwrap_or(RmtMode::Copy);
            repo.insert(CreateSyncPath {
                source: source.clone(),
                dest: None,
                unknown: None,
                mode,
                rename: true,
                enabled: false,
                note: None,
            })
            .await?;
        }
        _ => {}
    }

    settings.sync.extra.remove("sync_path");
    Ok(true)
}

/// One legacy channel block mapped to its client row, when complete
fn legacy_client(kind: &str, block: &Value) -> Option<(&'static str, serde_json::Value, bool)> {
    let get = |key: &str| yaml_str(block.get(key));
    match kind {
        "telegram" => {
            let token = get("telegram_token")?;
            let chat_id = get("telegram_chat_id")?;
            Some((
                "Telegram",
                json!({
                    "token": token,
                    "chat_id": chat_id,
                    "user_ids": get("telegram_user_ids"),
                    "webhook": yaml_truthy(block.get("webhook")),
                }),
                true,
            ))
        }
        "wechat" => {
            let corpid = get("corpid")?;
            let corpsecret = get("corpsecret")?;
            let agentid = get("agentid")?;
            Some((
                "WeChat",
                json!({
                    "corpid": corpid,
                    "corpsecret": corpsecret,
                    "agentid": agentid,
                    "default_proxy": get("default_proxy"),
                    "token": get("Token"),
                    "encodingAESKey": get("EncodingAESKey"),
                }),
                true,
            ))
        }
        "serverchan" => Some(("ServerChan", json!({ "sckey": get("sckey")? }), false)),
        "bark" => {
            let server = get("server")?;
            let apikey = get("apikey")?;
            Some(("Bark", json!({ "server": server, "apikey": apikey }), false))
        }
        "pushplus" => {
            let token = get("push_token")?;
            let channel = get("push_channel")?;
            Some((
                "PushPlus",
                json!({
                    "token": token,
                    "topic": get("push_topic"),
                    "channel": channel,
                    "webhook": get("push_webhook"),
                }),
                false,
            ))
        }
        "iyuu" => Some(("IyuuMsg", json!({ "token": get("iyuu_token")? }), false)),
        _ => None,
    }
}

/// `message.*` channel blocks into MESSAGE_CLIENT
async fn migrate_message_clients(settings: &mut AppSettings, db: &Database) -> Result<bool> {
    let message = &mut settings.message.extra;
    let Some(channel) = yaml_str(message.get("msg_channel")) else {
        return Ok(false);
    };

    let mut switchs = Vec::new();
    if let Some(switch) = message.get("switch").filter(|s| s.is_mapping()) {
        for name in LEGACY_SWITCHES {
            if yaml_truthy(switch.get(*name)) {
                switchs.push(name.to_string());
            }
        }
        switchs.extend(IMPLIED_SWITCHES.iter().map(|s| s.to_string()));
    }

    let repo = db.message_clients();
    for kind in ["telegram", "wechat", "serverchan", "bark", "pushplus", "iyuu"] {
        let Some(block) = message.get(kind) else {
            continue;
        };
        let Some((name, config, can_interact)) = legacy_client(kind, block) else {
            continue;
        };
        let enabled = channel == kind;
        repo.insert(CreateMessageClient {
            name: name.to_string(),
            kind: kind.to_string(),
            config,
            switchs: switchs.clone(),
            interactive: can_interact && enabled,
            enabled,
            note: None,
        })
        .await?;
    }

    for key in LEGACY_MESSAGE_KEYS {
        message.remove(*key);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_document_gets_defaults() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut settings = AppSettings::default();
        assert!(upgrade_settings(&mut settings, &db).await.unwrap());

        let security = settings.security.as_ref().unwrap();
        assert_eq!(security.api_key.as_ref().unwrap().len(), 16);
        assert!(security.extra.contains_key("synology_webhook_allow_ip"));
        assert!(settings.laboratory.as_ref().unwrap().tmdb_cache_expire);
        assert_eq!(
            settings.scraper_pic.as_ref().unwrap()["tv"]["season_thumb"],
            Value::Bool(true)
        );

        assert!(!upgrade_settings(&mut settings, &db).await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_token_becomes_api_key() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut settings =
            AppSettings::from_yaml("security:\n  subscribe_token: legacy123\n").unwrap();
        upgrade_settings(&mut settings, &db).await.unwrap();
        let security = settings.security.unwrap();
        assert_eq!(security.api_key.as_deref(), Some("legacy123"));
        assert!(!security.extra.contains_key("subscribe_token"));
    }

    #[test]
    fn test_unwrap_marker() {
        assert_eq!(unwrap_marker("#/a|/b#"), "/a|/b");
        assert_eq!(unwrap_marker("[/a]"), "/a");
    }
}
