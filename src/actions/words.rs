//! Custom word and word group actions, including the share code format
//!
//! A share code is base64 of `<json>@@@@@@<note>`, where the JSON maps group
//! ids to a group with its words keyed by word id.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

use super::prelude::*;
use crate::db::custom_words::{ANY_SEASON, GENERAL_GROUP_ID};
use crate::services::words::validate_offset;

const NOTE_SEPARATOR: &str = "@@@@@@";
const GENERAL_GROUP_TITLE: &str = "General";

#[derive(Debug, Deserialize)]
pub struct AddWordGroupRequest {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub tmdb_id: Option<i64>,
    #[serde(default)]
    pub tmdb_type: String,
}

#[derive(Debug, Deserialize)]
pub struct WordGroupId {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub gid: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CustomWordForm {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub gid: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub group_type: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub new_replaced: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub new_replace: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub new_front: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub new_back: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub new_offset: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub new_help: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "params::opt_i64")]
    pub kind: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub season: Option<i64>,
    #[serde(default, deserialize_with = "params::flag")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "params::flag")]
    pub regex: bool,
}

#[derive(Debug, Deserialize)]
pub struct WordIdRequest {
    #[serde(default, alias = "wid", deserialize_with = "params::opt_i64")]
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckWordsRequest {
    #[serde(default, deserialize_with = "params::string_list")]
    pub ids_info: Vec<String>,
    #[serde(default)]
    pub flag: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportWordsRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub note: Option<String>,
    /// `gid_wid` pairs joined with `@`
    #[serde(default)]
    pub ids_info: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportCodeRequest {
    #[serde(default)]
    pub import_code: String,
    #[serde(default, deserialize_with = "params::string_list")]
    pub ids_info: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SharedWordGroup {
    #[serde(deserialize_with = "lenient_i64")]
    id: i64,
    #[serde(default, deserialize_with = "params::opt_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string", skip_serializing_if = "Option::is_none")]
    year: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient_i64")]
    kind: i64,
    #[serde(default, deserialize_with = "params::opt_i64", skip_serializing_if = "Option::is_none")]
    tmdbid: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64", skip_serializing_if = "Option::is_none")]
    season_count: Option<i64>,
    #[serde(default)]
    words: BTreeMap<String, SharedWord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SharedWord {
    #[serde(deserialize_with = "lenient_i64")]
    id: i64,
    #[serde(default)]
    replaced: Option<String>,
    #[serde(default)]
    replace: Option<String>,
    #[serde(default)]
    front: Option<String>,
    #[serde(default)]
    back: Option<String>,
    #[serde(default)]
    offset: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient_i64")]
    kind: i64,
    #[serde(default, deserialize_with = "params::opt_i64")]
    season: Option<i64>,
    #[serde(default, deserialize_with = "params::flag")]
    regex: bool,
    #[serde(default)]
    help: Option<String>,
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    params::opt_i64(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected an integer"))
}

impl From<&CustomWordRecord> for SharedWord {
    fn from(word: &CustomWordRecord) -> Self {
        Self {
            id: word.id,
            replaced: Some(word.replaced.clone()),
            replace: Some(word.replace.clone()),
            front: Some(word.front.clone()),
            back: Some(word.back.clone()),
            offset: Some(word.offset.clone()),
            kind: word.kind,
            season: Some(word.season),
            regex: word.regex,
            help: Some(word.help.clone()),
        }
    }
}

/// Page view of a word row
fn word_view(word: &CustomWordRecord) -> Value {
    json!({
        "id": word.id,
        "replaced": word.replaced,
        "replace": word.replace,
        "front": word.front,
        "back": word.back,
        "offset": word.offset,
        "type": word.kind,
        "group_id": word.group_id,
        "season": word.season,
        "enabled": word.enabled,
        "regex": word.regex,
        "help": word.help,
    })
}

fn tmdb_link(kind: i64, tmdbid: i64) -> String {
    let media = if kind == 1 { "movie" } else { "tv" };
    format!("https://www.themoviedb.org/{}/{}", media, tmdbid)
}

/// Split a `gid_wid` pair
fn split_id_pair(value: &str) -> Option<(&str, &str)> {
    value.split_once('_')
}

fn encode_share_code(groups: &BTreeMap<String, SharedWordGroup>, note: &str) -> Result<String, ActionError> {
    let json = serde_json::to_string(groups).map_err(anyhow::Error::from)?;
    Ok(BASE64.encode(format!("{}{}{}", json, NOTE_SEPARATOR, note)))
}

fn decode_share_code(code: &str) -> Result<(BTreeMap<String, SharedWordGroup>, String), ActionError> {
    let bytes = BASE64
        .decode(code.trim())
        .map_err(|e| ActionError::failed(format!("invalid import code, {}", e)))?;
    let text = String::from_utf8(bytes).map_err(|e| ActionError::failed(format!("invalid import code, {}", e)))?;
    let (json, note) = text.split_once(NOTE_SEPARATOR).unwrap_or((text.as_str(), ""));
    let groups = serde_json::from_str(json)
        .map_err(|e| ActionError::failed(format!("invalid import code, {}", e)))?;
    Ok((groups, note.to_string()))
}

impl WebActions {
    async fn word_exists(&self, kind: WordKind, replaced: &str, front: &str, back: &str) -> Result<(), ActionError> {
        let repo = self.db.custom_words();
        match kind {
            WordKind::Offset => {
                if repo.exists(None, Some(front), Some(back)).await? {
                    return Err(ActionError::failed(format!(
                        "word already exists\n(front/back: {}@{})",
                        front, back
                    )));
                }
            }
            _ => {
                if repo.exists(Some(replaced), None, None).await? {
                    return Err(ActionError::failed(format!(
                        "word already exists\n(replaced: {})",
                        replaced
                    )));
                }
            }
        }
        Ok(())
    }

    pub(super) async fn add_custom_word_group(&self, req: AddWordGroupRequest) -> ActionResult {
        let (media_type, kind) = match req.tmdb_type.as_str() {
            "tv" => (MediaType::Tv, 2),
            "movie" => (MediaType::Movie, 1),
            _ => return Err(ActionError::failed("unknown media type")),
        };
        let tmdbid = req
            .tmdb_id
            .ok_or_else(|| ActionError::failed("TMDB id is required"))?;
        let repo = self.db.custom_words();
        if repo.group_exists(tmdbid, kind).await? {
            return Err(ActionError::failed("word group (TMDB id) already exists"));
        }
        let info = self
            .metadata
            .get_tmdb_info(media_type, tmdbid)
            .await?
            .ok_or_else(|| ActionError::failed("add failed, no TMDB info"))?;

        let year: String = info.year.unwrap_or_default().chars().take(4).collect();
        let season_count = if kind == 2 { info.season_count.unwrap_or(0) } else { 0 };
        let id = repo
            .insert_group(CreateCustomWordGroup {
                title: info.title.clone(),
                year,
                kind,
                tmdbid,
                season_count,
                note: None,
            })
            .await?;
        info!(id, title = %info.title, tmdbid, "Word group added");
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn delete_custom_word_group(&self, req: WordGroupId) -> ActionResult {
        if let Some(gid) = req.gid {
            self.db.custom_words().delete_group(gid).await?;
            self.words.reload(&self.db).await?;
        }
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn add_or_edit_custom_word(&self, form: CustomWordForm) -> ActionResult {
        let kind = form
            .kind
            .and_then(WordKind::from_code)
            .ok_or_else(|| ActionError::failed("unknown word type"))?;
        let offset = form.new_offset.unwrap_or_default();
        if kind.has_offset() && !validate_offset(&offset) {
            return Err(ActionError::failed("invalid episode offset format"));
        }

        let repo = self.db.custom_words();
        if let Some(id) = form.id {
            repo.delete(id).await?;
        }
        let season = if form.group_type == Some(1) {
            ANY_SEASON
        } else {
            form.season.unwrap_or(ANY_SEASON)
        };

        let replaced = form.new_replaced.unwrap_or_default();
        let front = form.new_front.unwrap_or_default();
        let back = form.new_back.unwrap_or_default();
        self.word_exists(kind, &replaced, &front, &back).await?;

        let word = match kind {
            WordKind::Block => CreateCustomWord {
                replaced,
                replace: String::new(),
                front: String::new(),
                back: String::new(),
                offset: String::new(),
                kind,
                group_id: 0,
                season,
                enabled: form.enabled,
                regex: form.regex,
                help: String::new(),
                note: String::new(),
            },
            WordKind::Replace => CreateCustomWord {
                replaced,
                replace: form.new_replace.unwrap_or_default(),
                front: String::new(),
                back: String::new(),
                offset: String::new(),
                kind,
                group_id: 0,
                season,
                enabled: form.enabled,
                regex: form.regex,
                help: String::new(),
                note: String::new(),
            },
            WordKind::Offset => CreateCustomWord {
                replaced: String::new(),
                replace: String::new(),
                front,
                back,
                offset,
                kind,
                group_id: 0,
                season,
                enabled: form.enabled,
                regex: form.regex,
                help: String::new(),
                note: String::new(),
            },
            WordKind::ReplaceOffset => CreateCustomWord {
                replaced,
                replace: form.new_replace.unwrap_or_default(),
                front,
                back,
                offset,
                kind,
                group_id: 0,
                season,
                enabled: form.enabled,
                regex: form.regex,
                help: String::new(),
                note: String::new(),
            },
        };
        let id = repo
            .insert(CreateCustomWord {
                group_id: form.gid.unwrap_or(GENERAL_GROUP_ID),
                help: form.new_help.unwrap_or_default(),
                ..word
            })
            .await?;
        debug!(id, kind = kind.code(), "Custom word saved");
        self.words.reload(&self.db).await?;
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn get_custom_word(&self, req: WordIdRequest) -> ActionResult {
        let word = match req.id {
            Some(id) => self.db.custom_words().get(id).await?,
            None => None,
        };
        let data = word.as_ref().map(word_view).unwrap_or_else(|| json!({}));
        Ok(ActionReply::ok().field("data", data))
    }

    pub(super) async fn delete_custom_word(&self, req: WordIdRequest) -> ActionResult {
        if let Some(id) = req.id {
            self.db.custom_words().delete(id).await?;
            self.words.reload(&self.db).await?;
        }
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn check_custom_words(&self, req: CheckWordsRequest) -> ActionResult {
        let enabled = match req.flag.as_str() {
            "enable" => true,
            "disable" => false,
            _ => return Err(ActionError::failed("failed to set word state")),
        };
        let repo = self.db.custom_words();
        for pair in &req.ids_info {
            let Some(wid) = split_id_pair(pair).and_then(|(_, w)| w.parse::<i64>().ok()) else {
                warn!(pair = %pair, "Malformed word id");
                continue;
            };
            repo.set_enabled(wid, enabled).await?;
        }
        self.words.reload(&self.db).await?;
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn export_custom_words(&self, req: ExportWordsRequest) -> ActionResult {
        let repo = self.db.custom_words();
        let pairs: Vec<(&str, &str)> = req.ids_info.split('@').filter_map(split_id_pair).collect();

        let mut groups: BTreeMap<String, SharedWordGroup> = BTreeMap::new();
        for (gid, _) in &pairs {
            if groups.contains_key(*gid) {
                continue;
            }
            if *gid == GENERAL_GROUP_ID.to_string() {
                groups.insert(
                    gid.to_string(),
                    SharedWordGroup {
                        id: GENERAL_GROUP_ID,
                        title: Some(GENERAL_GROUP_TITLE.to_string()),
                        year: None,
                        kind: 1,
                        tmdbid: None,
                        season_count: None,
                        words: BTreeMap::new(),
                    },
                );
            } else if let Ok(id) = gid.parse::<i64>()
                && let Some(group) = repo.get_group(id).await?
            {
                groups.insert(
                    group.id.to_string(),
                    SharedWordGroup {
                        id: group.id,
                        title: Some(group.title),
                        year: Some(group.year),
                        kind: group.kind,
                        tmdbid: Some(group.tmdbid),
                        season_count: Some(group.season_count),
                        words: BTreeMap::new(),
                    },
                );
            }
        }

        for (_, wid) in &pairs {
            let Ok(id) = wid.parse::<i64>() else {
                continue;
            };
            if let Some(word) = repo.get(id).await?
                && let Some(group) = groups.get_mut(&word.group_id.to_string())
            {
                group.words.insert(word.id.to_string(), SharedWord::from(&word));
            }
        }

        let code = encode_share_code(&groups, req.note.as_deref().unwrap_or_default())?;
        Ok(ActionReply::ok().field("string", code))
    }

    pub(super) fn analyse_import_custom_words_code(&self, req: ImportCodeRequest) -> ActionResult {
        let (groups, note) = decode_share_code(&req.import_code)?;
        let groups: Vec<Value> = groups
            .into_values()
            .map(|g| {
                let title = g.title.clone().unwrap_or_default();
                let name = match &g.year {
                    Some(year) => format!("{} ({})", title, year),
                    None => title,
                };
                let link = g.tmdbid.map(|id| tmdb_link(g.kind, id)).unwrap_or_default();
                json!({
                    "id": g.id,
                    "name": name,
                    "link": link,
                    "type": g.kind,
                    "seasons": g.season_count.map(|c| c.to_string()).unwrap_or_default(),
                    "words": g.words,
                })
            })
            .collect();
        Ok(ActionReply::ok().field("groups", groups).field("note_string", note))
    }

    pub(super) async fn import_custom_words(&self, req: ImportCodeRequest) -> ActionResult {
        let (groups, _) = decode_share_code(&req.import_code)?;
        let repo = self.db.custom_words();

        // Map each selected group of the code to a local group id
        let mut local_ids: BTreeMap<String, i64> = BTreeMap::new();
        for pair in &req.ids_info {
            let Some((gid, _)) = split_id_pair(pair) else {
                continue;
            };
            if local_ids.contains_key(gid) {
                continue;
            }
            let Some(group) = groups.get(gid) else {
                return Err(ActionError::failed(format!("group {} not in import code", gid)));
            };
            if group.id == GENERAL_GROUP_ID {
                local_ids.insert(gid.to_string(), GENERAL_GROUP_ID);
                continue;
            }
            let tmdbid = group.tmdbid.unwrap_or_default();
            if !repo.group_exists(tmdbid, group.kind).await? {
                repo.insert_group(CreateCustomWordGroup {
                    title: group.title.clone().unwrap_or_default(),
                    year: group.year.clone().unwrap_or_default(),
                    kind: group.kind,
                    tmdbid,
                    season_count: group.season_count.unwrap_or(0),
                    note: None,
                })
                .await?;
            }
            if let Some(local) = repo.find_group(tmdbid, group.kind).await? {
                local_ids.insert(gid.to_string(), local.id);
            }
        }

        let mut imported = 0;
        for pair in &req.ids_info {
            let Some((gid, wid)) = split_id_pair(pair) else {
                continue;
            };
            let Some(word) = groups.get(gid).and_then(|g| g.words.get(wid)) else {
                continue;
            };
            let Some(kind) = WordKind::from_code(word.kind) else {
                warn!(kind = word.kind, "Skipping word with unknown type");
                continue;
            };
            let replaced = word.replaced.clone().unwrap_or_default();
            let front = word.front.clone().unwrap_or_default();
            let back = word.back.clone().unwrap_or_default();
            self.word_exists(kind, &replaced, &front, &back).await?;

            repo.insert(CreateCustomWord {
                replaced,
                replace: word.replace.clone().unwrap_or_default(),
                front,
                back,
                offset: word.offset.clone().unwrap_or_default(),
                kind,
                group_id: local_ids.get(gid).copied().unwrap_or(GENERAL_GROUP_ID),
                season: word.season.unwrap_or(ANY_SEASON),
                enabled: true,
                regex: word.regex,
                help: word.help.clone().unwrap_or_default(),
                note: String::new(),
            })
            .await?;
            imported += 1;
        }
        info!(imported, "Custom words imported");
        self.words.reload(&self.db).await?;
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn get_customwords(&self) -> ActionResult {
        let repo = self.db.custom_words();
        let general: Vec<Value> = repo
            .list_by_group(GENERAL_GROUP_ID)
            .await?
            .iter()
            .map(word_view)
            .collect();
        let mut groups = vec![json!({
            "id": GENERAL_GROUP_ID.to_string(),
            "name": GENERAL_GROUP_TITLE,
            "link": "",
            "type": "1",
            "seasons": "0",
            "words": general,
        })];

        for group in repo.list_groups().await? {
            let words: Vec<Value> = repo.list_by_group(group.id).await?.iter().map(word_view).collect();
            groups.push(json!({
                "id": group.id,
                "name": format!("{} ({})", group.title, group.year),
                "link": tmdb_link(group.kind, group.tmdbid),
                "type": group.kind,
                "seasons": group.season_count,
                "words": words,
            }));
        }
        Ok(ActionReply::ok().field("result", groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_code_keeps_note() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "-1".to_string(),
            SharedWordGroup {
                id: -1,
                title: Some("General".to_string()),
                year: None,
                kind: 1,
                tmdbid: None,
                season_count: None,
                words: BTreeMap::new(),
            },
        );
        let code = encode_share_code(&groups, "my words").unwrap();
        let (decoded, note) = decode_share_code(&code).unwrap();
        assert_eq!(note, "my words");
        assert_eq!(decoded["-1"].id, -1);
    }

    #[test]
    fn test_decode_accepts_string_numbers() {
        let json = r#"{"7":{"id":"7","title":"Show","year":"2020","type":"2","tmdbid":"42","season_count":"3",
            "words":{"9":{"id":9,"replaced":"foo","replace":"bar","type":"2","season":"-2","regex":1}}}}"#;
        let code = BASE64.encode(format!("{}@@@@@@", json));
        let (groups, note) = decode_share_code(&code).unwrap();
        assert_eq!(note, "");
        let group = &groups["7"];
        assert_eq!(group.tmdbid, Some(42));
        assert_eq!(group.words["9"].kind, 2);
        assert!(group.words["9"].regex);
        assert!(decode_share_code("not base64!").is_err());
    }
}
