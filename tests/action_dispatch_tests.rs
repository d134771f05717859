//! Integration tests for the web action layer
//!
//! Every test builds a full `WebActions` over an in-memory database and a
//! temporary settings document, then drives it through the same entry points
//! the HTTP routes use.

use std::sync::Arc;

use async_trait::async_trait;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use mediashelf::actions::{Collaborators, Command, WebActions};
use mediashelf::config::{AppSettings, Config, SettingsStore};
use mediashelf::db::Database;
use mediashelf::media::{MediaType, RmtMode};
use mediashelf::services::{MediaInfo, MetadataProvider, TmdbInfo};
use mediashelf::services::{LogBuffer, WallpaperService};
use mediashelf::{AppState, app};

struct Harness {
    dir: TempDir,
    actions: Arc<WebActions>,
}

async fn harness() -> Harness {
    harness_with(Collaborators::default()).await
}

async fn harness_with(collaborators: Collaborators) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().to_string();
    let config = Arc::new(Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        config_path: format!("{}/config/config.yaml", root),
        temp_path: format!("{}/temp", root),
        meta_cache_path: format!("{}/meta.json", root),
        log_buffer_lines: 50,
        lite_version: false,
    });
    let db = Database::connect_in_memory().await.unwrap();
    let settings = Arc::new(SettingsStore::new(&config.config_path, AppSettings::default()));
    let actions = WebActions::new(
        db,
        config,
        settings,
        collaborators,
        LogBuffer::new(50),
        CancellationToken::new(),
    )
    .unwrap();
    actions.reload_caches().await.unwrap();
    Harness {
        dir,
        actions: Arc::new(actions),
    }
}

fn code(reply: &Value) -> i64 {
    reply["code"].as_i64().unwrap()
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_unknown_command_is_unauthorized() {
    let h = harness().await;
    let reply = h.actions.action("format_disk", json!({})).await;
    assert_eq!(reply, json!({"code": -1, "msg": "unauthorized access"}));
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() {
    let h = harness().await;
    let reply = h.actions.action("get_sync_path", json!("sid=1")).await;
    assert_eq!(code(&reply), -1);
    assert!(reply["msg"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn test_every_query_command_answers() {
    let h = harness().await;
    for command in Command::ALL {
        let name = command.as_str();
        if !name.starts_with("get_") || name == "get_sync_path" || name == "get_custom_word" {
            continue;
        }
        let reply = h.actions.action(name, Value::Null).await;
        assert!(reply.get("code").is_some(), "{} returned {}", name, reply);
    }
}

#[tokio::test]
async fn test_rmt_modes_through_api_envelope() {
    let h = harness().await;
    let envelope = h.actions.api_action("get_rmt_modes", Value::Null).await;
    assert!(envelope.success);
    assert_eq!(envelope.code, 0);
    let modes = envelope.data["result"].as_array().unwrap();
    assert_eq!(modes.len(), 8);
    assert_eq!(modes[1], json!({"value": "link", "name": "Hardlink"}));
}

// ============================================================================
// Sync paths
// ============================================================================

mod sync_paths {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_source_is_required() {
        let h = harness().await;
        let reply = h.actions.action("add_or_edit_sync_path", json!({"to": "/library"})).await;
        assert_eq!(reply, json!({"code": 1, "msg": "source directory is required"}));
    }

    #[tokio::test]
    async fn test_dest_inside_source_is_rejected() {
        let h = harness().await;
        let source = h.dir.path().join("downloads");
        std::fs::create_dir_all(&source).unwrap();
        let source = source.to_string_lossy().to_string();

        let reply = h
            .actions
            .action(
                "add_or_edit_sync_path",
                json!({"from": source, "to": format!("{}/library", source), "syncmod": "copy"}),
            )
            .await;
        assert_eq!(code(&reply), 1);
        assert_eq!(reply["msg"], "destination cannot be inside the source directory");
    }

    #[tokio::test]
    async fn test_unknown_sync_mode_is_rejected() {
        let h = harness().await;
        let source = h.dir.path().join("downloads");
        std::fs::create_dir_all(&source).unwrap();
        let source = source.to_string_lossy().to_string();
        let dest = h.dir.path().join("library").to_string_lossy().to_string();

        let reply = h
            .actions
            .action("add_or_edit_sync_path", json!({"from": source, "to": dest, "syncmod": "teleport"}))
            .await;
        assert_eq!(reply, json!({"code": 1, "msg": "unknown sync mode"}));
        let listed = h.actions.action("get_directorysync", Value::Null).await;
        assert!(listed["result"].as_array().unwrap().is_empty());

        // No mode at all still means copy
        let reply = h
            .actions
            .action("add_or_edit_sync_path", json!({"from": source, "to": dest}))
            .await;
        assert_eq!(code(&reply), 0, "{}", reply);
        let listed = h.actions.action("get_directorysync", Value::Null).await;
        assert_eq!(listed["result"][0]["syncmod"], "copy");
        let sid = listed["result"][0]["id"].as_i64().unwrap();

        // A bad mode on edit leaves the existing row untouched
        let reply = h
            .actions
            .action("add_or_edit_sync_path", json!({"sid": sid, "from": source, "to": dest, "syncmod": "nope"}))
            .await;
        assert_eq!(code(&reply), 1);
        let listed = h.actions.action("get_directorysync", Value::Null).await;
        assert_eq!(listed["result"][0]["id"], sid);
    }

    #[tokio::test]
    async fn test_add_edit_and_list() {
        let h = harness().await;
        let source = h.dir.path().join("downloads");
        std::fs::create_dir_all(&source).unwrap();
        let source = source.to_string_lossy().to_string();
        let dest = h.dir.path().join("library").to_string_lossy().to_string();

        let reply = h
            .actions
            .action(
                "add_or_edit_sync_path",
                json!({"from": source, "to": dest, "syncmod": "copy", "rename": "1", "enabled": 1}),
            )
            .await;
        assert_eq!(code(&reply), 0, "{}", reply);

        let listed = h.actions.action("get_directorysync", Value::Null).await;
        let paths = listed["result"].as_array().unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0]["from"], json!(source));
        assert_eq!(paths[0]["syncmod_name"], "Copy");
        let sid = paths[0]["id"].as_i64().unwrap();

        // Editing replaces the row
        let reply = h
            .actions
            .action(
                "add_or_edit_sync_path",
                json!({"sid": sid, "from": source, "to": dest, "syncmod": "move", "enabled": true}),
            )
            .await;
        assert_eq!(code(&reply), 0);
        let listed = h.actions.action("get_directorysync", Value::Null).await;
        let paths = listed["result"].as_array().unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0]["syncmod"], "move");

        let sid = paths[0]["id"].as_i64().unwrap();
        let reply = h.actions.action("delete_sync_path", json!({"sid": sid})).await;
        assert_eq!(code(&reply), 0);
        let listed = h.actions.action("get_directorysync", Value::Null).await;
        assert!(listed["result"].as_array().unwrap().is_empty());
    }
}

// ============================================================================
// Filter groups
// ============================================================================

#[tokio::test]
async fn test_filter_group_share_and_import() {
    let h = harness().await;
    let reply = h.actions.action("add_filtergroup", json!({"name": "Shared HD"})).await;
    assert_eq!(code(&reply), 0);
    let group_id = h
        .actions
        .db
        .filter_rules()
        .group_id_by_name("Shared HD")
        .await
        .unwrap()
        .unwrap();

    // An empty group cannot be shared
    let reply = h.actions.action("share_filtergroup", json!({"id": group_id})).await;
    assert_eq!(reply, json!({"code": 1, "msg": "group has no rules"}));

    let reply = h
        .actions
        .action(
            "add_filterrule",
            json!({
                "group_id": group_id,
                "rule_name": "1080p",
                "rule_pri": "10",
                "rule_include": "1080[pi]",
                "rule_exclude": "CAM",
                "rule_sizelimit": "",
                "rule_free": ""
            }),
        )
        .await;
    assert_eq!(code(&reply), 0);

    let shared = h.actions.action("share_filtergroup", json!({"id": group_id})).await;
    assert_eq!(code(&shared), 0);
    let content = shared["string"].as_str().unwrap().to_string();

    h.actions.action("del_filtergroup", json!({"id": group_id})).await;
    let reply = h.actions.action("import_filtergroup", json!({"content": content})).await;
    assert_eq!(code(&reply), 0, "{}", reply);

    let repo = h.actions.db.filter_rules();
    let imported = repo.group_id_by_name("Shared HD").await.unwrap().unwrap();
    let rules = repo.list_rules(Some(imported)).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].include, "1080[pi]");

    let reply = h.actions.action("import_filtergroup", json!({"content": "bm90IGpzb24="})).await;
    assert_eq!(code(&reply), 1);
}

#[tokio::test]
async fn test_rule_test_without_rules_matches() {
    let h = harness().await;
    let reply = h
        .actions
        .action("rule_test", json!({"title": "Show.S01E01.1080p.WEB-DL", "size": "1.5"}))
        .await;
    assert_eq!(code(&reply), 0);
    assert!(reply.get("flag").is_some());
}

// ============================================================================
// Custom words
// ============================================================================

mod custom_words {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn general_words(actions: &WebActions) -> Vec<Value> {
        let reply = actions.action("get_customwords", Value::Null).await;
        let groups = reply["result"].as_array().unwrap().clone();
        assert_eq!(groups[0]["id"], "-1");
        groups[0]["words"].as_array().unwrap().clone()
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_bad_offsets() {
        let h = harness().await;
        let word = json!({"gid": -1, "group_type": 1, "new_replaced": "WEB", "type": 1, "enabled": 1, "regex": 0});
        assert_eq!(code(&h.actions.action("add_or_edit_custom_word", word.clone()).await), 0);

        let reply = h.actions.action("add_or_edit_custom_word", word).await;
        assert_eq!(code(&reply), 1);
        assert!(reply["msg"].as_str().unwrap().contains("already exists"));

        let offset = json!({"gid": -1, "new_front": "[", "new_back": "]", "new_offset": "EP+x", "type": 4});
        let reply = h.actions.action("add_or_edit_custom_word", offset).await;
        assert_eq!(reply, json!({"code": 1, "msg": "invalid episode offset format"}));
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let h = harness().await;
        let word = json!({"gid": -1, "new_replaced": "HEVC", "new_replace": "x265", "type": 2, "enabled": 1});
        assert_eq!(code(&h.actions.action("add_or_edit_custom_word", word).await), 0);
        let words = general_words(&h.actions).await;
        assert_eq!(words.len(), 1);
        assert_eq!(words[0]["season"], -2);
        let wid = words[0]["id"].as_i64().unwrap();

        let exported = h
            .actions
            .action("export_custom_words", json!({"note": "codec fixes", "ids_info": format!("-1_{}", wid)}))
            .await;
        let code_string = exported["string"].as_str().unwrap().to_string();

        let analysed = h
            .actions
            .action("analyse_import_custom_words_code", json!({"import_code": code_string}))
            .await;
        assert_eq!(analysed["note_string"], "codec fixes");
        assert_eq!(analysed["groups"][0]["name"], "General");

        // Importing a word that is still present fails
        let ids = json!([format!("-1_{}", wid)]);
        let reply = h
            .actions
            .action("import_custom_words", json!({"import_code": code_string, "ids_info": ids}))
            .await;
        assert_eq!(code(&reply), 1);

        assert_eq!(code(&h.actions.action("delete_custom_word", json!({"id": wid})).await), 0);
        assert!(general_words(&h.actions).await.is_empty());

        let reply = h
            .actions
            .action("import_custom_words", json!({"import_code": code_string, "ids_info": ids}))
            .await;
        assert_eq!(code(&reply), 0, "{}", reply);
        let words = general_words(&h.actions).await;
        assert_eq!(words.len(), 1);
        assert_eq!(words[0]["replace"], "x265");
        assert_eq!(words[0]["enabled"], true);
    }

    #[tokio::test]
    async fn test_toggle_words() {
        let h = harness().await;
        let word = json!({"gid": -1, "new_replaced": "REPACK", "type": 1, "enabled": 1});
        h.actions.action("add_or_edit_custom_word", word).await;
        let wid = general_words(&h.actions).await[0]["id"].as_i64().unwrap();

        let reply = h
            .actions
            .action("check_custom_words", json!({"flag": "disable", "ids_info": [format!("-1_{}", wid)]}))
            .await;
        assert_eq!(code(&reply), 0);
        assert_eq!(general_words(&h.actions).await[0]["enabled"], false);
    }

    #[tokio::test]
    async fn test_group_needs_metadata() {
        let h = harness().await;
        let reply = h
            .actions
            .action("add_custom_word_group", json!({"tmdb_id": "1399", "tmdb_type": "tv"}))
            .await;
        assert_eq!(reply, json!({"code": 1, "msg": "add failed, no TMDB info"}));

        let reply = h
            .actions
            .action("add_custom_word_group", json!({"tmdb_id": 1, "tmdb_type": "music"}))
            .await;
        assert_eq!(reply, json!({"code": 1, "msg": "unknown media type"}));
    }
}

// ============================================================================
// Settings and system
// ============================================================================

#[tokio::test]
async fn test_update_config_test_flag_skips_save() {
    let h = harness().await;
    let reply = h
        .actions
        .action("update_config", json!({"media.category": "anime", "test": true}))
        .await;
    assert_eq!(code(&reply), 0, "{}", reply);
    assert!(!h.actions.settings.path().exists());

    let reply = h.actions.action("update_config", json!({"media.category": "anime"})).await;
    assert_eq!(code(&reply), 0);
    assert!(h.actions.settings.path().exists());
    assert_eq!(h.actions.settings.snapshot().media.category.as_deref(), Some("anime"));
}

#[tokio::test]
async fn test_update_config_rejects_batch_atomically() {
    let h = harness().await;
    let reply = h
        .actions
        .action("update_config", json!({"app.login_user": "mallory", "app.web_port": "abc"}))
        .await;
    assert_eq!(code(&reply), -1, "{}", reply);
    assert_eq!(h.actions.settings.snapshot().app.login_user, None);
    assert!(!h.actions.settings.path().exists());
}

#[tokio::test]
async fn test_update_config_hashes_password() {
    let h = harness().await;
    let reply = h
        .actions
        .action("update_config", json!({"app.login_user": "admin", "app.login_password": "s3cret", "test": 1}))
        .await;
    assert_eq!(code(&reply), 0, "{}", reply);
    let settings = h.actions.settings.snapshot();
    assert_eq!(settings.app.login_user.as_deref(), Some("admin"));
    let stored = settings.app.login_password.unwrap();
    let hash = stored.strip_prefix("[hash]").unwrap();
    assert!(bcrypt::verify("s3cret", hash).unwrap());
}

#[tokio::test]
async fn test_update_directory_add_and_sub() {
    let h = harness().await;
    let add = json!({"oper": "add", "key": "media.movie_path", "value": "/mnt/movies"});
    assert_eq!(code(&h.actions.action("update_directory", add).await), 0);
    let paths = h.actions.settings.snapshot().media.movie_path.map(|p| p.to_vec());
    assert_eq!(paths, Some(vec!["/mnt/movies".to_string()]));

    let sub = json!({"oper": "sub", "key": "media.movie_path", "value": "/mnt/movies"});
    assert_eq!(code(&h.actions.action("update_directory", sub).await), 0);
    let paths = h.actions.settings.snapshot().media.movie_path.map(|p| p.to_vec()).unwrap_or_default();
    assert!(paths.is_empty());
}

#[tokio::test]
async fn test_users_and_progress() {
    let h = harness().await;
    let reply = h
        .actions
        .action("user_manager", json!({"oper": "add", "name": "guest", "password": "pw", "pris": ["home", "rss"]}))
        .await;
    assert_eq!(code(&reply), 0);
    let users = h.actions.action("get_users", Value::Null).await;
    assert_eq!(users["result"][0]["pris"], json!(["home", "rss"]));

    let reply = h.actions.action("refresh_process", json!({"type": "mediasync"})).await;
    assert_eq!(reply, json!({"code": 1, "value": 0, "text": "processing..."}));
}

#[tokio::test]
async fn test_restart_cancels_shutdown_token() {
    let h = harness().await;
    assert!(!h.actions.shutdown.is_cancelled());
    assert_eq!(code(&h.actions.action("restart", Value::Null).await), 0);
    assert!(h.actions.shutdown.is_cancelled());
}

#[tokio::test]
async fn test_restore_missing_backup() {
    let h = harness().await;
    let reply = h.actions.action("restory_backup", json!({})).await;
    assert_eq!(reply, json!({"code": 1, "msg": "file does not exist"}));
}

// ============================================================================
// Transfer history and manual transfers
// ============================================================================

#[tokio::test]
async fn test_transfer_history_huge_page_is_empty() {
    let h = harness().await;
    let reply = h
        .actions
        .action("get_transfer_history", json!({"page": "4611686018427387904", "pagenum": 30}))
        .await;
    assert_eq!(code(&reply), 0, "{}", reply);
    assert_eq!(reply["total"], 0);
    assert!(reply["result"].as_array().unwrap().is_empty());
}

mod rename {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Answers every positive id with a fixed title and remembers the
    /// category each lookup asked for
    #[derive(Default)]
    struct FixedMetadata {
        requested: parking_lot::Mutex<Vec<MediaType>>,
    }

    #[async_trait]
    impl MetadataProvider for FixedMetadata {
        async fn get_tmdb_info(&self, media_type: MediaType, tmdbid: i64) -> anyhow::Result<Option<TmdbInfo>> {
            self.requested.lock().push(media_type);
            Ok((tmdbid > 0).then(|| TmdbInfo {
                id: tmdbid,
                media_type,
                title: "Chicago".to_string(),
                year: Some("2002".to_string()),
                overview: None,
                poster: None,
                season_count: None,
            }))
        }

        async fn recognize(&self, _info: &MediaInfo) -> anyhow::Result<Option<TmdbInfo>> {
            Ok(None)
        }

        async fn search(&self, _keyword: &str, _source: Option<&str>) -> anyhow::Result<Vec<TmdbInfo>> {
            Ok(Vec::new())
        }

        async fn status(&self) -> bool {
            true
        }
    }

    async fn setup() -> (Harness, Arc<FixedMetadata>) {
        let metadata = Arc::new(FixedMetadata::default());
        let collaborators = Collaborators {
            metadata: metadata.clone(),
            ..Collaborators::default()
        };
        (harness_with(collaborators).await, metadata)
    }

    fn write_file(h: &Harness, relative: &str) -> String {
        let path = h.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"video").unwrap();
        path.to_string_lossy().to_string()
    }

    fn library(h: &Harness) -> String {
        h.dir.path().join("library").to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_unknown_row_single_file_is_marked_processed() {
        let (h, metadata) = setup().await;
        let path = write_file(&h, "downloads/Chicago.2002.mkv");
        let target = library(&h);
        let unknown = h.actions.db.transfer_unknown();
        unknown.insert(&path, Some(&target), RmtMode::Copy).await.unwrap();
        let id = unknown.list_pending().await.unwrap()[0].id;

        let reply = h
            .actions
            .action("rename", json!({"unknown_id": id, "tmdb": 1, "type": "MOV", "syncmod": "copy"}))
            .await;
        assert_eq!(reply, json!({"code": 0, "msg": "transfer succeeded"}));
        assert_eq!(*metadata.requested.lock(), vec![MediaType::Movie]);
        assert!(h.dir.path().join("library/Chicago (2002)/Chicago (2002).mkv").exists());
        assert!(unknown.get(id).await.unwrap().unwrap().is_processed());
    }

    #[tokio::test]
    async fn test_episode_format_fixes_whole_folder() {
        let (h, _) = setup().await;
        let first = write_file(&h, "downloads/show/Chicago - 01.mkv");
        write_file(&h, "downloads/show/Chicago - 02.mkv");
        let target = library(&h);
        let unknown = h.actions.db.transfer_unknown();
        unknown.insert(&first, Some(&target), RmtMode::Copy).await.unwrap();
        let id = unknown.list_pending().await.unwrap()[0].id;

        let reply = h
            .actions
            .action(
                "rename",
                json!({"unknown_id": id, "tmdb": 1, "type": "TV", "syncmod": "copy",
                       "episode_format": "Chicago - {ep}.mkv"}),
            )
            .await;
        assert_eq!(code(&reply), 0, "{}", reply);

        let season = h.dir.path().join("library/Chicago (2002)/Season 01");
        assert!(season.join("Chicago - S01E01.mkv").exists());
        assert!(season.join("Chicago - S01E02.mkv").exists());
        // The folder was transferred, so the single-file row is left alone
        assert!(!unknown.get(id).await.unwrap().unwrap().is_processed());
    }

    #[tokio::test]
    async fn test_history_rename_uses_recorded_target() {
        let (h, _) = setup().await;
        let path = write_file(&h, "downloads/Chicago.2002.mkv");
        let target = library(&h);
        h.actions
            .db
            .transfer_history()
            .insert(mediashelf::db::CreateTransferHistory {
                mode: RmtMode::Copy,
                source: "sync".to_string(),
                in_path: path.clone(),
                dest: target.clone(),
                out_path: String::new(),
                media_type: MediaType::Movie,
                category: None,
                tmdbid: None,
                title: "Wrong Title".to_string(),
                year: None,
                season_episode: None,
            })
            .await
            .unwrap();
        let (_, rows) = h.actions.db.transfer_history().list(None, 1, 10).await.unwrap();

        let reply = h
            .actions
            .action("rename", json!({"logid": rows[0].id, "tmdb": 1, "type": "MOV", "syncmod": "copy"}))
            .await;
        assert_eq!(code(&reply), 0, "{}", reply);
        assert!(h.dir.path().join("library/Chicago (2002)/Chicago (2002).mkv").exists());
    }

    #[tokio::test]
    async fn test_rename_udf_maps_request_types() {
        let (h, metadata) = setup().await;
        let tv = write_file(&h, "downloads/tv/Chicago.S01E03.mkv");
        let anime = write_file(&h, "downloads/anime/Chicago.S01E04.mkv");
        let outpath = library(&h);

        for (inpath, kind) in [(&tv, "TV"), (&anime, "ANI")] {
            let reply = h
                .actions
                .action(
                    "rename_udf",
                    json!({"inpath": inpath, "outpath": outpath, "tmdb": 7, "type": kind, "syncmod": "copy"}),
                )
                .await;
            assert_eq!(code(&reply), 0, "{}", reply);
        }
        assert_eq!(*metadata.requested.lock(), vec![MediaType::Tv, MediaType::Anime]);

        let (total, rows) = h.actions.db.transfer_history().list(None, 1, 10).await.unwrap();
        assert_eq!(total, 2);
        let mut types: Vec<&str> = rows.iter().map(|r| r.media_type.as_str()).collect();
        types.sort();
        assert_eq!(types, vec!["anime", "tv"]);
    }

    #[tokio::test]
    async fn test_rename_failures() {
        let (h, _) = setup().await;
        let reply = h.actions.action("rename", json!({})).await;
        assert_eq!(reply, json!({"code": -1, "msg": "invalid input path"}));

        let reply = h
            .actions
            .action("rename_udf", json!({"inpath": "/nonexistent/file.mkv", "tmdb": 1}))
            .await;
        assert_eq!(reply, json!({"code": -1, "msg": "input path does not exist"}));

        let inpath = write_file(&h, "downloads/Chicago.2002.mkv");
        let reply = h
            .actions
            .action("rename_udf", json!({"inpath": inpath, "outpath": library(&h), "tmdb": 0, "type": "MOV"}))
            .await;
        assert_eq!(reply, json!({"code": 2, "msg": "recognition failed, no TMDB info found"}));
    }
}

// ============================================================================
// HTTP surface
// ============================================================================

mod http {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn router() -> (Harness, axum::Router) {
        let h = harness().await;
        let state = AppState {
            config: h.actions.config.clone(),
            db: h.actions.db.clone(),
            actions: h.actions.clone(),
            wallpaper: Arc::new(WallpaperService::new().unwrap()),
        };
        (h, app(state))
    }

    #[tokio::test]
    async fn test_healthz() {
        let (_h, router) = router().await;
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_do_requires_session() {
        let (_h, router) = router().await;
        let request = Request::post("/do")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"cmd":"get_users"}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_action_requires_key() {
        let (_h, router) = router().await;
        let request = Request::post("/api/v1/action/get_rmt_modes?apikey=guess")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_then_action() {
        let (_h, router) = router().await;
        let login = Request::post("/login")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"username":"admin","password":"password"}"#))
            .unwrap();
        let response = router.clone().oneshot(login).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let token = serde_json::from_slice::<Value>(&body).unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();

        let request = Request::post("/do")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::from(r#"{"cmd":"get_rmt_modes"}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let reply: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["code"], 0);
    }
}
