//! Table definitions and startup schema creation
//!
//! Every table is created with `CREATE TABLE IF NOT EXISTS`; the applied
//! version is recorded in `SCHEMA_VERSION`.

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Current schema version written to `SCHEMA_VERSION`
pub const SCHEMA_VERSION: i64 = 1;

/// (table name, create statement)
pub const TABLES: &[(&str, &str)] = &[
    (
        "TRANSFER_HISTORY",
        r#"CREATE TABLE IF NOT EXISTS TRANSFER_HISTORY (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            MODE TEXT,
            TYPE TEXT,
            CATEGORY TEXT,
            TMDBID INTEGER,
            TITLE TEXT,
            YEAR TEXT,
            SEASON_EPISODE TEXT,
            SOURCE TEXT,
            SOURCE_PATH TEXT,
            SOURCE_FILENAME TEXT,
            DEST TEXT,
            DEST_PATH TEXT,
            DEST_FILENAME TEXT,
            DATE TEXT
        )"#,
    ),
    (
        "TRANSFER_UNKNOWN",
        r#"CREATE TABLE IF NOT EXISTS TRANSFER_UNKNOWN (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            PATH TEXT,
            DEST TEXT,
            MODE TEXT,
            STATE TEXT
        )"#,
    ),
    (
        "TRANSFER_BLACKLIST",
        r#"CREATE TABLE IF NOT EXISTS TRANSFER_BLACKLIST (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            PATH TEXT
        )"#,
    ),
    (
        "SYNC_HISTORY",
        r#"CREATE TABLE IF NOT EXISTS SYNC_HISTORY (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            PATH TEXT,
            SRC TEXT,
            DEST TEXT
        )"#,
    ),
    (
        "CONFIG_SYNC_PATHS",
        r#"CREATE TABLE IF NOT EXISTS CONFIG_SYNC_PATHS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            SOURCE TEXT,
            DEST TEXT,
            UNKNOWN TEXT,
            MODE TEXT,
            RENAME INTEGER,
            ENABLED INTEGER,
            NOTE TEXT
        )"#,
    ),
    (
        "CUSTOM_WORDS",
        r#"CREATE TABLE IF NOT EXISTS CUSTOM_WORDS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            REPLACED TEXT,
            REPLACE TEXT,
            FRONT TEXT,
            BACK TEXT,
            OFFSET TEXT,
            TYPE INTEGER,
            GROUP_ID INTEGER,
            SEASON INTEGER,
            ENABLED INTEGER,
            REGEX INTEGER,
            HELP TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "CUSTOM_WORD_GROUPS",
        r#"CREATE TABLE IF NOT EXISTS CUSTOM_WORD_GROUPS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            TITLE TEXT,
            YEAR TEXT,
            TYPE INTEGER,
            TMDBID INTEGER,
            SEASON_COUNT INTEGER,
            NOTE TEXT
        )"#,
    ),
    (
        "CONFIG_FILTER_GROUP",
        r#"CREATE TABLE IF NOT EXISTS CONFIG_FILTER_GROUP (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            GROUP_NAME TEXT,
            IS_DEFAULT TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "CONFIG_FILTER_RULES",
        r#"CREATE TABLE IF NOT EXISTS CONFIG_FILTER_RULES (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            GROUP_ID TEXT,
            ROLE_NAME TEXT,
            PRIORITY TEXT,
            INCLUDE TEXT,
            EXCLUDE TEXT,
            SIZE_LIMIT TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "MESSAGE_CLIENT",
        r#"CREATE TABLE IF NOT EXISTS MESSAGE_CLIENT (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            NAME TEXT,
            TYPE TEXT,
            CONFIG TEXT,
            SWITCHS TEXT,
            INTERACTIVE INTEGER,
            ENABLED INTEGER,
            NOTE TEXT
        )"#,
    ),
    (
        "CONFIG_USERS",
        r#"CREATE TABLE IF NOT EXISTS CONFIG_USERS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            NAME TEXT,
            PASSWORD TEXT,
            PRIS TEXT
        )"#,
    ),
    (
        "SYSTEM_DICT",
        r#"CREATE TABLE IF NOT EXISTS SYSTEM_DICT (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            TYPE TEXT,
            KEY TEXT,
            VALUE TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "SEARCH_RESULT_INFO",
        r#"CREATE TABLE IF NOT EXISTS SEARCH_RESULT_INFO (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            TORRENT_NAME TEXT,
            ENCLOSURE TEXT,
            DESCRIPTION TEXT,
            TYPE TEXT,
            TITLE TEXT,
            YEAR TEXT,
            SEASON TEXT,
            EPISODE TEXT,
            ES_STRING TEXT,
            VOTE TEXT,
            IMAGE TEXT,
            POSTER TEXT,
            TMDBID TEXT,
            OVERVIEW TEXT,
            RES_TYPE TEXT,
            RES_ORDER TEXT,
            SIZE INTEGER,
            SEEDERS INTEGER,
            PEERS INTEGER,
            SITE TEXT,
            SITE_ORDER TEXT,
            PAGEURL TEXT,
            OTHERINFO TEXT,
            UPLOAD_VOLUME_FACTOR REAL,
            DOWNLOAD_VOLUME_FACTOR REAL
        )"#,
    ),
    (
        "RSS_TORRENTS",
        r#"CREATE TABLE IF NOT EXISTS RSS_TORRENTS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            TORRENT_NAME TEXT,
            ENCLOSURE TEXT,
            TYPE TEXT,
            TITLE TEXT,
            YEAR TEXT,
            SEASON TEXT,
            EPISODE TEXT
        )"#,
    ),
    (
        "RSS_HISTORY",
        r#"CREATE TABLE IF NOT EXISTS RSS_HISTORY (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            TYPE TEXT,
            RSSID TEXT,
            NAME TEXT,
            YEAR TEXT,
            TMDBID TEXT,
            SEASON TEXT,
            IMAGE TEXT,
            DESC TEXT,
            TOTAL INTEGER,
            START INTEGER,
            FINISH_TIME TEXT
        )"#,
    ),
    (
        "CONFIG_USER_RSS",
        r#"CREATE TABLE IF NOT EXISTS CONFIG_USER_RSS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            NAME TEXT,
            ADDRESS TEXT,
            PARSER TEXT,
            INTERVAL TEXT,
            USES TEXT,
            INCLUDE TEXT,
            EXCLUDE TEXT,
            FILTER TEXT,
            UPDATE_TIME TEXT,
            PROCESS_COUNT INTEGER,
            STATE TEXT,
            SAVE_PATH TEXT,
            DOWNLOAD_SETTING TEXT,
            RECOGNIZATION TEXT,
            OVER_EDITION INTEGER,
            SITES TEXT,
            FILTER_ARGS TEXT,
            MEDIAINFOS TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "CONFIG_RSS_PARSER",
        r#"CREATE TABLE IF NOT EXISTS CONFIG_RSS_PARSER (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            NAME TEXT,
            TYPE TEXT,
            FORMAT TEXT,
            PARAMS TEXT,
            NOTE TEXT,
            SYSDEF TEXT
        )"#,
    ),
    (
        "USERRSS_TASK_HISTORY",
        r#"CREATE TABLE IF NOT EXISTS USERRSS_TASK_HISTORY (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            TASK_ID TEXT,
            TITLE TEXT,
            DOWNLOADER TEXT,
            DATE TEXT
        )"#,
    ),
    (
        "DOWNLOAD_SETTING",
        r#"CREATE TABLE IF NOT EXISTS DOWNLOAD_SETTING (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            NAME TEXT,
            CATEGORY TEXT,
            TAGS TEXT,
            CONTENT_LAYOUT INTEGER,
            IS_PAUSED INTEGER,
            UPLOAD_LIMIT INTEGER,
            DOWNLOAD_LIMIT INTEGER,
            RATIO_LIMIT INTEGER,
            SEEDING_TIME_LIMIT INTEGER,
            DOWNLOADER TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "TORRENT_REMOVE_TASK",
        r#"CREATE TABLE IF NOT EXISTS TORRENT_REMOVE_TASK (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            NAME TEXT,
            ACTION INTEGER,
            INTERVAL INTEGER,
            ENABLED INTEGER,
            SAMEDATA INTEGER,
            ONLYNASTOOL INTEGER,
            DOWNLOADER TEXT,
            CONFIG TEXT,
            NOTE TEXT
        )"#,
    ),
    (
        "MEDIASYNC_STATISTICS",
        r#"CREATE TABLE IF NOT EXISTS MEDIASYNC_STATISTICS (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            SERVER TEXT,
            TOTAL_COUNT INTEGER,
            MOVIE_COUNT INTEGER,
            TV_COUNT INTEGER,
            UPDATE_TIME TEXT
        )"#,
    ),
    (
        "SCHEMA_VERSION",
        r#"CREATE TABLE IF NOT EXISTS SCHEMA_VERSION (
            VERSION INTEGER NOT NULL,
            APPLIED_AT TEXT NOT NULL
        )"#,
    ),
];

/// Result of a schema initialization pass
#[derive(Debug, Default)]
pub struct SchemaInitResult {
    pub tables_created: Vec<String>,
    pub errors: Vec<String>,
}

/// Check if a table exists in the database
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create missing tables and record the schema version
pub async fn init_schema(pool: &SqlitePool) -> SchemaInitResult {
    let mut result = SchemaInitResult::default();

    for (name, sql) in TABLES {
        let existed = match table_exists(pool, name).await {
            Ok(e) => e,
            Err(e) => {
                result.errors.push(format!("{}: {}", name, e));
                continue;
            }
        };
        if existed {
            continue;
        }
        debug!(table = name, "Creating table");
        match sqlx::query(sql).execute(pool).await {
            Ok(_) => result.tables_created.push(name.to_string()),
            Err(e) => {
                warn!(table = name, error = %e, "Failed to create table");
                result.errors.push(format!("{}: {}", name, e));
            }
        }
    }

    if let Err(e) = record_version(pool).await {
        result.errors.push(format!("SCHEMA_VERSION: {}", e));
    }

    if !result.tables_created.is_empty() {
        info!(tables = ?result.tables_created, "Created tables");
    }
    result
}

async fn record_version(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let (current,): (Option<i64>,) = sqlx::query_as("SELECT MAX(VERSION) FROM SCHEMA_VERSION")
        .fetch_one(pool)
        .await?;
    if current.is_some_and(|v| v >= SCHEMA_VERSION) {
        return Ok(());
    }
    sqlx::query("INSERT INTO SCHEMA_VERSION (VERSION, APPLIED_AT) VALUES (?, ?)")
        .bind(SCHEMA_VERSION)
        .bind(super::sqlite_helpers::now_timestamp())
        .execute(pool)
        .await?;
    Ok(())
}

/// Whether `name` is one of the known tables
pub fn is_known_table(name: &str) -> bool {
    TABLES.iter().any(|(t, _)| *t == name)
}
