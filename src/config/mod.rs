//! Application configuration management
//!
//! Two layers: [`Config`] is process configuration read from the environment
//! once at startup, [`AppSettings`] is the user-editable YAML document that
//! the web actions read and rewrite.

pub mod check;
pub mod settings;
pub mod setters;
pub mod upgrade;

use std::env;

use anyhow::{Context, Result};

pub use check::check_settings;
pub use settings::{AppSettings, PathList, SettingsStore};
pub use setters::{DirectoryKey, DirectoryOp, SettingKey};
pub use upgrade::upgrade_settings;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// SQLite database path or `sqlite://` url
    pub database_url: String,

    /// Settings document location
    pub config_path: String,

    /// Scratch directory for uploads and backup archives
    pub temp_path: String,

    /// Metadata cache file
    pub meta_cache_path: String,

    /// Number of formatted log lines kept for the `logging` action
    pub log_buffer_lines: usize,

    /// Restricts the offered transfer modes to the lite set
    pub lite_version: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/mediashelf.db".to_string());

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            config_path: env::var("CONFIG_PATH")
                .unwrap_or_else(|_| "./config/config.yaml".to_string()),

            temp_path: env::var("TEMP_PATH").unwrap_or_else(|_| "./data/temp".to_string()),

            meta_cache_path: env::var("META_CACHE_PATH")
                .unwrap_or_else(|_| "./data/meta.json".to_string()),

            log_buffer_lines: env::var("LOG_BUFFER_LINES")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .context("Invalid LOG_BUFFER_LINES")?,

            lite_version: env::var("LITE_VERSION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Directory holding the settings document, used as the backup restore target
    pub fn config_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.config_path)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::path::PathBuf::from("."))
    }
}
