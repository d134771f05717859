//! Identify media files and place them into the library
//!
//! `LocalFileTransfer` handles the local modes. Each file is parsed (after
//! the custom words ran over its name), matched against the metadata
//! provider unless the caller already supplied the title, and then placed
//! under `<library>/<Title (Year)>[/Season NN]/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{AppSettings, PathList, SettingsStore};
use crate::db::{CreateTransferHistory, Database};
use crate::media::filename::EpisodeFormat;
use crate::media::paths::{basename, normpath};
use crate::media::{MediaOrganizer, MediaType, RmtMode, extension_of, is_media_file};
use crate::services::metadata::{MediaInfo, MetadataProvider, TmdbInfo};
use crate::services::words::WordsEngine;

/// One transfer job: a file or a directory of files
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub in_path: String,
    pub mode: RmtMode,
    /// Library root; the configured library for the media type when unset
    pub target_dir: Option<String>,
    /// Unidentified files are placed here
    pub unknown_dir: Option<String>,
    pub media_type: Option<MediaType>,
    pub tmdb_info: Option<TmdbInfo>,
    pub season: Option<u32>,
    pub episode_format: Option<EpisodeFormat>,
    /// Apply the episode format to every file in the directory
    pub need_fix_all: bool,
    /// Files smaller than this many bytes are skipped
    pub min_filesize: u64,
    pub manual: bool,
    /// Label recorded in history, e.g. the sync directory
    pub source: String,
}

impl TransferRequest {
    pub fn new(in_path: &str, mode: RmtMode) -> Self {
        Self {
            in_path: in_path.to_string(),
            mode,
            target_dir: None,
            unknown_dir: None,
            media_type: None,
            tmdb_info: None,
            season: None,
            episode_format: None,
            need_fix_all: false,
            min_filesize: 0,
            manual: false,
            source: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub success: bool,
    pub message: String,
    /// Destination paths written
    pub transferred: Vec<String>,
}

impl TransferOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            transferred: Vec::new(),
        }
    }
}

#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome>;
}

/// Place `src` at `dest` with the given mode
pub async fn place_file(src: &Path, dest: &Path, mode: RmtMode) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    match mode {
        RmtMode::Copy => {
            tokio::fs::copy(src, dest).await?;
        }
        RmtMode::Link => tokio::fs::hard_link(src, dest).await?,
        RmtMode::Softlink => symlink(src, dest).await?,
        RmtMode::Move => {
            // Cross-filesystem renames fail, fall back to copy then delete
            if tokio::fs::rename(src, dest).await.is_err() {
                tokio::fs::copy(src, dest).await?;
                tokio::fs::remove_file(src).await?;
            }
        }
        other => bail!("{} is not supported", other.label()),
    }
    Ok(())
}

#[cfg(unix)]
async fn symlink(src: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(src, dest).await
}

#[cfg(not(unix))]
async fn symlink(_src: &Path, _dest: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks are only supported on unix"))
}

/// First configured library directory for a media type
pub fn library_dir(settings: &AppSettings, media_type: MediaType) -> Option<String> {
    let paths = match media_type {
        MediaType::Movie => settings.media.movie_path.as_ref(),
        MediaType::Tv => settings.media.tv_path.as_ref(),
        // Anime falls back to the tv library when no anime library is set
        MediaType::Anime => settings
            .media
            .anime_path
            .as_ref()
            .filter(|p| !p.is_empty())
            .or(settings.media.tv_path.as_ref()),
    };
    paths.map(PathList::to_vec).and_then(|v| v.into_iter().next())
}

/// Media files under `path` (or `path` itself) of at least `min_size` bytes
pub fn collect_media_files(path: &Path, min_size: u64) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_media_file(&e.path().to_string_lossy()))
        .filter(|e| e.metadata().map(|m| m.len() >= min_size).unwrap_or(false))
        .map(|e| e.into_path())
        .collect()
}

pub struct LocalFileTransfer {
    db: Database,
    settings: Arc<SettingsStore>,
    metadata: Arc<dyn MetadataProvider>,
    words: Arc<WordsEngine>,
}

impl LocalFileTransfer {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        metadata: Arc<dyn MetadataProvider>,
        words: Arc<WordsEngine>,
    ) -> Self {
        Self {
            db,
            settings,
            metadata,
            words,
        }
    }

    async fn transfer_one(&self, file: &Path, request: &TransferRequest, single: bool) -> Result<String> {
        let file_str = file.to_string_lossy().to_string();
        let file_name = basename(&file_str);

        let outcome = self.words.process(&file_name, request.season.map(i64::from));
        let mut info = MediaInfo::from_words(&file_name, outcome);
        if let Some(season) = request.season {
            info.meta.season = Some(season);
        }
        if let Some(format) = &request.episode_format
            && (single || request.need_fix_all)
            && let Some(ep) = format.episode(&file_name)
        {
            info.meta.episode = Some(ep);
        }

        let tmdb = match &request.tmdb_info {
            Some(tmdb) => Some(tmdb.clone()),
            None => self.metadata.recognize(&info).await?,
        };
        let Some(tmdb) = tmdb else {
            if let Some(dir) = request.unknown_dir.as_deref().filter(|d| !d.is_empty()) {
                self.place_unknown(file, &file_name, dir, request.mode).await;
            }
            bail!("{}: no metadata found", file_name);
        };
        info.tmdb = Some(tmdb.clone());

        let media_type = request.media_type.unwrap_or(tmdb.media_type);
        let root = match &request.target_dir {
            Some(dir) if !dir.is_empty() => dir.clone(),
            _ => library_dir(&self.settings.snapshot(), media_type)
                .with_context(|| format!("No {} library directory configured", media_type))?,
        };

        let year = info.year();
        let dest = MediaOrganizer::new(Path::new(&root)).destination(
            media_type,
            &tmdb.title,
            year.as_deref(),
            info.meta.season,
            info.meta.episode,
            &file_name,
            &extension_of(&file_name),
        );
        if dest.exists() {
            bail!("{}: target already exists", dest.display());
        }

        place_file(file, &dest, request.mode)
            .await
            .with_context(|| format!("{} failed for {}", request.mode.label(), file_name))?;

        let dest_str = dest.to_string_lossy().to_string();
        self.db
            .transfer_history()
            .insert(CreateTransferHistory {
                mode: request.mode,
                source: request.source.clone(),
                in_path: file_str.clone(),
                dest: root,
                out_path: dest_str.clone(),
                media_type,
                category: info.category.clone(),
                tmdbid: Some(tmdb.id),
                title: tmdb.title.clone(),
                year,
                season_episode: Some(info.meta.season_episode_string()).filter(|s| !s.is_empty()),
            })
            .await?;
        info!(src = %file_str, dest = %dest_str, mode = %request.mode, "File transferred");
        Ok(dest_str)
    }

    /// Put an unidentified file into the unknown directory. The source stays
    /// in place so the unknown row can be re-transferred later.
    async fn place_unknown(&self, file: &Path, file_name: &str, dir: &str, mode: RmtMode) {
        let dest = Path::new(dir).join(file_name);
        if dest.exists() {
            return;
        }
        let mode = if mode == RmtMode::Move { RmtMode::Copy } else { mode };
        match place_file(file, &dest, mode).await {
            Ok(()) => info!(src = %file.display(), dest = %dest.display(), "Unidentified file placed in unknown directory"),
            Err(e) => warn!(src = %file.display(), error = %e, "Failed to place unidentified file"),
        }
    }

    /// The unknown row keeps the library target so a manual re-transfer
    /// lands where the automatic one would have
    async fn record_unknown(&self, path: &str, request: &TransferRequest) {
        let unknown = self.db.transfer_unknown();
        let result = async {
            if unknown.needs_insert(path).await? {
                unknown
                    .insert(path, request.target_dir.as_deref(), request.mode)
                    .await?;
            }
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(path, error = %e, "Failed to record unidentified file");
        }
    }
}

#[async_trait]
impl FileTransfer for LocalFileTransfer {
    async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        let in_path = normpath(&request.in_path);
        let path = Path::new(&in_path);
        if !path.exists() {
            return Ok(TransferOutcome::failed(format!("{} does not exist", in_path)));
        }
        if !RmtMode::LITE.contains(&request.mode) {
            return Ok(TransferOutcome::failed(format!("{} is not supported", request.mode.label())));
        }

        let files = collect_media_files(path, request.min_filesize);
        if files.is_empty() {
            return Ok(TransferOutcome::failed(format!("No media files found in {}", in_path)));
        }
        debug!(path = %in_path, files = files.len(), "Starting transfer");

        let single = files.len() == 1;
        let mut outcome = TransferOutcome {
            success: true,
            ..Default::default()
        };
        let mut failures = Vec::new();
        for file in &files {
            match self.transfer_one(file, &request, single).await {
                Ok(dest) => outcome.transferred.push(dest),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Transfer failed");
                    failures.push(format!("{:#}", e));
                }
            }
        }

        if failures.is_empty() {
            if let Err(e) = self.db.transfer_unknown().mark_processed(&in_path).await {
                warn!(path = %in_path, error = %e, "Failed to update unknown state");
            }
        } else {
            outcome.success = false;
            outcome.message = failures.join("; ");
            if !request.manual || outcome.transferred.is_empty() {
                self.record_unknown(&in_path, &request).await;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata::UnconfiguredMetadata;

    fn matrix() -> TmdbInfo {
        TmdbInfo {
            id: 603,
            media_type: MediaType::Movie,
            title: "The Matrix".to_string(),
            year: Some("1999".to_string()),
            overview: None,
            poster: None,
            season_count: None,
        }
    }

    async fn setup() -> (tempfile::TempDir, Database, LocalFileTransfer) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let mut settings = AppSettings::default();
        settings.media.movie_path = Some(PathList::One(dir.path().join("movies").display().to_string()));
        let store = Arc::new(SettingsStore::new(dir.path().join("config.yaml"), settings));
        let transfer = LocalFileTransfer::new(
            db.clone(),
            store,
            Arc::new(UnconfiguredMetadata),
            Arc::new(WordsEngine::new()),
        );
        (dir, db, transfer)
    }

    #[tokio::test]
    async fn test_copy_with_known_title_records_history() {
        let (dir, db, transfer) = setup().await;
        let src = dir.path().join("downloads/The.Matrix.1999.1080p.mkv");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, b"video").unwrap();

        let mut request = TransferRequest::new(&src.display().to_string(), RmtMode::Copy);
        request.tmdb_info = Some(matrix());
        let outcome = transfer.transfer(request).await.unwrap();

        assert!(outcome.success, "{}", outcome.message);
        let dest = dir.path().join("movies/The Matrix (1999)/The Matrix (1999).mkv");
        assert!(dest.exists());
        assert!(src.exists());
        let (total, rows) = db.transfer_history().list(None, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].title, "The Matrix");
    }

    #[tokio::test]
    async fn test_unidentified_file_goes_to_unknown() {
        let (dir, db, transfer) = setup().await;
        let src = dir.path().join("Unknown.Thing.mkv");
        std::fs::write(&src, b"video").unwrap();

        let outcome = transfer
            .transfer(TransferRequest::new(&src.display().to_string(), RmtMode::Move))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("no metadata found"));
        assert_eq!(db.transfer_unknown().list_pending().await.unwrap().len(), 1);
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_unknown_row_keeps_library_target() {
        let (dir, db, transfer) = setup().await;
        let src = dir.path().join("downloads/Unknown.Thing.mkv");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, b"video").unwrap();
        let target = dir.path().join("library/movies").display().to_string();
        let unknown_dir = dir.path().join("library/unknown");

        let mut request = TransferRequest::new(&src.display().to_string(), RmtMode::Move);
        request.target_dir = Some(target.clone());
        request.unknown_dir = Some(unknown_dir.display().to_string());
        let outcome = transfer.transfer(request).await.unwrap();
        assert!(!outcome.success);

        let rows = db.transfer_unknown().list_pending().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dest, target);
        assert!(unknown_dir.join("Unknown.Thing.mkv").exists());
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_remote_modes_are_rejected() {
        let (dir, _db, transfer) = setup().await;
        let outcome = transfer
            .transfer(TransferRequest::new(&dir.path().display().to_string(), RmtMode::Rclone))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("not supported"));
    }

    #[tokio::test]
    async fn test_move_falls_back_and_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.mkv");
        let dest = dir.path().join("nested/b.mkv");
        std::fs::write(&src, b"x").unwrap();
        place_file(&src, &dest, RmtMode::Move).await.unwrap();
        assert!(!src.exists());
        assert!(dest.exists());
    }

    #[test]
    fn test_anime_falls_back_to_tv_library() {
        let mut settings = AppSettings::default();
        settings.media.tv_path = Some(PathList::Many(vec!["/tv".to_string(), "/tv2".to_string()]));
        assert_eq!(library_dir(&settings, MediaType::Anime).as_deref(), Some("/tv"));
        assert_eq!(library_dir(&settings, MediaType::Movie), None);
    }
}
