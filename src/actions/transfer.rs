//! Transfer and identification actions

use super::prelude::*;
use crate::media::filename::EpisodeFormat;
use crate::media::is_media_file;
use crate::media::paths::{dirname, normpath};
use crate::services::system::delete_media_file;
use crate::services::transfer::TransferRequest;

#[derive(Debug, Deserialize)]
pub struct SchRequest {
    #[serde(default)]
    pub item: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    #[serde(default, deserialize_with = "params::id_list")]
    pub id: Vec<i64>,
}

/// Identification hints shared by `rename` and `rename_udf`
#[derive(Debug, Default, Deserialize)]
pub struct ManualHints {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub syncmod: Option<String>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub tmdb: Option<i64>,
    #[serde(default, rename = "type", deserialize_with = "params::opt_string")]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "params::opt_u32")]
    pub season: Option<u32>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub episode_format: Option<String>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub episode_offset: Option<i64>,
    /// Megabytes
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub min_filesize: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub logid: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub unknown_id: Option<i64>,
    #[serde(flatten)]
    pub hints: ManualHints,
}

#[derive(Debug, Deserialize)]
pub struct RenameUdfRequest {
    #[serde(default)]
    pub inpath: String,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub outpath: Option<String>,
    #[serde(flatten)]
    pub hints: ManualHints,
}

#[derive(Debug, Deserialize)]
pub struct DeleteHistoryRequest {
    #[serde(default, deserialize_with = "params::id_list")]
    pub logids: Vec<i64>,
    #[serde(default)]
    pub flag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReIdentifyRequest {
    #[serde(default)]
    pub flag: String,
    #[serde(default, deserialize_with = "params::id_list")]
    pub ids: Vec<i64>,
}

impl WebActions {
    /// Mode from the sync settings, used when a request or record carries none
    fn default_mode(&self) -> RmtMode {
        self.settings
            .snapshot()
            .sync
            .extra
            .get("sync_mod")
            .and_then(|v| v.as_str())
            .and_then(RmtMode::parse)
            .unwrap_or(RmtMode::Copy)
    }

    fn mode_or_default(&self, mode: Option<&str>) -> RmtMode {
        mode.and_then(RmtMode::parse).unwrap_or_else(|| self.default_mode())
    }

    pub(super) async fn sch(&self, req: SchRequest) -> ActionResult {
        match req.item.as_deref() {
            Some("sync") => {
                let sync = self.sync.clone();
                let progress = self.progress.clone();
                tokio::spawn(async move {
                    progress.start("sync");
                    if let Err(e) = sync.transfer_all().await {
                        error!(error = %e, "Directory sync failed");
                    }
                    progress.end("sync");
                });
            }
            other => warn!(item = ?other, "Unknown scheduled service"),
        }
        Ok(ActionReply::ok().msg("service started").field("item", req.item))
    }

    pub(super) async fn del_unknown_path(&self, req: IdsRequest) -> ActionResult {
        let repo = self.db.transfer_unknown();
        for id in req.id {
            repo.delete(id).await?;
        }
        Ok(ActionReply::ok())
    }

    /// Build the manual transfer request and run it
    async fn manual_transfer(
        &self,
        in_path: &str,
        target_dir: Option<String>,
        hints: &ManualHints,
        need_fix_all: bool,
    ) -> Result<(), ActionError> {
        let in_path = normpath(in_path);
        if !std::path::Path::new(&in_path).exists() {
            return Err(ActionError::Transfer("input path does not exist".to_string()));
        }
        let media_type = MediaType::from_request(hints.media_type.as_deref());

        let tmdb_info = match hints.tmdb {
            Some(tmdbid) => match self.metadata.get_tmdb_info(media_type, tmdbid).await? {
                Some(info) => Some(info),
                None => {
                    return Err(ActionError::Transfer(
                        "recognition failed, no TMDB info found".to_string(),
                    ));
                }
            },
            None => None,
        };
        let episode_format = match hints.episode_format.as_deref() {
            Some(format) => Some(
                EpisodeFormat::new(format, hints.episode_offset)
                    .map_err(|e| ActionError::invalid(e.to_string()))?,
            ),
            None => None,
        };

        let mut request = TransferRequest::new(&in_path, self.mode_or_default(hints.syncmod.as_deref()));
        request.target_dir = target_dir.map(|d| normpath(&d)).filter(|d| !d.is_empty());
        request.media_type = Some(media_type);
        request.tmdb_info = tmdb_info;
        request.season = hints.season;
        request.episode_format = episode_format;
        request.need_fix_all = need_fix_all;
        request.min_filesize = hints
            .min_filesize
            .and_then(|mb| u64::try_from(mb).ok())
            .unwrap_or(0)
            * 1024
            * 1024;
        request.manual = true;
        request.source = "manual".to_string();

        let outcome = self.transfer.transfer(request).await?;
        if outcome.success {
            info!(path = %in_path, files = outcome.transferred.len(), "Manual transfer finished");
            Ok(())
        } else {
            Err(ActionError::Transfer(outcome.message))
        }
    }

    pub(super) async fn rename(&self, req: RenameRequest) -> ActionResult {
        let (mut path, dest) = if let Some(logid) = req.logid {
            let record = self
                .db
                .transfer_history()
                .get(logid)
                .await?
                .ok_or_else(|| ActionError::invalid("transfer record not found"))?;
            (record.source_full_path(), record.dest)
        } else if let Some(unknown_id) = req.unknown_id {
            let record = self
                .db
                .transfer_unknown()
                .get(unknown_id)
                .await?
                .ok_or_else(|| ActionError::invalid("unknown record not found"))?;
            (record.path, record.dest)
        } else {
            (String::new(), String::new())
        };
        if path.is_empty() {
            return Err(ActionError::invalid("invalid input path"));
        }

        // A single episode fixed with a format fixes its siblings too
        let mut need_fix_all = false;
        if is_media_file(&path) && req.hints.episode_format.is_some() {
            path = dirname(&path);
            need_fix_all = true;
        }

        self.manual_transfer(&path, Some(dest), &req.hints, need_fix_all)
            .await?;
        if !need_fix_all && req.logid.is_none() {
            self.db.transfer_unknown().mark_processed(&path).await?;
        }
        Ok(ActionReply::ok().msg("transfer succeeded"))
    }

    pub(super) async fn rename_udf(&self, req: RenameUdfRequest) -> ActionResult {
        if req.inpath.is_empty() || !std::path::Path::new(&req.inpath).exists() {
            return Err(ActionError::invalid("input path does not exist"));
        }
        self.manual_transfer(&req.inpath, req.outpath, &req.hints, false)
            .await?;
        Ok(ActionReply::ok().msg("transfer succeeded"))
    }

    pub(super) async fn delete_history(&self, req: DeleteHistoryRequest) -> ActionResult {
        let flag = req.flag.as_deref().unwrap_or_default();
        let del_source = matches!(flag, "del_source" | "del_all");
        let del_dest = matches!(flag, "del_dest" | "del_all");
        let repo = self.db.transfer_history();

        for logid in req.logids {
            let Some(record) = repo.get(logid).await? else {
                continue;
            };
            repo.delete(logid).await?;

            if del_source {
                log_file_delete(delete_media_file(&record.source_path, &record.source_filename));
            }
            if del_dest {
                if record.dest_path.is_empty() || record.dest_filename.is_empty() {
                    warn!(id = logid, title = %record.title, "History record has no destination file");
                } else {
                    log_file_delete(delete_media_file(&record.dest_path, &record.dest_filename));
                }
            }
        }
        Ok(ActionReply::ok())
    }

    pub(super) async fn re_identification(&self, req: ReIdentifyRequest) -> ActionResult {
        let mut messages: Vec<String> = Vec::new();
        for id in req.ids {
            let (path, dest, mode, unknown) = match req.flag.as_str() {
                "unidentification" => {
                    let record = self
                        .db
                        .transfer_unknown()
                        .get(id)
                        .await?
                        .ok_or_else(|| ActionError::invalid("unknown record not found"))?;
                    (record.path, record.dest, record.mode, true)
                }
                "history" => {
                    let record = self
                        .db
                        .transfer_history()
                        .get(id)
                        .await?
                        .ok_or_else(|| ActionError::invalid("transfer record not found"))?;
                    (record.source_full_path(), record.dest, record.mode, false)
                }
                _ => break,
            };
            if path.is_empty() {
                return Err(ActionError::invalid("invalid unknown path"));
            }

            let mut request = TransferRequest::new(&path, self.mode_or_default(Some(&mode)));
            request.target_dir = Some(dest).filter(|d| !d.is_empty());
            request.manual = true;
            request.source = "manual".to_string();
            let outcome = self.transfer.transfer(request).await?;
            if outcome.success {
                if unknown {
                    self.db.transfer_unknown().mark_processed(&path).await?;
                }
            } else if !messages.contains(&outcome.message) {
                messages.push(outcome.message);
            }
        }

        if messages.is_empty() {
            Ok(ActionReply::ok().msg("transfer succeeded"))
        } else {
            Err(ActionError::Transfer(messages.join(", ")))
        }
    }

    pub(super) async fn truncate_blacklist(&self) -> ActionResult {
        self.db.blacklist().truncate().await?;
        info!("Transfer blacklist cleared");
        Ok(ActionReply::ok())
    }
}

/// Batch deletes keep going; each outcome is only logged
pub(super) fn log_file_delete(result: anyhow::Result<String>) {
    match result {
        Ok(msg) => info!(message = %msg, "Media file deleted"),
        Err(e) => error!(error = %e, "Failed to delete media file"),
    }
}
