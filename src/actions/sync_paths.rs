//! Sync directory maintenance

use super::prelude::*;
use crate::media::paths::{common_prefix, is_path_in_path, normpath};

#[derive(Debug, Deserialize)]
pub struct SyncPathForm {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub sid: Option<i64>,
    #[serde(default, rename = "from", deserialize_with = "params::opt_string")]
    pub source: Option<String>,
    #[serde(default, rename = "to", deserialize_with = "params::opt_string")]
    pub dest: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub unknown: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub syncmod: Option<String>,
    #[serde(default, deserialize_with = "params::flag")]
    pub rename: bool,
    #[serde(default, deserialize_with = "params::flag")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncPathId {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub sid: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckSyncPathRequest {
    #[serde(default)]
    pub flag: String,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub sid: Option<i64>,
    #[serde(default, deserialize_with = "params::flag")]
    pub checked: bool,
}

/// Page view of a sync path row
pub(super) fn sync_path_view(record: &SyncPathRecord) -> Value {
    json!({
        "id": record.id,
        "from": record.source,
        "to": record.dest,
        "unknown": record.unknown,
        "syncmod": record.mode,
        "syncmod_name": record.rmt_mode().label(),
        "rename": record.rename,
        "enabled": record.enabled,
    })
}

impl WebActions {
    pub(super) async fn add_or_edit_sync_path(&self, form: SyncPathForm) -> ActionResult {
        let Some(source) = form.source else {
            return Err(ActionError::failed("source directory is required"));
        };
        if !std::path::Path::new(&source).exists() {
            return Err(ActionError::failed(format!("{} does not exist", source)));
        }
        let source = normpath(&source);
        let dest = form.dest.map(|d| normpath(&d));
        if let Some(dest) = &dest
            && is_path_in_path(&source, dest)
        {
            return Err(ActionError::failed(
                "destination cannot be inside the source directory",
            ));
        }
        let unknown = form.unknown.map(|u| normpath(&u));

        let mode = match form.syncmod.as_deref() {
            Some(key) => RmtMode::parse(key).ok_or_else(|| ActionError::failed("unknown sync mode"))?,
            None => RmtMode::Copy,
        };
        if mode == RmtMode::Link
            && let Some(dest) = &dest
        {
            let common = common_prefix(&source, dest);
            if common.is_empty() || common == "/" {
                return Err(ActionError::failed("hard links cannot span disks"));
            }
        }

        let id = self
            .db
            .sync_paths()
            .save(
                form.sid,
                CreateSyncPath {
                    source: source.clone(),
                    dest,
                    unknown,
                    mode,
                    rename: form.rename,
                    enabled: form.enabled,
                    note: None,
                },
            )
            .await?;
        info!(id, source = %source, mode = %mode, "Sync path saved");

        self.sync.reload().await?;
        Ok(ActionReply::ok().msg(""))
    }

    pub(super) async fn get_sync_path(&self, req: SyncPathId) -> ActionResult {
        let record = match req.sid {
            Some(sid) => self.db.sync_paths().get(sid).await?,
            None => None,
        };
        let record = record.ok_or_else(|| ActionError::failed("sync path not found"))?;
        Ok(ActionReply::ok().field("data", sync_path_view(&record)))
    }

    pub(super) async fn delete_sync_path(&self, req: SyncPathId) -> ActionResult {
        if let Some(sid) = req.sid {
            self.db.sync_paths().delete(sid).await?;
            self.sync.reload().await?;
        }
        Ok(ActionReply::ok())
    }

    pub(super) async fn check_sync_path(&self, req: CheckSyncPathRequest) -> ActionResult {
        let sid = req
            .sid
            .ok_or_else(|| ActionError::failed("sync path id is required"))?;
        let repo = self.db.sync_paths();
        match req.flag.as_str() {
            "rename" => repo.set_rename(sid, req.checked).await?,
            "enable" if req.checked => {
                if !repo.enable_exclusive(sid).await? {
                    return Err(ActionError::failed("sync path not found"));
                }
            }
            "enable" => repo.set_enabled(sid, false).await?,
            _ => return Err(ActionError::failed("unknown flag")),
        }
        self.sync.reload().await?;
        Ok(ActionReply::ok())
    }
}
