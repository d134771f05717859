//! Metadata cache persisted as a JSON file
//!
//! Keys are the normalized names that were looked up. An entry with id 0
//! records a failed lookup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::sqlite_helpers::now_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaCacheEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub poster: String,
    #[serde(default)]
    pub update_time: String,
}

struct State {
    entries: BTreeMap<String, MetaCacheEntry>,
    dirty: bool,
}

pub struct MetaCache {
    path: PathBuf,
    state: RwLock<State>,
}

impl MetaCache {
    /// Load the cache file; a missing or unreadable file starts empty
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Metadata cache is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "Metadata cache loaded");
        Self {
            path: path.to_path_buf(),
            state: RwLock::new(State { entries, dirty: false }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<MetaCacheEntry> {
        self.state.read().entries.get(key).cloned()
    }

    pub fn insert(&self, key: &str, mut entry: MetaCacheEntry) {
        entry.update_time = now_timestamp();
        let mut state = self.state.write();
        state.entries.insert(key.to_string(), entry);
        state.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry, keyed, for the cache page
    pub fn entries(&self) -> Vec<(String, MetaCacheEntry)> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.write();
        let removed = state.entries.remove(key).is_some();
        state.dirty |= removed;
        removed
    }

    pub fn modify_title(&self, key: &str, title: &str) -> bool {
        let mut state = self.state.write();
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        entry.title = title.to_string();
        entry.update_time = now_timestamp();
        state.dirty = true;
        true
    }

    /// Drop entries recorded for failed lookups
    pub fn delete_unknown(&self) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, e| e.id != 0);
        let removed = before - state.entries.len();
        state.dirty |= removed > 0;
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.dirty = true;
    }

    /// Write the file when something changed, or always with `force`
    pub fn save(&self, force: bool) -> Result<bool> {
        let json = {
            let state = self.state.read();
            if !state.dirty && !force {
                return Ok(false);
            }
            serde_json::to_string(&state.entries)?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write metadata cache {}", self.path.display()))?;
        self.state.write().dirty = false;
        info!(path = %self.path.display(), "Metadata cache saved");
        Ok(true)
    }

    /// Empty the cache and remove its file
    pub fn clear_and_remove(&self) -> Result<()> {
        self.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        self.state.write().dirty = false;
        Ok(())
    }
}
