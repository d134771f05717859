//! File-system helpers behind the admin actions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sysinfo::Disks;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::media::paths::{dirname, join, normpath};
use crate::media::{is_media_file, is_subtitle_file};

static SEASON_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^S\d{2}|^Season").expect("valid regex"));
static DRIVE_ROOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]:/$").expect("valid regex"));

/// Human readable size, e.g. `1.50G`
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G", "T"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", size, UNITS[unit])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpaceUsage {
    pub total: u64,
    pub free: u64,
}

impl SpaceUsage {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.free)
    }
}

/// Disk usage of the partitions holding `paths`, each partition counted once
pub fn library_space(paths: &[String]) -> SpaceUsage {
    let disks = Disks::new_with_refreshed_list();
    let mut partitions: BTreeMap<PathBuf, (u64, u64)> = BTreeMap::new();
    for path in paths.iter().filter(|p| !p.is_empty()) {
        let path = Path::new(path);
        let disk = disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());
        if let Some(disk) = disk {
            partitions.insert(
                disk.mount_point().to_path_buf(),
                (disk.total_space(), disk.available_space()),
            );
        }
    }
    partitions
        .values()
        .fold(SpaceUsage::default(), |acc, (total, free)| SpaceUsage {
            total: acc.total + total,
            free: acc.free + free,
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardlinkEntry {
    pub file: String,
    pub filename: String,
    pub filepath: String,
}

/// Other names of `file` below `dir` (same device and inode)
#[cfg(unix)]
pub fn find_hardlinks(file: &Path, dir: &Path) -> Result<Vec<HardlinkEntry>> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(file).with_context(|| format!("Cannot stat {}", file.display()))?;
    if meta.nlink() <= 1 {
        return Ok(Vec::new());
    }
    let (dev, ino) = (meta.dev(), meta.ino());
    let links = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path() != file)
        .filter(|e| e.metadata().is_ok_and(|m| m.dev() == dev && m.ino() == ino))
        .map(|e| {
            let path = e.path().to_string_lossy().replace('\\', "/");
            HardlinkEntry {
                filename: e.file_name().to_string_lossy().to_string(),
                filepath: dirname(&path),
                file: path,
            }
        })
        .collect();
    Ok(links)
}

#[cfg(not(unix))]
pub fn find_hardlinks(_file: &Path, _dir: &Path) -> Result<Vec<HardlinkEntry>> {
    Ok(Vec::new())
}

/// Which entries `list_sub_path` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFilter {
    All,
    OnlyDir,
    OnlyFile,
    MediaFile,
    SubFile,
}

impl PathFilter {
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("ALL").to_uppercase().as_str() {
            "ONLYDIR" => PathFilter::OnlyDir,
            "ONLYFILE" => PathFilter::OnlyFile,
            "MEDIAFILE" => PathFilter::MediaFile,
            "SUBFILE" => PathFilter::SubFile,
            _ => PathFilter::All,
        }
    }

    fn wants_dirs(&self) -> bool {
        matches!(self, PathFilter::All | PathFilter::OnlyDir)
    }

    fn wants_file(&self, path: &str) -> bool {
        match self {
            PathFilter::All | PathFilter::OnlyFile => true,
            PathFilter::MediaFile => is_media_file(path),
            PathFilter::SubFile => is_subtitle_file(path),
            PathFilter::OnlyDir => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubPathEntry {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub rel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Direct children of `dir` (of the root when unset, of the parent when a file is given)
pub fn list_sub_path(dir: Option<&str>, filter: PathFilter) -> Result<Vec<SubPathEntry>> {
    let dir = match dir.map(|d| urlencoding::decode(d).map(|c| c.into_owned()).unwrap_or_else(|_| d.to_string())) {
        Some(d) if !d.is_empty() && d != "/" => {
            let d = normpath(&d.replace('\\', "/"));
            if Path::new(&d).is_dir() { d } else { dirname(&d) }
        }
        _ => "/".to_string(),
    };

    let mut children: Vec<PathBuf> = std::fs::read_dir(&dir)
        .with_context(|| format!("Cannot read {}", dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    children.sort();

    let mut entries = Vec::new();
    for child in children {
        let path = child.to_string_lossy().replace('\\', "/");
        let name = child
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if child.is_dir() {
            if filter.wants_dirs() {
                entries.push(SubPathEntry {
                    rel: dirname(&path),
                    path,
                    name,
                    kind: "dir",
                    ext: None,
                    size: None,
                });
            }
        } else if filter.wants_file(&path) {
            let ext = child
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            let size = std::fs::metadata(&child).map(|m| m.len()).unwrap_or(0);
            entries.push(SubPathEntry {
                rel: dirname(&path),
                path,
                name,
                kind: "file",
                ext: Some(ext),
                size: Some(format_size(size)),
            });
        }
    }
    Ok(entries)
}

fn has_media_files(dir: &str) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && is_media_file(&e.path().to_string_lossy()))
}

fn remove_dir(dir: &str) -> Result<()> {
    std::fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {}", dir))?;
    info!(dir, "Removed empty media directory");
    Ok(())
}

/// Delete a media file, its `.nfo`, and the season and title folders it
/// leaves without media. Returns a message describing what was deleted.
pub fn delete_media_file(file_dir: &str, file_name: &str) -> Result<String> {
    let file_dir = normpath(&file_dir.replace('\\', "/"));
    let file_path = join(&file_dir, file_name);
    if !Path::new(&file_path).exists() {
        bail!("{} does not exist", file_path);
    }

    std::fs::remove_file(&file_path).with_context(|| format!("Failed to delete {}", file_path))?;
    let nfo = Path::new(&file_path).with_extension("nfo");
    if nfo.exists() {
        std::fs::remove_file(&nfo).with_context(|| format!("Failed to delete {}", nfo.display()))?;
    }
    debug!(path = %file_path, "Deleted media file");

    let slashes = file_dir.matches('/').count();
    let dir_name = Path::new(&file_dir)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let media_dir = if SEASON_DIR_RE.is_match(&dir_name) && slashes > 1 {
        if !has_media_files(&file_dir) {
            remove_dir(&file_dir)?;
        }
        dirname(&file_dir)
    } else {
        file_dir.clone()
    };

    if media_dir != "/"
        && media_dir.matches('/').count() > 1
        && !DRIVE_ROOT_RE.is_match(&media_dir)
        && Path::new(&media_dir).exists()
        && !has_media_files(&media_dir)
    {
        remove_dir(&media_dir)?;
    }

    Ok(format!("{} deleted", file_path))
}

/// Extract a zip archive into `dest`, refusing entries that escape it
pub fn unpack_backup(archive: &Path, dest: &Path) -> Result<usize> {
    let file = std::fs::File::open(archive).with_context(|| format!("Cannot open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("Not a zip archive")?;
    std::fs::create_dir_all(dest)?;

    let mut count = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Archive entry {} escapes the target directory", entry.name());
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)
            .with_context(|| format!("Cannot write {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)?;
        count += 1;
    }
    info!(archive = %archive.display(), files = count, "Backup restored");
    Ok(count)
}
