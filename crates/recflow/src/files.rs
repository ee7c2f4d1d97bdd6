use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{debug, warn};
use walkdir::WalkDir;

/// Extensions considered recordings when walking a library
pub const MEDIA_EXTENSIONS: &[&str] = &["ts", "mkv", "mp4", "m4v", "avi", "mov", "webm", "mp3"];

/// Size of a file in bytes, 0 if it cannot be read
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Check whether a directory has no entries. Unreadable directories count as not empty.
pub fn dir_is_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => {
            warn!("Could not open directory {} for read: {}", dir.display(), e);
            false
        }
    }
}

/// Remove `dir` if it is empty. Returns true if it was removed.
pub fn remove_dir_if_empty(dir: &Path) -> Result<bool> {
    if !dir.is_dir() || !dir_is_empty(dir) {
        return Ok(false);
    }
    fs::remove_dir(dir)
        .with_context(|| format!("Failed to remove empty directory: {}", dir.display()))?;
    Ok(true)
}

/// Move `src` to `dest`, creating the destination directory when missing.
///
/// Both paths are expected on the same filesystem.
pub fn move_into_place(src: &Path, dest: &Path) -> Result<()> {
    if let Some(dir) = dest.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            debug!("Creating destination directory: {}", dir.display());
            fs::create_dir_all(dir)
                .with_context(|| format!("Unable to create directory: {}", dir.display()))?;
        }
    }
    fs::rename(src, dest)
        .with_context(|| format!("Failed to move {} to {}", src.display(), dest.display()))?;
    Ok(())
}

/// Replace the extension of `path`, keeping everything else
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    let mut out = path.to_path_buf();
    out.set_extension(ext);
    out
}

/// Recursively collect media files under `root`, sorted by path
pub fn media_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_media = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| MEDIA_EXTENSIONS.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false);

        if is_media {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files
}
