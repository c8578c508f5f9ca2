use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::track::TrackRef;

pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac"];

/// Answers whether a dropped path is playable media that exists.
pub trait ExistenceCheck: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// Filesystem check: the path must be a regular file with a playable extension.
///
/// Any I/O failure (missing file, permission denied, broken link) counts as
/// "does not exist".
#[derive(Debug, Clone)]
pub struct FsExistence {
    extensions: Vec<String>,
}

impl FsExistence {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn is_playable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

impl Default for FsExistence {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

impl ExistenceCheck for FsExistence {
    fn exists(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) => meta.is_file() && self.is_playable(path),
            Err(e) => {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    log::debug!("Access denied for dropped path {:?}", path);
                } else {
                    log::debug!("Skipping dropped path {:?}: {}", path, e);
                }
                false
            }
        }
    }
}

/// Playable files in `dir`, sorted by name (case-insensitive).
///
/// Unreadable entries are skipped.
pub fn list_directory(dir: &Path, filter: &FsExistence) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && filter.is_playable(path))
        .collect();

    entries.sort_by_key(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_lowercase()
    });

    Ok(entries)
}

/// Whatever the surrounding UI is currently showing.
///
/// `play` on an empty queue falls back to populating the queue from here.
pub trait CurrentView: Send {
    fn tracks(&self) -> Vec<TrackRef>;

    /// Position within `tracks()` to start from
    fn selected(&self) -> usize {
        0
    }
}

/// A directory listing used as the current view.
#[derive(Debug, Clone)]
pub struct DirectoryView {
    pub dir: PathBuf,
    pub filter: FsExistence,
}

impl DirectoryView {
    pub fn new(dir: impl Into<PathBuf>, filter: FsExistence) -> Self {
        Self { dir: dir.into(), filter }
    }
}

impl CurrentView for DirectoryView {
    fn tracks(&self) -> Vec<TrackRef> {
        match list_directory(&self.dir, &self.filter) {
            Ok(paths) => paths.into_iter().map(TrackRef::from).collect(),
            Err(e) => {
                log::warn!("Cannot list {:?}: {}", self.dir, e);
                Vec::new()
            }
        }
    }
}
