use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::targets::ImageRef;
use crate::common::errors::CacheIoError;
use crate::common::persist;

/// Bumped whenever the on-disk layout changes; older files are discarded
const FOLDER_CACHE_VERSION: u32 = 1;

/// Memoized listing of one folder or archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderCacheEntry {
    /// Folder (or archive) that was listed
    pub folder: PathBuf,
    /// Folder mtime at scan time
    pub mtime_secs: i64,
    /// Folder ctime at scan time
    pub ctime_secs: i64,
    /// Every image in natural order, before the extract limit
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub invalidated: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.invalidated;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Deserialize)]
struct FolderCacheFile {
    version: u32,
    timestamp: chrono::DateTime<chrono::Utc>,
    entries: HashMap<String, FolderCacheEntry>,
}

#[derive(Serialize)]
struct FolderCacheFileRef<'a> {
    version: u32,
    timestamp: chrono::DateTime<chrono::Utc>,
    entries: &'a HashMap<String, FolderCacheEntry>,
}

/// Per-folder scan cache, persisted as JSON
#[derive(Debug)]
pub struct FolderCache {
    path: Option<PathBuf>,
    /// When the store was last written
    pub timestamp: chrono::DateTime<chrono::Utc>,
    entries: HashMap<String, FolderCacheEntry>,
    dirty: bool,
    pub stats: CacheStats,
}

impl FolderCache {
    /// A cache that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            timestamp: chrono::Utc::now(),
            entries: HashMap::new(),
            dirty: false,
            stats: CacheStats::default(),
        }
    }

    /// Load the store at `path`; a missing or unreadable file starts empty
    pub fn load(path: &Path) -> Self {
        let mut cache = Self::in_memory();
        cache.path = Some(path.to_path_buf());

        let Ok(contents) = std::fs::read_to_string(path) else {
            return cache;
        };
        match serde_json::from_str::<FolderCacheFile>(&contents) {
            Ok(file) if file.version == FOLDER_CACHE_VERSION => {
                cache.timestamp = file.timestamp;
                cache.entries = file.entries;
            }
            Ok(_) => tracing::debug!("Discarding folder cache with old layout: {}", path.display()),
            Err(e) => tracing::warn!("Ignoring corrupt folder cache {}: {}", path.display(), e),
        }
        cache
    }

    /// Return the cached entry if the folder's timestamps are unchanged
    pub fn check(&mut self, folder: &Path, mtime_secs: i64, ctime_secs: i64) -> Option<&FolderCacheEntry> {
        let key = folder.display().to_string();

        let unchanged = self
            .entries
            .get(&key)
            .map(|entry| entry.mtime_secs == mtime_secs && entry.ctime_secs == ctime_secs);

        match unchanged {
            Some(true) => {
                self.stats.hits += 1;
                self.entries.get(&key)
            }
            Some(false) => {
                self.stats.invalidated += 1;
                self.entries.remove(&key);
                self.dirty = true;
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a folder listing
    pub fn store(&mut self, entry: FolderCacheEntry) {
        let key = entry.folder.display().to_string();
        self.entries.insert(key, entry);
        self.dirty = true;
    }

    /// Remove a folder from the cache
    pub fn invalidate(&mut self, folder: &Path) {
        let key = folder.display().to_string();
        if self.entries.remove(&key).is_some() {
            self.dirty = true;
        }
    }

    /// Write the store if anything changed
    pub fn save(&mut self) -> Result<(), CacheIoError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        self.timestamp = chrono::Utc::now();
        let json = serde_json::to_vec(&FolderCacheFileRef {
            version: FOLDER_CACHE_VERSION,
            timestamp: self.timestamp,
            entries: &self.entries,
        })?;

        if let Err(source) = persist::write_atomic(&path, &json) {
            // Keep serving from memory for the rest of the run
            self.path = None;
            return Err(CacheIoError::Write { path, source });
        }
        self.dirty = false;
        Ok(())
    }

    /// Empty the cache and delete its file
    pub fn clear(&mut self) -> Result<(), CacheIoError> {
        self.entries.clear();
        self.dirty = false;
        match &self.path {
            Some(path) => persist::remove_if_exists(path).map_err(|source| CacheIoError::Remove {
                path: path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Get cache age as a human-readable string
    pub fn age_string(&self) -> String {
        let secs = (chrono::Utc::now() - self.timestamp).num_seconds();

        if secs < 60 {
            format!("{}s ago", secs)
        } else if secs < 3600 {
            format!("{}m ago", secs / 60)
        } else if secs < 86400 {
            format!("{}h ago", secs / 3600)
        } else {
            format!("{}d ago", secs / 86400)
        }
    }

    /// Number of cached folders
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
