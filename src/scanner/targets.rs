use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::errors::ScanError;

/// Known image extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Archive containers expanded into virtual folders
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz"];

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check if a file or archive member is an image based on extension
pub fn is_image(name: &str) -> bool {
    has_extension(name, IMAGE_EXTENSIONS)
}

/// Check if a file is a supported archive container
pub fn is_archive(name: &str) -> bool {
    has_extension(name, ARCHIVE_EXTENSIONS)
}

/// Identity of one discovered image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// File on disk; for archive members, the archive file
    pub path: PathBuf,
    /// Member name inside the archive, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    /// Containing folder (the archive itself for members)
    pub folder: PathBuf,
    /// Zero-based page index in the folder's natural order
    pub position: usize,
    pub size_bytes: u64,
    /// Modification time, seconds since the epoch
    pub mtime_secs: i64,
    /// Content hash, the feature cache key
    pub fingerprint: String,
}

impl ImageRef {
    /// Path shown to users, `archive.cbz!/member` for archive members
    pub fn display_path(&self) -> String {
        match &self.member {
            Some(member) => format!("{}!/{}", self.path.display(), member),
            None => self.path.display().to_string(),
        }
    }

    /// Ordering key inside a group: page order, then path
    pub fn page_key(&self) -> (usize, String) {
        (self.position, self.display_path())
    }

    pub fn is_archive_member(&self) -> bool {
        self.member.is_some()
    }
}

/// Candidates selected from one folder or archive
#[derive(Debug, Clone)]
pub struct FolderPlan {
    pub folder: PathBuf,
    pub is_archive: bool,
    /// Images in the folder before the extract limit
    pub total_images: usize,
    pub candidates: Vec<ImageRef>,
}

/// Output of a scan: per-folder candidates plus non-fatal errors
#[derive(Debug, Default)]
pub struct BatchPlan {
    pub root: PathBuf,
    pub folders: Vec<FolderPlan>,
    /// Folders pruned by exclusion or the time filter
    pub folders_skipped: usize,
    pub errors: Vec<ScanError>,
}

impl BatchPlan {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    /// All candidates, folder by folder in page order
    pub fn candidates(&self) -> Vec<ImageRef> {
        self.folders
            .iter()
            .flat_map(|f| f.candidates.iter().cloned())
            .collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.folders.iter().map(|f| f.candidates.len()).sum()
    }

    pub fn contains_folder(&self, folder: &Path) -> bool {
        self.folders.iter().any(|f| f.folder == folder)
    }
}

/// Keep only the trailing `limit` images of a folder listing
pub fn select_candidates(images: &[ImageRef], limit: Option<usize>) -> Vec<ImageRef> {
    match limit {
        Some(n) if n < images.len() => images[images.len() - n..].to_vec(),
        _ => images.to_vec(),
    }
}
