use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

use super::archive::ArchiveSource;
use super::cache::{FolderCache, FolderCacheEntry};
use super::natural::natural_cmp;
use super::targets::{self, ImageRef};
use super::ScanOptions;
use crate::common::config::FolderTimeMode;
use crate::common::errors::ScanError;
use crate::duplicates::hasher;

/// A folder or archive the walk found to contain images
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanNode {
    /// Directory with its image files in natural order
    Folder { path: PathBuf, images: Vec<PathBuf> },
    /// Archive container, expanded later by the archive source
    Archive(PathBuf),
}

/// Everything the directory walk produced
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub nodes: Vec<ScanNode>,
    pub skipped: usize,
    pub errors: Vec<ScanError>,
}

#[derive(Default)]
struct DirListing {
    has_subdir: bool,
    images: Vec<PathBuf>,
}

/// Modification time as seconds since the epoch
pub fn modified_secs(meta: &Metadata) -> i64 {
    system_secs(meta.modified().ok())
}

/// Status-change time on Unix, creation time elsewhere
#[cfg(unix)]
pub fn changed_secs(meta: &Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.ctime()
}

#[cfg(not(unix))]
pub fn changed_secs(meta: &Metadata) -> i64 {
    system_secs(meta.created().ok())
}

fn system_secs(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Timestamp the time filter compares against
pub fn folder_time(meta: &Metadata, mode: FolderTimeMode) -> i64 {
    match mode {
        FolderTimeMode::Mtime => modified_secs(meta),
        FolderTimeMode::Ctime => changed_secs(meta),
    }
}

/// Whether a folder or archive survives exclusion and the time filter
fn accepts_container(entry: &DirEntry, options: &ScanOptions) -> bool {
    let name = entry.file_name().to_string_lossy();
    if options.is_excluded(&name) || options.is_skipped_path(entry.path()) {
        return false;
    }
    match (&options.time_filter, entry.metadata()) {
        (Some(filter), Ok(meta)) => filter.accepts(folder_time(&meta, filter.mode)),
        // Unreadable metadata surfaces as a walk error instead
        _ => true,
    }
}

fn walk_error(e: walkdir::Error) -> ScanError {
    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    tracing::warn!("Skipping unreadable folder {}: {}", path.display(), source);
    ScanError::Unreadable { path, source }
}

/// Walk the tree under `root` in natural order.
///
/// Excluded and out-of-range folders are pruned without descending into
/// them. With `leaves_only`, a directory only yields a node when it has no
/// (surviving) subdirectories.
pub fn walk_tree(root: &Path, options: &ScanOptions, archives: &dyn ArchiveSource) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let mut order: Vec<PathBuf> = Vec::new();
    let mut dirs: HashMap<PathBuf, DirListing> = HashMap::new();
    let mut archive_nodes: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    let mut pruned_dirs = 0usize;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| {
            natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
        })
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let keep = accepts_container(e, options);
            if !keep {
                pruned_dirs += 1;
            }
            keep
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                outcome.errors.push(walk_error(e));
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if entry.depth() > 0 {
                if let Some(parent) = path.parent().and_then(|p| dirs.get_mut(p)) {
                    parent.has_subdir = true;
                }
            }
            order.push(path.to_path_buf());
            dirs.insert(path.to_path_buf(), DirListing::default());
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        let Some(parent) = path.parent() else {
            continue;
        };
        if targets::is_image(&name) {
            if let Some(listing) = dirs.get_mut(parent) {
                listing.images.push(path.to_path_buf());
            }
        } else if options.archives && archives.is_archive(path) {
            if accepts_container(&entry, options) {
                archive_nodes
                    .entry(parent.to_path_buf())
                    .or_default()
                    .push(path.to_path_buf());
            } else {
                outcome.skipped += 1;
            }
        }
    }
    outcome.skipped += pruned_dirs;

    for dir in order {
        let Some(listing) = dirs.remove(&dir) else {
            continue;
        };
        let is_node = !listing.images.is_empty() && !(options.leaves_only && listing.has_subdir);
        if is_node {
            outcome.nodes.push(ScanNode::Folder {
                path: dir.clone(),
                images: listing.images,
            });
        }
        if let Some(found) = archive_nodes.remove(&dir) {
            outcome
                .nodes
                .extend(found.into_iter().map(ScanNode::Archive));
        }
    }

    outcome
}

fn image_ref_for_file(path: &Path, folder: &Path, position: usize) -> Result<ImageRef, ScanError> {
    let fingerprint_error = |message: String| ScanError::Fingerprint {
        path: path.display().to_string(),
        message,
    };
    let meta = std::fs::metadata(path).map_err(|e| fingerprint_error(e.to_string()))?;
    let fingerprint = hasher::fingerprint_file(path).map_err(|e| fingerprint_error(e.to_string()))?;

    Ok(ImageRef {
        path: path.to_path_buf(),
        member: None,
        folder: folder.to_path_buf(),
        position,
        size_bytes: meta.len(),
        mtime_secs: modified_secs(&meta),
        fingerprint,
    })
}

/// Fingerprint a folder's images in parallel, preserving page order
fn fingerprint_images(folder: &Path, paths: &[PathBuf], errors: &mut Vec<ScanError>) -> Vec<ImageRef> {
    let results: Vec<Result<ImageRef, ScanError>> = paths
        .par_iter()
        .enumerate()
        .map(|(position, path)| image_ref_for_file(path, folder, position))
        .collect();

    let mut images = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(image) => images.push(image),
            Err(e) => errors.push(e),
        }
    }
    images
}

/// Re-check cached images against the disk: files edited in place keep the
/// folder mtime, so size/mtime drift triggers a fresh fingerprint.
fn revalidate(images: Vec<ImageRef>, errors: &mut Vec<ScanError>) -> (Vec<ImageRef>, bool) {
    let mut changed = false;
    let mut fresh = Vec::with_capacity(images.len());

    for image in images {
        match std::fs::metadata(&image.path) {
            Ok(meta) if meta.len() == image.size_bytes && modified_secs(&meta) == image.mtime_secs => {
                fresh.push(image);
            }
            Ok(_) => {
                changed = true;
                match image_ref_for_file(&image.path, &image.folder, image.position) {
                    Ok(updated) => fresh.push(updated),
                    Err(e) => errors.push(e),
                }
            }
            Err(e) => {
                changed = true;
                errors.push(ScanError::Fingerprint {
                    path: image.display_path(),
                    message: e.to_string(),
                });
            }
        }
    }
    (fresh, changed)
}

/// List one directory's images, reusing the folder cache when the folder's
/// timestamps are unchanged
pub fn list_folder(
    folder: &Path,
    image_paths: &[PathBuf],
    cache: &mut FolderCache,
    errors: &mut Vec<ScanError>,
) -> Result<Vec<ImageRef>, ScanError> {
    let meta = std::fs::metadata(folder).map_err(|source| ScanError::Unreadable {
        path: folder.to_path_buf(),
        source,
    })?;
    let (mtime_secs, ctime_secs) = (modified_secs(&meta), changed_secs(&meta));

    if let Some(entry) = cache.check(folder, mtime_secs, ctime_secs) {
        let cached = entry.images.clone();
        let (images, changed) = revalidate(cached, errors);
        if changed {
            cache.store(FolderCacheEntry {
                folder: folder.to_path_buf(),
                mtime_secs,
                ctime_secs,
                images: images.clone(),
            });
        }
        return Ok(images);
    }

    let images = fingerprint_images(folder, image_paths, errors);
    cache.store(FolderCacheEntry {
        folder: folder.to_path_buf(),
        mtime_secs,
        ctime_secs,
        images: images.clone(),
    });
    Ok(images)
}

/// List an archive's image members as a virtual folder
pub fn list_archive(
    archive: &Path,
    source: &dyn ArchiveSource,
    cache: &mut FolderCache,
) -> Result<Vec<ImageRef>, ScanError> {
    let meta = std::fs::metadata(archive).map_err(|source| ScanError::Unreadable {
        path: archive.to_path_buf(),
        source,
    })?;
    let (mtime_secs, ctime_secs) = (modified_secs(&meta), changed_secs(&meta));

    if let Some(entry) = cache.check(archive, mtime_secs, ctime_secs) {
        return Ok(entry.images.clone());
    }

    let members = match source.list_images(archive) {
        Ok(members) => members,
        Err(e) => {
            cache.invalidate(archive);
            return Err(ScanError::Archive {
                path: archive.to_path_buf(),
                source: e,
            });
        }
    };
    let images: Vec<ImageRef> = members
        .into_iter()
        .enumerate()
        .map(|(position, m)| ImageRef {
            path: archive.to_path_buf(),
            member: Some(m.member),
            folder: archive.to_path_buf(),
            position,
            size_bytes: m.size_bytes,
            mtime_secs,
            fingerprint: m.fingerprint,
        })
        .collect();

    cache.store(FolderCacheEntry {
        folder: archive.to_path_buf(),
        mtime_secs,
        ctime_secs,
        images: images.clone(),
    });
    Ok(images)
}
