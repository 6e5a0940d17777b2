pub mod archive;
pub mod cache;
pub mod natural;
pub mod targets;
pub mod walker;

use std::path::{Path, PathBuf};

use archive::ArchiveSource;
use cache::FolderCache;
use targets::{BatchPlan, FolderPlan, ImageRef};
use walker::ScanNode;

use crate::common::config::{Config, TimeFilter};
use crate::common::errors::{ConfigError, ScanError};

/// What a scan walks into and what it keeps
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Folder-name substrings that prune a subtree
    pub excluded_folders: Vec<String>,
    /// Folders never treated as comic folders (the ad library)
    pub skip_paths: Vec<PathBuf>,
    pub time_filter: Option<TimeFilter>,
    /// Trailing pages kept per folder
    pub extract_limit: Option<usize>,
    /// Expand .zip/.cbz containers into virtual folders
    pub archives: bool,
    /// Only folders without subfolders count
    pub leaves_only: bool,
}

impl ScanOptions {
    /// Options for scanning the comic root
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let skip_paths = config
            .ad_folder_path
            .iter()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
            .collect();

        Ok(Self {
            excluded_folders: config.excluded_folders.clone(),
            skip_paths,
            time_filter: config.time_filter()?,
            extract_limit: config.extract_limit(),
            archives: config.enable_archive_scan,
            leaves_only: true,
        })
    }

    /// Options for the ad library: every image, every folder, no limit
    pub fn library(archives: bool) -> Self {
        Self {
            archives,
            ..Default::default()
        }
    }

    pub fn is_excluded(&self, folder_name: &str) -> bool {
        self.excluded_folders
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| folder_name.contains(p.as_str()))
    }

    pub fn is_skipped_path(&self, path: &Path) -> bool {
        if self.skip_paths.is_empty() {
            return false;
        }
        if self.skip_paths.iter().any(|p| p == path) {
            return true;
        }
        match path.canonicalize() {
            Ok(canonical) => self.skip_paths.contains(&canonical),
            Err(_) => false,
        }
    }
}

/// Discover leaf folders under `root` and select their candidate pages.
///
/// Unreadable folders, broken archives and files that cannot be
/// fingerprinted are reported in [`BatchPlan::errors`]; only a missing root
/// fails the scan.
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    archives: &dyn ArchiveSource,
    cache: &mut FolderCache,
) -> Result<BatchPlan, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootMissing {
            path: root.to_path_buf(),
        });
    }

    let outcome = walker::walk_tree(root, options, archives);
    let mut plan = BatchPlan::new(root);
    plan.folders_skipped = outcome.skipped;
    plan.errors = outcome.errors;

    for node in outcome.nodes {
        let (folder, is_archive, listed) = match node {
            ScanNode::Folder { path, images } => {
                let listed = walker::list_folder(&path, &images, cache, &mut plan.errors);
                (path, false, listed)
            }
            ScanNode::Archive(path) => {
                let listed = walker::list_archive(&path, archives, cache);
                (path, true, listed)
            }
        };

        let images = match listed {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!("{}", e);
                plan.errors.push(e);
                continue;
            }
        };
        if images.is_empty() {
            continue;
        }

        tracing::debug!("{}: {} images", folder.display(), images.len());
        plan.folders.push(FolderPlan {
            candidates: targets::select_candidates(&images, options.extract_limit),
            total_images: images.len(),
            folder,
            is_archive,
        });
    }

    tracing::info!(
        "Scanned {}: {} folders, {} candidates, {} skipped, {} errors",
        root.display(),
        plan.folders.len(),
        plan.candidate_count(),
        plan.folders_skipped,
        plan.errors.len()
    );
    Ok(plan)
}

/// Every image under the ad library root, in natural order
pub fn scan_library(
    ad_root: &Path,
    archives_enabled: bool,
    archives: &dyn ArchiveSource,
    cache: &mut FolderCache,
) -> Result<(Vec<ImageRef>, Vec<ScanError>), ScanError> {
    let plan = scan(ad_root, &ScanOptions::library(archives_enabled), archives, cache)?;
    Ok((plan.candidates(), plan.errors))
}
