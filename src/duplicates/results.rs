use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use super::grouper::{Group, SkippedImage};
use crate::common::config::PageSize;
use crate::scanner::cache::CacheStats;
use crate::scanner::targets::ImageRef;

/// Cache activity during one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSummary {
    pub features: CacheStats,
    pub folders: CacheStats,
}

/// Everything one detection run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub mode: String,
    pub threshold: u8,
    pub root: PathBuf,
    pub folders_scanned: usize,
    /// Pruned by exclusion or the time filter
    pub folders_skipped: usize,
    pub candidates: usize,
    pub ad_library_size: usize,
    pub groups: Vec<Group>,
    /// Images left out of matching
    pub skipped: Vec<SkippedImage>,
    /// Folders, archives and files the scan could not read
    pub scan_errors: Vec<String>,
    /// Non-fatal problems such as cache write failures
    pub warnings: Vec<String>,
    pub cache: CacheSummary,
    pub duration_secs: f64,
    pub page_size: PageSize,
}

impl RunReport {
    /// Number of result pages; an empty report still has one (empty) page
    pub fn page_count(&self) -> usize {
        match self.page_size {
            PageSize::All => 1,
            PageSize::Count(n) => self.groups.len().div_ceil(n.max(1)).max(1),
        }
    }

    /// Groups on 1-based page `page`; out-of-range pages are empty
    pub fn page(&self, page: usize) -> &[Group] {
        if page == 0 || page > self.page_count() {
            return &[];
        }
        match self.page_size {
            PageSize::All => &self.groups,
            PageSize::Count(n) => {
                let n = n.max(1);
                let start = (page - 1) * n;
                let end = (start + n).min(self.groups.len());
                &self.groups[start.min(end)..end]
            }
        }
    }

    /// Images flagged for deletion, in group order
    pub fn removable_images(&self) -> Vec<&ImageRef> {
        self.groups
            .iter()
            .flat_map(|g| g.removable().map(|m| &m.image))
            .collect()
    }

    pub fn removable_count(&self) -> usize {
        self.groups.iter().map(|g| g.removable().count()).sum()
    }

    pub fn removable_bytes(&self) -> u64 {
        self.removable_images().iter().map(|i| i.size_bytes).sum()
    }
}
