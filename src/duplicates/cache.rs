use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::features::{FeatureRecord, FeatureRequest, FeatureStatus};
use super::perceptual::PerceptualHash;
use super::prefilter::CoarseSignature;
use super::qr::QrResult;
use crate::common::errors::CacheIoError;
use crate::common::persist;
use crate::scanner::cache::CacheStats;
use crate::scanner::targets::ImageRef;

const FEATURE_CACHE_VERSION: u32 = 2;

/// Stored features for one content fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<PerceptualHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<CoarseSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrResult>,
    pub status: FeatureStatus,
    pub size_bytes: u64,
    /// When the features were computed, seconds since the epoch
    pub computed_at: i64,
}

impl CachedFeatures {
    fn to_record(&self, image: &ImageRef) -> FeatureRecord {
        FeatureRecord {
            image: image.clone(),
            hash: self.hash.clone(),
            signature: self.signature,
            qr: self.qr.clone(),
            status: self.status.clone(),
        }
    }
}

#[derive(Deserialize)]
struct FeatureCacheFile {
    version: u32,
    entries: HashMap<String, CachedFeatures>,
}

#[derive(Serialize)]
struct FeatureCacheFileRef<'a> {
    version: u32,
    entries: &'a HashMap<String, CachedFeatures>,
}

/// Content-fingerprint keyed feature store.
///
/// Only the orchestrator touches it: lookups happen before work is
/// dispatched and upserts after results are collected.
#[derive(Debug)]
pub struct FeatureCache {
    path: Option<PathBuf>,
    entries: HashMap<String, CachedFeatures>,
    dirty: bool,
    pub stats: CacheStats,
}

impl FeatureCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
            dirty: false,
            stats: CacheStats::default(),
        }
    }

    /// Load the store at `path`; a missing or corrupt file starts empty
    pub fn load(path: &Path) -> Self {
        let mut cache = Self::in_memory();
        cache.path = Some(path.to_path_buf());

        let Ok(contents) = std::fs::read_to_string(path) else {
            return cache;
        };
        match serde_json::from_str::<FeatureCacheFile>(&contents) {
            Ok(file) if file.version == FEATURE_CACHE_VERSION => cache.entries = file.entries,
            Ok(_) => tracing::debug!("Discarding feature cache with old layout: {}", path.display()),
            Err(e) => tracing::warn!("Ignoring corrupt feature cache {}: {}", path.display(), e),
        }
        tracing::debug!("Feature cache: {} entries from {}", cache.entries.len(), path.display());
        cache
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CachedFeatures> {
        self.entries.get(fingerprint)
    }

    /// Cached record for `image` if it is current and complete enough for
    /// `request`. Entries older than the file, or for a different size, are
    /// treated as a miss.
    pub fn lookup(&mut self, image: &ImageRef, request: &FeatureRequest) -> Option<FeatureRecord> {
        let Some(cached) = self.entries.get(&image.fingerprint) else {
            self.stats.misses += 1;
            return None;
        };
        if cached.size_bytes != image.size_bytes || cached.computed_at < image.mtime_secs {
            self.stats.invalidated += 1;
            return None;
        }

        let record = cached.to_record(image);
        if !request.satisfied_by(&record) {
            self.stats.misses += 1;
            return None;
        }
        self.stats.hits += 1;
        Some(record)
    }

    /// Upsert a computed record. Unreadable images are an I/O condition and
    /// are retried next run rather than cached.
    pub fn put(&mut self, fingerprint: &str, record: &FeatureRecord) {
        if matches!(record.status, FeatureStatus::Unreadable(_)) {
            return;
        }
        self.entries.insert(
            fingerprint.to_string(),
            CachedFeatures {
                hash: record.hash.clone(),
                signature: record.signature,
                qr: record.qr.clone(),
                status: record.status.clone(),
                size_bytes: record.image.size_bytes,
                computed_at: chrono::Utc::now().timestamp(),
            },
        );
        self.dirty = true;
    }

    /// Cached record, or compute and store it
    pub fn get_or_compute<F>(&mut self, image: &ImageRef, request: &FeatureRequest, compute: F) -> FeatureRecord
    where
        F: FnOnce(&ImageRef) -> FeatureRecord,
    {
        if let Some(record) = self.lookup(image, request) {
            return record;
        }
        let record = compute(image);
        self.put(&image.fingerprint, &record);
        record
    }

    /// Persist pending upserts. On failure the store keeps working from
    /// memory for the rest of the process.
    pub fn flush(&mut self) -> Result<(), CacheIoError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let json = serde_json::to_vec(&FeatureCacheFileRef {
            version: FEATURE_CACHE_VERSION,
            entries: &self.entries,
        })?;
        if let Err(source) = persist::write_atomic(&path, &json) {
            tracing::warn!("Feature cache is now memory-only: {}", source);
            self.path = None;
            return Err(CacheIoError::Write { path, source });
        }
        self.dirty = false;
        Ok(())
    }

    /// Empty the store and delete its file
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

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether flushes reach the disk
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }
}
