use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Instant;

use super::cache::FeatureCache;
use super::features::{FeatureExtractor, FeatureRecord, QrPolicy};
use super::grouper::{self, MatchOptions};
use super::mode::{AdLibraryUse, BuiltinStrategy, ComparisonStrategy};
use super::pool::{CancelFlag, WorkerPool};
use super::qr::{QrDetector, RqrrDetector};
use super::results::{CacheSummary, RunReport};
use crate::common::config::{Config, DataDir};
use crate::common::errors::{CacheIoError, ConfigError, EngineError};
use crate::scanner::archive::{ArchiveSource, ZipArchiveSource};
use crate::scanner::cache::FolderCache;
use crate::scanner::targets::ImageRef;
use crate::scanner::{self, ScanOptions};

/// The persisted stores a run reads and updates
#[derive(Debug)]
pub struct CacheSet {
    pub features: FeatureCache,
    pub folders: FolderCache,
}

impl CacheSet {
    /// Stores under the data directory
    pub fn load(data_dir: &DataDir) -> Self {
        Self {
            features: FeatureCache::load(&data_dir.feature_cache_path()),
            folders: FolderCache::load(&data_dir.folder_cache_path()),
        }
    }

    /// Stores that live only for this process
    pub fn in_memory() -> Self {
        Self {
            features: FeatureCache::in_memory(),
            folders: FolderCache::in_memory(),
        }
    }

    /// Persist both stores, collecting failures instead of stopping
    pub fn flush(&mut self) -> Vec<CacheIoError> {
        let mut errors = Vec::new();
        if let Err(e) = self.features.flush() {
            errors.push(e);
        }
        if let Err(e) = self.folders.save() {
            errors.push(e);
        }
        errors
    }

    pub fn clear(&mut self) -> Result<(), CacheIoError> {
        self.features.clear()?;
        self.folders.clear()
    }
}

/// Runs scan, feature extraction and matching for one configuration
pub struct Engine {
    config: Config,
    archives: Box<dyn ArchiveSource>,
    qr: Box<dyn QrDetector>,
    cancel: CancelFlag,
    show_progress: bool,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            archives: Box::new(ZipArchiveSource),
            qr: Box::new(RqrrDetector),
            cancel: CancelFlag::new(),
            show_progress: false,
        }
    }

    pub fn with_qr_detector(mut self, qr: Box<dyn QrDetector>) -> Self {
        self.qr = qr;
        self
    }

    pub fn with_archive_source(mut self, archives: Box<dyn ArchiveSource>) -> Self {
        self.archives = archives;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Handle for cancelling the run from another thread
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the configured built-in mode
    pub fn run(&self, caches: &mut CacheSet) -> Result<RunReport, EngineError> {
        let strategy = BuiltinStrategy::for_mode(&self.config.comparison_mode)?;
        self.run_with(&strategy, caches)
    }

    /// Run with any comparison strategy
    pub fn run_with<S>(&self, strategy: &S, caches: &mut CacheSet) -> Result<RunReport, EngineError>
    where
        S: ComparisonStrategy + ?Sized,
    {
        let start = Instant::now();
        let started_at = chrono::Utc::now();
        let config = &self.config;

        // ── Validate before touching the disk ─────────────────────────────
        config.validate()?;
        let options = MatchOptions::from_config(config);
        let ad_use = strategy.ad_library(&options);
        if ad_use == AdLibraryUse::Required && config.ad_folder_path.is_none() {
            return Err(ConfigError::MissingAdFolder(strategy.id().to_string()).into());
        }
        let root = config.root_scan_folder.as_deref().ok_or(ConfigError::MissingRoot)?;
        let scan_options = ScanOptions::from_config(config)?;
        let pool = WorkerPool::new(config.effective_workers())?;
        tracing::info!(
            "Run: mode={} threshold={} workers={}",
            strategy.id(),
            config.similarity_threshold,
            pool.workers()
        );

        // ── Scan ──────────────────────────────────────────────────────────
        let pb = make_spinner(self.show_progress, "Scanning folders...");
        let plan = scanner::scan(root, &scan_options, self.archives.as_ref(), &mut caches.folders)?;
        finish_spinner(
            pb,
            &format!("{} folders, {} candidates", plan.folders.len(), plan.candidate_count()),
        );
        self.check_cancelled()?;

        let mut scan_errors: Vec<String> = plan.errors.iter().map(|e| e.to_string()).collect();
        let ad_images = match (ad_use, &config.ad_folder_path) {
            (AdLibraryUse::Unused, _) | (_, None) => Vec::new(),
            (_, Some(ad_root)) => {
                let (images, errors) = scanner::scan_library(
                    ad_root,
                    config.enable_archive_scan,
                    self.archives.as_ref(),
                    &mut caches.folders,
                )?;
                scan_errors.extend(errors.iter().map(|e| e.to_string()));
                images
            }
        };
        tracing::debug!("Ad library: {} images", ad_images.len());

        // ── Features ──────────────────────────────────────────────────────
        let extractor = FeatureExtractor::new(
            strategy.feature_request(config),
            self.archives.as_ref(),
            self.qr.as_ref(),
        );
        let candidates = plan.candidates();
        let mut candidate_records = self.extract(
            &pool,
            strategy,
            &extractor,
            &candidates,
            &mut caches.features,
            "Hashing candidates",
        )?;
        let ad_records = self.extract(
            &pool,
            strategy,
            &extractor,
            &ad_images,
            &mut caches.features,
            "Hashing ad library",
        )?;

        if extractor.request().qr == QrPolicy::Deferred {
            self.probe_deferred_qr(&pool, &extractor, &mut candidate_records, &ad_records, &options, caches)?;
        }
        self.check_cancelled()?;

        // ── Match ─────────────────────────────────────────────────────────
        let outcome = strategy.match_features(&candidate_records, &ad_records, &options)?;
        tracing::info!(
            "{} groups, {} skipped images in {:.2}s",
            outcome.groups.len(),
            outcome.skipped.len(),
            start.elapsed().as_secs_f64()
        );

        let warnings: Vec<String> = caches
            .flush()
            .into_iter()
            .map(|e| {
                tracing::warn!("{}", e);
                e.to_string()
            })
            .collect();

        Ok(RunReport {
            run_id: uuid::Uuid::new_v4(),
            started_at,
            mode: strategy.id().to_string(),
            threshold: config.similarity_threshold,
            root: root.to_path_buf(),
            folders_scanned: plan.folders.len(),
            folders_skipped: plan.folders_skipped,
            candidates: candidates.len(),
            ad_library_size: ad_images.len(),
            groups: outcome.groups,
            skipped: outcome.skipped,
            scan_errors,
            warnings,
            cache: CacheSummary {
                features: caches.features.stats.clone(),
                folders: caches.folders.stats.clone(),
            },
            duration_secs: start.elapsed().as_secs_f64(),
            page_size: config.page_size,
        })
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            tracing::info!("Run cancelled");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Feature records for `images`, in order. Cache lookups and upserts
    /// happen here on the calling thread; only misses reach the pool, and
    /// byte-identical images are computed once.
    fn extract<S>(
        &self,
        pool: &WorkerPool,
        strategy: &S,
        extractor: &FeatureExtractor<'_>,
        images: &[ImageRef],
        cache: &mut FeatureCache,
        label: &str,
    ) -> Result<Vec<FeatureRecord>, EngineError>
    where
        S: ComparisonStrategy + ?Sized,
    {
        let request = extractor.request();
        let mut records: Vec<Option<FeatureRecord>> =
            images.iter().map(|image| cache.lookup(image, &request)).collect();

        // One task per distinct fingerprint among the misses
        let mut first_by_fingerprint: HashMap<&str, usize> = HashMap::new();
        let mut tasks: Vec<usize> = Vec::new();
        let mut copies: Vec<(usize, usize)> = Vec::new();
        for (i, image) in images.iter().enumerate() {
            if records[i].is_some() {
                continue;
            }
            match first_by_fingerprint.get(image.fingerprint.as_str()) {
                Some(&first) => copies.push((i, first)),
                None => {
                    first_by_fingerprint.insert(image.fingerprint.as_str(), i);
                    tasks.push(i);
                }
            }
        }
        tracing::debug!(
            "{}: {} cached, {} to compute",
            label,
            images.len() - tasks.len() - copies.len(),
            tasks.len()
        );

        let pb = make_progress(self.show_progress, tasks.len() as u64, label);
        let computed = pool.run(&tasks, &self.cancel, pb.as_ref(), |&i| {
            strategy.compute_features(&images[i], extractor)
        });
        finish_progress(pb, &format!("{}: {} computed", label, tasks.len()));
        let computed = computed?;

        for (i, record) in tasks.into_iter().zip(computed) {
            cache.put(&images[i].fingerprint, &record);
            records[i] = Some(record);
        }
        for (i, first) in copies {
            records[i] = records[first].as_ref().map(|r| FeatureRecord {
                image: images[i].clone(),
                ..r.clone()
            });
        }

        Ok(records.into_iter().flatten().collect())
    }

    /// Hybrid QR: decode only candidates the ad library did not already match
    fn probe_deferred_qr(
        &self,
        pool: &WorkerPool,
        extractor: &FeatureExtractor<'_>,
        candidates: &mut [FeatureRecord],
        ads: &[FeatureRecord],
        options: &MatchOptions,
        caches: &mut CacheSet,
    ) -> Result<(), EngineError> {
        let fast = grouper::fast_path_matches(candidates, ads, options);
        let pending: Vec<usize> = candidates
            .iter()
            .zip(&fast)
            .enumerate()
            .filter(|(_, (record, hit))| {
                hit.is_none() && record.is_matchable() && !extractor.request().has_current_qr(record)
            })
            .map(|(i, _)| i)
            .collect();
        tracing::debug!(
            "QR fast path: {} matched by ad library, {} to decode",
            fast.iter().filter(|hit| hit.is_some()).count(),
            pending.len()
        );

        let pb = make_progress(self.show_progress, pending.len() as u64, "Decoding QR codes");
        let probed = pool.run(&pending, &self.cancel, pb.as_ref(), |&i| {
            extractor.probe_qr(&candidates[i])
        });
        finish_progress(pb, &format!("Decoded {} images", pending.len()));
        let probed = probed?;

        for (i, record) in pending.into_iter().zip(probed) {
            caches.features.put(&record.image.fingerprint, &record);
            candidates[i] = record;
        }
        Ok(())
    }
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(show: bool, msg: &str) -> Option<ProgressBar> {
    if show {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    } else {
        None
    }
}

fn finish_spinner(pb: Option<ProgressBar>, msg: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(msg.to_string());
    }
}

fn make_progress(show: bool, total: u64, msg: &str) -> Option<ProgressBar> {
    if show && total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━░"),
        );
        pb.set_message(msg.to_string());
        Some(pb)
    } else {
        None
    }
}

fn finish_progress(pb: Option<ProgressBar>, msg: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(msg.to_string());
    }
}
