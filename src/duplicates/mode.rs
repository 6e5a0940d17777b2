//! Comparison strategies.
//!
//! The three built-in modes share one implementation; anything else plugs
//! in by implementing [`ComparisonStrategy`] and calling
//! [`Engine::run_with`](super::engine::Engine::run_with).

use super::features::{FeatureExtractor, FeatureRecord, FeatureRequest, QrPolicy};
use super::grouper::{self, MatchOptions, MatchOutcome};
use crate::common::config::{ComparisonMode, Config};
use crate::common::errors::{ConfigError, MatchError};
use crate::scanner::targets::ImageRef;

/// How a strategy depends on the ad library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdLibraryUse {
    Unused,
    /// Read when configured, skipped otherwise
    Optional,
    /// The run cannot start without it
    Required,
}

/// A comparison mode: what to compute per image and how to group
pub trait ComparisonStrategy: Sync {
    /// Mode name used in reports
    fn id(&self) -> &str;

    fn ad_library(&self, options: &MatchOptions) -> AdLibraryUse;

    /// Optional features the extractor should compute
    fn feature_request(&self, config: &Config) -> FeatureRequest;

    /// Unit of work run on the worker pool
    fn compute_features(&self, image: &ImageRef, extractor: &FeatureExtractor<'_>) -> FeatureRecord {
        extractor.compute(image)
    }

    fn match_features(
        &self,
        candidates: &[FeatureRecord],
        ads: &[FeatureRecord],
        options: &MatchOptions,
    ) -> Result<MatchOutcome, MatchError>;
}

/// `ad_comparison`, `mutual_comparison` and `qr_detection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinStrategy {
    mode: ComparisonMode,
}

impl BuiltinStrategy {
    /// Strategy for a configured mode; plugin ids have no built-in
    pub fn for_mode(mode: &ComparisonMode) -> Result<Self, ConfigError> {
        match mode {
            ComparisonMode::Plugin(id) => Err(ConfigError::UnknownMode(id.clone())),
            builtin => Ok(Self { mode: builtin.clone() }),
        }
    }

    pub fn mode(&self) -> &ComparisonMode {
        &self.mode
    }
}

impl ComparisonStrategy for BuiltinStrategy {
    fn id(&self) -> &str {
        self.mode.as_str()
    }

    fn ad_library(&self, options: &MatchOptions) -> AdLibraryUse {
        match self.mode {
            ComparisonMode::AdComparison => AdLibraryUse::Required,
            ComparisonMode::MutualComparison if options.ad_cross_comparison => AdLibraryUse::Required,
            ComparisonMode::QrDetection if options.qr_hybrid => AdLibraryUse::Optional,
            _ => AdLibraryUse::Unused,
        }
    }

    fn feature_request(&self, config: &Config) -> FeatureRequest {
        let qr = match self.mode {
            ComparisonMode::QrDetection if config.enable_qr_hybrid_mode => QrPolicy::Deferred,
            ComparisonMode::QrDetection => QrPolicy::Eager,
            _ => QrPolicy::Skip,
        };
        FeatureRequest {
            signature: config.enable_color_filter,
            qr,
            qr_resize: config.qr_resize_size,
        }
    }

    fn match_features(
        &self,
        candidates: &[FeatureRecord],
        ads: &[FeatureRecord],
        options: &MatchOptions,
    ) -> Result<MatchOutcome, MatchError> {
        grouper::match_features(candidates, ads, &self.mode, options)
    }
}
