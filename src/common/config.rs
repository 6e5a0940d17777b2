use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::errors::ConfigError;

/// Upper bound for `worker_processes`
pub const MAX_WORKERS: usize = 256;

/// Detection settings. Field names are the recognized configuration keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Root of the comic folder tree to scan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_scan_folder: Option<PathBuf>,

    /// Folder holding the known advertisement images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_folder_path: Option<PathBuf>,

    /// How many trailing pages per folder become candidates (0 = all)
    #[serde(default = "default_extract_count")]
    pub extract_count: usize,

    /// Whether `extract_count` is applied at all
    #[serde(default = "default_true")]
    pub enable_extract_count_limit: bool,

    /// Hashing threads (0 = one per available core)
    #[serde(default)]
    pub worker_processes: usize,

    /// Minimum similarity percentage for two images to match (80-100)
    #[serde(default = "default_threshold")]
    pub similarity_threshold: u8,

    #[serde(default)]
    pub comparison_mode: ComparisonMode,

    /// Mutual mode: ignore pairs that live in the same folder
    #[serde(default = "default_true")]
    pub enable_inter_folder_only: bool,

    /// Mutual mode: check each group against the ad library
    #[serde(default)]
    pub enable_ad_cross_comparison: bool,

    /// QR mode: try the ad library hashes before decoding QR codes
    #[serde(default = "default_true")]
    pub enable_qr_hybrid_mode: bool,

    /// Long-edge size images are scaled to before QR decoding
    #[serde(default = "default_qr_resize")]
    pub qr_resize_size: u32,

    /// Skip obviously dissimilar pairs with the coarse signature gate
    #[serde(default = "default_true")]
    pub enable_color_filter: bool,

    #[serde(default)]
    pub enable_time_filter: bool,

    /// Inclusive start date, YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_filter: Option<String>,

    /// Inclusive end date, YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_filter: Option<String>,

    #[serde(default)]
    pub folder_time_mode: FolderTimeMode,

    /// Folder-name substrings that exclude a folder and everything below it
    #[serde(default)]
    pub excluded_folders: Vec<String>,

    /// Treat .zip/.cbz archives as virtual folders
    #[serde(default = "default_true")]
    pub enable_archive_scan: bool,

    /// Groups per result page
    #[serde(default)]
    pub page_size: PageSize,
}

/// How candidates are compared
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComparisonMode {
    /// Each candidate against the ad library only
    #[default]
    AdComparison,
    /// Candidates against each other
    MutualComparison,
    /// QR code presence, optionally short-circuited by ad library hashes
    QrDetection,
    /// Mode provided by an external strategy
    Plugin(String),
}

impl ComparisonMode {
    pub fn as_str(&self) -> &str {
        match self {
            ComparisonMode::AdComparison => "ad_comparison",
            ComparisonMode::MutualComparison => "mutual_comparison",
            ComparisonMode::QrDetection => "qr_detection",
            ComparisonMode::Plugin(id) => id,
        }
    }
}

impl From<String> for ComparisonMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ad_comparison" => ComparisonMode::AdComparison,
            "mutual_comparison" => ComparisonMode::MutualComparison,
            "qr_detection" => ComparisonMode::QrDetection,
            _ => ComparisonMode::Plugin(value),
        }
    }
}

impl From<ComparisonMode> for String {
    fn from(mode: ComparisonMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which folder timestamp the time filter looks at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FolderTimeMode {
    #[default]
    Mtime,
    Ctime,
}

/// Number of groups per result page, or every group on one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PageSizeRepr", into = "PageSizeRepr")]
pub enum PageSize {
    All,
    Count(usize),
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::Count(50)
    }
}

#[doc(hidden)]
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageSizeRepr {
    Count(usize),
    Keyword(String),
}

impl TryFrom<PageSizeRepr> for PageSize {
    type Error = String;

    fn try_from(repr: PageSizeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            PageSizeRepr::Count(n) => Ok(PageSize::Count(n)),
            PageSizeRepr::Keyword(s) if s.eq_ignore_ascii_case("all") => Ok(PageSize::All),
            PageSizeRepr::Keyword(s) => s
                .parse::<usize>()
                .map(PageSize::Count)
                .map_err(|_| format!("invalid page_size '{}'", s)),
        }
    }
}

impl From<PageSize> for PageSizeRepr {
    fn from(size: PageSize) -> Self {
        match size {
            PageSize::All => PageSizeRepr::Keyword("all".to_string()),
            PageSize::Count(n) => PageSizeRepr::Count(n),
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PageSize::try_from(PageSizeRepr::Keyword(s.to_string()))
    }
}

/// Inclusive date window applied to folder timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub mode: FolderTimeMode,
}

impl TimeFilter {
    /// Check a unix timestamp (seconds) against the window, in local time
    pub fn accepts(&self, secs: i64) -> bool {
        let Some(date) = chrono::DateTime::from_timestamp(secs, 0)
            .map(|utc| utc.with_timezone(&chrono::Local).date_naive())
        else {
            return false;
        };
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

fn default_true() -> bool {
    true
}
fn default_extract_count() -> usize {
    8
}
fn default_threshold() -> u8 {
    95
}
fn default_qr_resize() -> u32 {
    800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_scan_folder: None,
            ad_folder_path: None,
            extract_count: default_extract_count(),
            enable_extract_count_limit: true,
            worker_processes: 0,
            similarity_threshold: default_threshold(),
            comparison_mode: ComparisonMode::default(),
            enable_inter_folder_only: true,
            enable_ad_cross_comparison: false,
            enable_qr_hybrid_mode: true,
            qr_resize_size: default_qr_resize(),
            enable_color_filter: true,
            enable_time_filter: false,
            start_date_filter: None,
            end_date_filter: None,
            folder_time_mode: FolderTimeMode::default(),
            excluded_folders: Vec::new(),
            enable_archive_scan: true,
            page_size: PageSize::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, or defaults if it does not exist
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Check every option before a run starts
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(80..=100).contains(&self.similarity_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.similarity_threshold));
        }
        if !(400..=1600).contains(&self.qr_resize_size) {
            return Err(ConfigError::QrResizeOutOfRange(self.qr_resize_size));
        }
        if self.worker_processes > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                value: self.worker_processes,
                max: MAX_WORKERS,
            });
        }
        if self.page_size == PageSize::Count(0) {
            return Err(ConfigError::InvalidPageSize);
        }
        self.time_filter()?;

        if self.root_scan_folder.is_none() {
            return Err(ConfigError::MissingRoot);
        }
        if self.requires_ad_library() && self.ad_folder_path.is_none() {
            return Err(ConfigError::MissingAdFolder(self.comparison_mode.to_string()));
        }
        Ok(())
    }

    /// Whether the active built-in mode cannot run without ad images
    pub fn requires_ad_library(&self) -> bool {
        match self.comparison_mode {
            ComparisonMode::AdComparison => true,
            ComparisonMode::MutualComparison => self.enable_ad_cross_comparison,
            ComparisonMode::QrDetection | ComparisonMode::Plugin(_) => false,
        }
    }

    /// Parsed date window, or None when the time filter is off
    pub fn time_filter(&self) -> std::result::Result<Option<TimeFilter>, ConfigError> {
        if !self.enable_time_filter {
            return Ok(None);
        }
        let start = parse_date("start_date_filter", self.start_date_filter.as_deref())?;
        let end = parse_date("end_date_filter", self.end_date_filter.as_deref())?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ConfigError::DateRangeInverted {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }
        Ok(Some(TimeFilter {
            start,
            end,
            mode: self.folder_time_mode,
        }))
    }

    /// Number of hashing threads to start
    pub fn effective_workers(&self) -> usize {
        if self.worker_processes == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.worker_processes
        }
    }

    /// Limit on trailing pages per folder, None when unlimited
    pub fn extract_limit(&self) -> Option<usize> {
        if self.enable_extract_count_limit && self.extract_count > 0 {
            Some(self.extract_count)
        } else {
            None
        }
    }
}

fn parse_date(
    field: &'static str,
    value: Option<&str>,
) -> std::result::Result<Option<NaiveDate>, ConfigError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ConfigError::InvalidDate {
                field,
                value: v.to_string(),
            }),
    }
}

/// Location of persisted state (config, caches, logs)
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The default data directory (~/.adsweep)
    pub fn default_location() -> Self {
        Self::new(
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".adsweep"),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn feature_cache_path(&self) -> PathBuf {
        self.root.join("feature_cache.json")
    }

    pub fn folder_cache_path(&self) -> PathBuf {
        self.root.join("folder_cache.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the data and log directories
    pub fn init(&self) -> Result<()> {
        for dir in [self.root.clone(), self.logs_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_page_size_accepts_all_keyword() {
        let config = Config::from_toml("page_size = \"all\"").unwrap();
        assert_eq!(config.page_size, PageSize::All);
        let config = Config::from_toml("page_size = 20").unwrap();
        assert_eq!(config.page_size, PageSize::Count(20));
    }

    #[test]
    fn test_unknown_mode_becomes_plugin() {
        let config = Config::from_toml("comparison_mode = \"color_bands\"").unwrap();
        assert_eq!(
            config.comparison_mode,
            ComparisonMode::Plugin("color_bands".to_string())
        );
    }

    #[test]
    fn test_time_filter_window_is_inclusive() {
        let filter = TimeFilter {
            start: NaiveDate::from_ymd_opt(2024, 1, 1),
            end: NaiveDate::from_ymd_opt(2024, 1, 31),
            mode: FolderTimeMode::Mtime,
        };
        let mid_january = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_local_timezone(chrono::Local)
            .unwrap()
            .timestamp();
        assert!(filter.accepts(mid_january));
        assert!(!filter.accepts(mid_january + 40 * 86400));
    }
}
