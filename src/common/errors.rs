//! Typed errors for adsweep operations.
//! The CLI wraps these in `anyhow` at the top level, but library modules
//! stay precise about which stage failed and whether the run can continue.

use std::path::PathBuf;
use thiserror::Error;

/// A folder could not be walked. Non-fatal unless it is the scan root.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root folder does not exist or is not a directory
    #[error("Scan root not found: '{}'", path.display())]
    RootMissing { path: PathBuf },

    /// Folder could not be read
    #[error("Cannot read folder '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive container could not be listed
    #[error("Cannot open archive '{}': {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// Image inside a folder could not be fingerprinted
    #[error("Cannot fingerprint '{path}': {message}")]
    Fingerprint { path: String, message: String },
}

impl ScanError {
    /// Path of the folder, archive or image the error refers to
    pub fn path(&self) -> String {
        match self {
            ScanError::RootMissing { path }
            | ScanError::Unreadable { path, .. }
            | ScanError::Archive { path, .. } => path.display().to_string(),
            ScanError::Fingerprint { path, .. } => path.clone(),
        }
    }
}

/// Failures of the archive collaborator
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid archive: {0}")]
    Format(String),

    #[error("member '{0}' not found")]
    MissingMember(String),
}

/// An image could not be turned into features.
/// Recorded in the feature status, never propagated.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Bytes could not be read at all
    #[error("unreadable: {0}")]
    Unreadable(String),

    /// Bytes were read but are not a decodable image
    #[error("decode failed: {0}")]
    Corrupt(String),
}

/// Persisting a cache store failed. Logged; the store degrades to memory-only.
#[derive(Debug, Error)]
pub enum CacheIoError {
    #[error("Failed to write cache '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to remove cache '{}': {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration. Always raised before any scanning starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("similarity_threshold must be between 80 and 100, got {0}")]
    ThresholdOutOfRange(u8),

    #[error("qr_resize_size must be between 400 and 1600, got {0}")]
    QrResizeOutOfRange(u32),

    #[error("worker_processes must be at most {max}, got {value}")]
    TooManyWorkers { value: usize, max: usize },

    #[error("page_size must be a positive number or \"all\"")]
    InvalidPageSize,

    #[error("{field} is not a valid YYYY-MM-DD date: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("start_date_filter {start} is after end_date_filter {end}")]
    DateRangeInverted { start: String, end: String },

    #[error("root_scan_folder is not set")]
    MissingRoot,

    #[error("comparison mode '{0}' needs ad_folder_path to be set")]
    MissingAdFolder(String),

    #[error("no comparison strategy is available for mode '{0}'")]
    UnknownMode(String),
}

/// Grouping could not run for this mode and input
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("mode '{0}' requires a non-empty ad library")]
    EmptyAdLibrary(String),

    #[error("mode '{mode}' cannot be matched by strategy '{strategy}'")]
    UnsupportedMode { mode: String, strategy: String },
}

/// Run-level failure of the detection engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("worker pool could not start: {0}")]
    Pool(String),

    #[error("run cancelled")]
    Cancelled,
}
