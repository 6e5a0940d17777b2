use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::common::config::ComparisonMode;

/// adsweep: find advertisement and duplicate pages in scanned comics
#[derive(Parser, Debug)]
#[command(
    name = "adsweep",
    version,
    about = "Find advertisement and duplicate pages in scanned comics",
    long_about = "adsweep walks a comic folder tree (including .zip/.cbz archives), hashes the\n\
                   trailing pages of every chapter and reports the ones that match a library of\n\
                   known ads, repeat across chapters, or carry a QR code.",
    after_help = "EXAMPLES:\n  \
        adsweep scan ~/Comics --ads ~/Comics/_ads          Match trailing pages against ads\n  \
        adsweep scan ~/Comics --mode mutual --detailed     Pages repeated across chapters\n  \
        adsweep scan ~/Comics --mode qr --format json      QR-code pages as JSON\n  \
        adsweep scan ~/Comics --all-pages -t 90            Every page, looser threshold\n  \
        adsweep cache info                                 Show cache statistics\n  \
        adsweep config init                                Write a default config file"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <data dir>/config.toml)
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Directory for config, caches and logs (default: ~/.adsweep)
    #[arg(long, global = true, env = "ADSWEEP_HOME", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode: minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a comic tree for ad and duplicate pages
    Scan {
        /// Root folder to scan (overrides root_scan_folder)
        root: Option<PathBuf>,

        /// Folder of known ad images (overrides ad_folder_path)
        #[arg(long, value_name = "DIR")]
        ads: Option<PathBuf>,

        /// Comparison mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Similarity threshold in percent (80-100)
        #[arg(long, short)]
        threshold: Option<u8>,

        /// Worker threads (0 = one per core)
        #[arg(long, short = 'j')]
        workers: Option<usize>,

        /// Trailing pages per folder to check
        #[arg(long, value_name = "N")]
        extract_count: Option<usize>,

        /// Check every page instead of only the trailing ones
        #[arg(long, conflicts_with = "extract_count")]
        all_pages: bool,

        /// Skip folder names containing any of these substrings
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Ignore and do not update the caches
        #[arg(long)]
        no_cache: bool,

        /// Result page to show
        #[arg(long, default_value = "1")]
        page: usize,

        /// Show every image in each group
        #[arg(long)]
        detailed: bool,
    },

    /// Inspect or clear the hash caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache sizes and age
    Info,

    /// Delete both caches (the next scan recomputes everything)
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Create the data directory and a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file location
    Path,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Candidates against the ad library
    Ad,
    /// Candidates against each other
    Mutual,
    /// QR codes, with the ad library as a fast path
    Qr,
}

impl From<ModeArg> for ComparisonMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ad => ComparisonMode::AdComparison,
            ModeArg::Mutual => ComparisonMode::MutualComparison,
            ModeArg::Qr => ComparisonMode::QrDetection,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
