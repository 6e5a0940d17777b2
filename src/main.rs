use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use adsweep::cli::args::{CacheAction, Cli, Commands, ConfigAction, ModeArg, OutputFormat};
use adsweep::cli::output;
use adsweep::common::config::{Config, DataDir};
use adsweep::common::{format, logging};
use adsweep::duplicates::{CacheSet, Engine};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let data_dir = cli
        .data_dir
        .clone()
        .map(DataDir::new)
        .unwrap_or_else(DataDir::default_location);
    let _log_guard = logging::init(cli.verbose, Some(&data_dir.logs_dir()));

    match cli.command {
        Commands::Scan {
            ref root,
            ref ads,
            mode,
            threshold,
            workers,
            extract_count,
            all_pages,
            ref exclude,
            no_cache,
            page,
            detailed,
        } => {
            let overrides = ScanOverrides {
                root: root.clone(),
                ads: ads.clone(),
                mode,
                threshold,
                workers,
                extract_count,
                all_pages,
                exclude: exclude.clone(),
            };
            cmd_scan(&cli, &data_dir, overrides, no_cache, page, detailed)
        }

        Commands::Cache { ref action } => cmd_cache(&data_dir, action),

        Commands::Config { ref action } => cmd_config(&cli, &data_dir, action),

        Commands::Completions { ref shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                adsweep::cli::args::CompletionShell::Bash => clap_complete::Shell::Bash,
                adsweep::cli::args::CompletionShell::Zsh => clap_complete::Shell::Zsh,
                adsweep::cli::args::CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "adsweep", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn config_path(cli: &Cli, data_dir: &DataDir) -> PathBuf {
    cli.config_file
        .clone()
        .unwrap_or_else(|| data_dir.config_path())
}

fn load_config(cli: &Cli, data_dir: &DataDir) -> Result<Config> {
    let path = config_path(cli, data_dir);
    Config::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
}

// ─── Scan ─────────────────────────────────────────────────────────────────────

/// Command-line values that take precedence over the config file
struct ScanOverrides {
    root: Option<PathBuf>,
    ads: Option<PathBuf>,
    mode: Option<ModeArg>,
    threshold: Option<u8>,
    workers: Option<usize>,
    extract_count: Option<usize>,
    all_pages: bool,
    exclude: Vec<String>,
}

impl ScanOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(root) = self.root {
            config.root_scan_folder = Some(root);
        }
        if let Some(ads) = self.ads {
            config.ad_folder_path = Some(ads);
        }
        if let Some(mode) = self.mode {
            config.comparison_mode = mode.into();
        }
        if let Some(threshold) = self.threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(workers) = self.workers {
            config.worker_processes = workers;
        }
        if let Some(count) = self.extract_count {
            config.extract_count = count;
            config.enable_extract_count_limit = true;
        }
        if self.all_pages {
            config.enable_extract_count_limit = false;
        }
        config.excluded_folders.extend(self.exclude);
    }
}

fn cmd_scan(
    cli: &Cli,
    data_dir: &DataDir,
    overrides: ScanOverrides,
    no_cache: bool,
    page: usize,
    detailed: bool,
) -> Result<()> {
    let mut config = load_config(cli, data_dir)?;
    overrides.apply(&mut config);
    config.validate()?;

    let show_progress = !cli.quiet && matches!(cli.format, OutputFormat::Human);
    if show_progress {
        if let Some(root) = &config.root_scan_folder {
            println!();
            println!(
                "  {} Scanning for ad pages in: {}",
                "🔍",
                format::format_path(root).cyan()
            );
        }
        if let Some(ads) = &config.ad_folder_path {
            println!("  {} Ad library: {}", "🖼️", format::format_path(ads).cyan());
        }
        println!();
    }

    let mut caches = if no_cache {
        CacheSet::in_memory()
    } else {
        CacheSet::load(data_dir)
    };

    let engine = Engine::new(config).with_progress(show_progress);
    let report = engine.run(&mut caches)?;

    match cli.format {
        _ if cli.quiet => output::print_report_quiet(&report),
        OutputFormat::Human => output::print_report(&report, page, detailed),
        OutputFormat::Json => output::print_report_json(&report, page),
        OutputFormat::Quiet => output::print_report_quiet(&report),
    }

    Ok(())
}

// ─── Cache ────────────────────────────────────────────────────────────────────

fn cmd_cache(data_dir: &DataDir, action: &CacheAction) -> Result<()> {
    let mut caches = CacheSet::load(data_dir);
    match action {
        CacheAction::Info => {
            let file_size = |path: PathBuf| std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

            println!();
            println!("  {} adsweep Cache", "📦");
            println!("{}", "─".repeat(60).dimmed());
            println!(
                "  Feature cache: {} entries ({})",
                caches.features.len().to_string().cyan(),
                format::format_size(file_size(data_dir.feature_cache_path()))
            );
            println!(
                "  Folder cache:  {} folders ({}), updated {}",
                caches.folders.entry_count().to_string().cyan(),
                format::format_size(file_size(data_dir.folder_cache_path())),
                caches.folders.age_string()
            );
            println!(
                "  Location:      {}",
                format::format_path(data_dir.root()).dimmed()
            );
            println!();
            Ok(())
        }
        CacheAction::Clear => {
            caches.clear().context("Failed to clear caches")?;
            println!("  {} Caches cleared. Next scan will rehash everything.", "✓".green());
            Ok(())
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(cli: &Cli, data_dir: &DataDir, action: &ConfigAction) -> Result<()> {
    let path = config_path(cli, data_dir);
    match action {
        ConfigAction::Show => {
            let config = load_config(cli, data_dir)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Init { force } => {
            data_dir.init()?;
            if path.exists() && !force {
                println!(
                    "  {} Config already exists at {} (use {} to overwrite)",
                    "⚠".yellow(),
                    format::format_path(&path),
                    "--force".cyan()
                );
                return Ok(());
            }
            Config::default().save(&path)?;
            println!(
                "  {} adsweep initialized at {}",
                "✓".green(),
                format::format_path(data_dir.root())
            );
            println!("  Created: {}, logs/", format::format_path(&path));
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
