use colored::*;

use crate::common::format::{self, format_path, format_similarity, format_size};
use crate::duplicates::grouper::{Group, GroupKind};
use crate::duplicates::results::RunReport;

/// Print a run report in human-readable format
pub fn print_report(report: &RunReport, page: usize, detailed: bool) {
    println!();
    println!("  {} adsweep Results", "🔍");
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "  Mode {}  •  threshold {}%  •  finished in {}",
        report.mode.cyan(),
        report.threshold,
        format::format_duration(report.duration_secs).cyan()
    );
    println!(
        "  {} folders  •  {} candidates  •  {} ad images",
        report.folders_scanned.to_string().cyan(),
        report.candidates.to_string().cyan(),
        report.ad_library_size.to_string().cyan()
    );
    if report.folders_skipped > 0 {
        println!(
            "  {} folders skipped by exclusion or date filter",
            report.folders_skipped.to_string().dimmed()
        );
    }
    println!("{}", "─".repeat(60).dimmed());
    println!();

    if report.groups.is_empty() {
        println!("  {} No ads or duplicate pages found!", "✨");
        println!();
    } else {
        let groups = report.page(page);
        if groups.is_empty() {
            println!(
                "  {} Page {} is empty ({} pages available)",
                "⚠".yellow(),
                page,
                report.page_count()
            );
            println!();
        }
        for group in groups {
            print_group(group, detailed);
        }
        if !detailed {
            println!("      Run with {} to see every image", "--detailed".cyan());
            println!();
        }
        if report.page_count() > 1 {
            println!(
                "  Page {} of {}  •  use {} to see more",
                page.to_string().bold(),
                report.page_count(),
                "--page <N>".cyan()
            );
            println!();
        }
    }

    if !report.skipped.is_empty() {
        println!(
            "  {} {} not compared:",
            "⚠".yellow(),
            format::format_count(report.skipped.len()).yellow()
        );
        for skipped in report.skipped.iter().take(if detailed { usize::MAX } else { 5 }) {
            println!(
                "    {} {} ({})",
                "→".dimmed(),
                skipped.image.display_path().dimmed(),
                skipped.reason.dimmed()
            );
        }
        if !detailed && report.skipped.len() > 5 {
            println!("    ... and {} more", report.skipped.len() - 5);
        }
        println!();
    }

    let problems: Vec<&String> = report.scan_errors.iter().chain(&report.warnings).collect();
    if !problems.is_empty() {
        println!("  {} {} warnings:", "⚠".yellow(), problems.len());
        for problem in problems.iter().take(5) {
            println!("    {} {}", "→".dimmed(), problem.dimmed());
        }
        if problems.len() > 5 {
            println!("    ... and {} more", problems.len() - 5);
        }
        println!();
    }

    // Summary
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "  {} {} groups, {} removable ({})",
        "💾",
        report.groups.len().to_string().cyan(),
        format::format_count(report.removable_count()).cyan(),
        format_size(report.removable_bytes())
    );
    println!(
        "  {} Cache: {} hits, {} computed ({:.0}% hit rate, folders {:.0}%)",
        "📦",
        report.cache.features.hits,
        report.cache.features.misses + report.cache.features.invalidated,
        report.cache.features.hit_rate(),
        report.cache.folders.hit_rate()
    );
    println!();
}

fn print_group(group: &Group, detailed: bool) {
    let kind = match group.kind {
        GroupKind::AdMatch => group.kind.to_string().red().bold(),
        GroupKind::Mutual if group.ad_like => "Mutual (ad-like)".red().bold(),
        GroupKind::Mutual => group.kind.to_string().yellow().bold(),
        GroupKind::QrCode => group.kind.to_string().magenta().bold(),
    };
    println!(
        "    Group {} — {}, {}",
        group.id.to_string().bold(),
        kind,
        format::format_count(group.members.len()),
    );

    if let Some(reference) = group.reference() {
        println!(
            "      {} {}",
            "ad   →".dimmed(),
            reference.image.display_path().green()
        );
    }

    let removable: Vec<_> = group.removable().collect();
    let shown = if detailed { removable.len() } else { removable.len().min(3) };
    for member in &removable[..shown] {
        let label = match &member.qr_payload {
            Some(_) => "qr".magenta().to_string(),
            None => format_similarity(member.similarity).to_string(),
        };
        println!(
            "      {} {} {} ({})",
            label,
            "→".dimmed(),
            member.image.display_path(),
            format_size(member.image.size_bytes).dimmed()
        );
        if detailed {
            if let Some(payload) = &member.qr_payload {
                println!("        {} {}", "↳".dimmed(), payload.dimmed());
            }
            println!("        {} {}", "↳".dimmed(), format_path(&member.image.folder).dimmed());
        }
    }
    if removable.len() > shown {
        println!("      ... and {} more", removable.len() - shown);
    }
    println!();
}

/// Print one result page, with run metadata, as JSON
pub fn print_report_json(report: &RunReport, page: usize) {
    let json = serde_json::json!({
        "run_id": report.run_id,
        "started_at": report.started_at,
        "mode": report.mode,
        "threshold": report.threshold,
        "root": report.root,
        "folders_scanned": report.folders_scanned,
        "folders_skipped": report.folders_skipped,
        "candidates": report.candidates,
        "ad_library_size": report.ad_library_size,
        "duration_secs": report.duration_secs,
        "page": page,
        "page_count": report.page_count(),
        "total_groups": report.groups.len(),
        "removable_count": report.removable_count(),
        "groups": report.page(page),
        "skipped": report.skipped,
        "scan_errors": report.scan_errors,
        "warnings": report.warnings,
        "cache": report.cache,
    });
    match serde_json::to_string_pretty(&json) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error serializing: {}", e),
    }
}

/// Print removable image paths, one per line
pub fn print_report_quiet(report: &RunReport) {
    for image in report.removable_images() {
        println!("{}", image.display_path());
    }
}
