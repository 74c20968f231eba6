//! Human-readable and JSON report output.

use console::style;
use modfetch::installer::{InstallReport, ResolutionReport};
use serde::Serialize;

use crate::error::CliError;

/// Print `report` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(report: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn print_resolution(report: &ResolutionReport) {
    println!("{}", style("Modules").bold());
    for module in &report.modules {
        println!("  {} {}", module, style(format!("({})", module.repository())).dim());
    }

    if !report.conflicts.is_empty() {
        println!();
        println!("{}", style("Conflicts").bold());
        for conflict in &report.conflicts {
            println!("  {}", conflict);
        }
    }

    if !report.excluded.is_empty() {
        println!();
        println!("{}", style("Excluded").bold());
        for specification in &report.excluded {
            println!("  {}", specification);
        }
    }

    if !report.unidentified.is_empty() {
        println!();
        println!("{}", style("Unidentified").red().bold());
        for specification in &report.unidentified {
            println!("  {}", style(specification).red());
        }
    }

    let stats = &report.stats;
    println!();
    println!(
        "{} module(s), {} conflict(s), {} queries, {} cache hits",
        report.modules.len(),
        report.conflicts.len(),
        stats.queries,
        stats.cache_hits
    );
}

pub fn print_install(report: &InstallReport) {
    print_resolution(&report.resolution);
    println!();

    for file in &report.installed {
        println!("  {} {}", style("installed").green(), file.display());
    }
    for file in &report.reconciliation.deleted {
        println!("  {} {}", style("deleted").yellow(), file.display());
    }
    for file in &report.reconciliation.retained {
        println!("  {} {} (modified)", style("kept").yellow(), file.display());
    }
    for (file, reason) in &report.reconciliation.failed {
        println!("  {} {}: {}", style("failed").red(), file.display(), reason);
    }

    println!();
    println!(
        "Installed {} file(s) ({}), {} up to date, {} removed",
        report.installed.len(),
        report.download.bytes_display(),
        report.skipped.len(),
        report.reconciliation.deleted.len()
    );
}
