//! Terminal output for the `history` and `check` commands.
//!
//! The engine itself reports only through the log; this module is for the
//! short-lived commands a user runs by hand.

use crate::history::HistoryRecord;
use colored::*;
use std::collections::BTreeMap;

/// One monitored folder as shown by `check`.
#[derive(Debug, Clone)]
pub struct FolderStatus {
    /// Display label.
    pub name: String,
    /// Resolved path, or the resolution error.
    pub path: Result<String, String>,
    /// Whether the folder is enabled in the configuration.
    pub enabled: bool,
    /// Whether the resolved path is an existing directory.
    pub exists: bool,
}

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints history records, oldest first, followed by per-category totals.
    ///
    /// `limit` keeps only the most recent records.
    pub fn history(records: &[HistoryRecord], limit: Option<usize>) {
        if records.is_empty() {
            Self::info("No files have been organized yet.");
            return;
        }

        let start = limit.map_or(0, |n| records.len().saturating_sub(n));
        let shown = &records[start..];

        Self::header("HISTORY");
        for record in shown {
            println!(
                "{}  {} {} {}  {}",
                record.date.dimmed(),
                record.file,
                "→".cyan(),
                record.destination.green(),
                format!("[{}]", record.category).yellow()
            );
        }
        if start > 0 {
            Self::info(&format!("({} older records not shown)", start));
        }

        Self::summary_table(&category_counts(records), records.len());
    }

    /// Prints a summary table with file counts by category.
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_category_len
        );
    }

    /// Prints the monitored folders with their state.
    pub fn folders(folders: &[FolderStatus]) {
        Self::header("MONITORED FOLDERS");
        if folders.is_empty() {
            Self::warning("No monitored folders configured.");
            return;
        }

        for folder in folders {
            let state = match (folder.enabled, folder.exists) {
                (false, _) => "disabled".dimmed(),
                (true, true) => "watching".green(),
                (true, false) => "missing".red(),
            };
            let path = match &folder.path {
                Ok(path) => path.normal(),
                Err(reason) => reason.red(),
            };
            println!("  {:<10} {}  {}", state, folder.name.bold(), path);
        }
    }
}

/// Counts records per category.
pub fn category_counts(records: &[HistoryRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.category.clone()).or_insert(0) += 1;
    }
    counts
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
