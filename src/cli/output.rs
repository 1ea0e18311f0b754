//! Output formatting for CLI commands

use anyhow::{Context, Result};
use serde::Serialize;
use std::str::FromStr;

use crate::secrets::DirectoryEntry;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            _ => anyhow::bail!("Unsupported output format: '{}'. Use 'json' or 'table'.", s),
        }
    }
}

/// Print data as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print directory entries in the requested format
pub fn print_entries(entries: &[DirectoryEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => {
            print_table_header(&[("ID", 40), ("KIND", 18), ("USERNAME", 16), ("VARIABLE", 40)]);
            for entry in entries {
                println!(
                    "{:<40} {:<18} {:<16} {}",
                    truncate(&entry.id, 40),
                    entry.inferred_kind,
                    truncate(entry.inferred_username.as_deref().unwrap_or("-"), 16),
                    entry.variable_path
                );
            }
            println!();
            println!("{} entries", entries.len());
            Ok(())
        }
    }
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let header: String =
        columns.iter().map(|(name, width)| format!("{:<width$} ", name, width = width)).collect();
    println!("{}", header.trim_end());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    println!("{}", "-".repeat(total_width.saturating_sub(1)));
}
