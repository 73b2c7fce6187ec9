//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a warning when there are none
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format an optional value, `-` when absent
pub fn format_optional(value: Option<f64>, render: impl Fn(f64) -> String) -> String {
    value.map(render).unwrap_or_else(|| "-".to_string())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "scheduled" => status.blue().to_string(),
        "running" => status.cyan().to_string(),
        "succeeded" | "accepted" | "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "failed" | "rejected" | "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a policy score: positive green, zero yellow, negative red
pub fn color_score(score: f64) -> String {
    let formatted = format!("{:.2}", score);
    if score > 0.0 {
        formatted.green().to_string()
    } else if score == 0.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Truncate long identifiers for table display
pub fn truncate_id(id: &str) -> String {
    if id.chars().count() > 24 {
        let head: String = id.chars().take(21).collect();
        format!("{}...", head)
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00Ki");
        assert_eq!(format_bytes(8 * 1024 * 1024 * 1024), "8.00Gi");
    }

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(None, |v| format!("{v:.1}")), "-");
        assert_eq!(format_optional(Some(12.34), |v| format!("{v:.1}%")), "12.3%");
    }

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("p1"), "p1");
        let long = "nightly-batch-consolidation-3f2a9c1d";
        assert_eq!(truncate_id(long), "nightly-batch-consoli...");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
