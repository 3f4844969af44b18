//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the stormer CLI. Status
//! messages go to stderr so that Markdown written to stdout stays clean.

use crate::health::{HealthCheckResult, ServiceStatus};
use crate::types::Article;
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    pub fn banner(&self) {
        if self.colored {
            eprintln!(
                "\n  {} {}\n",
                "stormer".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            eprintln!("\n  stormer v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✓".green().bold(), message.green());
        } else {
            eprintln!("  [OK] {}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "•".blue(), message);
        } else {
            eprintln!("  [INFO] {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            eprintln!("  [WARN] {}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            eprintln!("\n  {}", title.bright_white().bold().underline());
        } else {
            eprintln!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            eprintln!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            eprintln!("    {}: {}", key, value);
        }
    }

    pub fn list_item(&self, item: &str) {
        if self.colored {
            eprintln!("    {} {}", "•".blue(), item);
        } else {
            eprintln!("    - {}", item);
        }
    }

    /// Print a table header row
    pub fn table_header(&self, columns: &[&str]) {
        let header = pad_columns(columns);
        if self.colored {
            eprintln!("    {}", header.bright_white().bold());
            eprintln!("    {}", "─".repeat(columns.len() * 24).dimmed());
        } else {
            eprintln!("    {}", header);
            eprintln!("    {}", "-".repeat(columns.len() * 24));
        }
    }

    /// Print a table row
    pub fn table_row(&self, values: &[&str]) {
        eprintln!("    {}", pad_columns(values));
    }

    /// One row per health check result
    pub fn health_table(&self, results: &[(String, HealthCheckResult)]) {
        self.table_header(&["Service", "Status", "Time"]);
        for (name, result) in results {
            let time = result
                .response_time_ms
                .map(|ms| format!("{:.0} ms", ms))
                .unwrap_or_else(|| "-".to_string());
            let status = format!("{:<23}", result.status.to_string());
            if self.colored {
                let painted = match result.status {
                    ServiceStatus::Healthy => status.green().bold().to_string(),
                    ServiceStatus::Degraded => status.yellow().bold().to_string(),
                    ServiceStatus::Unknown => status.dimmed().to_string(),
                    _ => status.red().bold().to_string(),
                };
                eprintln!("    {:<23} {} {}", name, painted, time);
            } else {
                self.table_row(&[name.as_str(), status.trim_end(), time.as_str()]);
            }
            if !result.status.is_usable() || result.status == ServiceStatus::Degraded {
                self.kv("message", &result.message);
            }
        }
    }

    /// Summary printed after a run
    pub fn article_summary(&self, article: &Article) {
        self.header("Article");
        self.kv("topic", &article.topic);
        self.kv("sections", &article.sections.len().to_string());
        self.kv("references", &article.references.len().to_string());
        self.kv("cited", &article.cited_reference_ids().len().to_string());

        if article.is_degraded() {
            self.warning(&format!(
                "{} stage(s) fell back during the run:",
                article.degradations.len()
            ));
            for degradation in &article.degradations {
                self.list_item(&degradation.to_string());
            }
        } else {
            self.success("All stages completed without fallbacks");
        }
    }
}

fn pad_columns(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("{:<23}", v))
        .collect::<Vec<_>>()
        .join(" ")
}
