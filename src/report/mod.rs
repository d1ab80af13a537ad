//! Report generation with multiple output formats
//!
//! CDD Principle: Anti-Corruption Layer - Formatters translate domain objects to external formats
//! - LintReport (domain) is converted to terminal, machine and CI representations
//! - Each formatter encapsulates the rules for its specific output format
//! - Filtering by severity and count happens once, before any formatter runs

use crate::domain::violations::{LintError, LintReport, LintResult, Severity, Violation};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Supported output formats for lint reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable format grouped by file
    #[default]
    Human,
    /// JSON format for programmatic consumption
    Json,
    /// GitHub Actions workflow annotations
    GitHub,
}

impl OutputFormat {
    /// Get all available format names
    pub fn all_formats() -> &'static [&'static str] {
        &["human", "json", "github"]
    }
}

impl FromStr for OutputFormat {
    type Err = LintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "github" => Ok(Self::GitHub),
            other => Err(LintError::config(format!(
                "Unknown output format '{other}' (expected one of: {})",
                Self::all_formats().join(", ")
            ))),
        }
    }
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Whether to use colored output (for human format)
    pub use_colors: bool,
    /// Maximum number of violations to include
    pub max_violations: Option<usize>,
    /// Minimum severity level to include
    pub min_severity: Option<Severity>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            use_colors: true,
            max_violations: None,
            min_severity: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Error,
    Warning,
    Success,
    Dim,
    Bold,
}

/// Main report formatter that dispatches to specific formatters
#[derive(Debug, Clone, Default)]
pub struct ReportFormatter {
    options: ReportOptions,
}

impl ReportFormatter {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Format a lint report in the specified format
    pub fn format_report(&self, report: &LintReport, format: OutputFormat) -> LintResult<String> {
        let filtered = self.filter_violations(&report.violations);

        match format {
            OutputFormat::Human => Ok(self.format_human(report, &filtered)),
            OutputFormat::Json => self.format_json(report, &filtered),
            OutputFormat::GitHub => Ok(self.format_github(&filtered)),
        }
    }

    /// Write a formatted report to a writer
    pub fn write_report<W: Write>(&self, report: &LintReport, format: OutputFormat, mut writer: W) -> LintResult<()> {
        let formatted = self.format_report(report, format)?;
        writer.write_all(formatted.as_bytes())?;
        Ok(())
    }

    fn filter_violations<'a>(&self, violations: &'a [Violation]) -> Vec<&'a Violation> {
        let mut filtered: Vec<&Violation> = violations
            .iter()
            .filter(|v| self.options.min_severity.map_or(true, |min| v.severity >= min))
            .collect();

        if let Some(max) = self.options.max_violations {
            filtered.truncate(max);
        }

        filtered
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if self.options.use_colors {
            paint(text, tone)
        } else {
            text.to_string()
        }
    }

    fn format_human(&self, report: &LintReport, violations: &[&Violation]) -> String {
        let mut output = String::new();

        if violations.is_empty() {
            output.push_str(&format!("✅ {}\n", self.paint("No violations found", Tone::Success)));
        } else {
            // Files keep their input order, which is the order violations arrive in
            let mut order: Vec<&Path> = Vec::new();
            let mut by_file: BTreeMap<&Path, Vec<&Violation>> = BTreeMap::new();
            for violation in violations {
                let path = violation.file_path.as_path();
                if !by_file.contains_key(path) {
                    order.push(path);
                }
                by_file.entry(path).or_default().push(violation);
            }

            for path in order {
                output.push_str(&format!("📁 {}\n", self.paint(&path.display().to_string(), Tone::Bold)));
                for violation in by_file.get(path).into_iter().flatten() {
                    let tone = match violation.severity {
                        Severity::Error => Tone::Error,
                        Severity::Warning => Tone::Warning,
                    };
                    output.push_str(&format!(
                        "  {} {} [{}] {}\n",
                        self.paint(&violation.position().to_string(), Tone::Dim),
                        violation.rule_name,
                        self.paint(violation.severity.as_str(), tone),
                        violation.message
                    ));
                }
                output.push('\n');
            }

            let hidden = report.violation_count().saturating_sub(violations.len());
            if hidden > 0 {
                output.push_str(&format!(
                    "{}\n",
                    self.paint(&format!("... {hidden} more violation(s) not shown"), Tone::Dim)
                ));
            }
        }

        output.push_str(&self.format_summary(report));
        output
    }

    fn format_summary(&self, report: &LintReport) -> String {
        let counts = &report.summary.violations_by_severity;
        let seconds = report.summary.elapsed_ms as f64 / 1000.0;
        let files = report.summary.file_count;

        let findings = if counts.total() == 0 {
            self.paint("0 violations", Tone::Success)
        } else {
            let mut parts = Vec::new();
            if counts.error > 0 {
                let text = format!("{} error{}", counts.error, plural(counts.error));
                parts.push(self.paint(&text, Tone::Error));
            }
            if counts.warning > 0 {
                let text = format!("{} warning{}", counts.warning, plural(counts.warning));
                parts.push(self.paint(&text, Tone::Warning));
            }
            parts.join(", ")
        };

        let mut summary = format!(
            "📊 {} {} in {} file{} ({:.1}s)\n",
            self.paint("Summary:", Tone::Bold),
            findings,
            files,
            plural(files),
            seconds
        );
        if report.summary.cancelled {
            summary.push_str(&format!(
                "{}\n",
                self.paint("⚠️  Run cancelled before every script was linted", Tone::Warning)
            ));
        }
        summary
    }

    fn format_json(&self, report: &LintReport, violations: &[&Violation]) -> LintResult<String> {
        let json_violations: Vec<JsonValue> = violations
            .iter()
            .map(|v| {
                serde_json::json!({
                    "rule_name": v.rule_name,
                    "severity": v.severity.as_str(),
                    "file_path": v.file_path.display().to_string(),
                    "line": v.line,
                    "column": v.column,
                    "message": v.message,
                })
            })
            .collect();

        let json_report = serde_json::json!({
            "violations": json_violations,
            "summary": {
                "file_count": report.summary.file_count,
                "violations_by_severity": {
                    "error": report.summary.violations_by_severity.error,
                    "warning": report.summary.violations_by_severity.warning,
                },
                "elapsed_ms": report.summary.elapsed_ms,
                "cancelled": report.summary.cancelled,
                "linted_at": report.summary.linted_at.to_rfc3339(),
            },
            "config_fingerprint": report.config_fingerprint,
        });

        serde_json::to_string_pretty(&json_report)
            .map_err(|e| LintError::config(format!("JSON serialization failed: {e}")))
    }

    fn format_github(&self, violations: &[&Violation]) -> String {
        let mut output = String::new();

        for violation in violations {
            let level = match violation.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            output.push_str(&format!(
                "::{} file={},line={},col={},title={}::{}\n",
                level,
                escape_property(&violation.file_path.display().to_string()),
                violation.line,
                violation.column,
                escape_property(&violation.rule_name),
                escape_data(&violation.message)
            ));
        }

        output
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(feature = "colors")]
fn paint(text: &str, tone: Tone) -> String {
    use colored::Colorize;

    match tone {
        Tone::Error => text.red().to_string(),
        Tone::Warning => text.yellow().to_string(),
        Tone::Success => text.green().to_string(),
        Tone::Dim => text.dimmed().to_string(),
        Tone::Bold => text.bold().to_string(),
    }
}

#[cfg(not(feature = "colors"))]
fn paint(text: &str, _tone: Tone) -> String {
    text.to_string()
}

/// Escape the message part of a workflow command
fn escape_data(s: &str) -> String {
    s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

/// Escape a `key=value` property of a workflow command
fn escape_property(s: &str) -> String {
    escape_data(s).replace(':', "%3A").replace(',', "%2C")
}
