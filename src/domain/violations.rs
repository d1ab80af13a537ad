//! Core domain models for lint violations and run results
//!
//! Architecture: Rich Domain Models - Violations are immutable values with a total order
//! - A violation is created once, at the moment a rule finds its invariant broken
//! - LintReport acts as an aggregate root over the ordered findings of a whole run
//! - Ordering is line, then column, then rule name, so output is reproducible

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Rule name reserved for scripts the parser rejects
pub const PARSE_ERROR_RULE: &str = "parse-error";

/// Rule name reserved for scripts that could not be read
pub const IO_ERROR_RULE: &str = "io-error";

/// Rule name recorded when a violation is created without one
pub const UNNAMED_RULE: &str = "unnamed-rule";

/// Severity of a reported violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Should be addressed but does not fail the run
    Warning,
    /// Fails the run
    Error,
}

impl Severity {
    /// Whether this severity level should cause the run to fail
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Convert to string for display
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Configured severity of a rule, including the disabled state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    /// The rule is never constructed
    Off,
    Warning,
    #[default]
    Error,
}

impl RuleSeverity {
    /// Severity stamped on violations, or `None` when the rule is disabled
    pub fn to_severity(self) -> Option<Severity> {
        match self {
            Self::Off => None,
            Self::Warning => Some(Severity::Warning),
            Self::Error => Some(Severity::Error),
        }
    }

    /// Whether the rule takes part in a run
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A 1-based line and display column inside a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    /// Position of the first character of a script
    pub const START: Position = Position { line: 1, column: 1 };

    /// Create a position, clamping both coordinates to be 1-based
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line: line.max(1),
            column: column.max(1),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single finding reported by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the rule that produced this violation
    pub rule_name: String,
    /// Severity configured for the rule
    pub severity: Severity,
    /// Script the violation was found in (empty until the orchestrator tags it)
    pub file_path: PathBuf,
    /// Line number (1-indexed)
    pub line: u32,
    /// Display column (1-indexed, tabs expanded)
    pub column: u32,
    /// Human-readable description of the violation
    pub message: String,
}

impl Violation {
    /// Create a new violation at the given position
    pub fn new(
        rule_name: impl Into<String>,
        severity: Severity,
        position: Position,
        message: impl Into<String>,
    ) -> Self {
        let mut rule_name = rule_name.into();
        if rule_name.trim().is_empty() {
            rule_name = UNNAMED_RULE.to_string();
        }
        let position = Position::new(position.line, position.column);

        Self {
            rule_name,
            severity,
            file_path: PathBuf::new(),
            line: position.line,
            column: position.column,
            message: message.into(),
        }
    }

    /// Tag the violation with the script it belongs to
    pub fn with_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = file_path.into();
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Whether this violation is blocking
    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    /// Format violation for display
    pub fn format_display(&self) -> String {
        format!(
            "{}({},{}): {} {} : {}",
            self.file_path.display(),
            self.line,
            self.column,
            self.severity.as_str(),
            self.rule_name,
            self.message
        )
    }
}

impl Ord for Violation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.column.cmp(&other.column))
            .then_with(|| self.rule_name.cmp(&other.rule_name))
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.file_path.cmp(&other.file_path))
            .then_with(|| self.severity.cmp(&other.severity))
    }
}

impl PartialOrd for Violation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Summary statistics for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintSummary {
    /// Number of scripts attempted, including those that failed to parse
    pub file_count: usize,
    /// Number of violations by severity level
    pub violations_by_severity: ViolationCounts,
    /// Wall-clock time of the run in milliseconds
    pub elapsed_ms: u64,
    /// Whether the run was cancelled before every script was scheduled
    pub cancelled: bool,
    /// Timestamp when the run finished
    pub linted_at: DateTime<Utc>,
}

/// Count of violations by severity level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub error: usize,
    pub warning: usize,
}

impl ViolationCounts {
    pub fn total(&self) -> usize {
        self.error + self.warning
    }

    pub fn has_blocking(&self) -> bool {
        self.error > 0
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
        }
    }
}

/// Findings of one file, kept together until the run is merged
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub file_path: PathBuf,
    pub violations: Vec<Violation>,
}

/// Complete result of a run over a list of scripts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintReport {
    /// Violations in input-file order, each file ordered by line, column and rule
    pub violations: Vec<Violation>,
    pub summary: LintSummary,
    /// Fingerprint of the configuration used for this run
    pub config_fingerprint: Option<String>,
}

impl LintReport {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
            summary: LintSummary {
                linted_at: Utc::now(),
                ..Default::default()
            },
            config_fingerprint: None,
        }
    }

    /// Append the findings of one file, ordering them first
    pub fn add_file(&mut self, mut outcome: FileOutcome) {
        outcome.violations.sort();
        self.summary.file_count += 1;
        for violation in outcome.violations {
            self.add_violation(violation.with_file(outcome.file_path.clone()));
        }
    }

    pub fn add_violation(&mut self, violation: Violation) {
        self.summary.violations_by_severity.add(violation.severity);
        self.violations.push(violation);
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn file_count(&self) -> usize {
        self.summary.file_count
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.summary.violations_by_severity.has_blocking()
    }

    /// Violations reported for one rule
    pub fn violations_for_rule<'a>(&'a self, rule_name: &'a str) -> impl Iterator<Item = &'a Violation> {
        self.violations.iter().filter(move |v| v.rule_name == rule_name)
    }

    pub fn set_elapsed(&mut self, elapsed_ms: u64) {
        self.summary.elapsed_ms = elapsed_ms;
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.summary.cancelled = cancelled;
    }

    pub fn set_config_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.config_fingerprint = Some(fingerprint.into());
    }
}

impl Default for LintReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Error types that can occur during a run
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    /// Bad or duplicate rule configuration; fatal to the run
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File could not be read or written
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Script text does not conform to the grammar
    #[error("Parse error: {source}")]
    Parse {
        #[from]
        source: crate::parser::ParseError,
    },

    /// A rule failed unexpectedly while handling a node
    #[error("Rule '{rule}' failed: {message}")]
    RuleInternal { rule: String, message: String },

    /// A plugin location or descriptor could not be used
    #[error("Plugin error: {message}")]
    Plugin { message: String },
}

impl LintError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn rule_internal(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleInternal {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Self::Plugin {
            message: message.into(),
        }
    }

    /// Whether this error must stop the run before any file is processed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Plugin { .. })
    }
}

/// Result type for linter operations
pub type LintResult<T> = Result<T, LintError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn violation(rule: &str, line: u32, column: u32) -> Violation {
        Violation::new(rule, Severity::Error, Position::new(line, column), "message")
    }

    #[test]
    fn test_violation_creation() {
        let violation = Violation::new("select-star", Severity::Error, Position::new(3, 8), "msg")
            .with_file("scripts/a.sql");

        assert_eq!(violation.rule_name, "select-star");
        assert_eq!(violation.line, 3);
        assert_eq!(violation.column, 8);
        assert_eq!(violation.file_path, Path::new("scripts/a.sql"));
        assert!(violation.is_blocking());
    }

    #[test]
    fn test_violation_always_names_a_rule() {
        let violation = Violation::new("", Severity::Warning, Position::new(2, 3), "msg");
        assert_eq!(violation.rule_name, UNNAMED_RULE);
        assert!(violation.format_display().contains("unnamed-rule"));

        let blank = Violation::new("  ", Severity::Warning, Position::START, "msg");
        assert_eq!(blank.rule_name, UNNAMED_RULE);
    }

    #[test]
    fn test_position_is_one_based() {
        let position = Position::new(0, 0);
        assert_eq!(position, Position::START);
    }

    #[test]
    fn test_ordering_by_line_column_then_rule() {
        let mut violations = vec![
            violation("select-star", 4, 1),
            violation("print-statement", 2, 9),
            violation("schema-qualify", 2, 3),
            violation("data-type-length", 2, 3),
            violation("upper-lower", 1, 20),
        ];
        violations.sort();

        let keys: Vec<_> = violations
            .iter()
            .map(|v| (v.line, v.column, v.rule_name.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (1, 20, "upper-lower"),
                (2, 3, "data-type-length"),
                (2, 3, "schema-qualify"),
                (2, 9, "print-statement"),
                (4, 1, "select-star"),
            ]
        );
    }

    #[test]
    fn test_ordering_is_total_for_unequal_fields() {
        // Three elements unequal on the same field must still sort consistently
        let mut forward = vec![violation("a", 3, 1), violation("a", 1, 1), violation("a", 2, 1)];
        let mut backward = forward.clone();
        backward.reverse();
        forward.sort();
        backward.sort();

        assert_eq!(forward, backward);
        assert!(forward.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_report_counts_and_file_order() {
        let mut report = LintReport::new();
        report.add_file(FileOutcome {
            file_path: PathBuf::from("b.sql"),
            violations: vec![violation("select-star", 5, 1), violation("print-statement", 1, 1)],
        });
        report.add_file(FileOutcome {
            file_path: PathBuf::from("a.sql"),
            violations: vec![Violation::new(
                "upper-lower",
                Severity::Warning,
                Position::START,
                "msg",
            )],
        });

        assert_eq!(report.file_count(), 2);
        assert_eq!(report.violation_count(), 3);
        assert_eq!(report.summary.violations_by_severity.error, 2);
        assert_eq!(report.summary.violations_by_severity.warning, 1);
        assert_eq!(report.violations[0].rule_name, "print-statement");
        assert_eq!(report.violations[2].file_path, Path::new("a.sql"));
        assert!(report.has_errors());
    }

    #[test]
    fn test_rule_severity_mapping() {
        assert_eq!(RuleSeverity::Off.to_severity(), None);
        assert_eq!(RuleSeverity::Warning.to_severity(), Some(Severity::Warning));
        assert!(!RuleSeverity::Off.is_enabled());
        assert!(Severity::Error > Severity::Warning);
    }
}
