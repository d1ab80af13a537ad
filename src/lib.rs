//! TSQL Guardian - Rule-based linting for T-SQL scripts
//!
//! Architecture: Clean Architecture - Library interface serves as the application layer
//! - Pure domain logic separated from file system, plugin and terminal concerns
//! - Parser, dispatch engine and rule catalogue are independent layers behind small traits
//! - `Linter` wires configuration, plugins, input resolution and reporting together

pub mod analyzer;
pub mod config;
pub mod domain;
pub mod engine;
pub mod input;
pub mod parser;
pub mod report;
pub mod rules;

// Re-export main types for convenient access
pub use domain::violations::{
    LintError, LintReport, LintResult, LintSummary, Position, RuleSeverity, Severity, Violation,
};

pub use config::{ConfigBuilder, LintConfig, RuleConfig};

pub use analyzer::{AnalysisOptions, Analyzer, CancellationFlag, Stopwatch};

pub use engine::DispatchEngine;

pub use input::PathResolver;

pub use parser::{CompatibilityLevel, ScriptParser, SqlParser};

pub use report::{OutputFormat, ReportFormatter, ReportOptions};

pub use rules::{
    Emitter, PluginDescriptor, PluginLoader, Rule, RuleError, RuleParameters, RuleRegistry,
    StaticPluginLoader, UnsupportedPluginLoader,
};

use std::path::{Path, PathBuf};

/// Main entry point providing high-level lint operations
pub struct Linter {
    analyzer: Analyzer,
    resolver: PathResolver,
    report_formatter: ReportFormatter,
}

impl Linter {
    /// Create a linter, loading the configured plugins through `loader`
    pub fn new(config: LintConfig, loader: &dyn PluginLoader) -> LintResult<Self> {
        config.validate()?;
        let plugins = rules::plugin::load_all(loader, &config.plugins)?;
        let resolver = PathResolver::from_config(&config.paths)?;
        let analyzer = Analyzer::new(config, plugins)?;

        Ok(Self {
            analyzer,
            resolver,
            report_formatter: ReportFormatter::default(),
        })
    }

    /// Create a linter with default configuration and no plugins
    pub fn with_defaults() -> LintResult<Self> {
        Self::new(LintConfig::default(), &UnsupportedPluginLoader)
    }

    /// Create a linter loading configuration from file
    pub fn from_config_file<P: AsRef<Path>>(path: P, loader: &dyn PluginLoader) -> LintResult<Self> {
        let config = LintConfig::load_from_file(path)?;
        Self::new(config, loader)
    }

    /// Set custom report formatter
    pub fn with_report_formatter(mut self, formatter: ReportFormatter) -> Self {
        self.report_formatter = formatter;
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn config(&self) -> &LintConfig {
        self.analyzer.config()
    }

    /// Expand input arguments into the ordered list of scripts to lint
    pub fn resolve(&self, arguments: &[String]) -> LintResult<Vec<PathBuf>> {
        self.resolver.resolve(arguments)
    }

    /// Resolve and lint every input argument
    pub fn lint_paths(&self, arguments: &[String], options: &AnalysisOptions) -> LintResult<LintReport> {
        let stopwatch = Stopwatch::start();
        let paths = self.resolve(arguments)?;
        Ok(self.analyzer.process_all(&paths, options, &stopwatch))
    }

    /// Lint script text that does not live in a file
    pub fn lint_source(&self, text: &str) -> LintResult<Vec<Violation>> {
        self.analyzer.analyze_source(text)
    }

    /// Format a report for output
    pub fn format_report(&self, report: &LintReport, format: OutputFormat) -> LintResult<String> {
        self.report_formatter.format_report(report, format)
    }
}

/// Convenience function to lint script text with default settings
pub fn lint_source(text: &str) -> LintResult<Vec<Violation>> {
    Linter::with_defaults()?.lint_source(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::prohibit::PrintStatement;
    use std::fs;
    use tempfile::TempDir;

    fn house_plugin() -> StaticPluginLoader {
        StaticPluginLoader::new().register(
            "plugins/house",
            vec![PluginDescriptor::new("house-print", |_: &RuleParameters| {
                Ok(Box::new(PrintStatement::new()) as Box<dyn Rule>)
            })],
        )
    }

    #[test]
    fn test_lint_source_with_defaults() {
        let violations = lint_source("SELECT * FROM dbo.t;").unwrap();
        assert!(violations
            .iter()
            .any(|v| v.rule_name == "select-star" && v.position() == Position::new(1, 8)));
    }

    #[test]
    fn test_lint_paths_over_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.sql"), "PRINT 'a';").unwrap();
        fs::write(dir.path().join("b.sql"), "SELECT (1;").unwrap();
        fs::write(dir.path().join("readme.md"), "PRINT 'ignored'").unwrap();

        let linter = Linter::with_defaults().unwrap();

        let argument = dir.path().to_string_lossy().into_owned();
        let report = linter.lint_paths(&[argument], &AnalysisOptions::default()).unwrap();

        assert_eq!(report.file_count(), 2);
        assert_eq!(report.violations_for_rule("print-statement").count(), 1);
        assert_eq!(report.violations_for_rule("parse-error").count(), 1);
        assert!(report.has_errors());
        assert!(report.config_fingerprint.is_some());
    }

    #[test]
    fn test_configured_plugins_are_loaded() {
        let config = ConfigBuilder::new()
            .add_plugin("plugins/house")
            .rule_severity("house-print", RuleSeverity::Warning)
            .build()
            .unwrap();
        let linter = Linter::new(config, &house_plugin()).unwrap();

        let violations = linter.lint_source("PRINT 'x';").unwrap();
        let house: Vec<_> = violations.iter().filter(|v| v.rule_name == "house-print").collect();
        assert_eq!(house.len(), 1);
        assert_eq!(house[0].severity, Severity::Warning);
    }

    #[test]
    fn test_unloadable_plugin_is_fatal() {
        let config = ConfigBuilder::new().add_plugin("plugins/house").build().unwrap();
        let err = Linter::new(config, &UnsupportedPluginLoader).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_from_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tsql_guardian.yaml");
        fs::write(&path, "rules:\n  print-statement: off\n").unwrap();

        let linter = Linter::from_config_file(&path, &UnsupportedPluginLoader).unwrap();
        let violations = linter.lint_source("PRINT 'x';").unwrap();
        assert!(violations.iter().all(|v| v.rule_name != "print-statement"));
    }
}
