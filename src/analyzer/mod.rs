//! File orchestration for TSQL Guardian
//!
//! CDD Principle: Domain Services - Analyzer runs the parse and dispatch workflow per script
//! - Every script gets a fresh rule set and one engine run, isolated from all other scripts
//! - Unreadable and unparsable scripts become findings instead of stopping the batch
//! - Files may be processed in parallel; the report always keeps input order

use crate::config::LintConfig;
use crate::domain::violations::{
    FileOutcome, LintError, LintReport, LintResult, Position, Severity, Violation, IO_ERROR_RULE,
    PARSE_ERROR_RULE,
};
use crate::engine::DispatchEngine;
use crate::parser::{ScriptParser, SqlParser};
use crate::rules::{PluginDescriptor, RuleRegistry};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared flag that stops new scripts from being scheduled
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wall-clock timer for one run, started by the caller
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Options for customizing analysis behavior
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Whether to process scripts on the rayon pool
    pub parallel: bool,
    /// Checked before each script is started
    pub cancellation: Option<CancellationFlag>,
}

impl AnalysisOptions {
    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationFlag::is_cancelled)
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            cancellation: None,
        }
    }
}

/// Main analyzer that runs the rule catalogue over scripts
pub struct Analyzer {
    config: LintConfig,
    registry: RuleRegistry,
    parser: Box<dyn ScriptParser>,
    engine: DispatchEngine,
}

impl Analyzer {
    /// Create an analyzer from configuration and already-loaded plugin rules
    pub fn new(config: LintConfig, plugins: Vec<PluginDescriptor>) -> LintResult<Self> {
        config.validate()?;
        let registry = RuleRegistry::build(&config, plugins)?;
        let parser = Box::new(SqlParser::new(config.tab_width));

        tracing::debug!(
            "Analyzer ready with {} active rule(s) at compatibility level {}",
            registry.enabled_count(),
            config.compatibility_level
        );

        Ok(Self {
            config,
            registry,
            parser,
            engine: DispatchEngine::new(),
        })
    }

    /// Create an analyzer with default configuration
    pub fn with_defaults() -> LintResult<Self> {
        Self::new(LintConfig::default(), Vec::new())
    }

    /// Replace the built-in parser
    pub fn with_parser(mut self, parser: Box<dyn ScriptParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &LintConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Lint script text, returning its findings in position order
    pub fn analyze_source(&self, text: &str) -> LintResult<Vec<Violation>> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let script = self.parser.parse(text, self.config.compatibility_level)?;
        let rules = self.registry.instantiate()?;
        Ok(self.engine.run(&script, rules))
    }

    /// Lint one script; failures are reported as findings of that script
    pub fn analyze_file<P: AsRef<Path>>(&self, file_path: P) -> FileOutcome {
        let file_path = file_path.as_ref();
        tracing::debug!("Linting {}", file_path.display());

        let violations = match self.lint_file(file_path) {
            Ok(violations) => violations,
            Err(error) => {
                tracing::warn!("Failed to analyze {}: {}", file_path.display(), error);
                vec![self.failure_violation(error)]
            }
        };

        FileOutcome {
            file_path: file_path.to_path_buf(),
            violations,
        }
    }

    fn lint_file(&self, file_path: &Path) -> LintResult<Vec<Violation>> {
        let content = fs::read_to_string(file_path)?;
        self.analyze_source(&content)
    }

    /// Lint every path in order and build the run report
    pub fn process_all(&self, paths: &[PathBuf], options: &AnalysisOptions, stopwatch: &Stopwatch) -> LintReport {
        let outcomes: Vec<Option<FileOutcome>> = if options.parallel && paths.len() > 1 {
            paths
                .par_iter()
                .map(|path| self.process_unless_cancelled(path, options))
                .collect()
        } else {
            paths
                .iter()
                .map(|path| self.process_unless_cancelled(path, options))
                .collect()
        };

        let mut report = LintReport::new();
        let mut skipped = 0usize;
        for outcome in outcomes {
            match outcome {
                Some(outcome) => report.add_file(outcome),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!("Run cancelled; {} script(s) were not linted", skipped);
            report.set_cancelled(true);
        }
        report.set_elapsed(stopwatch.elapsed_ms());
        report.set_config_fingerprint(self.config.fingerprint());
        report
    }

    fn process_unless_cancelled(&self, path: &Path, options: &AnalysisOptions) -> Option<FileOutcome> {
        if options.is_cancelled() {
            return None;
        }
        Some(self.analyze_file(path))
    }

    /// The single finding recorded for a script that could not be linted
    fn failure_violation(&self, error: LintError) -> Violation {
        match error {
            LintError::Parse { source } => {
                Violation::new(PARSE_ERROR_RULE, Severity::Error, source.position, source.message)
            }
            LintError::RuleInternal { rule, message } => {
                // Same severity the engine gives a rule that fails mid-run
                let severity = self
                    .registry
                    .get(&rule)
                    .and_then(|registered| registered.severity.to_severity())
                    .unwrap_or(Severity::Error);
                Violation::new(rule, severity, Position::START, message)
            }
            LintError::Io { source } => Violation::new(
                IO_ERROR_RULE,
                Severity::Error,
                Position::START,
                format!("Could not read script: {source}"),
            ),
            other => Violation::new(IO_ERROR_RULE, Severity::Error, Position::START, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::domain::violations::RuleSeverity;
    use crate::parser::{CompatibilityLevel, ParseError, Script};
    use crate::rules::prohibit::PrintStatement;
    use crate::rules::{Rule, RuleParameters};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn only(rule: &str) -> LintConfig {
        let mut builder = ConfigBuilder::new();
        for definition in crate::rules::builtin_rules() {
            if definition.name != rule {
                builder = builder.rule_severity(definition.name, RuleSeverity::Off);
            }
        }
        builder.build().unwrap()
    }

    fn positions(violations: &[Violation]) -> Vec<(u32, u32)> {
        violations.iter().map(|v| (v.line, v.column)).collect()
    }

    #[test]
    fn test_analyze_source_applies_configuration() {
        let analyzer = Analyzer::new(only("select-star"), Vec::new()).unwrap();
        let violations = analyzer.analyze_source("SELECT * FROM dbo.t;\nPRINT 'x';").unwrap();

        assert_eq!(positions(&violations), vec![(1, 8)]);
        assert_eq!(violations[0].rule_name, "select-star");
    }

    #[test]
    fn test_tab_expansion_matches_spaces() {
        let analyzer = Analyzer::new(only("select-star"), Vec::new()).unwrap();
        let tabbed = analyzer.analyze_source("\tSELECT *\n\t\tFROM dbo.t;").unwrap();
        let spaced = analyzer.analyze_source("    SELECT *\n        FROM dbo.t;").unwrap();
        assert_eq!(positions(&tabbed), vec![(1, 12)]);
        assert_eq!(positions(&tabbed), positions(&spaced));

        let mut wide = only("select-star");
        wide.tab_width = 8;
        let analyzer = Analyzer::new(wide, Vec::new()).unwrap();
        let violations = analyzer.analyze_source("\tSELECT *\nFROM dbo.t;").unwrap();
        assert_eq!(positions(&violations), vec![(1, 16)]);
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.sql");
        let missing = dir.path().join("missing.sql");
        let good = dir.path().join("good.sql");
        fs::write(&broken, "SELECT (1;").unwrap();
        fs::write(&good, "PRINT 'x';").unwrap();

        let analyzer = Analyzer::new(only("print-statement"), Vec::new()).unwrap();
        let options = AnalysisOptions {
            parallel: false,
            ..Default::default()
        };
        let report = analyzer.process_all(
            &[broken.clone(), missing.clone(), good.clone()],
            &options,
            &Stopwatch::start(),
        );

        assert_eq!(report.file_count(), 3);
        assert_eq!(report.violation_count(), 3);
        assert_eq!(report.violations[0].rule_name, PARSE_ERROR_RULE);
        assert_eq!(report.violations[0].position(), Position::new(1, 8));
        assert_eq!(report.violations[0].file_path, broken);
        assert_eq!(report.violations[1].rule_name, IO_ERROR_RULE);
        assert_eq!(report.violations[1].file_path, missing);
        assert_eq!(report.violations[2].rule_name, "print-statement");
        assert_eq!(report.violations[2].file_path, good);
        assert!(!report.summary.cancelled);
        assert!(report.config_fingerprint.is_some());
    }

    #[test]
    fn test_rule_construction_failure_keeps_configured_severity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let flaky = PluginDescriptor::new("flaky-rule", move |_: &RuleParameters| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Box::new(PrintStatement::new()) as Box<dyn Rule>)
            } else {
                Err(LintError::config("rule state unavailable"))
            }
        });
        let config = ConfigBuilder::new()
            .rule_severity("flaky-rule", RuleSeverity::Warning)
            .build()
            .unwrap();
        let analyzer = Analyzer::new(config, vec![flaky]).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.sql");
        fs::write(&path, "SELECT 1;").unwrap();

        let outcome = analyzer.analyze_file(&path);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_name, "flaky-rule");
        assert_eq!(outcome.violations[0].severity, Severity::Warning);
        assert_eq!(outcome.violations[0].position(), Position::START);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<_> = (0..8)
            .map(|i| {
                let path = dir.path().join(format!("s{i}.sql"));
                fs::write(&path, format!("select * from t{i}\nPRINT 'x'")).unwrap();
                path
            })
            .collect();

        let analyzer = Analyzer::with_defaults().unwrap();
        let sequential = analyzer.process_all(
            &paths,
            &AnalysisOptions {
                parallel: false,
                ..Default::default()
            },
            &Stopwatch::start(),
        );
        let parallel = analyzer.process_all(&paths, &AnalysisOptions::default(), &Stopwatch::start());

        assert_eq!(sequential.violations, parallel.violations);
        assert_eq!(parallel.file_count(), 8);
    }

    #[test]
    fn test_cancelled_run_skips_scripts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.sql");
        fs::write(&path, "SELECT 1;").unwrap();

        let flag = CancellationFlag::new();
        flag.cancel();
        let options = AnalysisOptions {
            parallel: false,
            cancellation: Some(flag),
        };

        let report = Analyzer::with_defaults()
            .unwrap()
            .process_all(&[path], &options, &Stopwatch::start());
        assert_eq!(report.file_count(), 0);
        assert!(report.summary.cancelled);
    }

    struct RejectingParser;

    impl ScriptParser for RejectingParser {
        fn parse(&self, _text: &str, level: CompatibilityLevel) -> Result<Script, ParseError> {
            Err(ParseError::new(Position::new(2, 3), format!("rejected at level {level}")))
        }
    }

    #[test]
    fn test_custom_parser() {
        let analyzer = Analyzer::with_defaults()
            .unwrap()
            .with_parser(Box::new(RejectingParser));

        let outcome = analyzer.analyze_file(Path::new("virtual.sql"));
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule_name, IO_ERROR_RULE);

        let err = analyzer.analyze_source("SELECT 1;").unwrap_err();
        assert!(matches!(err, LintError::Parse { .. }));
        assert!(err.to_string().contains("rejected at level 120"));
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let analyzer = Analyzer::new(only("print-statement"), Vec::new()).unwrap();
        let violations = analyzer.analyze_source("\u{feff}PRINT 'x';").unwrap();
        assert_eq!(positions(&violations), vec![(1, 1)]);
    }
}
