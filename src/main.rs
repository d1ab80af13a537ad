//! TSQL Guardian CLI - Command-line interface for T-SQL script linting
//!
//! CDD Principle: Application Layer - CLI coordinates user interactions with domain services
//! - Translates user commands to domain operations
//! - Handles external concerns like config discovery, Ctrl-C, process exit codes and terminal output
//! - Provides clean separation between user interface and linting logic

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tsql_guardian::config::CONFIG_FILE_NAMES;
use tsql_guardian::rules::builtin_rule;
use tsql_guardian::{
    AnalysisOptions, CancellationFlag, LintConfig, LintError, LintResult, Linter, OutputFormat,
    ReportFormatter, ReportOptions, Severity, UnsupportedPluginLoader,
};

/// Exit code when an error-severity violation was reported
const EXIT_VIOLATIONS: i32 = 1;
/// Exit code when configuration or plugins could not be used
const EXIT_CONFIG: i32 = 2;

/// TSQL Guardian - Rule-based linting for T-SQL scripts
#[derive(Parser)]
#[command(name = "tsql-guardian")]
#[command(version)]
#[command(about = "Rule-based linter for T-SQL scripts")]
#[command(long_about = "TSQL Guardian parses T-SQL scripts and runs a configurable catalogue of style and safety rules over them. Designed for pre-commit hooks and CI/CD pipelines.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint scripts for rule violations
    Check(CheckArgs),

    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config_file: Option<PathBuf>,
    },

    /// List available rules
    Rules {
        /// Show only enabled rules
        #[arg(long)]
        enabled_only: bool,
    },

    /// Explain what a specific rule does
    Explain {
        /// Rule name to explain
        rule: String,
    },

    /// Print the default configuration
    Init {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Files, directories or glob patterns (defaults to the current directory)
    paths: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormatArg,

    /// Minimum severity level to report
    #[arg(short, long, value_enum)]
    severity: Option<SeverityArg>,

    /// Maximum number of violations to report
    #[arg(long)]
    max_violations: Option<usize>,

    /// Additional exclude patterns
    #[arg(long, action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Disable parallel processing
    #[arg(long)]
    no_parallel: bool,
}

#[derive(Copy, Clone, ValueEnum, PartialEq)]
enum OutputFormatArg {
    Human,
    Json,
    Github,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Github => OutputFormat::GitHub,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum SeverityArg {
    Warning,
    Error,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Error => Severity::Error,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    match run_command(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(if e.is_fatal() { EXIT_CONFIG } else { EXIT_VIOLATIONS });
        }
    }
}

async fn run_command(cli: Cli) -> LintResult<i32> {
    match cli.command {
        Commands::Check(args) => {
            let use_colors = !cli.no_color && std::io::stdout().is_terminal();
            run_check(cli.config, args, use_colors).await
        }
        Commands::ValidateConfig { config_file } => run_validate_config(config_file.or(cli.config)),
        Commands::Rules { enabled_only } => run_list_rules(cli.config, enabled_only),
        Commands::Explain { rule } => run_explain(&rule),
        Commands::Init { output, force } => run_init(output, force),
    }
}

/// `--config`, then the first discovered file in the working directory, then defaults
fn load_config(config_path: Option<PathBuf>) -> LintResult<LintConfig> {
    let path = match config_path {
        Some(path) => Some(path),
        None => LintConfig::discover(&std::env::current_dir()?),
    };

    match path {
        Some(path) => {
            tracing::debug!("Using configuration {}", path.display());
            LintConfig::load_from_file(path)
        }
        None => {
            tracing::debug!("No configuration file found; using defaults");
            Ok(LintConfig::default())
        }
    }
}

async fn run_check(config_path: Option<PathBuf>, args: CheckArgs, use_colors: bool) -> LintResult<i32> {
    let mut config = load_config(config_path)?;
    config.paths.exclude.extend(args.exclude);

    let formatter = ReportFormatter::new(ReportOptions {
        use_colors,
        max_violations: args.max_violations,
        min_severity: args.severity.map(Severity::from),
    });
    let linter = Arc::new(Linter::new(config, &UnsupportedPluginLoader)?.with_report_formatter(formatter));

    // Use current directory if no paths specified
    let paths = if args.paths.is_empty() {
        vec![".".to_string()]
    } else {
        args.paths
    };

    let cancellation = CancellationFlag::new();
    let options = AnalysisOptions {
        parallel: !args.no_parallel,
        cancellation: Some(cancellation.clone()),
    };

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing scripts already in progress");
            cancellation.cancel();
        }
    });

    let worker = Arc::clone(&linter);
    let outcome = tokio::task::spawn_blocking(move || worker.lint_paths(&paths, &options)).await;
    interrupt.abort();

    let report = outcome.map_err(|e| LintError::from(std::io::Error::other(e.to_string())))??;

    let formatted = linter.format_report(&report, args.format.into())?;
    print!("{formatted}");

    Ok(if report.has_errors() { EXIT_VIOLATIONS } else { 0 })
}

fn run_validate_config(config_path: Option<PathBuf>) -> LintResult<i32> {
    let config_path = match config_path {
        Some(path) => path,
        None => match LintConfig::discover(&std::env::current_dir()?) {
            Some(path) => path,
            None => {
                eprintln!(
                    "❌ No configuration file found (looked for {})",
                    CONFIG_FILE_NAMES.join(", ")
                );
                return Ok(EXIT_CONFIG);
            }
        },
    };

    println!("Validating configuration: {}", config_path.display());

    // Building the linter also checks rule names and parameters
    match LintConfig::load_from_file(&config_path).and_then(|config| Linter::new(config, &UnsupportedPluginLoader)) {
        Ok(linter) => {
            let registry = linter.analyzer().registry();
            println!("✅ Configuration is valid");
            println!("📊 Configuration summary:");
            println!("  Compatibility level: {}", linter.config().compatibility_level);
            println!("  Tab width: {}", linter.config().tab_width);
            println!(
                "  Rules: {} total, {} enabled",
                registry.rules().len(),
                registry.enabled_count()
            );
            println!("  Exclude patterns: {}", linter.config().paths.exclude.len());
            Ok(0)
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {e}");
            Ok(EXIT_CONFIG)
        }
    }
}

fn run_explain(rule_name: &str) -> LintResult<i32> {
    if let Some(rule) = builtin_rule(rule_name) {
        println!("📖 Rule: {}", rule.name);
        println!("⚠️ Default severity: {}", rule.default_severity.as_str());
        println!();
        println!("📝 Description:");
        println!("   {}", rule.description);
        return Ok(0);
    }

    eprintln!("❌ Rule '{rule_name}' not found");
    println!();
    println!("Available rules:");
    for rule in tsql_guardian::rules::builtin_rules() {
        println!("  - {}", rule.name);
    }

    Ok(EXIT_VIOLATIONS)
}

fn run_list_rules(config_path: Option<PathBuf>, enabled_only: bool) -> LintResult<i32> {
    let linter = Linter::new(load_config(config_path)?, &UnsupportedPluginLoader)?;

    println!("📋 Available Rules\n");

    for rule in linter.analyzer().registry().rules() {
        if enabled_only && !rule.is_enabled() {
            continue;
        }

        let status = if rule.is_enabled() { "✅" } else { "❌" };
        println!(
            "  {}🔍 {} [{}] ({}) - {}",
            status,
            rule.name,
            rule.severity.as_str(),
            rule.source.as_str(),
            rule.description
        );
    }

    Ok(0)
}

fn run_init(output: Option<PathBuf>, force: bool) -> LintResult<i32> {
    let yaml = LintConfig::with_defaults().to_yaml()?;

    match output {
        None => {
            print!("{yaml}");
            Ok(0)
        }
        Some(path) => write_config(&path, &yaml, force),
    }
}

fn write_config(path: &Path, yaml: &str, force: bool) -> LintResult<i32> {
    if path.exists() && !force {
        eprintln!(
            "❌ {} already exists; pass --force to overwrite it",
            path.display()
        );
        return Ok(EXIT_VIOLATIONS);
    }

    std::fs::write(path, yaml)?;
    println!("✅ Wrote default configuration to {}", path.display());
    Ok(0)
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const QUIET_CONFIG: &str = "\
rules:
  set-ansi: off
  set-nocount: off
  set-quoted-identifier: off
  set-transaction-isolation-level: off
";

    fn check_args(paths: Vec<String>) -> CheckArgs {
        CheckArgs {
            paths,
            format: OutputFormatArg::Json,
            severity: None,
            max_violations: None,
            exclude: Vec::new(),
            no_parallel: false,
        }
    }

    fn workspace(script: &str) -> (TempDir, PathBuf, String) {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("tsql_guardian.yaml");
        fs::write(&config, QUIET_CONFIG).unwrap();
        fs::write(dir.path().join("script.sql"), script).unwrap();
        let argument = dir.path().to_string_lossy().into_owned();
        (dir, config, argument)
    }

    #[tokio::test]
    async fn test_check_fails_on_error_violations() {
        let (_dir, config, argument) = workspace("PRINT 'debug';");
        let code = run_check(Some(config), check_args(vec![argument]), false).await.unwrap();
        assert_eq!(code, EXIT_VIOLATIONS);
    }

    #[tokio::test]
    async fn test_check_passes_clean_and_warning_only_scripts() {
        let (_dir, config, argument) = workspace("SELECT a FROM dbo.t;");
        let code = run_check(Some(config.clone()), check_args(vec![argument]), false).await.unwrap();
        assert_eq!(code, 0);

        let (_dir, config, argument) = workspace("select a FROM dbo.t;");
        let code = run_check(Some(config), check_args(vec![argument]), false).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_check_honours_exclude() {
        let (_dir, config, argument) = workspace("PRINT 'debug';");
        let mut args = check_args(vec![argument]);
        args.exclude.push("script.sql".to_string());
        assert_eq!(run_check(Some(config), args, false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_rejects_unknown_rule_in_config() {
        let (dir, _config, argument) = workspace("SELECT 1;");
        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "rules:\n  no-such-rule: error\n").unwrap();

        let err = run_check(Some(bad), check_args(vec![argument]), false).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_config() {
        let (dir, config, _) = workspace("");
        assert_eq!(run_validate_config(Some(config)).unwrap(), 0);

        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "tab-width: 0\n").unwrap();
        assert_eq!(run_validate_config(Some(bad)).unwrap(), EXIT_CONFIG);
    }

    #[test]
    fn test_explain_rule() {
        assert_eq!(run_explain("select-star").unwrap(), 0);
        assert_eq!(run_explain("nonexistent-rule").unwrap(), EXIT_VIOLATIONS);
    }

    #[test]
    fn test_list_rules() {
        let (_dir, config, _) = workspace("");
        assert_eq!(run_list_rules(Some(config.clone()), false).unwrap(), 0);
        assert_eq!(run_list_rules(Some(config), true).unwrap(), 0);
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tsql_guardian.yaml");

        assert_eq!(run_init(Some(path.clone()), false).unwrap(), 0);
        let loaded = LintConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, LintConfig::with_defaults());

        assert_eq!(run_init(Some(path.clone()), false).unwrap(), EXIT_VIOLATIONS);
        assert_eq!(run_init(Some(path), true).unwrap(), 0);
    }
}
