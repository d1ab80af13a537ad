//! Configuration loading and management for TSQL Guardian
//!
//! Architecture: Anti-Corruption Layer - Configuration translates external YAML formats
//! - Raw YAML structures are converted to severities and typed rule parameters
//! - Default configuration comes from the built-in rule catalogue, not from a file on disk
//! - Rule names in configuration are the same identifiers violations carry

use crate::domain::violations::{LintError, LintResult, RuleSeverity};
use crate::parser::{CompatibilityLevel, DEFAULT_TAB_WIDTH};
use crate::rules::{builtin_rules, RuleParameters};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// File names searched in the working directory when no `--config` is given
pub const CONFIG_FILE_NAMES: &[&str] = &["tsql_guardian.yaml", "tsql_guardian.yml", ".tsqllintrc"];

/// Supported configuration format versions
const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Main configuration structure for TSQL Guardian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LintConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,
    /// Grammar dialect handed to the parser
    #[serde(default)]
    pub compatibility_level: CompatibilityLevel,
    /// Display width of a horizontal tab when computing columns
    #[serde(default = "default_tab_width")]
    pub tab_width: u32,
    /// Per-rule severity and parameters keyed by rule name
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,
    /// Plugin locations, loaded in order
    #[serde(default)]
    pub plugins: Vec<PathBuf>,
    /// Input file selection
    #[serde(default)]
    pub paths: PathConfig,
}

/// A rule entry: either a bare severity or a severity with parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConfig {
    Severity(RuleSeverity),
    Detailed(DetailedRuleConfig),
}

/// Long form of a rule entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailedRuleConfig {
    /// Severity override; the rule's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<RuleSeverity>,
    /// Every other key is a rule parameter
    #[serde(flatten)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,
}

impl RuleConfig {
    pub fn severity(&self) -> Option<RuleSeverity> {
        match self {
            Self::Severity(severity) => Some(*severity),
            Self::Detailed(detailed) => detailed.severity,
        }
    }

    pub fn parameters(&self) -> BTreeMap<String, serde_yaml::Value> {
        match self {
            Self::Severity(_) => BTreeMap::new(),
            Self::Detailed(detailed) => detailed.parameters.clone(),
        }
    }
}

/// Input file selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathConfig {
    /// File name globs a walked directory entry must match
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    /// Glob patterns removed from the resolved input list
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_tab_width() -> u32 {
    DEFAULT_TAB_WIDTH
}

fn default_include() -> Vec<String> {
    vec!["*.sql".to_string()]
}

/// Whether a rule name is a lowercase hyphenated identifier
pub fn is_valid_rule_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

impl LintConfig {
    /// Load configuration from a YAML (or JSON) file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> LintResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            LintError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            LintError::config(format!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from string content
    pub fn load_from_str(content: &str) -> LintResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| LintError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Find the configuration file for a working directory
    pub fn discover(directory: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| directory.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Every built-in rule at its default severity
    pub fn with_defaults() -> Self {
        let rules = builtin_rules()
            .into_iter()
            .map(|rule| (rule.name, RuleConfig::Severity(rule.default_severity)))
            .collect();

        Self {
            version: default_version(),
            compatibility_level: CompatibilityLevel::default(),
            tab_width: DEFAULT_TAB_WIDTH,
            rules,
            plugins: Vec::new(),
            paths: PathConfig::default(),
        }
    }

    /// Validate the configuration for consistency and correctness
    ///
    /// Whether each rule name refers to a known rule is checked by the registry, once
    /// plugins have been loaded.
    pub fn validate(&self) -> LintResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(LintError::config(format!(
                "Unsupported configuration version: {}. Supported versions: {}",
                self.version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        if !(1..=16).contains(&self.tab_width) {
            return Err(LintError::config(format!(
                "tab-width must be between 1 and 16, got {}",
                self.tab_width
            )));
        }

        if !self.compatibility_level.is_supported() {
            let supported: Vec<_> = CompatibilityLevel::SUPPORTED.iter().map(u16::to_string).collect();
            return Err(LintError::config(format!(
                "Unsupported compatibility-level: {}. Supported levels: {}",
                self.compatibility_level,
                supported.join(", ")
            )));
        }

        for name in self.rules.keys() {
            if !is_valid_rule_name(name) {
                return Err(LintError::config(format!(
                    "Invalid rule name '{name}': names are lowercase words joined by hyphens"
                )));
            }
        }

        for pattern in self.paths.include.iter().chain(&self.paths.exclude) {
            glob::Pattern::new(pattern).map_err(|e| {
                LintError::config(format!("Invalid path pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }

    /// Effective severity and parameters of a rule
    pub fn rule_settings(&self, name: &str, default_severity: RuleSeverity) -> (RuleSeverity, RuleParameters) {
        match self.rules.get(name) {
            Some(entry) => (
                entry.severity().unwrap_or(default_severity),
                RuleParameters::new(name, entry.parameters()),
            ),
            None => (default_severity, RuleParameters::empty(name)),
        }
    }

    /// Convert to YAML, the format `init` writes
    pub fn to_yaml(&self) -> LintResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LintError::config(format!("Failed to serialize config: {e}")))
    }

    /// Convert to JSON for serialization
    pub fn to_json(&self) -> LintResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LintError::config(format!("Failed to serialize config: {e}")))
    }

    /// Stable identity of the configuration, recorded in reports
    pub fn fingerprint(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        // BTreeMap keeps rule order stable, so the JSON form is canonical
        match serde_json::to_string(self) {
            Ok(json) => json.hash(&mut hasher),
            Err(_) => {
                self.version.hash(&mut hasher);
                self.rules.keys().for_each(|name| name.hash(&mut hasher));
            }
        }

        format!("{:x}", hasher.finish())
    }
}

impl Default for LintConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: LintConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LintConfig::default(),
        }
    }

    pub fn compatibility_level(mut self, level: u16) -> Self {
        self.config.compatibility_level = CompatibilityLevel(level);
        self
    }

    pub fn tab_width(mut self, width: u32) -> Self {
        self.config.tab_width = width;
        self
    }

    /// Set a rule's severity, keeping any parameters already configured
    pub fn rule_severity(mut self, name: impl Into<String>, severity: RuleSeverity) -> Self {
        let name = name.into();
        let entry = match self.config.rules.remove(&name) {
            Some(RuleConfig::Detailed(mut detailed)) => {
                detailed.severity = Some(severity);
                RuleConfig::Detailed(detailed)
            }
            _ => RuleConfig::Severity(severity),
        };
        self.config.rules.insert(name, entry);
        self
    }

    /// Set one parameter of a rule, keeping its severity
    pub fn rule_parameter(
        mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_yaml::Value>,
    ) -> Self {
        let name = name.into();
        let mut detailed = match self.config.rules.remove(&name) {
            Some(RuleConfig::Detailed(detailed)) => detailed,
            Some(RuleConfig::Severity(severity)) => DetailedRuleConfig {
                severity: Some(severity),
                ..Default::default()
            },
            None => DetailedRuleConfig::default(),
        };
        detailed.parameters.insert(key.into(), value.into());
        self.config.rules.insert(name, RuleConfig::Detailed(detailed));
        self
    }

    pub fn add_plugin(mut self, location: impl Into<PathBuf>) -> Self {
        self.config.plugins.push(location.into());
        self
    }

    pub fn add_exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.paths.exclude.push(pattern.into());
        self
    }

    /// Build the final configuration
    pub fn build(self) -> LintResult<LintConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
