//! Rule registry: merges built-in and plugin rules with configuration
//!
//! Architectural Principle: Registry - Rules are found by stable string keys, never by reflection
//! - Built-ins are registered first in catalogue order, plugins after them in load order
//! - Every identity conflict is a configuration error raised before any script is read
//! - Enabled rules are constructed once up front so bad parameters fail early

use crate::config::{is_valid_rule_name, LintConfig};
use crate::domain::violations::{
    LintError, LintResult, RuleSeverity, Severity, IO_ERROR_RULE, PARSE_ERROR_RULE, UNNAMED_RULE,
};
use crate::rules::{builtin_rules, PluginDescriptor, Rule, RuleConstructor, RuleParameters};
use std::collections::HashSet;
use std::fmt;

/// Where a registered rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Builtin,
    Plugin,
}

impl RuleSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "built-in",
            Self::Plugin => "plugin",
        }
    }
}

/// A rule with its effective configuration for one run
#[derive(Clone)]
pub struct RegisteredRule {
    pub name: String,
    pub description: String,
    pub source: RuleSource,
    pub default_severity: RuleSeverity,
    pub severity: RuleSeverity,
    pub parameters: RuleParameters,
    constructor: RuleConstructor,
}

impl RegisteredRule {
    pub fn is_enabled(&self) -> bool {
        self.severity.is_enabled()
    }

    fn construct(&self) -> LintResult<Box<dyn Rule>> {
        (self.constructor)(&self.parameters)
    }
}

impl fmt::Debug for RegisteredRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredRule")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("severity", &self.severity)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A constructed rule ready for one traversal
pub struct ActiveRule {
    pub(crate) name: String,
    pub(crate) severity: Severity,
    pub(crate) rule: Box<dyn Rule>,
}

impl ActiveRule {
    pub fn new(name: impl Into<String>, severity: Severity, rule: Box<dyn Rule>) -> Self {
        Self {
            name: name.into(),
            severity,
            rule,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl fmt::Debug for ActiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

/// Snapshot of every known rule and its configuration for one run
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<RegisteredRule>,
}

impl RuleRegistry {
    /// Merge the built-in catalogue with plugin rules and apply configuration
    pub fn build(config: &LintConfig, plugins: Vec<PluginDescriptor>) -> LintResult<Self> {
        let mut candidates: Vec<(String, String, RuleSource, RuleSeverity, RuleConstructor)> = builtin_rules()
            .into_iter()
            .map(|rule| {
                (
                    rule.name,
                    rule.description,
                    RuleSource::Builtin,
                    rule.default_severity,
                    rule.constructor,
                )
            })
            .collect();

        for plugin in plugins {
            candidates.push((
                plugin.rule_name,
                plugin.description.unwrap_or_default(),
                RuleSource::Plugin,
                RuleSeverity::Error,
                plugin.constructor,
            ));
        }

        let mut seen = HashSet::new();
        for (name, _, source, _, _) in &candidates {
            Self::check_identity(name, *source)?;
            if !seen.insert(name.as_str()) {
                return Err(LintError::config(format!("Duplicate rule name '{name}'")));
            }
        }

        for name in config.rules.keys() {
            if !seen.contains(name.as_str()) {
                return Err(LintError::config(format!(
                    "Unknown rule '{name}' in configuration"
                )));
            }
        }

        let mut rules = Vec::with_capacity(candidates.len());
        for (name, description, source, default_severity, constructor) in candidates {
            let (severity, parameters) = config.rule_settings(&name, default_severity);
            let registered = RegisteredRule {
                name,
                description,
                source,
                default_severity,
                severity,
                parameters,
                constructor,
            };

            if registered.is_enabled() {
                registered.construct()?;
                tracing::debug!(
                    "Enabled {} rule '{}' at {}",
                    registered.source.as_str(),
                    registered.name,
                    registered.severity.as_str()
                );
            }
            rules.push(registered);
        }

        Ok(Self { rules })
    }

    fn check_identity(name: &str, source: RuleSource) -> LintResult<()> {
        if !is_valid_rule_name(name) {
            return Err(LintError::config(format!(
                "Invalid {} rule name '{name}': names are lowercase words joined by hyphens",
                source.as_str()
            )));
        }
        if name == PARSE_ERROR_RULE || name == IO_ERROR_RULE || name == UNNAMED_RULE {
            return Err(LintError::config(format!("Rule name '{name}' is reserved")));
        }
        Ok(())
    }

    /// Fresh instances of every enabled rule, in registration order
    pub fn instantiate(&self) -> LintResult<Vec<ActiveRule>> {
        self.rules
            .iter()
            .filter_map(|rule| rule.severity.to_severity().map(|severity| (rule, severity)))
            .map(|(rule, severity)| {
                let instance = rule
                    .construct()
                    .map_err(|e| LintError::rule_internal(&rule.name, e.to_string()))?;
                Ok(ActiveRule::new(rule.name.clone(), severity, instance))
            })
            .collect()
    }

    /// Every known rule, enabled or not
    pub fn rules(&self) -> &[RegisteredRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn active_rule_names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|rule| rule.is_enabled())
            .map(|rule| rule.name.as_str())
            .collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|rule| rule.is_enabled()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::rules::prohibit::PrintStatement;
    use rstest::rstest;

    fn plugin(name: &str) -> PluginDescriptor {
        PluginDescriptor::new(name, |_: &RuleParameters| Ok(Box::new(PrintStatement::new()) as Box<dyn Rule>))
    }

    #[test]
    fn test_defaults_enable_whole_catalogue() {
        let registry = RuleRegistry::build(&LintConfig::default(), Vec::new()).unwrap();
        assert_eq!(registry.rules().len(), 15);
        assert_eq!(registry.enabled_count(), 15);

        let active = registry.instantiate().unwrap();
        assert_eq!(active.len(), 15);
        assert_eq!(active[0].name(), "conditional-begin-end");
        let casing = active.iter().find(|r| r.name() == "upper-lower").unwrap();
        assert_eq!(casing.severity(), Severity::Warning);
    }

    #[test]
    fn test_disabled_rules_are_not_active() {
        let config = ConfigBuilder::new()
            .rule_severity("select-star", RuleSeverity::Off)
            .rule_severity("upper-lower", RuleSeverity::Error)
            .build()
            .unwrap();
        let registry = RuleRegistry::build(&config, Vec::new()).unwrap();

        assert!(!registry.active_rule_names().contains(&"select-star"));
        assert_eq!(registry.get("upper-lower").unwrap().severity, RuleSeverity::Error);
        assert_eq!(registry.instantiate().unwrap().len(), 14);
    }

    #[test]
    fn test_disabled_rules_skip_parameter_validation() {
        let config = ConfigBuilder::new()
            .rule_severity("upper-lower", RuleSeverity::Off)
            .rule_parameter("upper-lower", "case", "title")
            .build()
            .unwrap();
        assert!(RuleRegistry::build(&config, Vec::new()).is_ok());
    }

    #[test]
    fn test_plugins_are_appended() {
        let registry = RuleRegistry::build(&LintConfig::default(), vec![plugin("house-style")]).unwrap();
        let last = registry.rules().last().unwrap();

        assert_eq!(last.name, "house-style");
        assert_eq!(last.source, RuleSource::Plugin);
        assert_eq!(registry.instantiate().unwrap().len(), 16);
    }

    #[rstest]
    #[case::duplicate_of_builtin(vec!["select-star"], "Duplicate")]
    #[case::duplicate_plugins(vec!["house-style", "house-style"], "Duplicate")]
    #[case::bad_name(vec!["HouseStyle"], "Invalid")]
    #[case::reserved_parse(vec!["parse-error"], "reserved")]
    #[case::reserved_io(vec!["io-error"], "reserved")]
    #[case::reserved_unnamed(vec!["unnamed-rule"], "reserved")]
    #[case::empty_name(vec![""], "Invalid")]
    fn test_plugin_identity_conflicts(#[case] names: Vec<&str>, #[case] expected: &str) {
        let plugins = names.into_iter().map(plugin).collect();
        let err = RuleRegistry::build(&LintConfig::default(), plugins).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn test_unknown_configured_rule_is_rejected() {
        let config = LintConfig::load_from_str("rules:\n  no-such-rule: error").unwrap();
        let err = RuleRegistry::build(&config, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no-such-rule"));

        // The same entry is fine once a plugin provides the rule
        assert!(RuleRegistry::build(&config, vec![plugin("no-such-rule")]).is_ok());
    }

    #[test]
    fn test_bad_parameters_fail_at_build() {
        let config = LintConfig::load_from_str("rules:\n  data-type-length:\n    max-length: 0").unwrap();
        let err = RuleRegistry::build(&config, Vec::new()).unwrap_err();
        assert!(matches!(err, LintError::Configuration { .. }));
    }
}
