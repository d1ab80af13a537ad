//! Rule contract and built-in rule catalogue
//!
//! Architectural Principle: Strategy Pattern - Every rule is an independent state machine behind one trait
//! - Rules declare the node kinds they handle and are fed those nodes in document order
//! - Findings leave a rule only through the write-only `Emitter`
//! - Built-ins and plugins are both plain constructor closures keyed by rule name

pub mod bounded;
pub mod casing;
pub mod plugin;
pub mod prohibit;
pub mod registry;
pub mod required;
pub mod structure;
pub mod termination;

pub use plugin::{PluginDescriptor, PluginLoader, StaticPluginLoader, UnsupportedPluginLoader};
pub use registry::{ActiveRule, RuleRegistry};

use crate::domain::violations::{LintError, LintResult, Position, RuleSeverity, Severity, Violation};
use crate::parser::{NodeKind, SyntaxNode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Failure raised by a rule while handling a node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuleError {
    pub message: String,
}

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type RuleResult = Result<(), RuleError>;

/// A unit of analysis holding private state for one script
pub trait Rule: Send {
    /// Node kinds this rule wants to be offered
    fn node_kinds(&self) -> &[NodeKind];

    /// Called when a node of a registered kind is entered
    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult;

    /// Called after every descendant of the node has been visited
    fn leave(&mut self, _node: &SyntaxNode, _emitter: &mut Emitter<'_>) -> RuleResult {
        Ok(())
    }
}

/// Write-only channel that stamps rule name and severity on findings
pub struct Emitter<'a> {
    rule_name: &'a str,
    severity: Severity,
    sink: &'a mut Vec<Violation>,
}

impl<'a> Emitter<'a> {
    pub fn new(rule_name: &'a str, severity: Severity, sink: &'a mut Vec<Violation>) -> Self {
        Self {
            rule_name,
            severity,
            sink,
        }
    }

    pub fn emit(&mut self, position: Position, message: impl Into<String>) {
        self.sink
            .push(Violation::new(self.rule_name, self.severity, position, message));
    }

    pub fn rule_name(&self) -> &str {
        self.rule_name
    }
}

/// Builds a fresh rule from its configured parameters
pub type RuleConstructor = Arc<dyn Fn(&RuleParameters) -> LintResult<Box<dyn Rule>> + Send + Sync>;

/// Rule-specific parameters from the configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleParameters {
    rule: String,
    values: BTreeMap<String, serde_yaml::Value>,
}

impl RuleParameters {
    pub fn new(rule: impl Into<String>, values: BTreeMap<String, serde_yaml::Value>) -> Self {
        Self {
            rule: rule.into(),
            values,
        }
    }

    pub fn empty(rule: impl Into<String>) -> Self {
        Self::new(rule, BTreeMap::new())
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reject keys the rule does not understand
    pub fn expect_keys(&self, allowed: &[&str]) -> LintResult<()> {
        for key in self.values.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(self.invalid(key, format!("unknown parameter (expected one of: {})", allowed.join(", "))));
            }
        }
        Ok(())
    }

    pub fn positive_integer(&self, key: &str) -> LintResult<Option<u64>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => match value.as_u64() {
                Some(n) if n > 0 => Ok(Some(n)),
                _ => Err(self.invalid(key, "must be a positive integer")),
            },
        }
    }

    pub fn boolean(&self, key: &str) -> LintResult<Option<bool>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "must be true or false")),
        }
    }

    pub fn string(&self, key: &str) -> LintResult<Option<String>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.invalid(key, "must be a string")),
        }
    }

    /// A list of strings; a single string is accepted as a one-element list
    pub fn string_list(&self, key: &str) -> LintResult<Option<Vec<String>>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(serde_yaml::Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(key, "must be a list of strings"))
                })
                .collect::<LintResult<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.invalid(key, "must be a list of strings")),
        }
    }

    fn invalid(&self, key: &str, problem: impl fmt::Display) -> LintError {
        LintError::config(format!("rule '{}': parameter '{}' {}", self.rule, key, problem))
    }
}

/// A named rule with its documentation and constructor
#[derive(Clone)]
pub struct RuleDefinition {
    pub name: String,
    pub description: String,
    pub default_severity: RuleSeverity,
    pub constructor: RuleConstructor,
}

impl RuleDefinition {
    pub fn new<F>(name: &str, description: &str, default_severity: RuleSeverity, constructor: F) -> Self
    where
        F: Fn(&RuleParameters) -> LintResult<Box<dyn Rule>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            default_severity,
            constructor: Arc::new(constructor),
        }
    }
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("name", &self.name)
            .field("default_severity", &self.default_severity)
            .finish_non_exhaustive()
    }
}

/// Wrap a parameterless rule so it rejects any configured parameters
fn fixed<R, F>(make: F) -> impl Fn(&RuleParameters) -> LintResult<Box<dyn Rule>> + Send + Sync + 'static
where
    R: Rule + 'static,
    F: Fn() -> R + Send + Sync + 'static,
{
    move |parameters: &RuleParameters| {
        parameters.expect_keys(&[])?;
        Ok(Box::new(make()) as Box<dyn Rule>)
    }
}

/// The built-in catalogue in registration order
pub fn builtin_rules() -> Vec<RuleDefinition> {
    use RuleSeverity::{Error, Warning};

    vec![
        RuleDefinition::new(
            "conditional-begin-end",
            "IF and ELSE branches must wrap their body in BEGIN ... END",
            Error,
            fixed(structure::ConditionalBeginEnd::new),
        ),
        RuleDefinition::new(
            "data-compression",
            "CREATE TABLE and CREATE INDEX must set an allowed DATA_COMPRESSION option",
            Error,
            |p: &RuleParameters| Ok(Box::new(bounded::DataCompression::from_parameters(p)?) as Box<dyn Rule>),
        ),
        RuleDefinition::new(
            "data-type-length",
            "Character and binary data types must declare a bounded length",
            Error,
            |p: &RuleParameters| Ok(Box::new(bounded::DataTypeLength::from_parameters(p)?) as Box<dyn Rule>),
        ),
        RuleDefinition::new(
            "disallow-cursors",
            "Cursors must not be opened",
            Error,
            fixed(prohibit::DisallowCursors::new),
        ),
        RuleDefinition::new(
            "information-schema",
            "Catalog views must be queried through sys instead of INFORMATION_SCHEMA",
            Error,
            fixed(prohibit::InformationSchema::new),
        ),
        RuleDefinition::new(
            "object-property",
            "OBJECTPROPERTY must not be called; query the catalog views instead",
            Error,
            fixed(prohibit::ObjectProperty::new),
        ),
        RuleDefinition::new(
            "print-statement",
            "PRINT must not be used; use RAISERROR or THROW instead",
            Error,
            fixed(prohibit::PrintStatement::new),
        ),
        RuleDefinition::new(
            "schema-qualify",
            "Table references must name their schema",
            Error,
            fixed(prohibit::SchemaQualify::new),
        ),
        RuleDefinition::new(
            "select-star",
            "Select lists must name their columns instead of using *",
            Error,
            fixed(prohibit::SelectStar::new),
        ),
        RuleDefinition::new(
            "semicolon-termination",
            "Statements must be terminated with a semicolon",
            Error,
            fixed(termination::SemicolonTermination::new),
        ),
        RuleDefinition::new(
            "set-ansi",
            "Scripts must SET ANSI_NULLS ON before their first statement",
            Error,
            fixed(required::RequiredStatement::set_ansi),
        ),
        RuleDefinition::new(
            "set-nocount",
            "Scripts must SET NOCOUNT ON before returning or modifying rows",
            Error,
            fixed(required::RequiredStatement::set_nocount),
        ),
        RuleDefinition::new(
            "set-quoted-identifier",
            "Scripts must SET QUOTED_IDENTIFIER ON before their first statement",
            Error,
            fixed(required::RequiredStatement::set_quoted_identifier),
        ),
        RuleDefinition::new(
            "set-transaction-isolation-level",
            "Scripts must SET TRANSACTION ISOLATION LEVEL before accessing data",
            Error,
            fixed(required::RequiredStatement::set_transaction_isolation_level),
        ),
        RuleDefinition::new(
            "upper-lower",
            "Keywords must follow the configured letter case",
            Warning,
            |p: &RuleParameters| Ok(Box::new(casing::UpperLower::from_parameters(p)?) as Box<dyn Rule>),
        ),
    ]
}

/// Look up a built-in rule by name
pub fn builtin_rule(name: &str) -> Option<RuleDefinition> {
    builtin_rules().into_iter().find(|rule| rule.name == name)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::DispatchEngine;
    use crate::parser::{CompatibilityLevel, ScriptParser, SqlParser};

    /// Run one built-in rule with parameters over a script and return `(line, column)` pairs
    pub fn run_rule_with(name: &str, parameters: RuleParameters, sql: &str) -> Vec<(u32, u32)> {
        let definition = builtin_rule(name).unwrap();
        let rule = (definition.constructor)(&parameters).unwrap();
        let script = SqlParser::default()
            .parse(sql, CompatibilityLevel::default())
            .unwrap();
        let active = vec![ActiveRule::new(name, Severity::Error, rule)];

        DispatchEngine::new()
            .run(&script, active)
            .iter()
            .map(|v| {
                assert_eq!(v.rule_name, name);
                (v.line, v.column)
            })
            .collect()
    }

    pub fn run_rule(name: &str, sql: &str) -> Vec<(u32, u32)> {
        run_rule_with(name, RuleParameters::empty(name), sql)
    }

    pub fn parameters(rule: &str, yaml: &str) -> RuleParameters {
        RuleParameters::new(rule, serde_yaml::from_str(yaml).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_catalogue_names_are_unique_and_hyphenated() {
        let pattern = Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").unwrap();
        let rules = builtin_rules();
        let mut names: Vec<_> = rules.iter().map(|r| r.name.clone()).collect();

        assert_eq!(rules.len(), 15);
        assert!(names.iter().all(|n| pattern.is_match(n)));
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 15);
    }

    #[test]
    fn test_fixed_rules_reject_parameters() {
        let rule = builtin_rule("select-star").unwrap();
        let parameters = test_support::parameters("select-star", "foo: 1");
        let err = (rule.constructor)(&parameters).err().unwrap();
        assert!(err.to_string().contains("unknown parameter"));
    }

    #[test]
    fn test_parameter_accessors() {
        let parameters = test_support::parameters(
            "data-type-length",
            "max-length: 50\nallow-max: false\ncase: lower\nallowed: [ROW, PAGE]\nzero: 0",
        );

        assert_eq!(parameters.positive_integer("max-length").unwrap(), Some(50));
        assert_eq!(parameters.boolean("allow-max").unwrap(), Some(false));
        assert_eq!(parameters.string("case").unwrap().as_deref(), Some("lower"));
        assert_eq!(
            parameters.string_list("allowed").unwrap(),
            Some(vec!["ROW".to_string(), "PAGE".to_string()])
        );
        assert!(parameters.positive_integer("zero").is_err());
        assert!(parameters.boolean("max-length").is_err());
        assert_eq!(parameters.string("missing").unwrap(), None);
    }

    #[test]
    fn test_emitter_stamps_name_and_severity() {
        let mut sink = Vec::new();
        let mut emitter = Emitter::new("print-statement", Severity::Warning, &mut sink);
        emitter.emit(Position::new(2, 3), "found PRINT");

        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].rule_name, "print-statement");
        assert_eq!(sink[0].severity, Severity::Warning);
        assert_eq!(sink[0].position(), Position::new(2, 3));
    }
}
