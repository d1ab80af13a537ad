//! Keyword casing rule

use crate::domain::violations::{LintError, LintResult};
use crate::parser::{NodeKind, SyntaxNode};
use crate::rules::{Emitter, Rule, RuleParameters, RuleResult};

/// Letter case keywords are expected to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeywordCase {
    #[default]
    Upper,
    Lower,
}

impl KeywordCase {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "upper" => Some(Self::Upper),
            "lower" => Some(Self::Lower),
            _ => None,
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Upper => text.to_ascii_uppercase(),
            Self::Lower => text.to_ascii_lowercase(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
        }
    }
}

#[derive(Debug, Default)]
pub struct UpperLower {
    case: KeywordCase,
}

impl UpperLower {
    pub fn new(case: KeywordCase) -> Self {
        Self { case }
    }

    pub fn from_parameters(parameters: &RuleParameters) -> LintResult<Self> {
        parameters.expect_keys(&["case"])?;
        let case = match parameters.string("case")? {
            None => KeywordCase::default(),
            Some(value) => KeywordCase::parse(&value).ok_or_else(|| {
                LintError::config(format!(
                    "rule '{}': parameter 'case' must be 'upper' or 'lower', got '{value}'",
                    parameters.rule()
                ))
            })?,
        };
        Ok(Self::new(case))
    }
}

impl Rule for UpperLower {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::Keyword]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        let expected = self.case.apply(&node.text);
        if expected != node.text {
            emitter.emit(
                node.start,
                format!("Expected {} keyword '{expected}' but found '{}'", self.case.as_str(), node.text),
            );
        }
        Ok(())
    }
}
