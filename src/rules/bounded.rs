//! Bounded-value rules: data type lengths and table compression

use crate::domain::violations::{LintError, LintResult};
use crate::parser::{NodeDetail, NodeKind, SyntaxNode, TypeLength};
use crate::rules::{Emitter, Rule, RuleParameters, RuleResult};

/// Types whose storage is bounded by a declared length
const LENGTH_BEARING_TYPES: &[&str] = &["CHAR", "VARCHAR", "NCHAR", "NVARCHAR", "BINARY", "VARBINARY"];

/// Every value SQL Server accepts for DATA_COMPRESSION
pub const COMPRESSION_VALUES: &[&str] = &["NONE", "ROW", "PAGE", "COLUMNSTORE", "COLUMNSTORE_ARCHIVE"];

/// Flags length-bearing types without a length, above `max-length`, or `MAX` when disallowed
#[derive(Debug, Clone)]
pub struct DataTypeLength {
    max_length: Option<u64>,
    allow_max: bool,
}

impl DataTypeLength {
    pub fn new(max_length: Option<u64>, allow_max: bool) -> Self {
        Self { max_length, allow_max }
    }

    pub fn from_parameters(parameters: &RuleParameters) -> LintResult<Self> {
        parameters.expect_keys(&["max-length", "allow-max"])?;
        Ok(Self::new(
            parameters.positive_integer("max-length")?,
            parameters.boolean("allow-max")?.unwrap_or(true),
        ))
    }
}

impl Default for DataTypeLength {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl Rule for DataTypeLength {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::DataType]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        let NodeDetail::DataType {
            name,
            length,
            length_position,
        } = &node.detail
        else {
            return Ok(());
        };
        if !LENGTH_BEARING_TYPES.contains(&name.as_str()) {
            return Ok(());
        }

        let at = length_position.unwrap_or(node.start);
        match length {
            None => emitter.emit(node.start, format!("Expected length to be specified for {name}")),
            Some(TypeLength::Max) if !self.allow_max => {
                emitter.emit(at, format!("Expected bounded length for {name} instead of MAX"))
            }
            Some(TypeLength::Value(n)) => {
                if let Some(limit) = self.max_length.filter(|limit| n > limit) {
                    emitter.emit(at, format!("Length {n} of {name} exceeds the maximum of {limit}"));
                }
            }
            Some(TypeLength::Max) => {}
        }
        Ok(())
    }
}

/// Flags CREATE TABLE / CREATE INDEX without an allowed DATA_COMPRESSION option
#[derive(Debug, Clone)]
pub struct DataCompression {
    allowed: Vec<String>,
}

impl DataCompression {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn from_parameters(parameters: &RuleParameters) -> LintResult<Self> {
        parameters.expect_keys(&["allowed"])?;
        let allowed = match parameters.string_list("allowed")? {
            None => COMPRESSION_VALUES.iter().map(|v| v.to_string()).collect(),
            Some(values) => {
                let mut allowed = Vec::with_capacity(values.len());
                for value in values {
                    let upper = value.to_ascii_uppercase();
                    if !COMPRESSION_VALUES.contains(&upper.as_str()) {
                        return Err(LintError::config(format!(
                            "rule '{}': unknown compression value '{value}' (expected one of: {})",
                            parameters.rule(),
                            COMPRESSION_VALUES.join(", ")
                        )));
                    }
                    allowed.push(upper);
                }
                allowed
            }
        };
        Ok(Self::new(allowed))
    }

    fn is_temporary(node: &SyntaxNode) -> bool {
        matches!(&node.detail, NodeDetail::Object { parts } if parts.last().is_some_and(|p| p.starts_with('#')))
    }
}

impl Default for DataCompression {
    fn default() -> Self {
        Self::new(COMPRESSION_VALUES.iter().map(|v| v.to_string()).collect())
    }
}

impl Rule for DataCompression {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::CreateTable, NodeKind::CreateIndex]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if node.is(NodeKind::CreateTable) && Self::is_temporary(node) {
            return Ok(());
        }

        let mut found = false;
        for option in node.descendants() {
            if let NodeDetail::TableOption {
                name,
                value,
                value_position,
            } = &option.detail
            {
                if name != "DATA_COMPRESSION" {
                    continue;
                }
                found = true;
                if !self.allowed.iter().any(|a| a == value) {
                    emitter.emit(
                        *value_position,
                        format!("Compression {value} is not allowed (allowed: {})", self.allowed.join(", ")),
                    );
                }
            }
        }

        if !found {
            emitter.emit(node.start, "Expected table to use data compression");
        }
        Ok(())
    }
}
