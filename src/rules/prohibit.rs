//! Prohibition rules
//!
//! Stateless rules that report one violation per offending node at its first token.
//! `SchemaQualify` is the exception: it keeps the names each statement defines so CTE
//! names and aliases are not mistaken for unqualified tables.

use crate::parser::{NodeDetail, NodeKind, SyntaxNode};
use crate::rules::{Emitter, Rule, RuleResult};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DisallowCursors;

impl DisallowCursors {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for DisallowCursors {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::OpenCursor]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        emitter.emit(node.start, "Found use of CURSOR statement");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PrintStatement;

impl PrintStatement {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for PrintStatement {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::Print]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        emitter.emit(node.start, "Expected RAISERROR or THROW instead of PRINT statement");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SelectStar;

impl SelectStar {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for SelectStar {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::SelectStar]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        emitter.emit(node.start, "Expected column names in SELECT");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InformationSchema;

impl InformationSchema {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for InformationSchema {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::TableReference]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if let NodeDetail::TableReference { parts, .. } = &node.detail {
            let schema = parts.len().checked_sub(2).map(|i| parts[i].as_str());
            if schema.is_some_and(|s| s.eq_ignore_ascii_case("INFORMATION_SCHEMA")) {
                emitter.emit(node.start, "Expected use of SYS.Partitions rather than INFORMATION_SCHEMA views");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ObjectProperty;

impl ObjectProperty {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for ObjectProperty {
    fn node_kinds(&self) -> &[NodeKind] {
        &[NodeKind::FunctionCall]
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if let NodeDetail::FunctionCall { name } = &node.detail {
            let function = name.rsplit('.').next().unwrap_or(name);
            if function.eq_ignore_ascii_case("OBJECTPROPERTY") {
                emitter.emit(node.start, "Expected use of SYS.COLUMNS rather than OBJECTPROPERTY");
            }
        }
        Ok(())
    }
}

/// Pseudo-tables available inside triggers and OUTPUT clauses
const PSEUDO_TABLES: &[&str] = &["INSERTED", "DELETED"];

#[derive(Debug, Default)]
pub struct SchemaQualify {
    /// Upper-cased names defined by each enclosing statement
    scopes: Vec<HashSet<String>>,
}

impl SchemaQualify {
    pub fn new() -> Self {
        Self::default()
    }

    fn defined_names(statement: &SyntaxNode) -> HashSet<String> {
        statement
            .descendants()
            .filter_map(|node| match &node.detail {
                NodeDetail::CommonTableExpression { name } => Some(name.to_ascii_uppercase()),
                NodeDetail::TableReference { alias: Some(alias), .. } => Some(alias.to_ascii_uppercase()),
                _ => None,
            })
            .collect()
    }

    fn is_exempt(&self, name: &str) -> bool {
        if name.starts_with('#') || name.starts_with('@') {
            return true;
        }
        let upper = name.to_ascii_uppercase();
        PSEUDO_TABLES.contains(&upper.as_str()) || self.scopes.iter().any(|scope| scope.contains(&upper))
    }
}

impl Rule for SchemaQualify {
    fn node_kinds(&self) -> &[NodeKind] {
        static KINDS: std::sync::OnceLock<Vec<NodeKind>> = std::sync::OnceLock::new();
        KINDS.get_or_init(|| {
            let mut kinds = NodeKind::STATEMENTS.to_vec();
            kinds.push(NodeKind::TableReference);
            kinds
        })
    }

    fn visit(&mut self, node: &SyntaxNode, emitter: &mut Emitter<'_>) -> RuleResult {
        if node.kind.is_statement() {
            self.scopes.push(Self::defined_names(node));
            return Ok(());
        }

        if let NodeDetail::TableReference { parts, .. } = &node.detail {
            let Some(table) = parts.last() else {
                return Ok(());
            };
            let has_schema = parts.len() >= 2 && !parts[parts.len() - 2].is_empty();
            if !has_schema && !self.is_exempt(table) {
                emitter.emit(node.start, format!("Object name not schema qualified: '{table}'"));
            }
        }
        Ok(())
    }

    fn leave(&mut self, node: &SyntaxNode, _emitter: &mut Emitter<'_>) -> RuleResult {
        if node.kind.is_statement() {
            self.scopes.pop();
        }
        Ok(())
    }
}
