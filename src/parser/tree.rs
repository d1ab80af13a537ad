//! Syntax tree produced by the parser
//!
//! Architecture: Composite - every node owns its children in document order
//! - Statements carry their terminator state and full display span
//! - Parts (keywords, table references, data types) are leaves or small subtrees
//! - Rules read nodes through `NodeKind` and the typed `NodeDetail` payload

use crate::domain::violations::Position;
use serde::Serialize;

/// Kind of a syntax node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKind {
    Script,

    Select,
    Insert,
    Update,
    Delete,
    Merge,
    SetOption,
    SetIsolationLevel,
    SetVariable,
    Declare,
    DeclareCursor,
    OpenCursor,
    FetchCursor,
    CloseCursor,
    DeallocateCursor,
    Print,
    If,
    While,
    BeginEnd,
    TryCatch,
    Transaction,
    CreateTable,
    CreateIndex,
    CreateRoutine,
    Alter,
    Drop,
    Truncate,
    Execute,
    Return,
    Break,
    Continue,
    Goto,
    Label,
    Use,
    Throw,
    Raiserror,
    BatchSeparator,
    Other,

    ElseClause,
    CommonTableExpression,
    Keyword,
    SelectStar,
    TableReference,
    FunctionCall,
    DataType,
    TableOption,
}

impl NodeKind {
    /// Every statement kind, in declaration order
    pub const STATEMENTS: &'static [NodeKind] = &[
        NodeKind::Select,
        NodeKind::Insert,
        NodeKind::Update,
        NodeKind::Delete,
        NodeKind::Merge,
        NodeKind::SetOption,
        NodeKind::SetIsolationLevel,
        NodeKind::SetVariable,
        NodeKind::Declare,
        NodeKind::DeclareCursor,
        NodeKind::OpenCursor,
        NodeKind::FetchCursor,
        NodeKind::CloseCursor,
        NodeKind::DeallocateCursor,
        NodeKind::Print,
        NodeKind::If,
        NodeKind::While,
        NodeKind::BeginEnd,
        NodeKind::TryCatch,
        NodeKind::Transaction,
        NodeKind::CreateTable,
        NodeKind::CreateIndex,
        NodeKind::CreateRoutine,
        NodeKind::Alter,
        NodeKind::Drop,
        NodeKind::Truncate,
        NodeKind::Execute,
        NodeKind::Return,
        NodeKind::Break,
        NodeKind::Continue,
        NodeKind::Goto,
        NodeKind::Label,
        NodeKind::Use,
        NodeKind::Throw,
        NodeKind::Raiserror,
        NodeKind::BatchSeparator,
        NodeKind::Other,
    ];

    pub fn is_statement(self) -> bool {
        Self::STATEMENTS.contains(&self)
    }

    /// Statements that only group or route other statements
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::If
                | NodeKind::While
                | NodeKind::BeginEnd
                | NodeKind::TryCatch
                | NodeKind::CreateRoutine
                | NodeKind::Label
                | NodeKind::BatchSeparator
        )
    }

    /// Statements that return or modify rows
    pub fn is_rowset_action(self) -> bool {
        matches!(
            self,
            NodeKind::Select | NodeKind::Insert | NodeKind::Update | NodeKind::Delete | NodeKind::Merge
        )
    }
}

/// Declared length of a character or binary data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeLength {
    Max,
    Value(u64),
}

/// Kind-specific payload of a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum NodeDetail {
    #[default]
    None,
    /// `SET` of one or more session options, with the upper-cased value (`ON`, `OFF`, `10`)
    SetOption { options: Vec<String>, value: String },
    /// Object created, altered or dropped by a DDL statement
    Object { parts: Vec<String> },
    /// Table named in a data statement; empty parts stand for omitted qualifiers
    TableReference { parts: Vec<String>, alias: Option<String> },
    FunctionCall { name: String },
    DataType {
        name: String,
        length: Option<TypeLength>,
        length_position: Option<Position>,
    },
    TableOption {
        name: String,
        value: String,
        value_position: Position,
    },
    CommonTableExpression { name: String },
}

/// One node of the syntax tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Position of the first token
    pub start: Position,
    /// Display position just after the last token (before any `;`)
    pub end: Position,
    /// Leading token text as written
    pub text: String,
    /// Whether a statement was followed by `;`
    pub terminated: bool,
    pub detail: NodeDetail,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, start: Position, end: Position, text: impl Into<String>) -> Self {
        Self {
            kind,
            start,
            end,
            text: text.into(),
            terminated: false,
            detail: NodeDetail::None,
            children: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: NodeDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind == kind
    }

    /// Direct children that are statements
    pub fn statements(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter(|c| c.kind.is_statement())
    }

    /// All nodes below this one, in document order
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

/// Pre-order iterator over a subtree
pub struct Descendants<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A parsed script
#[derive(Debug, Clone, Serialize)]
pub struct Script {
    pub root: SyntaxNode,
}

impl Script {
    pub fn new(statements: Vec<SyntaxNode>) -> Self {
        let end = statements.last().map(|s| s.end).unwrap_or(Position::START);
        Self {
            root: SyntaxNode::new(NodeKind::Script, Position::START, end, "").with_children(statements),
        }
    }

    pub fn statements(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.root.statements()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: NodeKind, column: u32) -> SyntaxNode {
        SyntaxNode::new(kind, Position::new(1, column), Position::new(1, column + 1), "x")
    }

    #[test]
    fn test_descendants_in_document_order() {
        let inner = leaf(NodeKind::Select, 3).with_children(vec![leaf(NodeKind::Keyword, 3)]);
        let root = leaf(NodeKind::BeginEnd, 1)
            .with_children(vec![leaf(NodeKind::Keyword, 1), inner, leaf(NodeKind::Keyword, 9)]);

        let columns: Vec<_> = root.descendants().map(|n| (n.kind, n.start.column)).collect();
        assert_eq!(
            columns,
            vec![
                (NodeKind::Keyword, 1),
                (NodeKind::Select, 3),
                (NodeKind::Keyword, 3),
                (NodeKind::Keyword, 9),
            ]
        );
    }

    #[test]
    fn test_statement_classification() {
        assert!(NodeKind::Select.is_statement());
        assert!(!NodeKind::Keyword.is_statement());
        assert!(NodeKind::BeginEnd.is_container());
        assert!(!NodeKind::Print.is_container());
        assert!(NodeKind::Merge.is_rowset_action());
    }
}
