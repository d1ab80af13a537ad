//! T-SQL parsing for TSQL Guardian
//!
//! CDD Principle: Anti-Corruption Layer - Script text is turned into a typed tree before any rule sees it
//! - The engine depends only on the `ScriptParser` contract
//! - `SqlParser` is the built-in implementation: a tab-aware lexer plus a statement grammar
//! - Parse failures carry the position the script was rejected at

pub mod grammar;
pub mod lexer;
pub mod tree;

pub use tree::{NodeDetail, NodeKind, Script, SyntaxNode, TypeLength};

use crate::domain::violations::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default display width of a horizontal tab
pub const DEFAULT_TAB_WIDTH: u32 = 4;

/// A script rejected by the parser
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {position}")]
pub struct ParseError {
    pub position: Position,
    pub message: String,
}

impl ParseError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// SQL Server database compatibility level selecting the grammar dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompatibilityLevel(pub u16);

impl CompatibilityLevel {
    pub const SUPPORTED: &'static [u16] = &[80, 90, 100, 110, 120, 130, 140, 150, 160];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self.0)
    }

    /// Whether `THROW` is part of the dialect
    pub fn supports_throw(self) -> bool {
        self.0 >= 110
    }

    /// Whether `DROP ... IF EXISTS` is part of the dialect
    pub fn supports_drop_if_exists(self) -> bool {
        self.0 >= 130
    }
}

impl Default for CompatibilityLevel {
    fn default() -> Self {
        Self(120)
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parser contract used by the analyzer
pub trait ScriptParser: Send + Sync {
    fn parse(&self, text: &str, level: CompatibilityLevel) -> Result<Script, ParseError>;
}

/// Built-in T-SQL parser
#[derive(Debug, Clone)]
pub struct SqlParser {
    tab_width: u32,
}

impl SqlParser {
    pub fn new(tab_width: u32) -> Self {
        Self {
            tab_width: tab_width.max(1),
        }
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new(DEFAULT_TAB_WIDTH)
    }
}

impl ScriptParser for SqlParser {
    fn parse(&self, text: &str, level: CompatibilityLevel) -> Result<Script, ParseError> {
        let tokens = lexer::Lexer::new(text, self.tab_width).tokenize()?;
        grammar::Grammar::new(tokens, level).parse_script()
    }
}
