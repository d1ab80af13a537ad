//! Statement grammar for T-SQL
//!
//! Statements are recognised by their leading keyword and extend until a `;`, a batch
//! separator or the next statement-starting keyword at parenthesis depth zero. Inside a
//! statement the grammar only builds the parts rules look at: keywords, select stars,
//! table references, function calls, data types and table options.

use crate::domain::violations::Position;
use crate::parser::lexer::{Token, TokenKind};
use crate::parser::tree::{NodeDetail, NodeKind, Script, SyntaxNode, TypeLength};
use crate::parser::{CompatibilityLevel, ParseError};

/// Reserved words reported as keyword leaves
const KEYWORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "AUTHORIZATION", "BACKUP", "BEGIN",
    "BETWEEN", "BREAK", "BROWSE", "BULK", "BY", "CASCADE", "CASE", "CATCH", "CHECK",
    "CHECKPOINT", "CLOSE", "CLUSTERED", "COALESCE", "COLLATE", "COLUMN", "COMMIT", "COMPUTE",
    "CONSTRAINT", "CONTAINS", "CONTAINSTABLE", "CONTINUE", "CONVERT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR",
    "DATABASE", "DBCC", "DEALLOCATE", "DECLARE", "DEFAULT", "DELETE", "DENY", "DESC",
    "DISTINCT", "DISTRIBUTED", "DOUBLE", "DROP", "ELSE", "END", "ERRLVL", "ESCAPE", "EXCEPT",
    "EXEC", "EXECUTE", "EXISTS", "EXIT", "EXTERNAL", "FETCH", "FILE", "FILLFACTOR", "FOR",
    "FOREIGN", "FREETEXT", "FREETEXTTABLE", "FROM", "FULL", "FUNCTION", "GOTO", "GRANT",
    "GROUP", "HAVING", "HOLDLOCK", "IDENTITY", "IDENTITY_INSERT", "IDENTITYCOL", "IF", "IN",
    "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "KEY", "KILL", "LEFT",
    "LIKE", "LINENO", "LOAD", "MERGE", "NATIONAL", "NOCHECK", "NONCLUSTERED", "NOT", "NULL",
    "NULLIF", "OF", "OFF", "OFFSETS", "ON", "OPEN", "OPENDATASOURCE", "OPENQUERY",
    "OPENROWSET", "OPENXML", "OPTION", "OR", "ORDER", "OUTER", "OVER", "PERCENT", "PIVOT",
    "PLAN", "PRECISION", "PRIMARY", "PRINT", "PROC", "PROCEDURE", "PUBLIC", "RAISERROR",
    "READ", "READTEXT", "RECONFIGURE", "REFERENCES", "REPLICATION", "RESTORE", "RESTRICT",
    "RETURN", "REVERT", "REVOKE", "RIGHT", "ROLLBACK", "ROWCOUNT", "ROWGUIDCOL", "RULE",
    "SAVE", "SCHEMA", "SELECT", "SESSION_USER", "SET", "SETUSER", "SHUTDOWN", "SOME",
    "STATISTICS", "SYSTEM_USER", "TABLE", "TABLESAMPLE", "TEXTSIZE", "THEN", "TO", "TOP",
    "TRAN", "TRANSACTION", "TRIGGER", "TRUNCATE", "TRY", "TRY_CONVERT", "TSEQUAL", "UNION",
    "UNIQUE", "UNPIVOT", "UPDATE", "UPDATETEXT", "USE", "USER", "VALUES", "VARYING", "VIEW",
    "WAITFOR", "WHEN", "WHERE", "WHILE", "WITH", "WRITETEXT",
];

/// Reserved words that are also called like functions
const KEYWORD_FUNCTIONS: &[&str] = &[
    "COALESCE", "CONTAINS", "CONTAINSTABLE", "CONVERT", "FREETEXT", "FREETEXTTABLE",
    "IDENTITY", "LEFT", "NULLIF", "OPENDATASOURCE", "OPENQUERY", "OPENROWSET", "OPENXML",
    "RIGHT", "TRY_CONVERT", "USER",
];

/// Words that begin a new statement when met at depth zero
const STATEMENT_STARTERS: &[&str] = &[
    "ALTER", "BACKUP", "BEGIN", "BREAK", "BULK", "CHECKPOINT", "CLOSE", "COMMIT", "CONTINUE",
    "CREATE", "DBCC", "DEALLOCATE", "DECLARE", "DELETE", "DENY", "DROP", "ELSE", "END", "EXEC",
    "EXECUTE", "FETCH", "GO", "GOTO", "GRANT", "IF", "INSERT", "KILL", "MERGE", "OPEN",
    "PRINT", "RAISERROR", "RECONFIGURE", "RESTORE", "RETURN", "REVOKE", "ROLLBACK", "SAVE",
    "SELECT", "SET", "THROW", "TRUNCATE", "UPDATE", "USE", "WAITFOR", "WHILE", "WITH",
];

/// Statement words without a dedicated node kind
const OTHER_STATEMENTS: &[&str] = &[
    "BACKUP", "BULK", "CHECKPOINT", "DBCC", "DENY", "GRANT", "KILL", "RECONFIGURE", "RESTORE",
    "REVOKE", "WAITFOR",
];

/// Words that close the select list or FROM list open at the same depth
const CLAUSE_WORDS: &[&str] = &[
    "EXCEPT", "FOR", "FROM", "GROUP", "HAVING", "INTERSECT", "INTO", "OPTION", "ORDER",
    "UNION", "WHERE", "WINDOW",
];

/// Words followed by a table reference
const TABLE_WORDS: &[&str] = &["APPLY", "FROM", "INTO", "JOIN", "USING"];

/// Words followed by the name of an object being defined or dropped
const OBJECT_WORDS: &[&str] = &[
    "FUNCTION", "INDEX", "ON", "PROC", "PROCEDURE", "REFERENCES", "TABLE", "TRIGGER", "VIEW",
];

/// Non-reserved words that never act as a table alias
const NOT_ALIASES: &[&str] = &[
    "CATCH", "GO", "HASH", "LOOP", "MATCHED", "OUTPUT", "REMOTE", "RETURNS", "THROW", "TRY",
];

const DATA_TYPES: &[&str] = &[
    "BIGINT", "BINARY", "BIT", "CHAR", "DATE", "DATETIME", "DATETIME2", "DATETIMEOFFSET",
    "DECIMAL", "FLOAT", "GEOGRAPHY", "GEOMETRY", "HIERARCHYID", "IMAGE", "INT", "INTEGER",
    "MONEY", "NCHAR", "NTEXT", "NUMERIC", "NVARCHAR", "REAL", "ROWVERSION", "SMALLDATETIME",
    "SMALLINT", "SMALLMONEY", "SQL_VARIANT", "SYSNAME", "TEXT", "TIME", "TIMESTAMP",
    "TINYINT", "UNIQUEIDENTIFIER", "VARBINARY", "VARCHAR", "XML",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn contains(list: &[&str], word: &str) -> bool {
    list.contains(&word)
}

/// Token that can name a table, alias or object
fn is_name_token(token: &Token) -> bool {
    match token.kind {
        TokenKind::QuotedIdentifier | TokenKind::TempName | TokenKind::Variable => true,
        TokenKind::Word => !is_keyword(&token.text) && !contains(NOT_ALIASES, &token.upper()),
        _ => false,
    }
}

/// Token that can appear after a `.` in a multi-part name
fn is_part_token(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Word | TokenKind::QuotedIdentifier)
}

fn leaf(token: &Token, kind: NodeKind) -> SyntaxNode {
    SyntaxNode::new(kind, token.start, token.end, token.text.clone())
}

fn keyword_leaf(token: &Token) -> SyntaxNode {
    leaf(token, NodeKind::Keyword)
}

impl NodeKind {
    fn allows_table_references(self) -> bool {
        matches!(
            self,
            NodeKind::Select
                | NodeKind::Insert
                | NodeKind::Update
                | NodeKind::Delete
                | NodeKind::Merge
                | NodeKind::DeclareCursor
                | NodeKind::SetVariable
                | NodeKind::Declare
                | NodeKind::If
                | NodeKind::While
                | NodeKind::Return
                | NodeKind::Print
                | NodeKind::Execute
        )
    }

    fn defines_objects(self) -> bool {
        matches!(
            self,
            NodeKind::CreateTable
                | NodeKind::CreateIndex
                | NodeKind::CreateRoutine
                | NodeKind::Alter
                | NodeKind::Drop
                | NodeKind::Truncate
        )
    }

    fn declares_columns(self) -> bool {
        matches!(
            self,
            NodeKind::CreateTable | NodeKind::Declare | NodeKind::Alter | NodeKind::CreateRoutine
        )
    }

    fn allows_table_options(self) -> bool {
        matches!(self, NodeKind::CreateTable | NodeKind::CreateIndex | NodeKind::Alter)
    }
}

struct SelectList {
    depth: u32,
    expect_item: bool,
}

/// Scanning state of one statement
struct StatementState {
    kind: NodeKind,
    first_index: usize,
    depth: u32,
    case_depth: u32,
    open_parens: Vec<Position>,
    inner_select: bool,
    values_seen: bool,
    exec_seen: bool,
    set_seen: bool,
    table_ref_pending: bool,
    cast_pending: bool,
    convert_pending: bool,
    select_lists: Vec<SelectList>,
    from_depths: Vec<u32>,
    cast_depths: Vec<u32>,
    option_depth: Option<u32>,
    object: Option<Vec<String>>,
}

impl StatementState {
    fn new(kind: NodeKind, first_index: usize) -> Self {
        Self {
            kind,
            first_index,
            depth: 0,
            case_depth: 0,
            open_parens: Vec::new(),
            inner_select: false,
            values_seen: false,
            exec_seen: false,
            set_seen: false,
            table_ref_pending: false,
            cast_pending: false,
            convert_pending: false,
            select_lists: Vec::new(),
            from_depths: Vec::new(),
            cast_depths: Vec::new(),
            option_depth: None,
            object: None,
        }
    }

    fn expecting_item(&self) -> bool {
        self.select_lists
            .last()
            .is_some_and(|list| list.depth == self.depth && list.expect_item)
    }

    fn item_consumed(&mut self) {
        if let Some(list) = self.select_lists.last_mut() {
            if list.depth == self.depth {
                list.expect_item = false;
            }
        }
    }

    fn open_select_list(&mut self) {
        let depth = self.depth;
        self.select_lists.retain(|list| list.depth < depth);
        self.select_lists.push(SelectList {
            depth,
            expect_item: true,
        });
    }

    fn open_from_list(&mut self) {
        let depth = self.depth;
        self.from_depths.retain(|d| *d < depth);
        self.from_depths.push(depth);
    }

    fn close_clause(&mut self) {
        let depth = self.depth;
        self.select_lists.retain(|list| list.depth < depth);
        self.from_depths.retain(|d| *d < depth);
        self.table_ref_pending = false;
    }

    fn close_scopes(&mut self) {
        let depth = self.depth;
        self.select_lists.retain(|list| list.depth <= depth);
        self.from_depths.retain(|d| *d <= depth);
        self.cast_depths.retain(|d| *d <= depth);
        if self.option_depth.is_some_and(|d| d > depth) {
            self.option_depth = None;
        }
    }
}

/// Recursive-descent statement parser over a token stream
pub struct Grammar {
    tokens: Vec<Token>,
    pos: usize,
    level: CompatibilityLevel,
}

impl Grammar {
    pub fn new(tokens: Vec<Token>, level: CompatibilityLevel) -> Self {
        Self {
            tokens,
            pos: 0,
            level,
        }
    }

    /// Parse every statement of the script
    pub fn parse_script(mut self) -> Result<Script, ParseError> {
        let mut statements = Vec::new();
        let mut batch_start = true;

        loop {
            self.skip_empty_statements();
            if self.current().is_none() {
                break;
            }
            let statement = self.parse_statement(batch_start)?;
            batch_start = statement.kind == NodeKind::BatchSeparator;
            statements.push(statement);
        }

        Ok(Script::new(statements))
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn current_is_word(&self, word: &str) -> bool {
        self.current().is_some_and(|t| t.is_word(word))
    }

    fn current_is_symbol(&self, symbol: &str) -> bool {
        self.current().is_some_and(|t| t.is_symbol(symbol))
    }

    fn eof_position(&self) -> Position {
        self.tokens.last().map(|t| t.end).unwrap_or(Position::START)
    }

    /// Token `distance` places before `index`, bounded by the statement start
    fn token_before(&self, index: usize, state: &StatementState, distance: usize) -> Option<&Token> {
        if index >= state.first_index + distance {
            self.tokens.get(index - distance)
        } else {
            None
        }
    }

    fn skip_empty_statements(&mut self) {
        while self.current_is_symbol(";") {
            self.pos += 1;
        }
    }

    fn consume_terminator(&mut self) -> bool {
        if self.current_is_symbol(";") {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_statement(&mut self, batch_start: bool) -> Result<SyntaxNode, ParseError> {
        let token = match self.current() {
            Some(token) => token.clone(),
            None => return Err(ParseError::new(self.eof_position(), "expected a statement")),
        };

        if token.kind == TokenKind::Symbol {
            if token.is_symbol("(") && self.peek(1).is_some_and(|t| t.is_word("SELECT")) {
                return self.parse_simple(NodeKind::Select);
            }
            return Err(ParseError::new(token.start, format!("unexpected '{}'", token.text)));
        }

        if token.kind != TokenKind::Word {
            return Err(ParseError::new(token.start, format!("unexpected '{}'", token.text)));
        }

        let word = token.upper();
        if !is_keyword(&word) && self.peek(1).is_some_and(|t| t.is_symbol(":")) {
            let colon = self.peek(1).map(|t| t.end).unwrap_or(token.end);
            self.pos += 2;
            return Ok(SyntaxNode::new(NodeKind::Label, token.start, colon, token.text));
        }

        match word.as_str() {
            "SELECT" => self.parse_simple(NodeKind::Select),
            "INSERT" => self.parse_simple(NodeKind::Insert),
            "UPDATE" => self.parse_simple(NodeKind::Update),
            "DELETE" => self.parse_simple(NodeKind::Delete),
            "MERGE" => self.parse_simple(NodeKind::Merge),
            "WITH" => self.parse_with(),
            "SET" => self.parse_set(),
            "DECLARE" => {
                if self.is_cursor_declaration() {
                    self.parse_simple(NodeKind::DeclareCursor)
                } else {
                    self.parse_simple(NodeKind::Declare)
                }
            }
            "OPEN" => self.parse_simple(NodeKind::OpenCursor),
            "FETCH" => self.parse_simple(NodeKind::FetchCursor),
            "CLOSE" => self.parse_simple(NodeKind::CloseCursor),
            "DEALLOCATE" => self.parse_simple(NodeKind::DeallocateCursor),
            "PRINT" => self.parse_simple(NodeKind::Print),
            "IF" => self.parse_conditional(NodeKind::If),
            "WHILE" => self.parse_conditional(NodeKind::While),
            "ELSE" => Err(ParseError::new(token.start, "ELSE without a matching IF")),
            "END" => Err(ParseError::new(token.start, "END without a matching BEGIN")),
            "BEGIN" => {
                let next = self.peek(1).map(|t| t.upper()).unwrap_or_default();
                match next.as_str() {
                    "TRY" => self.parse_try_catch(),
                    "TRAN" | "TRANSACTION" | "DISTRIBUTED" => self.parse_simple(NodeKind::Transaction),
                    "DIALOG" | "CONVERSATION" => self.parse_simple(NodeKind::Other),
                    _ => self.parse_block(),
                }
            }
            "COMMIT" | "ROLLBACK" | "SAVE" => self.parse_simple(NodeKind::Transaction),
            "CREATE" | "ALTER" => self.parse_definition(),
            "DROP" => self.parse_simple(NodeKind::Drop),
            "TRUNCATE" => self.parse_simple(NodeKind::Truncate),
            "EXEC" | "EXECUTE" => self.parse_simple(NodeKind::Execute),
            "RETURN" => self.parse_simple(NodeKind::Return),
            "BREAK" => self.parse_simple(NodeKind::Break),
            "CONTINUE" => self.parse_simple(NodeKind::Continue),
            "GOTO" => self.parse_simple(NodeKind::Goto),
            "USE" => self.parse_simple(NodeKind::Use),
            "THROW" => {
                if !self.level.supports_throw() {
                    return Err(ParseError::new(
                        token.start,
                        format!("THROW is not supported at compatibility level {}", self.level),
                    ));
                }
                self.parse_simple(NodeKind::Throw)
            }
            "RAISERROR" => self.parse_simple(NodeKind::Raiserror),
            "GO" => Ok(self.parse_batch_separator()),
            w if contains(OTHER_STATEMENTS, w) => self.parse_simple(NodeKind::Other),
            // A bare procedure name is an implicit EXECUTE when it opens a batch
            _ if batch_start && !is_keyword(&word) => self.parse_simple(NodeKind::Execute),
            _ => Err(ParseError::new(token.start, format!("unexpected '{}'", token.text))),
        }
    }

    fn is_cursor_declaration(&self) -> bool {
        let named = self
            .peek(1)
            .is_some_and(|t| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdentifier));
        let cursor = self.peek(2).is_some_and(|t| {
            t.is_word("CURSOR") || t.is_word("INSENSITIVE") || t.is_word("SCROLL")
        });
        named && cursor
    }

    fn starts_common_table_expression(&self) -> bool {
        let named = self.peek(1).is_some_and(is_name_token);
        let follows = self
            .peek(2)
            .is_some_and(|t| t.is_word("AS") || t.is_symbol("("));
        named && follows
    }

    fn parse_simple(&mut self, kind: NodeKind) -> Result<SyntaxNode, ParseError> {
        let token = match self.current() {
            Some(token) => token.clone(),
            None => return Err(ParseError::new(self.eof_position(), "expected a statement")),
        };
        self.parse_simple_from(kind, token.start, token.text, Vec::new())
    }

    /// Scan a statement from the current token, after any already-parsed prefix nodes
    fn parse_simple_from(
        &mut self,
        kind: NodeKind,
        start: Position,
        text: String,
        mut children: Vec<SyntaxNode>,
    ) -> Result<SyntaxNode, ParseError> {
        let first_index = self.pos;
        let mut state = StatementState::new(kind, first_index);
        let mut end = children.last().map(|c| c.end).unwrap_or(start);
        let mut terminated = false;

        while let Some(token) = self.current() {
            if state.depth == 0 {
                if token.is_symbol(";") {
                    self.pos += 1;
                    terminated = true;
                    break;
                }
                if self.pos != first_index
                    && state.case_depth == 0
                    && self.ends_statement(token, &state)
                {
                    break;
                }
            }
            end = self.annotate(&mut state, &mut children)?;
        }

        if let Some(open) = state.open_parens.last() {
            return Err(ParseError::new(*open, "missing closing parenthesis"));
        }

        let mut node = SyntaxNode::new(kind, start, end, text).with_children(children);
        node.terminated = terminated;
        if let Some(parts) = state.object {
            node.detail = NodeDetail::Object { parts };
        }
        Ok(node)
    }

    fn ends_statement(&self, token: &Token, state: &StatementState) -> bool {
        if token.kind != TokenKind::Word {
            return false;
        }
        let word = token.upper();
        if word == "GO" {
            return true;
        }
        if !contains(STATEMENT_STARTERS, &word) {
            return false;
        }

        let previous = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i));
        if previous.is_some_and(|p| p.is_symbol(",")) {
            return false;
        }
        let prev = previous
            .filter(|p| p.kind == TokenKind::Word)
            .map(|p| p.upper())
            .unwrap_or_default();
        let prev = prev.as_str();
        if matches!(prev, "GRANT" | "REVOKE" | "DENY") {
            return false;
        }

        let open_insert_source = state.kind == NodeKind::Insert
            && !state.inner_select
            && !state.values_seen
            && !state.exec_seen;

        match word.as_str() {
            "SELECT" => {
                let continues = matches!(prev, "UNION" | "ALL" | "EXCEPT" | "INTERSECT" | "RETURN")
                    || open_insert_source
                    || (state.kind == NodeKind::DeclareCursor && prev == "FOR");
                !continues
            }
            "INSERT" | "UPDATE" | "DELETE" => !matches!(prev, "THEN" | "ON" | "FOR" | "AFTER" | "OF"),
            "SET" => {
                let continues = matches!(prev, "UPDATE" | "DELETE")
                    || (state.kind == NodeKind::Update && !state.set_seen)
                    || state.kind == NodeKind::Alter;
                !continues
            }
            "EXEC" | "EXECUTE" => !open_insert_source,
            "WITH" => self.starts_common_table_expression(),
            "IF" => state.kind != NodeKind::Drop,
            "FETCH" => !matches!(prev, "ROWS" | "ROW"),
            _ => true,
        }
    }

    /// Consume one or more tokens of a statement, building part nodes; returns the end of the last one
    fn annotate(
        &mut self,
        state: &mut StatementState,
        children: &mut Vec<SyntaxNode>,
    ) -> Result<Position, ParseError> {
        let index = self.pos;
        let token = self.advance();

        match token.kind {
            TokenKind::Symbol => self.annotate_symbol(token, index, state, children),
            TokenKind::Word => self.annotate_word(token, index, state, children),
            TokenKind::QuotedIdentifier | TokenKind::TempName | TokenKind::Variable => {
                self.annotate_name(token, state, children)
            }
            TokenKind::Number | TokenKind::String => {
                state.item_consumed();
                state.table_ref_pending = false;
                Ok(token.end)
            }
        }
    }

    fn annotate_symbol(
        &mut self,
        token: Token,
        index: usize,
        state: &mut StatementState,
        children: &mut Vec<SyntaxNode>,
    ) -> Result<Position, ParseError> {
        match token.text.as_str() {
            "(" => {
                state.item_consumed();
                state.table_ref_pending = false;
                let opens_options = state.kind.allows_table_options()
                    && self
                        .token_before(index, state, 1)
                        .is_some_and(|t| t.is_word("WITH"));

                state.depth += 1;
                state.open_parens.push(token.start);

                if opens_options {
                    state.option_depth = Some(state.depth);
                }
                if state.cast_pending {
                    state.cast_pending = false;
                    state.cast_depths.push(state.depth);
                }
                if state.convert_pending {
                    state.convert_pending = false;
                    let type_name = self.current().filter(|t| {
                        t.kind == TokenKind::Word && contains(DATA_TYPES, &t.upper())
                    });
                    if type_name.is_some() {
                        let type_token = self.advance();
                        self.parse_data_type(type_token, children)?;
                    }
                }
            }
            ")" => {
                if state.depth == 0 {
                    return Err(ParseError::new(token.start, "unexpected ')' without matching '('"));
                }
                state.depth -= 1;
                state.open_parens.pop();
                state.close_scopes();
                state.item_consumed();
            }
            "," => {
                if let Some(list) = state.select_lists.last_mut() {
                    if list.depth == state.depth {
                        list.expect_item = true;
                    }
                }
                if state.from_depths.last() == Some(&state.depth) {
                    state.table_ref_pending = true;
                }
            }
            "*" => {
                if state.expecting_item() {
                    children.push(leaf(&token, NodeKind::SelectStar));
                }
                state.item_consumed();
            }
            _ => state.item_consumed(),
        }

        Ok(token.end)
    }

    fn annotate_word(
        &mut self,
        token: Token,
        index: usize,
        state: &mut StatementState,
        children: &mut Vec<SyntaxNode>,
    ) -> Result<Position, ParseError> {
        let word = token.upper();
        let keyword = is_keyword(&word);

        if word == "CASE" {
            state.case_depth += 1;
        } else if word == "END" && state.case_depth > 0 {
            state.case_depth -= 1;
        }

        if index != state.first_index {
            match word.as_str() {
                "SELECT" => state.inner_select = true,
                "VALUES" => state.values_seen = true,
                "EXEC" | "EXECUTE" => state.exec_seen = true,
                "SET" => state.set_seen = true,
                _ => {}
            }
        }

        if word == "IF" && state.kind == NodeKind::Drop && !self.level.supports_drop_if_exists() {
            return Err(ParseError::new(
                token.start,
                format!("DROP ... IF EXISTS is not supported at compatibility level {}", self.level),
            ));
        }

        if state.table_ref_pending {
            state.table_ref_pending = false;
            if is_name_token(&token) {
                return self.parse_table_reference(token, true, state, children);
            }
        }

        if state.expecting_item() {
            if word == "DISTINCT" || word == "ALL" {
                children.push(keyword_leaf(&token));
                return Ok(token.end);
            }
            if word == "TOP" {
                return self.parse_top(token, children);
            }
            if let Some(end) = self.try_qualified_star(&token, children) {
                state.item_consumed();
                return Ok(end);
            }
        }

        if word == "SELECT" {
            state.open_select_list();
            children.push(keyword_leaf(&token));
            return Ok(token.end);
        }

        state.item_consumed();

        if contains(CLAUSE_WORDS, &word) {
            state.close_clause();
            if word == "FROM" {
                state.open_from_list();
            }
        }

        if contains(DATA_TYPES, &word) && self.is_type_context(index, state) {
            return self.parse_data_type(token, children);
        }

        if state.option_depth == Some(state.depth) && self.current_is_symbol("=") {
            return self.parse_table_option(token, children);
        }

        if state.kind.defines_objects()
            && contains(OBJECT_WORDS, &word)
            && self.current().is_some_and(is_name_token)
        {
            children.push(keyword_leaf(&token));
            let (parts, end) = self.parse_name_chain();
            if word != "ON" && word != "REFERENCES" && state.object.is_none() {
                state.object = Some(parts);
            }
            return Ok(end);
        }

        if state.kind.allows_table_references() && self.starts_table_reference(&word, index, state) {
            children.push(keyword_leaf(&token));
            if self.current().is_some_and(is_name_token) {
                // Only row sources can be table-valued functions; INTO and DML targets take column lists
                let allow_function = word != "INTO" && contains(TABLE_WORDS, &word);
                let name = self.advance();
                return self.parse_table_reference(name, allow_function, state, children);
            }
            return Ok(token.end);
        }

        if let Some(end) = self.try_function_call(&token, keyword, state, children) {
            return Ok(end);
        }

        if keyword {
            children.push(keyword_leaf(&token));
        }
        Ok(token.end)
    }

    fn annotate_name(
        &mut self,
        token: Token,
        state: &mut StatementState,
        children: &mut Vec<SyntaxNode>,
    ) -> Result<Position, ParseError> {
        if state.table_ref_pending {
            state.table_ref_pending = false;
            return self.parse_table_reference(token, true, state, children);
        }

        if state.expecting_item() {
            if let Some(end) = self.try_qualified_star(&token, children) {
                state.item_consumed();
                return Ok(end);
            }
        }
        state.item_consumed();

        if token.kind == TokenKind::QuotedIdentifier {
            if let Some(end) = self.try_function_call(&token, false, state, children) {
                return Ok(end);
            }
        }
        Ok(token.end)
    }

    fn starts_table_reference(&self, word: &str, index: usize, state: &StatementState) -> bool {
        if contains(TABLE_WORDS, word) {
            return true;
        }
        index == state.first_index && matches!(word, "UPDATE" | "INSERT" | "DELETE" | "MERGE")
    }

    fn is_type_context(&self, index: usize, state: &StatementState) -> bool {
        let prev = self.token_before(index, state, 1);
        let prev2 = self.token_before(index, state, 2);

        match prev {
            Some(p) if p.kind == TokenKind::Variable => true,
            Some(p) if p.is_word("RETURNS") => true,
            Some(p) if p.is_word("AS") => {
                prev2.is_some_and(|t| t.kind == TokenKind::Variable)
                    || state.cast_depths.last() == Some(&state.depth)
            }
            Some(p) if state.kind.declares_columns() && is_name_token(p) => prev2.is_some_and(|t| {
                t.is_symbol("(") || t.is_symbol(",") || t.is_word("ADD") || t.is_word("COLUMN")
            }),
            _ => false,
        }
    }

    /// `alias.*` or `schema.table.*` in a select list
    fn try_qualified_star(&mut self, token: &Token, children: &mut Vec<SyntaxNode>) -> Option<Position> {
        let mut cursor = self.pos;
        let mut text = token.text.clone();

        loop {
            let dot = self.tokens.get(cursor)?;
            if !dot.is_symbol(".") {
                return None;
            }
            let next = self.tokens.get(cursor + 1)?;
            if next.is_symbol("*") {
                text.push_str(".*");
                let end = next.end;
                self.pos = cursor + 2;
                children.push(SyntaxNode::new(NodeKind::SelectStar, token.start, end, text));
                return Some(end);
            }
            if !is_part_token(next) {
                return None;
            }
            text.push('.');
            text.push_str(&next.text);
            cursor += 2;
        }
    }

    fn try_function_call(
        &mut self,
        token: &Token,
        keyword: bool,
        state: &mut StatementState,
        children: &mut Vec<SyntaxNode>,
    ) -> Option<Position> {
        let word = token.upper();
        if keyword && !contains(KEYWORD_FUNCTIONS, &word) {
            return None;
        }

        let mut cursor = self.pos;
        let mut name = token.identifier_text();
        let mut end = token.end;
        while self.tokens.get(cursor).is_some_and(|t| t.is_symbol(".")) {
            let part = self.tokens.get(cursor + 1).filter(|t| is_part_token(t))?;
            name.push('.');
            name.push_str(&part.identifier_text());
            end = part.end;
            cursor += 2;
        }
        if !self.tokens.get(cursor).is_some_and(|t| t.is_symbol("(")) {
            return None;
        }
        self.pos = cursor;

        match word.as_str() {
            "CAST" | "TRY_CAST" => state.cast_pending = true,
            "CONVERT" | "TRY_CONVERT" => state.convert_pending = true,
            _ => {}
        }

        let mut node = SyntaxNode::new(NodeKind::FunctionCall, token.start, end, token.text.clone())
            .with_detail(NodeDetail::FunctionCall { name });
        if keyword {
            node.children.push(keyword_leaf(token));
        }
        children.push(node);
        Some(end)
    }

    fn parse_top(&mut self, token: Token, children: &mut Vec<SyntaxNode>) -> Result<Position, ParseError> {
        children.push(keyword_leaf(&token));
        let mut end = token.end;

        if self.current_is_symbol("(") {
            end = self.skip_parenthesized()?;
        } else if self.current().is_some() {
            end = self.advance().end;
        }

        if self.current_is_word("PERCENT") {
            let percent = self.advance();
            end = percent.end;
            children.push(keyword_leaf(&percent));
        }
        if self.current_is_word("WITH") && self.peek(1).is_some_and(|t| t.is_word("TIES")) {
            children.push(keyword_leaf(&self.advance()));
            end = self.advance().end;
        }
        Ok(end)
    }

    /// Consume a balanced parenthesized group without building nodes
    fn skip_parenthesized(&mut self) -> Result<Position, ParseError> {
        let open = self.advance();
        let mut depth = 1u32;

        while let Some(token) = self.current() {
            let token = token.clone();
            self.pos += 1;
            if token.is_symbol("(") {
                depth += 1;
            } else if token.is_symbol(")") {
                depth -= 1;
                if depth == 0 {
                    return Ok(token.end);
                }
            }
        }

        Err(ParseError::new(open.start, "missing closing parenthesis"))
    }

    fn parse_data_type(&mut self, token: Token, children: &mut Vec<SyntaxNode>) -> Result<Position, ParseError> {
        let mut length = None;
        let mut length_position = None;
        let mut end = token.end;

        if self.current_is_symbol("(") {
            if let Some(argument) = self.peek(1) {
                if argument.kind == TokenKind::Number {
                    let value = argument.text.parse().map_err(|_| {
                        ParseError::new(argument.start, format!("invalid length '{}'", argument.text))
                    })?;
                    length = Some(TypeLength::Value(value));
                    length_position = Some(argument.start);
                } else if argument.is_word("MAX") {
                    length = Some(TypeLength::Max);
                    length_position = Some(argument.start);
                }
            }
            end = self.skip_parenthesized()?;
        }

        children.push(
            SyntaxNode::new(NodeKind::DataType, token.start, end, token.text.clone()).with_detail(
                NodeDetail::DataType {
                    name: token.upper(),
                    length,
                    length_position,
                },
            ),
        );
        Ok(end)
    }

    fn parse_table_option(&mut self, token: Token, children: &mut Vec<SyntaxNode>) -> Result<Position, ParseError> {
        self.advance();
        let value = match self.current() {
            Some(value) if !value.is_symbol(")") && !value.is_symbol(",") => self.advance(),
            _ => {
                return Err(ParseError::new(token.end, format!("expected a value for option {}", token.text)));
            }
        };

        let mut node = SyntaxNode::new(NodeKind::TableOption, token.start, value.end, token.text.clone())
            .with_detail(NodeDetail::TableOption {
                name: token.upper(),
                value: value.upper(),
                value_position: value.start,
            });
        if value.kind == TokenKind::Word && is_keyword(&value.text) {
            node.children.push(keyword_leaf(&value));
        }
        children.push(node);
        Ok(value.end)
    }

    /// Consume `a.b.c` starting at the current token, keeping empty parts for `a..c`
    fn parse_name_chain(&mut self) -> (Vec<String>, Position) {
        let first = self.advance();
        let mut parts = vec![first.identifier_text()];
        let mut end = first.end;

        while self.current_is_symbol(".") {
            end = self.advance().end;
            match self.current() {
                Some(part) if is_part_token(part) => {
                    let part = self.advance();
                    parts.push(part.identifier_text());
                    end = part.end;
                }
                _ => parts.push(String::new()),
            }
        }

        (parts, end)
    }

    fn parse_table_reference(
        &mut self,
        first: Token,
        allow_function: bool,
        state: &mut StatementState,
        children: &mut Vec<SyntaxNode>,
    ) -> Result<Position, ParseError> {
        self.pos -= 1;
        let (parts, name_end) = self.parse_name_chain();
        state.item_consumed();

        if allow_function && self.current_is_symbol("(") {
            let name = parts.join(".");
            children.push(
                SyntaxNode::new(NodeKind::FunctionCall, first.start, name_end, first.text.clone())
                    .with_detail(NodeDetail::FunctionCall { name }),
            );
            return Ok(name_end);
        }

        let mut end = name_end;
        let mut trailing = Vec::new();
        let mut alias = None;

        if self.current_is_word("AS") {
            let as_token = self.advance();
            end = as_token.end;
            trailing.push(keyword_leaf(&as_token));
            if self.current().is_some_and(|t| is_part_token(t) || t.kind == TokenKind::String) {
                let name = self.advance();
                alias = Some(name.identifier_text());
                end = name.end;
            }
        } else if let Some(candidate) = self.current() {
            let is_alias = match candidate.kind {
                TokenKind::QuotedIdentifier => true,
                TokenKind::Word => is_name_token(candidate),
                _ => false,
            };
            if is_alias {
                let name = self.advance();
                alias = Some(name.identifier_text());
                end = name.end;
            }
        }

        children.push(
            SyntaxNode::new(NodeKind::TableReference, first.start, name_end, first.text.clone())
                .with_detail(NodeDetail::TableReference { parts, alias }),
        );
        children.extend(trailing);
        Ok(end)
    }

    fn parse_conditional(&mut self, kind: NodeKind) -> Result<SyntaxNode, ParseError> {
        let keyword = self.advance();
        let mut children = vec![keyword_leaf(&keyword)];
        let mut state = StatementState::new(kind, self.pos);
        let missing_body = || {
            ParseError::new(keyword.start, format!("{} statement has no body", keyword.upper()))
        };

        loop {
            let token = self.current().ok_or_else(missing_body)?;
            if state.depth == 0 {
                if token.is_symbol(";") {
                    return Err(missing_body());
                }
                let starts_body = state.case_depth == 0
                    && token.kind == TokenKind::Word
                    && contains(STATEMENT_STARTERS, &token.upper());
                if starts_body {
                    break;
                }
            }
            self.annotate(&mut state, &mut children)?;
        }

        if self
            .current()
            .is_some_and(|t| t.is_word("END") || t.is_word("ELSE") || t.is_word("GO"))
        {
            return Err(missing_body());
        }

        let body = self.parse_statement(false)?;
        let mut end = body.end;
        children.push(body);

        if kind == NodeKind::If && self.current_is_word("ELSE") {
            let else_token = self.advance();
            if self.current().is_none() || self.current_is_word("END") || self.current_is_word("GO") {
                return Err(ParseError::new(else_token.start, "ELSE has no body"));
            }
            let else_body = self.parse_statement(false)?;
            end = else_body.end;
            children.push(
                SyntaxNode::new(NodeKind::ElseClause, else_token.start, else_body.end, else_token.text.clone())
                    .with_children(vec![keyword_leaf(&else_token), else_body]),
            );
        }

        Ok(SyntaxNode::new(kind, keyword.start, end, keyword.text).with_children(children))
    }

    fn parse_block(&mut self) -> Result<SyntaxNode, ParseError> {
        let begin = self.advance();
        let mut children = vec![keyword_leaf(&begin)];
        let end_token = self.parse_statement_list(&begin, &mut children, None)?;
        children.push(keyword_leaf(&end_token));

        let mut node = SyntaxNode::new(NodeKind::BeginEnd, begin.start, end_token.end, begin.text)
            .with_children(children);
        node.terminated = self.consume_terminator();
        Ok(node)
    }

    /// Parse statements up to `END` (optionally `END <suffix>`), returning the `END` token
    fn parse_statement_list(
        &mut self,
        opener: &Token,
        children: &mut Vec<SyntaxNode>,
        suffix: Option<&str>,
    ) -> Result<Token, ParseError> {
        loop {
            self.skip_empty_statements();
            let token = match self.current() {
                Some(token) => token.clone(),
                None => {
                    let expected = suffix.map(|s| format!("END {s}")).unwrap_or_else(|| "END".to_string());
                    return Err(ParseError::new(
                        opener.start,
                        format!("{} without a matching {expected}", opener.upper()),
                    ));
                }
            };

            if token.is_word("END") {
                match suffix {
                    None => return Ok(self.advance()),
                    Some(suffix) if self.peek(1).is_some_and(|t| t.is_word(suffix)) => {
                        let end = self.advance();
                        children.push(keyword_leaf(&end));
                        return Ok(self.advance());
                    }
                    Some(_) => {}
                }
            }
            if token.is_word("GO") {
                return Err(ParseError::new(token.start, "batch separator inside a BEGIN ... END block"));
            }

            children.push(self.parse_statement(false)?);
        }
    }

    fn parse_try_catch(&mut self) -> Result<SyntaxNode, ParseError> {
        let begin = self.advance();
        let try_token = self.advance();
        let mut children = vec![keyword_leaf(&begin), keyword_leaf(&try_token)];
        let try_end = self.parse_statement_list(&begin, &mut children, Some("TRY"))?;
        children.push(keyword_leaf(&try_end));

        let catch_begin = match self.current() {
            Some(t) if t.is_word("BEGIN") && self.peek(1).is_some_and(|n| n.is_word("CATCH")) => self.advance(),
            Some(t) => return Err(ParseError::new(t.start, "expected BEGIN CATCH after END TRY")),
            None => return Err(ParseError::new(self.eof_position(), "expected BEGIN CATCH after END TRY")),
        };
        let catch_token = self.advance();
        children.push(keyword_leaf(&catch_begin));
        children.push(keyword_leaf(&catch_token));
        let catch_end = self.parse_statement_list(&catch_begin, &mut children, Some("CATCH"))?;
        children.push(keyword_leaf(&catch_end));

        let mut node = SyntaxNode::new(NodeKind::TryCatch, begin.start, catch_end.end, begin.text)
            .with_children(children);
        node.terminated = self.consume_terminator();
        Ok(node)
    }

    fn parse_with(&mut self) -> Result<SyntaxNode, ParseError> {
        let with_token = self.advance();
        let mut children = vec![keyword_leaf(&with_token)];

        loop {
            let name = match self.current() {
                Some(t) if is_name_token(t) => self.advance(),
                Some(t) => return Err(ParseError::new(t.start, "expected a common table expression name")),
                None => return Err(ParseError::new(self.eof_position(), "expected a common table expression name")),
            };

            if self.current_is_symbol("(") {
                self.skip_parenthesized()?;
            }
            match self.current() {
                Some(t) if t.is_word("AS") => children.push(keyword_leaf(&self.advance())),
                Some(t) => return Err(ParseError::new(t.start, "expected AS in common table expression")),
                None => return Err(ParseError::new(self.eof_position(), "expected AS in common table expression")),
            }
            if !self.current_is_symbol("(") {
                let position = self.current().map(|t| t.start).unwrap_or_else(|| self.eof_position());
                return Err(ParseError::new(position, "expected '(' to open a common table expression"));
            }

            let mut state = StatementState::new(NodeKind::Select, self.pos);
            let mut body = Vec::new();
            let end = loop {
                let end = self.annotate(&mut state, &mut body)?;
                if state.depth == 0 {
                    break end;
                }
                if self.current().is_none() {
                    let open = state.open_parens.first().copied().unwrap_or(name.start);
                    return Err(ParseError::new(open, "missing closing parenthesis"));
                }
            };

            children.push(
                SyntaxNode::new(NodeKind::CommonTableExpression, name.start, end, name.text.clone())
                    .with_detail(NodeDetail::CommonTableExpression {
                        name: name.identifier_text(),
                    })
                    .with_children(body),
            );

            if self.current_is_symbol(",") {
                self.pos += 1;
            } else {
                break;
            }
        }

        let kind = match self.current().map(|t| t.upper()).as_deref() {
            Some("SELECT") => NodeKind::Select,
            Some("INSERT") => NodeKind::Insert,
            Some("UPDATE") => NodeKind::Update,
            Some("DELETE") => NodeKind::Delete,
            Some("MERGE") => NodeKind::Merge,
            _ => {
                let position = self.current().map(|t| t.start).unwrap_or_else(|| self.eof_position());
                return Err(ParseError::new(position, "expected a statement after common table expressions"));
            }
        };

        self.parse_simple_from(kind, with_token.start, with_token.text, children)
    }

    fn parse_set(&mut self) -> Result<SyntaxNode, ParseError> {
        let next = self.peek(1).cloned();
        match next {
            Some(t) if t.is_word("TRANSACTION") => return self.parse_simple(NodeKind::SetIsolationLevel),
            Some(t) if t.kind == TokenKind::Variable => return self.parse_simple(NodeKind::SetVariable),
            Some(_) => {}
            None => return Err(ParseError::new(self.eof_position(), "expected an option after SET")),
        }

        let first = self.pos + 1;
        let mut node = self.parse_simple(NodeKind::SetOption)?;
        let last = if node.terminated { self.pos - 1 } else { self.pos };
        let tokens = &self.tokens[first..last];

        let value = tokens.last().map(|t| t.upper()).unwrap_or_default();
        let options = tokens[..tokens.len().saturating_sub(1)]
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.upper())
            .collect();
        node.detail = NodeDetail::SetOption { options, value };
        Ok(node)
    }

    fn parse_definition(&mut self) -> Result<SyntaxNode, ParseError> {
        let create = self.current_is_word("CREATE");
        let mut offset = 1;
        while self.peek(offset).is_some_and(|t| {
            ["OR", "ALTER", "UNIQUE", "CLUSTERED", "NONCLUSTERED", "COLUMNSTORE", "XML", "SPATIAL"]
                .iter()
                .any(|w| t.is_word(w))
        }) {
            offset += 1;
        }
        let object = self.peek(offset).map(|t| t.upper()).unwrap_or_default();

        match (object.as_str(), create) {
            ("TABLE", true) => self.parse_simple(NodeKind::CreateTable),
            ("INDEX", true) => self.parse_simple(NodeKind::CreateIndex),
            ("PROCEDURE" | "PROC" | "FUNCTION" | "TRIGGER", _) => self.parse_routine(false),
            ("VIEW", _) => self.parse_routine(true),
            (_, true) => self.parse_simple(NodeKind::Other),
            (_, false) => self.parse_simple(NodeKind::Alter),
        }
    }

    fn parse_routine(&mut self, is_view: bool) -> Result<SyntaxNode, ParseError> {
        let head = self.current().cloned().ok_or_else(|| {
            ParseError::new(self.eof_position(), "expected a routine definition")
        })?;
        let mut state = StatementState::new(NodeKind::CreateRoutine, self.pos);
        let mut children = Vec::new();

        loop {
            let token = match self.current() {
                Some(token) => token,
                None => return Err(ParseError::new(head.start, "routine definition without AS")),
            };
            if state.depth == 0 && self.pos > state.first_index && token.is_word("AS") {
                let prev = &self.tokens[self.pos - 1];
                let clause_as = prev.is_word("EXEC") || prev.is_word("EXECUTE") || prev.kind == TokenKind::Variable;
                if !clause_as {
                    break;
                }
            }
            if state.depth == 0 && token.is_word("GO") {
                return Err(ParseError::new(head.start, "routine definition without AS"));
            }
            self.annotate(&mut state, &mut children)?;
        }
        if let Some(open) = state.open_parens.last() {
            return Err(ParseError::new(*open, "missing closing parenthesis"));
        }

        let as_token = self.advance();
        children.push(keyword_leaf(&as_token));
        let mut end = as_token.end;
        let mut has_body = false;

        if is_view {
            let body = self.parse_statement(false)?;
            end = body.end;
            children.push(body);
            has_body = true;
        } else {
            loop {
                self.skip_empty_statements();
                match self.current() {
                    None => break,
                    Some(t) if t.is_word("GO") => break,
                    Some(_) => {
                        let statement = self.parse_statement(false)?;
                        end = statement.end;
                        children.push(statement);
                        has_body = true;
                    }
                }
            }
        }

        if !has_body {
            return Err(ParseError::new(as_token.start, "routine definition has no body"));
        }

        let mut node = SyntaxNode::new(NodeKind::CreateRoutine, head.start, end, head.text)
            .with_children(children);
        if let Some(parts) = state.object {
            node.detail = NodeDetail::Object { parts };
        }
        Ok(node)
    }

    fn parse_batch_separator(&mut self) -> SyntaxNode {
        let go = self.advance();
        let mut end = go.end;
        if self
            .current()
            .is_some_and(|t| t.kind == TokenKind::Number && t.start.line == go.start.line)
        {
            end = self.advance().end;
        }
        SyntaxNode::new(NodeKind::BatchSeparator, go.start, end, go.text)
    }
}
