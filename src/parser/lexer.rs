//! Tokenizer for T-SQL script text
//!
//! Every token records its start and end as display positions: a horizontal tab advances
//! the column to the next tab stop, so columns match what an editor shows.

use crate::domain::violations::Position;
use crate::parser::ParseError;

/// Lexical category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or regular identifier
    Word,
    /// `[name]` or `"name"`
    QuotedIdentifier,
    /// `@name` or `@@name`
    Variable,
    /// `#name` or `##name`
    TempName,
    Number,
    /// `'text'` or `N'text'`
    String,
    /// Punctuation and operators
    Symbol,
}

/// A single token with its display span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: Position,
    /// Display position immediately after the last character
    pub end: Position,
}

impl Token {
    /// Case-insensitive match against a bare word
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    /// Whether the token can name an object (table, column, alias, cursor)
    pub fn is_identifier(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Word | TokenKind::QuotedIdentifier | TokenKind::TempName | TokenKind::Variable
        )
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }

    /// Identifier text without brackets or quotes
    pub fn identifier_text(&self) -> String {
        match self.kind {
            TokenKind::QuotedIdentifier => {
                let inner = &self.text[1..self.text.len() - 1];
                if self.text.starts_with('[') {
                    inner.replace("]]", "]")
                } else {
                    inner.replace("\"\"", "\"")
                }
            }
            _ => self.text.clone(),
        }
    }
}

const TWO_CHAR_SYMBOLS: &[&str] = &[
    "<=", ">=", "<>", "!=", "!<", "!>", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "::",
];

/// Splits script text into tokens, skipping whitespace and comments
pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    column: u32,
    tab_width: u32,
}

impl Lexer {
    pub fn new(text: &str, tab_width: u32) -> Self {
        Self {
            chars: text.chars().collect(),
            index: 0,
            line: 1,
            column: 1,
            tab_width: tab_width.max(1),
        }
    }

    /// Tokenize the whole input
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '-' && self.peek(1) == Some('-') {
                self.skip_line_comment();
                continue;
            }

            if c == '/' && self.peek(1) == Some('*') {
                self.skip_block_comment()?;
                continue;
            }

            let start = self.position();
            let (kind, text) = self.lex_token(c, start)?;
            tokens.push(Token {
                kind,
                text,
                start,
                end: self.position(),
            });
        }

        Ok(tokens)
    }

    fn lex_token(&mut self, c: char, start: Position) -> Result<(TokenKind, String), ParseError> {
        if (c == 'N' || c == 'n') && self.peek(1) == Some('\'') {
            let mut text = String::new();
            text.push(self.bump_char());
            text.push_str(&self.lex_delimited('\'', '\'', start, "string literal")?);
            return Ok((TokenKind::String, text));
        }

        if c == '\'' {
            return Ok((TokenKind::String, self.lex_delimited('\'', '\'', start, "string literal")?));
        }

        if c == '[' {
            let text = self.lex_delimited('[', ']', start, "quoted identifier")?;
            return Ok((TokenKind::QuotedIdentifier, text));
        }

        if c == '"' {
            let text = self.lex_delimited('"', '"', start, "quoted identifier")?;
            return Ok((TokenKind::QuotedIdentifier, text));
        }

        if c == '@' {
            let mut text = String::new();
            text.push(self.bump_char());
            if self.peek(0) == Some('@') {
                text.push(self.bump_char());
            }
            text.push_str(&self.take_while(is_identifier_char));
            return Ok((TokenKind::Variable, text));
        }

        if c == '#' {
            let mut text = String::new();
            text.push(self.bump_char());
            if self.peek(0) == Some('#') {
                text.push(self.bump_char());
            }
            text.push_str(&self.take_while(is_identifier_char));
            return Ok((TokenKind::TempName, text));
        }

        if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
            return Ok((TokenKind::Number, self.lex_number()));
        }

        if c.is_alphabetic() || c == '_' {
            return Ok((TokenKind::Word, self.take_while(is_identifier_char)));
        }

        if c == '$' {
            // `$12.50` is a money literal; `$action` and `$IDENTITY` are pseudo-columns
            let money = self.peek(1).is_some_and(|n| n.is_ascii_digit())
                || (self.peek(1) == Some('.') && self.peek(2).is_some_and(|n| n.is_ascii_digit()));
            let word = self.peek(1).is_some_and(|n| n.is_alphabetic() || n == '_');
            if money || word {
                let mut text = String::new();
                text.push(self.bump_char());
                if money {
                    text.push_str(&self.lex_number());
                    return Ok((TokenKind::Number, text));
                }
                text.push_str(&self.take_while(is_identifier_char));
                return Ok((TokenKind::Word, text));
            }
        }

        if let Some(next) = self.peek(1) {
            let pair: String = [c, next].iter().collect();
            if TWO_CHAR_SYMBOLS.contains(&pair.as_str()) {
                self.bump();
                self.bump();
                return Ok((TokenKind::Symbol, pair));
            }
        }

        // Braces only appear in ODBC escapes such as `{fn NOW()}`
        if "(),;.*=<>!+-/%&|^~:{}".contains(c) {
            self.bump();
            return Ok((TokenKind::Symbol, c.to_string()));
        }

        Err(ParseError::new(start, format!("unexpected character '{c}'")))
    }

    /// Lex text between `open` and `close`, where a doubled `close` is an escape
    fn lex_delimited(
        &mut self,
        open: char,
        close: char,
        start: Position,
        what: &str,
    ) -> Result<String, ParseError> {
        let mut text = String::new();
        debug_assert_eq!(self.peek(0), Some(open));
        text.push(self.bump_char());

        loop {
            match self.peek(0) {
                None => return Err(ParseError::new(start, format!("unterminated {what}"))),
                Some(c) if c == close => {
                    text.push(self.bump_char());
                    if self.peek(0) == Some(close) {
                        text.push(self.bump_char());
                    } else {
                        return Ok(text);
                    }
                }
                Some(_) => text.push(self.bump_char()),
            }
        }
    }

    fn lex_number(&mut self) -> String {
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            let mut text = String::new();
            text.push(self.bump_char());
            text.push(self.bump_char());
            text.push_str(&self.take_while(|c| c.is_ascii_hexdigit()));
            return text;
        }

        let mut text = self.take_while(|c| c.is_ascii_digit() || c == '.');
        if matches!(self.peek(0), Some('e') | Some('E')) {
            let sign_then_digit = matches!(self.peek(1), Some('+') | Some('-'))
                && self.peek(2).is_some_and(|c| c.is_ascii_digit());
            if sign_then_digit || self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.bump_char());
                if sign_then_digit {
                    text.push(self.bump_char());
                }
                text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            }
        }
        text
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.position();
        let mut depth = 0usize;

        loop {
            match (self.peek(0), self.peek(1)) {
                (Some('/'), Some('*')) => {
                    depth += 1;
                    self.bump();
                    self.bump();
                }
                (Some('*'), Some('/')) => {
                    depth -= 1;
                    self.bump();
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                (Some(_), _) => self.bump(),
                (None, _) => return Err(ParseError::new(start, "unterminated block comment")),
            }
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if !predicate(c) {
                break;
            }
            text.push(self.bump_char());
        }
        text
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) {
        self.bump_char();
    }

    fn bump_char(&mut self) -> char {
        let c = self.chars[self.index];
        self.index += 1;

        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\t' => {
                self.column = ((self.column - 1) / self.tab_width + 1) * self.tab_width + 1;
            }
            '\r' => {}
            _ => self.column += 1,
        }

        c
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#' | '@')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<Token> {
        Lexer::new(text, 4).tokenize().unwrap()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = lex("SELECT [a b], @x, #t FROM dbo.t WHERE n >= 1.5;");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();

        assert_eq!(kinds[0], TokenKind::Word);
        assert_eq!(kinds[1], TokenKind::QuotedIdentifier);
        assert_eq!(tokens[1].identifier_text(), "a b");
        assert_eq!(tokens[3].kind, TokenKind::Variable);
        assert_eq!(tokens[5].kind, TokenKind::TempName);
        assert!(tokens.iter().any(|t| t.is_symbol(">=")));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Number && t.text == "1.5"));
        assert!(tokens.last().unwrap().is_symbol(";"));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("-- heading\nSELECT /* inner /* nested */ */ 1");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].start, Position::new(2, 1));
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = lex("PRINT N'it''s'");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].text, "N'it''s'");
    }

    #[test]
    fn test_tab_expands_to_next_stop() {
        let tabbed = lex("\tSELECT 1");
        let spaced = lex("    SELECT 1");
        assert_eq!(tabbed[0].start, Position::new(1, 5));
        assert_eq!(tabbed[0].start, spaced[0].start);

        let mid = lex("ab\tc");
        assert_eq!(mid[1].start, Position::new(1, 5));

        let wide = Lexer::new("\tx", 8).tokenize().unwrap();
        assert_eq!(wide[0].start, Position::new(1, 9));
    }

    #[test]
    fn test_token_end_is_after_last_char() {
        let tokens = lex("SELECT * FROM foo");
        assert_eq!(tokens[3].end, Position::new(1, 18));
    }

    #[test]
    fn test_dollar_pseudo_columns_and_money() {
        let tokens = lex("OUTPUT $action, $IDENTITY, $10.50, $.5");
        assert_eq!(tokens[1].kind, TokenKind::Word);
        assert_eq!(tokens[1].text, "$action");
        assert_eq!(tokens[1].start, Position::new(1, 8));
        assert_eq!(tokens[3].text, "$IDENTITY");
        assert_eq!(tokens[5].kind, TokenKind::Number);
        assert_eq!(tokens[5].text, "$10.50");
        assert_eq!(tokens[7].kind, TokenKind::Number);
        assert_eq!(tokens[7].text, "$.5");
    }

    #[test]
    fn test_odbc_escape_braces() {
        let tokens = lex("{fn NOW()}");
        assert!(tokens[0].is_symbol("{"));
        assert_eq!(tokens[1].text, "fn");
        assert!(tokens.last().unwrap().is_symbol("}"));
    }

    #[test]
    fn test_lone_dollar_is_error() {
        let err = Lexer::new("SELECT $ + 1", 4).tokenize().unwrap_err();
        assert_eq!(err.position, Position::new(1, 8));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = Lexer::new("SELECT 'abc", 4).tokenize().unwrap_err();
        assert_eq!(err.position, Position::new(1, 8));
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        assert!(Lexer::new("/* never closed", 4).tokenize().is_err());
    }
}
