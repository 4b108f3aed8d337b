//! Query tokenization
//!
//! Splits query text into keywords, identifiers, literals and operators.
//! Keywords are case-insensitive; identifiers keep their case.

use crate::error::{Error, ErrorCode, Result};

// ============================================================================
// Token Types
// ============================================================================

/// Token kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Integer,
    Float,
    String,

    // Identifiers and Keywords
    Identifier,

    // Keywords (alphabetical)
    All,
    And,
    As,
    By,
    Desc,
    Except,
    False,
    From,
    Group,
    Having,
    In,
    Inner,
    Intersect,
    Join,
    Like,
    Not,
    On,
    Or,
    Select,
    Skip,
    Take,
    True,
    Union,
    Where,
    With,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    Ne,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Punctuation
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Hash,

    // Special
    Eof,
}

impl TokenKind {
    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::All
                | TokenKind::And
                | TokenKind::As
                | TokenKind::By
                | TokenKind::Desc
                | TokenKind::Except
                | TokenKind::False
                | TokenKind::From
                | TokenKind::Group
                | TokenKind::Having
                | TokenKind::In
                | TokenKind::Inner
                | TokenKind::Intersect
                | TokenKind::Join
                | TokenKind::Like
                | TokenKind::Not
                | TokenKind::On
                | TokenKind::Or
                | TokenKind::Select
                | TokenKind::Skip
                | TokenKind::Take
                | TokenKind::True
                | TokenKind::Union
                | TokenKind::Where
                | TokenKind::With
        )
    }
}

// ============================================================================
// Token
// ============================================================================

/// A token with its position in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token type
    pub kind: TokenKind,
    /// Start position in source
    pub start: usize,
    /// End position in source (exclusive)
    pub end: usize,
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, start: usize, end: usize, line: u32, column: u32) -> Self {
        Token {
            kind,
            start,
            end,
            line,
            column,
        }
    }

    /// Get the text of this token from the source
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

/// Query tokenizer
pub struct Tokenizer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer
    pub fn new(source: &'a str) -> Self {
        Tokenizer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire source
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        if self.is_eof() {
            return Ok(Token::new(TokenKind::Eof, self.pos, self.pos, self.line, self.column));
        }

        let start = self.pos;
        let start_line = self.line;
        let start_column = self.column;

        let kind = self.scan_token()?;

        Ok(Token::new(kind, start, self.pos, start_line, start_column))
    }

    fn scan_token(&mut self) -> Result<TokenKind> {
        let c = self.current();

        if c.is_ascii_digit() {
            return Ok(self.scan_number());
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.scan_identifier());
        }

        // [Quoted Name] keeps spaces and keywords usable as column names
        if c == b'[' {
            return self.scan_bracketed_identifier();
        }

        if c == b'\'' {
            return self.scan_string();
        }

        self.scan_operator()
    }

    /// Scan a number (integer or float)
    fn scan_number(&mut self) -> TokenKind {
        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }

        if !self.is_eof() && self.current() == b'.' {
            if let Some(next) = self.peek() {
                if next.is_ascii_digit() {
                    self.advance(); // consume '.'
                    while !self.is_eof() && self.current().is_ascii_digit() {
                        self.advance();
                    }
                    return TokenKind::Float;
                }
            }
        }

        TokenKind::Integer
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;

        while !self.is_eof() {
            let c = self.current();
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        keyword_or_identifier(&self.source[start..self.pos])
    }

    fn scan_bracketed_identifier(&mut self) -> Result<TokenKind> {
        let line = self.line;
        let column = self.column;
        self.advance();

        while !self.is_eof() {
            if self.current() == b']' {
                self.advance();
                return Ok(TokenKind::Identifier);
            }
            self.advance();
        }

        Err(Error::with_message(
            ErrorCode::Syntax,
            format!("unterminated identifier at line {}, column {}", line, column),
        ))
    }

    /// Scan a string literal; '' inside the literal is an escaped quote
    fn scan_string(&mut self) -> Result<TokenKind> {
        let line = self.line;
        let column = self.column;
        self.advance(); // consume opening quote

        while !self.is_eof() {
            if self.current() == b'\'' {
                if self.peek() == Some(b'\'') {
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    return Ok(TokenKind::String);
                }
            } else {
                if self.current() == b'\n' {
                    self.line += 1;
                    self.column = 0;
                }
                self.advance();
            }
        }

        Err(Error::with_message(
            ErrorCode::Syntax,
            format!("unterminated string at line {}, column {}", line, column),
        ))
    }

    /// Scan an operator or punctuation
    fn scan_operator(&mut self) -> Result<TokenKind> {
        let c = self.current();
        let line = self.line;
        let column = self.column;
        self.advance();

        match c {
            b'+' => Ok(TokenKind::Plus),
            b'-' => Ok(TokenKind::Minus),
            b'*' => Ok(TokenKind::Star),
            b'/' => Ok(TokenKind::Slash),
            b'%' => Ok(TokenKind::Percent),
            b'=' => {
                if !self.is_eof() && self.current() == b'=' {
                    self.advance();
                    Ok(TokenKind::EqEq)
                } else {
                    Ok(TokenKind::Eq)
                }
            }
            b'<' => {
                if !self.is_eof() {
                    match self.current() {
                        b'=' => {
                            self.advance();
                            Ok(TokenKind::Le)
                        }
                        b'>' => {
                            self.advance();
                            Ok(TokenKind::Ne)
                        }
                        _ => Ok(TokenKind::Lt),
                    }
                } else {
                    Ok(TokenKind::Lt)
                }
            }
            b'>' => {
                if !self.is_eof() && self.current() == b'=' {
                    self.advance();
                    Ok(TokenKind::Ge)
                } else {
                    Ok(TokenKind::Gt)
                }
            }
            b'!' if !self.is_eof() && self.current() == b'=' => {
                self.advance();
                Ok(TokenKind::BangEq)
            }
            b'(' => Ok(TokenKind::LParen),
            b')' => Ok(TokenKind::RParen),
            b',' => Ok(TokenKind::Comma),
            b';' => Ok(TokenKind::Semicolon),
            b'.' => Ok(TokenKind::Dot),
            b'#' => Ok(TokenKind::Hash),
            _ => Err(Error::with_message(
                ErrorCode::Syntax,
                format!(
                    "unexpected character '{}' at line {}, column {}",
                    c as char, line, column
                ),
            )),
        }
    }

    /// Skip whitespace and comments
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while !self.is_eof() && self.current().is_ascii_whitespace() {
                if self.current() == b'\n' {
                    self.line += 1;
                    self.column = 0;
                }
                self.advance();
            }

            if self.is_eof() {
                break;
            }

            // -- comments
            if self.current() == b'-' && self.peek() == Some(b'-') {
                while !self.is_eof() && self.current() != b'\n' {
                    self.advance();
                }
                continue;
            }

            // /* */ comments
            if self.current() == b'/' && self.peek() == Some(b'*') {
                self.advance();
                self.advance();
                while !self.is_eof() {
                    if self.current() == b'*' && self.peek() == Some(b'/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    if self.current() == b'\n' {
                        self.line += 1;
                        self.column = 0;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        // stay on char boundaries so token slices of non-ASCII text are valid
        self.pos += 1;
        while self.pos < self.bytes.len() && (self.bytes[self.pos] & 0xC0) == 0x80 {
            self.pos += 1;
        }
        self.column += 1;
    }
}

// ============================================================================
// Keyword Recognition
// ============================================================================

/// Map a text to a keyword or identifier token
fn keyword_or_identifier(text: &str) -> TokenKind {
    match text.to_uppercase().as_str() {
        "ALL" => TokenKind::All,
        "AND" => TokenKind::And,
        "AS" => TokenKind::As,
        "BY" => TokenKind::By,
        "DESC" => TokenKind::Desc,
        "EXCEPT" => TokenKind::Except,
        "FALSE" => TokenKind::False,
        "FROM" => TokenKind::From,
        "GROUP" => TokenKind::Group,
        "HAVING" => TokenKind::Having,
        "IN" => TokenKind::In,
        "INNER" => TokenKind::Inner,
        "INTERSECT" => TokenKind::Intersect,
        "JOIN" => TokenKind::Join,
        "LIKE" => TokenKind::Like,
        "NOT" => TokenKind::Not,
        "ON" => TokenKind::On,
        "OR" => TokenKind::Or,
        "SELECT" => TokenKind::Select,
        "SKIP" => TokenKind::Skip,
        "TAKE" => TokenKind::Take,
        "TRUE" => TokenKind::True,
        "UNION" => TokenKind::Union,
        "WHERE" => TokenKind::Where,
        "WITH" => TokenKind::With,
        _ => TokenKind::Identifier,
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Tokenize query text
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Tokenizer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_keywords_case_insensitive() {
        assert_eq!(
            kinds("select FROM Where skip TAKE"),
            vec![
                TokenKind::Select,
                TokenKind::From,
                TokenKind::Where,
                TokenKind::Skip,
                TokenKind::Take,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_tokenize_schema_source() {
        assert_eq!(
            kinds("#csv.file('a.csv', ',', true, 0)"),
            vec![
                TokenKind::Hash,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::True,
                TokenKind::Comma,
                TokenKind::Integer,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_in_and_desc_are_keywords() {
        assert_eq!(
            kinds("desc x In (1)"),
            vec![
                TokenKind::Desc,
                TokenKind::Identifier,
                TokenKind::In,
                TokenKind::LParen,
                TokenKind::Integer,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
        assert!(TokenKind::Desc.is_keyword());
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("42 3.5"), vec![TokenKind::Integer, TokenKind::Float, TokenKind::Eof]);
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("= == <> != < <= > >= + - * / %"),
            vec![
                TokenKind::Eq,
                TokenKind::EqEq,
                TokenKind::Ne,
                TokenKind::BangEq,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_tokenize_comments() {
        assert_eq!(
            kinds("select -- trailing\n /* block */ Name"),
            vec![TokenKind::Select, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let source = "'it''s'";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text(source), "'it''s'");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("select 'abc").unwrap_err();
        assert_eq!(err.code, ErrorCode::Syntax);
    }

    #[test]
    fn test_token_position() {
        let tokens = tokenize("select\n  Name").unwrap();
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("select ?").unwrap_err();
        assert!(err.message.contains("line 1, column 8"));
    }
}
