//! Assembly tokens and source locations

use std::fmt;

/// A lexical token of StackVM assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Integer literal with optional sign, kept as written
    Number(String),
    /// Label definition `name:` (name without the colon)
    LabelDef(String),
    /// Mnemonic, register name or label reference
    Word(String),
}

impl Token {
    /// Source text of the token, without the colon of a label definition
    pub fn text(&self) -> &str {
        match self {
            Token::Number(text) | Token::LabelDef(text) | Token::Word(text) => text,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(text) | Token::Word(text) => write!(f, "{}", text),
            Token::LabelDef(name) => write!(f, "{}:", name),
        }
    }
}

/// Source location information for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset past the last character
    pub end: usize,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    /// Create a span
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no text
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Text covered by the span
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
