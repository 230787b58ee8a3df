//! Lexer for StackVM assembly.
//!
//! Tokens are separated by whitespace; `;` counts as whitespace so several
//! instructions can share a line, and `#` starts a comment running to the end
//! of the line.

use crate::token::{Span, Token};
use logos::Logos;

/// Logos-based token enum for lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f;]+")]
#[logos(skip r"#[^\n]*")]
enum LogosToken {
    #[regex(r"[+-]?[0-9]+", priority = 5)]
    Number,

    #[regex(r"[^ \t\r\n\f;#:]+:", priority = 4)]
    LabelDef,

    #[regex(r"[^ \t\r\n\f;#]+", priority = 1)]
    Word,
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// No token starts at this character
    UnexpectedCharacter {
        /// Offending character
        char: char,
        /// Its location
        span: Span,
    },
}

impl LexError {
    /// Location of the error
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. } => *span,
        }
    }
}

/// Converts assembly source into `(Token, Span)` pairs.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Lex the whole source, collecting every error
    pub fn tokenize(mut self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let mut logos_lexer = LogosToken::lexer(self.source);
        let mut line = 1u32;
        let mut column = 1u32;
        let mut last_end = 0;

        while let Some(token_result) = logos_lexer.next() {
            let range = logos_lexer.span();
            advance(&self.source[last_end..range.start], &mut line, &mut column);

            let span = Span::new(range.start, range.end, line, column);
            let text = logos_lexer.slice();

            match token_result {
                Ok(LogosToken::Number) => self.tokens.push((Token::Number(text.to_string()), span)),
                Ok(LogosToken::LabelDef) => {
                    let name = &text[..text.len() - 1];
                    self.tokens.push((Token::LabelDef(name.to_string()), span));
                }
                Ok(LogosToken::Word) => self.tokens.push((Token::Word(text.to_string()), span)),
                Err(_) => {
                    let char = text.chars().next().unwrap_or('\0');
                    self.errors.push(LexError::UnexpectedCharacter { char, span });
                }
            }

            advance(text, &mut line, &mut column);
            last_end = range.end;
        }

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }
}

/// Move a line/column cursor over `text`.
fn advance(text: &str, line: &mut u32, column: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    fn word(text: &str) -> Token {
        Token::Word(text.to_string())
    }

    fn number(text: &str) -> Token {
        Token::Number(text.to_string())
    }

    #[test]
    fn test_instructions() {
        assert_eq!(
            lex("push 10\npush -20\nadd"),
            vec![word("push"), number("10"), word("push"), number("-20"), word("add")]
        );
    }

    #[test]
    fn test_semicolons_are_whitespace() {
        assert_eq!(
            lex("push 10; push 20; add; out; end"),
            vec![
                word("push"),
                number("10"),
                word("push"),
                number("20"),
                word("add"),
                word("out"),
                word("end"),
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            lex("# header\npush 1 # trailing\n#push 2\nout"),
            vec![word("push"), number("1"), word("out")]
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            lex("loop: jmp loop"),
            vec![Token::LabelDef("loop".to_string()), word("jmp"), word("loop")]
        );
    }

    #[test]
    fn test_number_like_words() {
        assert_eq!(lex("+7 12ab -"), vec![number("+7"), word("12ab"), word("-")]);
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::new("push 1\n  label:\n\tout").tokenize().unwrap();

        assert_eq!(tokens[0].1, Span::new(0, 4, 1, 1));
        assert_eq!(tokens[1].1, Span::new(5, 6, 1, 6));
        assert_eq!(tokens[2].1, Span::new(9, 15, 2, 3));
        assert_eq!(tokens[3].1.line, 3);
        assert_eq!(tokens[3].1.slice("push 1\n  label:\n\tout"), "out");
    }

    #[test]
    fn test_empty_source() {
        assert!(lex("  ; ;\n# nothing\n").is_empty());
    }
}
