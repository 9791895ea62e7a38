// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The expression-level lexer, reentered by the parser on the raw text
//! carried inside an output statement or tag.

use std::str::Chars;

use crate::ast::Span;
use crate::error::{Error, Location};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    StringLiteral(String),
    NumberLiteral(String),
    Dot,
    Pipe,
    Colon,
    Assign,
    Comma,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    DotDot,
    Operator(Operator),
    Keyword(Keyword),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    And,
    Or,
    Contains,
    In,
    With,
    For,
    As,
    Limit,
    Offset,
    Reversed,
    Cols,
    Continue,
    Empty,
    Blank,
    Nil,
    Null,
    True,
    False,
    If,
    Else,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "contains" => Keyword::Contains,
            "in" => Keyword::In,
            "with" => Keyword::With,
            "for" => Keyword::For,
            "as" => Keyword::As,
            "limit" => Keyword::Limit,
            "offset" => Keyword::Offset,
            "reversed" => Keyword::Reversed,
            "cols" => Keyword::Cols,
            "continue" => Keyword::Continue,
            "empty" => Keyword::Empty,
            "blank" => Keyword::Blank,
            "nil" => Keyword::Nil,
            "null" => Keyword::Null,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            _ => return None,
        })
    }
}

/// Lexes the raw expression text of one output statement or tag.
///
/// `offset` is the byte offset of `input`'s first character within the
/// whole template source; `base_line`/`base_column` are that character's
/// 1-based position, so spans on the returned tokens are absolute.
pub fn lex_expression(
    input: &str,
    offset: usize,
    base_line: u32,
    base_column: u32,
    template_name: &str,
) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer::new(input, offset, base_line, base_column, template_name);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    chars: Chars<'a>,
    pos: usize,
    offset: usize,
    line: u32,
    column: u32,
    start_line: u32,
    start_column: u32,
    peeked: Option<char>,
    template_name: String,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, offset: usize, base_line: u32, base_column: u32, template_name: &str) -> Self {
        Self {
            chars: input.chars(),
            pos: 0,
            offset,
            line: base_line,
            column: base_column,
            start_line: base_line,
            start_column: base_column,
            peeked: None,
            template_name: template_name.to_string(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.skip_whitespace();

        let start = self.pos;
        self.start_line = self.line;
        self.start_column = self.column;
        let chr = match self.bump_char() {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match chr {
            '.' => {
                if self.peek_char() == Some('.') {
                    self.bump_char();
                    Token { kind: TokenKind::DotDot, span: self.span_from(start) }
                } else {
                    Token { kind: TokenKind::Dot, span: self.span_from(start) }
                }
            }
            '|' => Token { kind: TokenKind::Pipe, span: self.span_from(start) },
            ':' => Token { kind: TokenKind::Colon, span: self.span_from(start) },
            ',' => Token { kind: TokenKind::Comma, span: self.span_from(start) },
            '=' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    Token { kind: TokenKind::Operator(Operator::Equal), span: self.span_from(start) }
                } else {
                    Token { kind: TokenKind::Assign, span: self.span_from(start) }
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    Token { kind: TokenKind::Operator(Operator::NotEqual), span: self.span_from(start) }
                } else {
                    return Err(self.error_at(start, "unexpected '!' without '='"));
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    Token { kind: TokenKind::Operator(Operator::LessOrEqual), span: self.span_from(start) }
                } else {
                    Token { kind: TokenKind::Operator(Operator::Less), span: self.span_from(start) }
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    Token { kind: TokenKind::Operator(Operator::GreaterOrEqual), span: self.span_from(start) }
                } else {
                    Token { kind: TokenKind::Operator(Operator::Greater), span: self.span_from(start) }
                }
            }
            '(' => Token { kind: TokenKind::LeftParen, span: self.span_from(start) },
            ')' => Token { kind: TokenKind::RightParen, span: self.span_from(start) },
            '[' => Token { kind: TokenKind::LeftBracket, span: self.span_from(start) },
            ']' => Token { kind: TokenKind::RightBracket, span: self.span_from(start) },
            '"' => {
                let literal = self.read_quoted(start, '"')?;
                Token { kind: TokenKind::StringLiteral(literal), span: self.span_from(start) }
            }
            '\'' => {
                let literal = self.read_quoted(start, '\'')?;
                Token { kind: TokenKind::StringLiteral(literal), span: self.span_from(start) }
            }
            c if is_identifier_start(c) => {
                let ident = self.read_identifier(c);
                let span = self.span_from(start);
                match Keyword::from_str(&ident) {
                    Some(keyword) => Token { kind: TokenKind::Keyword(keyword), span },
                    None => Token { kind: TokenKind::Identifier(ident), span },
                }
            }
            c if c.is_ascii_digit() || (c == '-' && self.peek_char().is_some_and(|n| n.is_ascii_digit())) => {
                let literal = self.read_number(c);
                Token { kind: TokenKind::NumberLiteral(literal), span: self.span_from(start) }
            }
            _ => return Err(self.error_at(start, &format!("unexpected character '{chr}'"))),
        };

        Ok(Some(token))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.bump_char();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut ident = String::new();
        ident.push(first);
        while let Some(ch) = self.peek_char() {
            if is_identifier_part(ch) {
                ident.push(self.bump_char().unwrap());
            } else {
                break;
            }
        }
        ident
    }

    /// Reference-dialect string literals carry no escape sequences.
    fn read_quoted(&mut self, start: usize, quote: char) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.bump_char() {
            if ch == quote {
                return Ok(literal);
            }
            literal.push(ch);
        }
        Err(self.error_at(start, "unterminated string literal"))
    }

    fn read_number(&mut self, first: char) -> String {
        let mut literal = String::new();
        literal.push(first);
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() || ch == '.' {
                literal.push(self.bump_char().unwrap());
            } else {
                break;
            }
        }
        literal
    }

    fn bump_char(&mut self) -> Option<char> {
        let ch = if let Some(peek) = self.peeked.take() {
            Some(peek)
        } else {
            self.chars.next()
        };
        if let Some(c) = ch {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn peek_char(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.offset + start, self.offset + self.pos, self.start_line, self.start_column)
    }

    fn error_at(&self, start: usize, message: &str) -> Error {
        let span = self.span_from(start);
        Error::lexer(message, self.template_name.clone(), Location::from_span(span))
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit() || ch == '-' || ch == '?'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn lexes_identifier_and_strings() {
        let tokens = lex_expression(r#"name | default: "value""#, 0, 1, 1, "t").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier("name".into()),
                TokenKind::Pipe,
                TokenKind::Identifier("default".into()),
                TokenKind::Colon,
                TokenKind::StringLiteral("value".into()),
            ]
        );
    }

    #[test]
    fn lexes_range_and_keywords() {
        let tokens = lex_expression("(1..3) and x contains y", 0, 1, 1, "t").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::LeftParen,
                TokenKind::NumberLiteral("1".into()),
                TokenKind::DotDot,
                TokenKind::NumberLiteral("3".into()),
                TokenKind::RightParen,
                TokenKind::Keyword(Keyword::And),
                TokenKind::Identifier("x".into()),
                TokenKind::Keyword(Keyword::Contains),
                TokenKind::Identifier("y".into()),
            ]
        );
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = lex_expression("\"unterminated", 0, 1, 1, "t").unwrap_err();
        match err {
            Error::Lexer { .. } => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
