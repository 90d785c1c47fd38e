//! Filter lexer
//!
//! Never panics and never rejects input: unknown characters become
//! `Unknown` tokens and an unclosed quote becomes `Unterminated`. Syntax
//! errors are the parser's job.

use std::ops::Range;

/// Token type enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Identifiers and Literals
    /// Field path or macro, dots included (`author.email`, `@request.auth.id`)
    Ident(String),
    Number(String),
    String(String),

    // Operators and Symbols
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    And,
    Or,
    LParen,
    RParen,

    // Special tokens
    EOF,
    Unterminated,
    Unknown(char),
}

/// Token with position information
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }
}

/// Filter lexer
pub struct FilterLexer {
    input: Vec<char>,
    pos: usize,
}

impl FilterLexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire input; the last token is always `EOF`
    pub fn tokenize(input: &str) -> Vec<Token> {
        let mut lexer = Self::new(input);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token();
            let is_eof = matches!(token.kind, TokenKind::EOF);
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos;

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::EOF, start..start);
        };

        let kind = match c {
            '\'' | '"' => return self.read_string(c),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '~' => self.single(TokenKind::Like),
            '=' => {
                // `==` is accepted as an alias of `=`
                self.pos += 1;
                if self.peek() == Some('=') {
                    self.pos += 1;
                }
                TokenKind::Eq
            }
            '!' => match self.peek_next() {
                Some('=') => self.double(TokenKind::Ne),
                Some('~') => self.double(TokenKind::NotLike),
                _ => self.single(TokenKind::Unknown('!')),
            },
            '>' => match self.peek_next() {
                Some('=') => self.double(TokenKind::Ge),
                _ => self.single(TokenKind::Gt),
            },
            '<' => match self.peek_next() {
                Some('=') => self.double(TokenKind::Le),
                _ => self.single(TokenKind::Lt),
            },
            '&' if self.peek_next() == Some('&') => self.double(TokenKind::And),
            '|' if self.peek_next() == Some('|') => self.double(TokenKind::Or),
            '-' if matches!(self.peek_next(), Some(d) if d.is_ascii_digit()) => {
                return self.read_number();
            }
            c if c.is_ascii_digit() => return self.read_number(),
            c if c.is_alphabetic() || c == '_' || c == '@' => return self.read_ident(),
            other => self.single(TokenKind::Unknown(other)),
        };

        Token::new(kind, start..self.pos)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 2;
        kind
    }

    fn read_string(&mut self, quote: char) -> Token {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();

        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek() {
                        value.push(escaped);
                        self.pos += 1;
                    }
                }
                c if c == quote => return Token::new(TokenKind::String(value), start..self.pos),
                c => value.push(c),
            }
        }

        Token::new(TokenKind::Unterminated, start..self.pos)
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.input[start..self.pos].iter().collect();
        Token::new(TokenKind::Number(text), start..self.pos)
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.' || c == '@')
        {
            self.pos += 1;
        }
        let text: String = self.input[start..self.pos].iter().collect();
        Token::new(TokenKind::Ident(text), start..self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        FilterLexer::tokenize(input)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("message != \"\" && author.email ~ 'x'"),
            vec![
                TokenKind::Ident("message".into()),
                TokenKind::Ne,
                TokenKind::String("".into()),
                TokenKind::And,
                TokenKind::Ident("author.email".into()),
                TokenKind::Like,
                TokenKind::String("x".into()),
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_numbers_and_macros() {
        assert_eq!(
            kinds("(count >= -2.5 || owner = @request.auth.id)"),
            vec![
                TokenKind::LParen,
                TokenKind::Ident("count".into()),
                TokenKind::Ge,
                TokenKind::Number("-2.5".into()),
                TokenKind::Or,
                TokenKind::Ident("owner".into()),
                TokenKind::Eq,
                TokenKind::Ident("@request.auth.id".into()),
                TokenKind::RParen,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_tolerates_bad_input() {
        assert_eq!(
            kinds("a = 'open"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Eq,
                TokenKind::Unterminated,
                TokenKind::EOF,
            ]
        );
        assert!(kinds("a # b").contains(&TokenKind::Unknown('#')));
        assert!(kinds("a & b").contains(&TokenKind::Unknown('&')));
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(kinds(r#"'it\'s'"#)[0], TokenKind::String("it's".into()));
    }
}
