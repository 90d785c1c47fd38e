//! Filter parser
//!
//! Grammar (`&&` binds tighter than `||`):
//!
//! ```text
//! expr       := and_expr ( "||" and_expr )*
//! and_expr   := primary ( "&&" primary )*
//! primary    := "(" expr ")" | comparison
//! comparison := operand op operand
//! operand    := string | number | true | false | null | path | macro
//! ```

use super::lexer::{FilterLexer, Token, TokenKind};
use super::{CompareOp, Expr, FilterError, MacroRef, Operand};
use crate::store::model::Value;

/// Recursive descent parser over the token stream
pub struct FilterParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl FilterParser {
    pub fn new(input: &str) -> Self {
        Self {
            tokens: FilterLexer::tokenize(input),
            pos: 0,
        }
    }

    /// Parse a complete filter expression
    pub fn parse(input: &str) -> Result<Expr, FilterError> {
        let mut parser = Self::new(input);
        let expr = parser.parse_or()?;
        match parser.peek_kind() {
            TokenKind::EOF => Ok(expr),
            other => Err(parser.unexpected(&format!("{other:?}"))),
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        // tokenize always ends with EOF
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::EOF)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek_kind().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.span.start).unwrap_or(0)
    }

    fn unexpected(&self, found: &str) -> FilterError {
        FilterError::new(format!("unexpected {found} at position {}", self.offset()))
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek_kind(), TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_primary()?;
        while matches!(self.peek_kind(), TokenKind::And) {
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        if matches!(self.peek_kind(), TokenKind::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            return match self.advance() {
                TokenKind::RParen => Ok(inner),
                other => Err(self.unexpected(&format!("{other:?}, expected ')'"))),
            };
        }

        let left = self.parse_operand()?;
        let op = match self.advance() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Like => CompareOp::Like,
            TokenKind::NotLike => CompareOp::NotLike,
            other => return Err(self.unexpected(&format!("{other:?}, expected an operator"))),
        };
        let right = self.parse_operand()?;

        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, FilterError> {
        match self.advance() {
            TokenKind::String(s) => Ok(Operand::Literal(Value::Text(s))),
            TokenKind::Number(n) => parse_number(&n)
                .map(Operand::Literal)
                .ok_or_else(|| FilterError::new(format!("invalid number '{n}'"))),
            TokenKind::Ident(ident) => parse_identifier(&ident),
            TokenKind::Unterminated => Err(FilterError::new("unterminated string literal")),
            TokenKind::EOF => Err(FilterError::new("unexpected end of filter")),
            other => Err(self.unexpected(&format!("{other:?}"))),
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    text.parse::<f64>().ok().map(Value::Float)
}

fn parse_identifier(ident: &str) -> Result<Operand, FilterError> {
    match ident {
        "true" => return Ok(Operand::Literal(Value::Bool(true))),
        "false" => return Ok(Operand::Literal(Value::Bool(false))),
        "null" => return Ok(Operand::Literal(Value::Null)),
        _ => {}
    }

    if ident.starts_with('@') {
        return parse_macro(ident).map(Operand::Macro);
    }

    let segments: Vec<String> = ident.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty() || s.contains('@')) {
        return Err(FilterError::new(format!("invalid field path '{ident}'")));
    }
    Ok(Operand::Field(segments))
}

fn parse_macro(ident: &str) -> Result<MacroRef, FilterError> {
    let parts: Vec<&str> = ident.split('.').collect();
    let unknown = || FilterError::new(format!("unknown macro '{ident}'"));

    match parts.as_slice() {
        ["@now"] => Ok(MacroRef::Now),
        ["@request", "method"] => Ok(MacroRef::Method),
        ["@request", "auth", field] if !field.is_empty() => Ok(MacroRef::Auth(field.to_string())),
        ["@request", "query", key] if !key.is_empty() => Ok(MacroRef::Query(key.to_string())),
        ["@request", "data", key] if !key.is_empty() => Ok(MacroRef::Data(key.to_string())),
        ["@request", "headers", key] if !key.is_empty() => Ok(MacroRef::Headers(key.to_string())),
        _ => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &str) -> Operand {
        Operand::Field(path.split('.').map(str::to_string).collect())
    }

    #[test]
    fn test_parse_comparison() {
        let expr = FilterParser::parse("message != ''").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                left: field("message"),
                op: CompareOp::Ne,
                right: Operand::Literal(Value::Text(String::new())),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = FilterParser::parse("a = 1 || b = 2 && c = 3").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_parentheses_and_macros() {
        let expr = FilterParser::parse("(author = @request.auth.id) && created <= @now").unwrap();
        match expr {
            Expr::And(left, right) => {
                assert!(matches!(
                    *left,
                    Expr::Compare {
                        right: Operand::Macro(MacroRef::Auth(_)),
                        ..
                    }
                ));
                assert!(matches!(
                    *right,
                    Expr::Compare {
                        right: Operand::Macro(MacroRef::Now),
                        ..
                    }
                ));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(FilterParser::parse("message").is_err());
        assert!(FilterParser::parse("message = ").is_err());
        assert!(FilterParser::parse("(a = 1").is_err());
        assert!(FilterParser::parse("a = 'open").is_err());
        assert!(FilterParser::parse("a = 1 b = 2").is_err());
        assert!(FilterParser::parse("a = @request.unknown").is_err());
        assert!(FilterParser::parse("a. = 1").is_err());
    }

    #[test]
    fn test_literals() {
        let expr = FilterParser::parse("flag = true && n > 2.5 && x = null").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }
}
