// Recursive-descent parser for rule conditions
//
//   expr    := or
//   or      := and ("or" and)*
//   and     := not ("and" not)*
//   not     := "not" not | cmp
//   cmp     := primary (op primary)?          op: == != < <= > >= in, not in
//   primary := literal | field ("." "get" "(" expr ("," expr)? ")")? | "(" expr ")"

use thiserror::Error;

use super::ast::{BoolOp, CompareOp, Expr};
use super::lexer::{tokenize, Token, TokenKind};
use super::value::Value;

/// Deepest nesting accepted before parsing gives up
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string starting at {pos}")]
    UnterminatedString { pos: usize },
    #[error("invalid number '{text}' at {pos}")]
    InvalidNumber { text: String, pos: usize },
    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { found: String, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unsupported method '{name}' at {pos}; only get() is available")]
    UnknownMethod { name: String, pos: usize },
    #[error("expression nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("empty expression")]
    Empty,
}

/// Parse a condition into an expression tree
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;

    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(unexpected(token)),
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        found: token.kind.describe(),
        pos: token.pos,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(name)) if name == keyword)
    }

    fn peek_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(
            self.tokens.get(self.index + offset).map(|t| &t.kind),
            Some(TokenKind::Ident(name)) if name == keyword
        )
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self.tokens.get(self.index).cloned().ok_or(ParseError::UnexpectedEnd)?;
        self.index += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(unexpected(&token))
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.parse_chain("or", BoolOp::Or, Self::parse_and)?;
        self.leave();
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain("and", BoolOp::And, Self::parse_not)
    }

    /// Collect `operand (keyword operand)*` into one flat node so chain length never
    /// adds tree depth
    fn parse_chain(
        &mut self,
        keyword: &str,
        op: BoolOp,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let first = operand(self)?;
        if !self.peek_keyword(keyword) {
            return Ok(first);
        }

        let mut operands = vec![first];
        while self.peek_keyword(keyword) {
            self.index += 1;
            operands.push(operand(self)?);
        }
        Ok(Expr::Bool { op, operands })
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.peek_keyword("not") {
            self.index += 1;
            self.enter()?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_primary()?;

        let op = match self.peek_kind() {
            Some(TokenKind::EqEq) => Some((CompareOp::Eq, 1)),
            Some(TokenKind::NotEq) => Some((CompareOp::Ne, 1)),
            Some(TokenKind::Lt) => Some((CompareOp::Lt, 1)),
            Some(TokenKind::Le) => Some((CompareOp::Le, 1)),
            Some(TokenKind::Gt) => Some((CompareOp::Gt, 1)),
            Some(TokenKind::Ge) => Some((CompareOp::Ge, 1)),
            Some(TokenKind::Ident(name)) if name == "in" => Some((CompareOp::In, 1)),
            Some(TokenKind::Ident(name)) if name == "not" && self.peek_keyword_at(1, "in") => {
                Some((CompareOp::NotIn, 2))
            }
            _ => None,
        };

        match op {
            Some((op, width)) => {
                self.index += width;
                let rhs = self.parse_primary()?;
                Ok(Expr::Compare {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            None => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "True" | "true" => Ok(Expr::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Value::Bool(false))),
                "None" | "null" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" | "not" | "in" => Err(unexpected(&Token {
                    kind: TokenKind::Ident(name.clone()),
                    pos: token.pos,
                })),
                _ => self.parse_field(name),
            },
            _ => Err(unexpected(&token)),
        }
    }

    fn parse_field(&mut self, field: String) -> Result<Expr, ParseError> {
        if self.peek_kind() != Some(&TokenKind::Dot) {
            return Ok(Expr::Field(field));
        }
        self.index += 1;

        let method = self.next()?;
        match &method.kind {
            TokenKind::Ident(name) if name == "get" => {}
            TokenKind::Ident(name) => {
                return Err(ParseError::UnknownMethod {
                    name: name.clone(),
                    pos: method.pos,
                })
            }
            _ => return Err(unexpected(&method)),
        }

        self.expect(TokenKind::LParen)?;
        self.enter()?;
        let key = self.parse_or()?;
        let default = if self.peek_kind() == Some(&TokenKind::Comma) {
            self.index += 1;
            self.parse_or()?
        } else {
            Expr::Literal(Value::Null)
        };
        self.leave();
        self.expect(TokenKind::RParen)?;

        Ok(Expr::Lookup {
            field,
            key: Box::new(key),
            default: Box::new(default),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Box<Expr> {
        Box::new(Expr::Field(name.to_string()))
    }

    fn lit(value: Value) -> Box<Expr> {
        Box::new(Expr::Literal(value))
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!(
            parse("combination_valid == True").unwrap(),
            Expr::Compare {
                op: CompareOp::Eq,
                lhs: field("combination_valid"),
                rhs: lit(Value::Bool(true)),
            }
        );
    }

    #[test]
    fn test_parse_lookup_with_default() {
        assert_eq!(
            parse("detected_objects.get('Red', 0) >= 1").unwrap(),
            Expr::Compare {
                op: CompareOp::Ge,
                lhs: Box::new(Expr::Lookup {
                    field: "detected_objects".to_string(),
                    key: lit(Value::Str("Red".to_string())),
                    default: lit(Value::Number(0.0)),
                }),
                rhs: lit(Value::Number(1.0)),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a or b and not c").unwrap();
        assert_eq!(
            expr,
            Expr::Bool {
                op: BoolOp::Or,
                operands: vec![
                    *field("a"),
                    Expr::Bool {
                        op: BoolOp::And,
                        operands: vec![*field("b"), Expr::Not(field("c"))],
                    },
                ],
            }
        );
    }

    #[test]
    fn test_long_chains_stay_flat() {
        let source = vec!["a"; 10_000].join(" and ");
        match parse(&source).unwrap() {
            Expr::Bool { op, operands } => {
                assert_eq!(op, BoolOp::And);
                assert_eq!(operands.len(), 10_000);
                assert!(operands.iter().all(|o| matches!(o, Expr::Field(_))));
            }
            other => panic!("expected a flat chain, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_not_in() {
        let expr = parse("'Green' not in detected_objects").unwrap();
        assert!(matches!(expr, Expr::Compare { op: CompareOp::NotIn, .. }));
        assert_eq!(expr.fields(), vec!["detected_objects"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("a =="), Err(ParseError::UnexpectedEnd));
        assert!(matches!(parse("(a"), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(parse("a b"), Err(ParseError::UnexpectedToken { pos: 2, .. })));
        assert!(matches!(
            parse("detected_objects.keys()"),
            Err(ParseError::UnknownMethod { .. })
        ));
        assert!(matches!(parse("__import__('os').system('ls')"), Err(ParseError::UnexpectedToken { .. })));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}a{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&source), Err(ParseError::TooDeep));

        let source = format!("{}a", "not ".repeat(200));
        assert_eq!(parse(&source), Err(ParseError::TooDeep));
    }
}
