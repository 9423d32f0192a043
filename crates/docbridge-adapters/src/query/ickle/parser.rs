//! Ickle Parser.

use docbridge_common::types::Value;
use docbridge_core::execution::CompareOp;

use super::SyntaxError;
use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};

/// Ickle Parser.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given input.
    pub fn new(input: &'a str) -> Result<Self, SyntaxError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parses the input into a query.
    pub fn parse(&mut self) -> Result<IckleQuery, SyntaxError> {
        self.expect(&TokenKind::From)?;
        let entity = self.parse_qualified_name()?;
        let alias = self.parse_ident()?;

        let filter = if self.current.kind == TokenKind::Where {
            self.advance()?;
            Some(self.parse_or(&alias)?)
        } else {
            None
        };

        if self.current.kind != TokenKind::Eof {
            return Err(self.error("Expected end of query"));
        }
        Ok(IckleQuery {
            entity,
            alias,
            filter,
        })
    }

    fn parse_qualified_name(&mut self) -> Result<String, SyntaxError> {
        let mut name = self.parse_ident()?;
        while self.current.kind == TokenKind::Dot {
            self.advance()?;
            name.push('.');
            name.push_str(&self.parse_ident()?);
        }
        Ok(name)
    }

    fn parse_or(&mut self, alias: &str) -> Result<Condition, SyntaxError> {
        let mut left = self.parse_and(alias)?;
        while self.current.kind == TokenKind::Or {
            self.advance()?;
            let right = self.parse_and(alias)?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self, alias: &str) -> Result<Condition, SyntaxError> {
        let mut left = self.parse_unary(alias)?;
        while self.current.kind == TokenKind::And {
            self.advance()?;
            let right = self.parse_unary(alias)?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self, alias: &str) -> Result<Condition, SyntaxError> {
        match self.current.kind {
            TokenKind::Not => {
                self.advance()?;
                Ok(Condition::Not(Box::new(self.parse_unary(alias)?)))
            }
            TokenKind::LParen => {
                self.advance()?;
                let inner = self.parse_or(alias)?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            _ => self.parse_predicate(alias),
        }
    }

    fn parse_predicate(&mut self, alias: &str) -> Result<Condition, SyntaxError> {
        let path = self.parse_path(alias)?;

        let op = match self.current.kind {
            TokenKind::Eq => Some(CompareOp::Eq),
            TokenKind::Ne => Some(CompareOp::Ne),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Le => Some(CompareOp::Le),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Ge => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let value = self.parse_literal()?;
            return Ok(Condition::Compare { path, op, value });
        }

        match self.current.kind {
            TokenKind::Is => {
                self.advance()?;
                let negated = self.eat(&TokenKind::Not)?;
                self.expect(&TokenKind::Null)?;
                Ok(Condition::IsNull { path, negated })
            }
            TokenKind::Not | TokenKind::In | TokenKind::Like => {
                let negated = self.eat(&TokenKind::Not)?;
                if self.eat(&TokenKind::In)? {
                    let values = self.parse_literal_list()?;
                    Ok(Condition::In {
                        path,
                        values,
                        negated,
                    })
                } else if self.eat(&TokenKind::Like)? {
                    match self.parse_literal()? {
                        Value::String(pattern) => Ok(Condition::Like {
                            path,
                            pattern: pattern.to_string(),
                            negated,
                        }),
                        _ => Err(self.error("Expected string pattern after LIKE")),
                    }
                } else {
                    Err(self.error("Expected IN or LIKE"))
                }
            }
            _ => Err(self.error("Expected comparison, IN, LIKE or IS")),
        }
    }

    fn parse_path(&mut self, alias: &str) -> Result<PropertyPath, SyntaxError> {
        let head = self.parse_ident()?;
        if head != alias {
            return Err(self.error(&format!("Unknown alias {head}")));
        }
        let mut segments = Vec::new();
        while self.current.kind == TokenKind::Dot {
            self.advance()?;
            segments.push(self.parse_ident()?);
        }
        if segments.is_empty() {
            return Err(self.error("Expected property path"));
        }
        Ok(PropertyPath(segments))
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Value>, SyntaxError> {
        self.expect(&TokenKind::LParen)?;
        let mut values = vec![self.parse_literal()?];
        while self.eat(&TokenKind::Comma)? {
            values.push(self.parse_literal()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(values)
    }

    fn parse_literal(&mut self) -> Result<Value, SyntaxError> {
        let value = match &self.current.kind {
            TokenKind::String(s) => Value::from(s.as_str()),
            TokenKind::Integer(i) => Value::Int64(*i),
            TokenKind::Float(f) => Value::Float64(*f),
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            _ => return Err(self.error("Expected literal")),
        };
        self.advance()?;
        Ok(value)
    }

    fn parse_ident(&mut self) -> Result<String, SyntaxError> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.error("Expected identifier")),
        }
    }

    fn advance(&mut self) -> Result<(), SyntaxError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool, SyntaxError> {
        if &self.current.kind == kind {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), SyntaxError> {
        if self.eat(kind)? {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {:?}", kind)))
        }
    }

    fn error(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message, self.current.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> IckleQuery {
        Parser::new(input).unwrap().parse().unwrap()
    }

    #[test]
    fn test_parse_from_only() {
        let query = parse("FROM tutorial.Person g0");
        assert_eq!(query.entity, "tutorial.Person");
        assert_eq!(query.alias, "g0");
        assert!(query.filter.is_none());
    }

    #[test]
    fn test_parse_where_precedence() {
        let query = parse("FROM t.P g0 WHERE g0.a = 1 OR g0.b > 2 AND NOT g0.c IS NULL");
        match query.filter.unwrap() {
            Condition::Or(left, right) => {
                assert!(matches!(*left, Condition::Compare { op: CompareOp::Eq, .. }));
                match *right {
                    Condition::And(_, not) => assert!(matches!(*not, Condition::Not(_))),
                    other => panic!("expected And, got {other:?}"),
                }
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_nested_path_and_membership() {
        let query = parse("FROM t.P g0 WHERE (g0.phones.number NOT IN ('1', '2') AND g0.name LIKE 'A%')");
        match query.filter.unwrap() {
            Condition::And(left, right) => {
                match *left {
                    Condition::In { path, values, negated } => {
                        assert_eq!(path.to_string(), "phones.number");
                        assert_eq!(values.len(), 2);
                        assert!(negated);
                    }
                    other => panic!("expected In, got {other:?}"),
                }
                assert!(matches!(*right, Condition::Like { negated: false, .. }));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Parser::new("SELECT * FROM x").unwrap().parse().is_err());
        assert!(Parser::new("FROM t.P g0 WHERE g1.a = 1").unwrap().parse().is_err());
        assert!(Parser::new("FROM t.P g0 WHERE g0.a = ").unwrap().parse().is_err());
        assert!(Parser::new("FROM t.P g0 trailing").unwrap().parse().is_err());
    }
}
