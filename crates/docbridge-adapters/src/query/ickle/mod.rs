//! Ickle query language support.
//!
//! Parses the subset of Ickle the translator emits:
//!
//! ```text
//! FROM <entity> <alias> [WHERE <condition>]
//! condition := condition OR condition | condition AND condition
//!            | NOT condition | ( condition )
//!            | path (= | != | <> | < | <= | > | >=) literal
//!            | path [NOT] IN ( literal, ... ) | path [NOT] LIKE 'pattern'
//!            | path IS [NOT] NULL
//! ```

pub mod ast;
mod lexer;
mod parser;

pub use ast::{Condition, IckleQuery, PropertyPath};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

use thiserror::Error;

/// A malformed Ickle query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at offset {position}: {message}")]
pub struct SyntaxError {
    /// What went wrong.
    pub message: String,
    /// Byte offset of the offending token.
    pub position: usize,
}

impl SyntaxError {
    /// Creates a syntax error.
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Parses an Ickle query string.
pub fn parse(query: &str) -> Result<IckleQuery, SyntaxError> {
    Parser::new(query)?.parse()
}
