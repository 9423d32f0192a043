//! Ickle Abstract Syntax Tree.

use std::fmt;

use docbridge_common::types::Value;
use docbridge_core::execution::CompareOp;

/// A parsed `FROM <entity> <alias> [WHERE <condition>]` query.
#[derive(Debug, Clone, PartialEq)]
pub struct IckleQuery {
    /// Fully qualified document type.
    pub entity: String,
    /// Alias the condition refers to properties through.
    pub alias: String,
    /// Optional WHERE condition.
    pub filter: Option<Condition>,
}

/// A property path below the query alias, like `phones.number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath(pub Vec<String>);

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `path <op> literal`.
    Compare {
        /// Property compared.
        path: PropertyPath,
        /// Operator.
        op: CompareOp,
        /// Literal operand.
        value: Value,
    },
    /// `path [NOT] IN (literal, ...)`.
    In {
        /// Property tested.
        path: PropertyPath,
        /// Candidate literals.
        values: Vec<Value>,
        /// `NOT IN`.
        negated: bool,
    },
    /// `path [NOT] LIKE 'pattern'`.
    Like {
        /// Property tested.
        path: PropertyPath,
        /// SQL pattern.
        pattern: String,
        /// `NOT LIKE`.
        negated: bool,
    },
    /// `path IS [NOT] NULL`.
    IsNull {
        /// Property tested.
        path: PropertyPath,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// Conjunction.
    And(Box<Condition>, Box<Condition>),
    /// Disjunction.
    Or(Box<Condition>, Box<Condition>),
    /// Negation.
    Not(Box<Condition>),
}
