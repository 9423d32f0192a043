//! Store-side evaluation of Ickle conditions over decoded documents.
//!
//! Paths fan out through repeated fields: a predicate on `phones.number`
//! holds for a document when it holds for any reachable value. Missing values
//! compare as NULL, with SQL three-valued logic.

use std::cmp::Ordering;

use docbridge_common::types::Value;
use docbridge_core::document::{Document, Field, Message};
use docbridge_core::execution::{CompareOp, LikePattern};
use docbridge_core::schema::{FieldId, TableShape};

use crate::query::ickle::{Condition, PropertyPath};

/// Condition compiled against one document shape.
#[derive(Debug)]
pub(crate) enum Matcher {
    Compare {
        path: Vec<FieldId>,
        op: CompareOp,
        value: Value,
    },
    In {
        path: Vec<FieldId>,
        values: Vec<Value>,
        negated: bool,
    },
    Like {
        path: Vec<FieldId>,
        pattern: LikePattern,
        negated: bool,
    },
    IsNull {
        path: Vec<FieldId>,
        negated: bool,
    },
    And(Box<Matcher>, Box<Matcher>),
    Or(Box<Matcher>, Box<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    /// Resolves every property path of `condition` against `shape`.
    pub(crate) fn compile(shape: &TableShape, condition: &Condition) -> Result<Self, String> {
        Ok(match condition {
            Condition::Compare { path, op, value } => Self::Compare {
                path: resolve(shape, path)?,
                op: *op,
                value: value.clone(),
            },
            Condition::In {
                path,
                values,
                negated,
            } => Self::In {
                path: resolve(shape, path)?,
                values: values.clone(),
                negated: *negated,
            },
            Condition::Like {
                path,
                pattern,
                negated,
            } => Self::Like {
                path: resolve(shape, path)?,
                pattern: LikePattern::new(pattern).map_err(|e| e.to_string())?,
                negated: *negated,
            },
            Condition::IsNull { path, negated } => Self::IsNull {
                path: resolve(shape, path)?,
                negated: *negated,
            },
            Condition::And(l, r) => Self::And(
                Box::new(Self::compile(shape, l)?),
                Box::new(Self::compile(shape, r)?),
            ),
            Condition::Or(l, r) => Self::Or(
                Box::new(Self::compile(shape, l)?),
                Box::new(Self::compile(shape, r)?),
            ),
            Condition::Not(inner) => Self::Not(Box::new(Self::compile(shape, inner)?)),
        })
    }

    /// Returns true when the document satisfies the condition.
    pub(crate) fn matches(&self, document: &Document) -> bool {
        self.eval(document) == Some(true)
    }

    fn eval(&self, document: &Document) -> Option<bool> {
        match self {
            Self::Compare { path, op, value } => {
                any(document, path, |v| v.sql_cmp(value).map(|o| op.test(o)))
            }
            Self::In {
                path,
                values,
                negated,
            } => any(document, path, |v| {
                if v.is_null() {
                    return None;
                }
                let hit = values.iter().any(|c| v.sql_cmp(c) == Some(Ordering::Equal));
                Some(hit != *negated)
            }),
            Self::Like {
                path,
                pattern,
                negated,
            } => any(document, path, |v| match v {
                Value::Null => None,
                Value::String(s) => Some(pattern.is_match(s) != *negated),
                other => Some(pattern.is_match(&other.to_string()) != *negated),
            }),
            Self::IsNull { path, negated } => any(document, path, |v| Some(v.is_null() != *negated)),
            Self::And(l, r) => match (l.eval(document), r.eval(document)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Self::Or(l, r) => match (l.eval(document), r.eval(document)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Self::Not(inner) => inner.eval(document).map(|b| !b),
        }
    }
}

fn resolve(shape: &TableShape, path: &PropertyPath) -> Result<Vec<FieldId>, String> {
    let mut node = shape.root();
    let mut ids = Vec::with_capacity(path.0.len());
    for segment in &path.0 {
        node = shape
            .node(node)
            .children
            .iter()
            .copied()
            .find(|c| shape.node(*c).name == *segment)
            .ok_or_else(|| format!("unknown property {path} of {}", shape.document_type()))?;
        ids.push(node);
    }
    if shape.node(node).is_message() {
        return Err(format!("property {path} is not a scalar"));
    }
    Ok(ids)
}

/// Existential three-valued OR of `test` over every value reachable by `path`.
fn any(document: &Document, path: &[FieldId], test: impl Fn(&Value) -> Option<bool>) -> Option<bool> {
    let mut values = Vec::new();
    collect(document.root(), path, &mut values);
    if values.is_empty() {
        return test(&Value::Null);
    }
    let mut unknown = false;
    for value in values {
        match test(value) {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    if unknown { None } else { Some(false) }
}

fn collect<'d>(message: &'d Message, path: &[FieldId], out: &mut Vec<&'d Value>) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    for field in message.get(*head) {
        match field {
            Field::Scalar(value) if rest.is_empty() => out.push(value),
            Field::Message(inner) => collect(inner, rest, out),
            Field::Scalar(_) => {}
        }
    }
}
