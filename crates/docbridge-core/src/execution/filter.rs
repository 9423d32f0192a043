//! Residual document filter.
//!
//! Predicates the native query language cannot express are evaluated here,
//! once per candidate row, with SQL three-valued logic: a comparison involving
//! NULL is UNKNOWN, and a row is kept only when the whole predicate is TRUE.

use std::cmp::Ordering;

use docbridge_common::types::Value;
use regex::Regex;
use smallvec::SmallVec;

use crate::schema::FieldId;

/// Source of field values for one candidate row.
pub trait FieldSource {
    /// Returns the value of a leaf field for this row, NULL when absent.
    fn value(&self, field: FieldId) -> Value;

    /// Evaluates one predicate leaf reading `fields`.
    ///
    /// A row that leaves some repeated element on the path to `fields`
    /// unbound runs `test` once per element and ORs the outcomes: TRUE if any
    /// element passes, else UNKNOWN if any was UNKNOWN, else FALSE. With no
    /// elements the fields read as NULL.
    fn any_element(
        &self,
        _fields: &[FieldId],
        test: &mut dyn FnMut(&dyn Fn(FieldId) -> Value) -> Option<bool>,
    ) -> Option<bool> {
        test(&|field| self.value(field))
    }
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    /// Returns the operator with its operands swapped (`a < b` ⇔ `b > a`).
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Returns the textual operator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Returns whether an ordering of left against right satisfies the operator.
    #[must_use]
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// An arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Mod,
}

impl ArithmeticOp {
    fn apply(self, left: &Value, right: &Value) -> Value {
        match (left, right) {
            (Value::Int64(a), Value::Int64(b)) => {
                let result = match self {
                    Self::Add => a.checked_add(*b),
                    Self::Sub => a.checked_sub(*b),
                    Self::Mul => a.checked_mul(*b),
                    Self::Div => a.checked_div(*b),
                    Self::Mod => a.checked_rem(*b),
                };
                result.map_or(Value::Null, Value::Int64)
            }
            _ => match (left.as_float64(), right.as_float64()) {
                (Some(a), Some(b)) => {
                    let result = match self {
                        Self::Add => a + b,
                        Self::Sub => a - b,
                        Self::Mul => a * b,
                        Self::Div if b == 0.0 => return Value::Null,
                        Self::Div => a / b,
                        Self::Mod if b == 0.0 => return Value::Null,
                        Self::Mod => a % b,
                    };
                    Value::Float64(result)
                }
                _ => Value::Null,
            },
        }
    }
}

/// A value-producing operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A document field.
    Field(FieldId),
    /// A constant.
    Literal(Value),
    /// Arithmetic over two operands.
    Arithmetic {
        /// Left operand.
        left: Box<Operand>,
        /// Operator.
        op: ArithmeticOp,
        /// Right operand.
        right: Box<Operand>,
    },
}

impl Operand {
    fn eval(&self, get: &dyn Fn(FieldId) -> Value) -> Value {
        match self {
            Self::Field(field) => get(*field),
            Self::Literal(value) => value.clone(),
            Self::Arithmetic { left, op, right } => op.apply(&left.eval(get), &right.eval(get)),
        }
    }

    fn collect_fields(&self, out: &mut SmallVec<[FieldId; 8]>) {
        match self {
            Self::Field(field) => {
                if !out.contains(field) {
                    out.push(*field);
                }
            }
            Self::Literal(_) => {}
            Self::Arithmetic { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
        }
    }
}

/// A compiled SQL `LIKE` pattern.
#[derive(Debug, Clone)]
pub struct LikePattern {
    pattern: String,
    regex: Regex,
}

impl LikePattern {
    /// Compiles a pattern where `%` matches any run and `_` any one character.
    ///
    /// # Errors
    ///
    /// Returns the regex error if the translated pattern fails to compile.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push_str("(?s)^");
        for ch in pattern.chars() {
            match ch {
                '%' => translated.push_str(".*"),
                '_' => translated.push('.'),
                other => translated.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        translated.push('$');
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&translated)?,
        })
    }

    /// Returns the original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Returns whether the whole of `text` matches.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for LikePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// A residual predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Binary comparison.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// Membership in a literal list.
    In {
        /// Tested operand.
        operand: Operand,
        /// Candidate values.
        list: Vec<Value>,
        /// `NOT IN`.
        negated: bool,
    },
    /// Pattern match.
    Like {
        /// Tested operand.
        operand: Operand,
        /// Pattern.
        pattern: LikePattern,
        /// `NOT LIKE`.
        negated: bool,
    },
    /// NULL test.
    IsNull {
        /// Tested operand.
        operand: Operand,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// Conjunction.
    And(Vec<FilterExpr>),
    /// Disjunction.
    Or(Vec<FilterExpr>),
    /// Negation.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Evaluates the predicate; `None` is UNKNOWN.
    pub fn evaluate(&self, row: &dyn FieldSource) -> Option<bool> {
        match self {
            Self::Compare { left, op, right } => self.leaf(row, &mut |get| {
                let ordering = left.eval(get).sql_cmp(&right.eval(get))?;
                Some(op.test(ordering))
            }),
            Self::In {
                operand,
                list,
                negated,
            } => self.leaf(row, &mut |get| {
                let value = operand.eval(get);
                if value.is_null() {
                    return None;
                }
                let mut saw_null = false;
                for candidate in list {
                    match value.sql_cmp(candidate) {
                        Some(Ordering::Equal) => return Some(!negated),
                        None if candidate.is_null() => saw_null = true,
                        _ => {}
                    }
                }
                if saw_null { None } else { Some(*negated) }
            }),
            Self::Like {
                operand,
                pattern,
                negated,
            } => self.leaf(row, &mut |get| match operand.eval(get) {
                Value::Null => None,
                Value::String(text) => Some(pattern.is_match(&text) != *negated),
                other => Some(pattern.is_match(&other.to_string()) != *negated),
            }),
            Self::IsNull { operand, negated } => {
                self.leaf(row, &mut |get| Some(operand.eval(get).is_null() != *negated))
            }
            Self::And(items) => {
                let mut unknown = false;
                for item in items {
                    match item.evaluate(row) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Self::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match item.evaluate(row) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Self::Not(inner) => inner.evaluate(row).map(|b| !b),
        }
    }

    fn leaf(
        &self,
        row: &dyn FieldSource,
        test: &mut dyn FnMut(&dyn Fn(FieldId) -> Value) -> Option<bool>,
    ) -> Option<bool> {
        let mut fields = SmallVec::new();
        self.collect_fields(&mut fields);
        row.any_element(&fields, test)
    }

    /// Collects every field referenced by the predicate.
    pub fn collect_fields(&self, out: &mut SmallVec<[FieldId; 8]>) {
        match self {
            Self::Compare { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Self::In { operand, .. } | Self::Like { operand, .. } | Self::IsNull { operand, .. } => {
                operand.collect_fields(out);
            }
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Combines predicates with AND, flattening nested conjunctions.
    #[must_use]
    pub fn and_all(items: Vec<FilterExpr>) -> Option<FilterExpr> {
        let mut flat = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Self::And(flat)),
        }
    }
}

/// The residual part of a query filter, evaluated client-side.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualFilter {
    expr: FilterExpr,
    fields: SmallVec<[FieldId; 8]>,
}

impl ResidualFilter {
    /// Wraps a predicate tree.
    #[must_use]
    pub fn new(expr: FilterExpr) -> Self {
        let mut fields = SmallVec::new();
        expr.collect_fields(&mut fields);
        Self { expr, fields }
    }

    /// Returns the predicate tree.
    #[must_use]
    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    /// Returns the fields the predicate reads.
    #[must_use]
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Returns true when the row satisfies the predicate (UNKNOWN drops).
    pub fn keep(&self, row: &dyn FieldSource) -> bool {
        self.expr.evaluate(row) == Some(true)
    }
}
