//! Filter split between the remote store and the client.
//!
//! Every node of the relational filter is visited bottom-up and yields a
//! native fragment (rendered into the Ickle `WHERE` clause), a residual
//! fragment (evaluated per row by the marshaller), or both. The native part
//! may over-match but never under-match; the residual part restores the exact
//! result.
//!
//! Leaves on fields inside repeated groups are the delicate case: the store
//! matches a document when any element satisfies the predicate, while rows
//! are produced per element. Such leaves are pushed only when that existential
//! match is a superset (`=`, ranges, `IN`, `LIKE`), and always stay residual.

use std::fmt;

use docbridge_common::types::{ColumnType, Value};
use docbridge_common::utils::error::TranslationError;
use docbridge_core::execution::{ArithmeticOp, CompareOp, FilterExpr, LikePattern, Operand};
use docbridge_core::schema::{FieldId, ShapeColumn};

use super::binder::Bindings;
use super::plan::{BinaryOp, Expression, UnaryOp};

/// Alias of the queried entity in emitted queries.
pub const ENTITY_ALIAS: &str = "g0";

/// A predicate the remote store evaluates.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeExpr {
    /// `path op literal`.
    Compare {
        /// Dotted field path below the entity.
        path: String,
        /// Operator.
        op: CompareOp,
        /// Literal.
        value: Value,
    },
    /// `path [NOT] IN (literals)`.
    In {
        /// Dotted field path.
        path: String,
        /// Candidates.
        values: Vec<Value>,
        /// `NOT IN`.
        negated: bool,
    },
    /// `path [NOT] LIKE 'pattern'`.
    Like {
        /// Dotted field path.
        path: String,
        /// Pattern.
        pattern: String,
        /// `NOT LIKE`.
        negated: bool,
    },
    /// `path IS [NOT] NULL`.
    IsNull {
        /// Dotted field path.
        path: String,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// Conjunction.
    And(Vec<NativeExpr>),
    /// Disjunction.
    Or(Vec<NativeExpr>),
    /// Negation.
    Not(Box<NativeExpr>),
}

impl NativeExpr {
    fn and(left: Option<Self>, right: Option<Self>) -> Option<Self> {
        Self::combine(left, right, Self::And, |e| match e {
            Self::And(items) => Ok(items),
            other => Err(other),
        })
    }

    fn or(left: Self, right: Self) -> Self {
        Self::combine(Some(left), Some(right), Self::Or, |e| match e {
            Self::Or(items) => Ok(items),
            other => Err(other),
        })
        .unwrap_or_else(|| Self::Or(Vec::new()))
    }

    fn combine(
        left: Option<Self>,
        right: Option<Self>,
        wrap: fn(Vec<Self>) -> Self,
        flatten: fn(Self) -> Result<Vec<Self>, Self>,
    ) -> Option<Self> {
        match (left, right) {
            (None, None) => None,
            (Some(one), None) | (None, Some(one)) => Some(one),
            (Some(left), Some(right)) => {
                let mut items = Vec::new();
                for side in [left, right] {
                    match flatten(side) {
                        Ok(inner) => items.extend(inner),
                        Err(single) => items.push(single),
                    }
                }
                Some(wrap(items))
            }
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(_) | Self::Or(_) => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for NativeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { path, op, value } => {
                write!(f, "{ENTITY_ALIAS}.{path} {} ", op.symbol())?;
                write_literal(f, value)
            }
            Self::In {
                path,
                values,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{ENTITY_ALIAS}.{path} {not}IN (")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                f.write_str(")")
            }
            Self::Like {
                path,
                pattern,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{ENTITY_ALIAS}.{path} {not}LIKE ")?;
                write_quoted(f, pattern)
            }
            Self::IsNull { path, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{ENTITY_ALIAS}.{path} IS {not}NULL")
            }
            Self::And(items) | Self::Or(items) => {
                let joiner = if matches!(self, Self::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    item.write_operand(f)?;
                }
                Ok(())
            }
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "'{}'", text.replace('\'', "''"))
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write_quoted(f, s),
        Value::Float64(v) => write!(f, "{v:?}"),
        other => write!(f, "{other}"),
    }
}

/// Whether the store can receive a literal.
fn is_native_literal(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bytes(_) | Value::UInt64(_) => false,
        Value::Float64(v) => v.is_finite(),
        _ => true,
    }
}

/// The outcome of splitting one filter node.
#[derive(Debug, Clone)]
pub struct Split {
    /// Fragment pushed to the store.
    pub native: Option<NativeExpr>,
    /// Fragment evaluated per row.
    pub residual: Option<FilterExpr>,
    /// The whole node in residual form.
    full: FilterExpr,
}

impl Split {
    fn exact(native: NativeExpr, full: FilterExpr) -> Self {
        Self {
            native: Some(native),
            residual: None,
            full,
        }
    }

    fn superset(native: NativeExpr, full: FilterExpr) -> Self {
        Self {
            native: Some(native),
            residual: Some(full.clone()),
            full,
        }
    }

    fn residual_only(full: FilterExpr) -> Self {
        Self {
            native: None,
            residual: Some(full.clone()),
            full,
        }
    }
}

/// Splits a filter expression against bound tables.
pub struct FilterSplitter<'a> {
    bindings: &'a Bindings,
}

impl<'a> FilterSplitter<'a> {
    /// Creates a splitter.
    #[must_use]
    pub fn new(bindings: &'a Bindings) -> Self {
        Self { bindings }
    }

    /// Splits a predicate into its native and residual parts.
    ///
    /// # Errors
    ///
    /// Fails on unknown columns and on expressions that are not predicates.
    pub fn split(&self, expr: &Expression) -> Result<Split, TranslationError> {
        match expr {
            Expression::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let left = self.split(left)?;
                let right = self.split(right)?;
                let residual = match (left.residual, right.residual) {
                    (None, None) => None,
                    (Some(one), None) | (None, Some(one)) => Some(one),
                    (Some(l), Some(r)) => FilterExpr::and_all(vec![l, r]),
                };
                Ok(Split {
                    native: NativeExpr::and(left.native, right.native),
                    residual,
                    full: FilterExpr::and_all(vec![left.full, right.full])
                        .unwrap_or_else(|| FilterExpr::And(Vec::new())),
                })
            }
            Expression::Binary {
                left,
                op: BinaryOp::Or,
                right,
            } => {
                let left = self.split(left)?;
                let right = self.split(right)?;
                let full = or_all(left.full.clone(), right.full.clone());
                match (left.native, right.native) {
                    (Some(l), Some(r)) if left.residual.is_none() && right.residual.is_none() => {
                        Ok(Split::exact(NativeExpr::or(l, r), full))
                    }
                    (Some(l), Some(r)) => Ok(Split::superset(NativeExpr::or(l, r), full)),
                    _ => Ok(Split::residual_only(full)),
                }
            }
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let inner = self.split(operand)?;
                let full = FilterExpr::Not(Box::new(inner.full.clone()));
                // Exact fragments never touch repeated fields: those leaves
                // always keep a residual.
                match inner.native {
                    Some(native) if inner.residual.is_none() => {
                        Ok(Split::exact(NativeExpr::Not(Box::new(native)), full))
                    }
                    _ => Ok(Split::residual_only(full)),
                }
            }
            Expression::Unary {
                op: op @ (UnaryOp::IsNull | UnaryOp::IsNotNull),
                operand,
            } => self.split_is_null(operand, *op == UnaryOp::IsNotNull),
            Expression::Binary { left, op, right } => match compare_op(*op) {
                Some(op) => self.split_compare(left, op, right),
                None => Err(TranslationError::UnsupportedExpression(format!(
                    "{op:?} is not a predicate"
                ))),
            },
            Expression::In {
                expr,
                list,
                negated,
            } => self.split_in(expr, list, *negated),
            Expression::Like {
                expr,
                pattern,
                negated,
            } => self.split_like(expr, pattern, *negated),
            Expression::Column(_) => {
                self.split_compare(expr, CompareOp::Eq, &Expression::Literal(Value::Bool(true)))
            }
            Expression::Literal(value) => Ok(Split::residual_only(FilterExpr::Compare {
                left: Operand::Literal(value.clone()),
                op: CompareOp::Eq,
                right: Operand::Literal(Value::Bool(true)),
            })),
            Expression::Unary { op, .. } => Err(TranslationError::UnsupportedExpression(format!(
                "{op:?} is not a predicate"
            ))),
        }
    }

    fn split_compare(
        &self,
        left: &Expression,
        op: CompareOp,
        right: &Expression,
    ) -> Result<Split, TranslationError> {
        let left_operand = self.operand(left)?;
        let right_operand = self.operand(right)?;
        let full = FilterExpr::Compare {
            left: left_operand.clone(),
            op,
            right: right_operand.clone(),
        };

        // Normalise to `field op literal`.
        let (field, op, value) = match (left_operand, right_operand) {
            (Operand::Field(field), Operand::Literal(value)) => (field, op, value),
            (Operand::Literal(value), Operand::Field(field)) => (field, op.flip(), value),
            _ => return Ok(Split::residual_only(full)),
        };
        let column = self.column_of(field)?;
        if !column.searchable || !is_native_literal(&value) {
            return Ok(Split::residual_only(full));
        }

        let native = NativeExpr::Compare {
            path: self.path(field),
            op,
            value,
        };
        if !self.is_repeated(field) {
            Ok(Split::exact(native, full))
        } else if op == CompareOp::Ne {
            Ok(Split::residual_only(full))
        } else {
            Ok(Split::superset(native, full))
        }
    }

    fn split_in(
        &self,
        expr: &Expression,
        list: &[Value],
        negated: bool,
    ) -> Result<Split, TranslationError> {
        let operand = self.operand(expr)?;
        let full = FilterExpr::In {
            operand: operand.clone(),
            list: list.to_vec(),
            negated,
        };
        let Operand::Field(field) = operand else {
            return Ok(Split::residual_only(full));
        };
        let column = self.column_of(field)?;
        if !column.searchable || list.is_empty() || !list.iter().all(is_native_literal) {
            return Ok(Split::residual_only(full));
        }

        let native = NativeExpr::In {
            path: self.path(field),
            values: list.to_vec(),
            negated,
        };
        if !self.is_repeated(field) {
            Ok(Split::exact(native, full))
        } else if negated {
            Ok(Split::residual_only(full))
        } else {
            Ok(Split::superset(native, full))
        }
    }

    fn split_like(
        &self,
        expr: &Expression,
        pattern: &str,
        negated: bool,
    ) -> Result<Split, TranslationError> {
        let compiled = LikePattern::new(pattern).map_err(|e| {
            TranslationError::UnsupportedExpression(format!("LIKE pattern {pattern}: {e}"))
        })?;
        let operand = self.operand(expr)?;
        let full = FilterExpr::Like {
            operand: operand.clone(),
            pattern: compiled,
            negated,
        };
        let Operand::Field(field) = operand else {
            return Ok(Split::residual_only(full));
        };
        let column = self.column_of(field)?;
        // The store only matches patterns against text.
        if !column.searchable || !matches!(column.column_type, ColumnType::String) {
            return Ok(Split::residual_only(full));
        }

        let native = NativeExpr::Like {
            path: self.path(field),
            pattern: pattern.to_string(),
            negated,
        };
        if !self.is_repeated(field) {
            Ok(Split::exact(native, full))
        } else if negated {
            Ok(Split::residual_only(full))
        } else {
            Ok(Split::superset(native, full))
        }
    }

    fn split_is_null(&self, expr: &Expression, negated: bool) -> Result<Split, TranslationError> {
        let operand = self.operand(expr)?;
        let full = FilterExpr::IsNull {
            operand: operand.clone(),
            negated,
        };
        let Operand::Field(field) = operand else {
            return Ok(Split::residual_only(full));
        };
        let column = self.column_of(field)?;
        if !column.searchable || self.is_repeated(field) {
            return Ok(Split::residual_only(full));
        }
        Ok(Split::exact(
            NativeExpr::IsNull {
                path: self.path(field),
                negated,
            },
            full,
        ))
    }

    fn operand(&self, expr: &Expression) -> Result<Operand, TranslationError> {
        match expr {
            Expression::Column(column) => Ok(Operand::Field(self.bindings.column(column)?.field)),
            Expression::Literal(value) => Ok(Operand::Literal(value.clone())),
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match self.operand(operand)? {
                Operand::Literal(value) => Ok(Operand::Literal(negate(&value))),
                other => Ok(Operand::Arithmetic {
                    left: Box::new(Operand::Literal(Value::Int64(0))),
                    op: ArithmeticOp::Sub,
                    right: Box::new(other),
                }),
            },
            Expression::Binary { left, op, right } => match arithmetic_op(*op) {
                Some(op) => Ok(Operand::Arithmetic {
                    left: Box::new(self.operand(left)?),
                    op,
                    right: Box::new(self.operand(right)?),
                }),
                None => Err(TranslationError::UnsupportedExpression(format!(
                    "{op:?} cannot be used as a value"
                ))),
            },
            other => Err(TranslationError::UnsupportedExpression(format!(
                "{other:?} cannot be used as a value"
            ))),
        }
    }

    fn column_of(&self, field: FieldId) -> Result<&ShapeColumn, TranslationError> {
        self.bindings
            .shape()
            .column_for_field(field)
            .ok_or_else(|| TranslationError::UnsupportedExpression(format!("field {field}")))
    }

    fn path(&self, field: FieldId) -> String {
        self.bindings.shape().path(field)
    }

    fn is_repeated(&self, field: FieldId) -> bool {
        self.bindings.shape().is_under_repeated(field)
    }
}

fn or_all(left: FilterExpr, right: FilterExpr) -> FilterExpr {
    let mut items = Vec::new();
    for side in [left, right] {
        match side {
            FilterExpr::Or(inner) => items.extend(inner),
            other => items.push(other),
        }
    }
    FilterExpr::Or(items)
}

fn negate(value: &Value) -> Value {
    match value {
        Value::Int64(i) => i.checked_neg().map_or(Value::Null, Value::Int64),
        Value::UInt64(u) => 0i64.checked_sub_unsigned(*u).map_or(Value::Null, Value::Int64),
        Value::Float64(f) => Value::Float64(-f),
        _ => Value::Null,
    }
}

fn compare_op(op: BinaryOp) -> Option<CompareOp> {
    match op {
        BinaryOp::Eq => Some(CompareOp::Eq),
        BinaryOp::Ne => Some(CompareOp::Ne),
        BinaryOp::Lt => Some(CompareOp::Lt),
        BinaryOp::Le => Some(CompareOp::Le),
        BinaryOp::Gt => Some(CompareOp::Gt),
        BinaryOp::Ge => Some(CompareOp::Ge),
        _ => None,
    }
}

fn arithmetic_op(op: BinaryOp) -> Option<ArithmeticOp> {
    match op {
        BinaryOp::Add => Some(ArithmeticOp::Add),
        BinaryOp::Sub => Some(ArithmeticOp::Sub),
        BinaryOp::Mul => Some(ArithmeticOp::Mul),
        BinaryOp::Div => Some(ArithmeticOp::Div),
        BinaryOp::Mod => Some(ArithmeticOp::Mod),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alias::AliasResolver;
    use crate::execution::ExecutionContext;
    use crate::query::binder::Binder;
    use crate::query::plan::{RelationalQuery, TableRef};
    use docbridge_core::schema::{Column, Schema, Table};

    fn bindings() -> Bindings {
        let schema = Schema::new()
            .with_table(
                Table::root("Person", "tutorial.Person")
                    .with_column(Column::new("id", 1, ColumnType::Int32))
                    .with_column(Column::new("name", 2, ColumnType::String))
                    .with_column(Column::new("bio", 3, ColumnType::String).not_searchable())
                    .with_column(Column::new("score", 6, ColumnType::Double)),
            )
            .with_table(
                Table::nested("Phone", "tutorial.PhoneNumber", "Person", "phones", 4, true)
                    .with_column(Column::new("number", 1, ColumnType::String))
                    .with_column(Column::new("kind", 2, ColumnType::Enum)),
            );
        let resolver = AliasResolver::new(Arc::new(schema));
        let ctx = ExecutionContext::default();
        let query = RelationalQuery::select_from(TableRef::aliased("Person", "p"))
            .join(TableRef::aliased("Phone", "ph"));
        Binder::new(&resolver, &ctx).bind(&query).unwrap()
    }

    fn col(name: &str) -> Expression {
        Expression::column(name)
    }

    fn lit(value: impl Into<Value>) -> Expression {
        Expression::literal(value)
    }

    fn cmp(left: Expression, op: BinaryOp, right: Expression) -> Expression {
        Expression::binary(left, op, right)
    }

    fn split_of(expr: &Expression) -> Split {
        FilterSplitter::new(&bindings()).split(expr).unwrap()
    }

    fn native(expr: &Expression) -> Option<String> {
        split_of(expr).native.map(|n| n.to_string())
    }

    #[test]
    fn test_native_only_conjunction() {
        let expr = cmp(col("name"), BinaryOp::Eq, lit("O'Brien"))
            .and(cmp(col("id"), BinaryOp::Ge, lit(3)));
        let split = split_of(&expr);
        assert!(split.residual.is_none());
        assert_eq!(
            split.native.unwrap().to_string(),
            "g0.name = 'O''Brien' AND g0.id >= 3"
        );
    }

    #[test]
    fn test_literal_on_left_is_flipped() {
        let expr = cmp(lit(10), BinaryOp::Lt, col("id"));
        assert_eq!(native(&expr).unwrap(), "g0.id > 10");
    }

    #[test]
    fn test_float_and_negated_literals() {
        let expr = cmp(
            col("score"),
            BinaryOp::Gt,
            Expression::unary(UnaryOp::Neg, lit(2.0)),
        );
        assert_eq!(native(&expr).unwrap(), "g0.score > -2.0");
    }

    #[test]
    fn test_residual_only_constructs() {
        for expr in [
            cmp(col("bio"), BinaryOp::Eq, lit("x")),
            cmp(col("id"), BinaryOp::Eq, col("score")),
            cmp(
                Expression::binary(col("id"), BinaryOp::Add, lit(1)),
                BinaryOp::Gt,
                lit(3),
            ),
            cmp(col("id"), BinaryOp::Eq, Expression::Literal(Value::Null)),
            cmp(col("score"), BinaryOp::Lt, lit(f64::NAN)),
            cmp(col("id"), BinaryOp::Lt, lit(u64::MAX)),
            col("id").in_list(vec![Value::Int64(1), Value::Null], false),
            col("id").in_list(Vec::new(), false),
            col("id").like("1%", false),
        ] {
            let split = split_of(&expr);
            assert!(split.native.is_none(), "{expr:?}");
            assert!(split.residual.is_some(), "{expr:?}");
        }
    }

    #[test]
    fn test_repeated_leaves_keep_residual() {
        let monotone = cmp(col("number"), BinaryOp::Eq, lit("555"));
        let split = split_of(&monotone);
        assert_eq!(split.native.unwrap().to_string(), "g0.phones.number = '555'");
        assert!(split.residual.is_some());

        let not_equal = cmp(col("number"), BinaryOp::Ne, lit("555"));
        let split = split_of(&not_equal);
        assert!(split.native.is_none());
        assert!(split.residual.is_some());

        let like = col("number").like("555%", false);
        assert!(split_of(&like).native.is_some());
        assert!(split_of(&like).residual.is_some());
        assert!(split_of(&col("number").like("555%", true)).native.is_none());
        assert!(
            split_of(&Expression::unary(UnaryOp::IsNull, col("number")))
                .native
                .is_none()
        );
    }

    #[test]
    fn test_and_mixes_native_and_residual() {
        let expr = cmp(col("id"), BinaryOp::Eq, lit(1))
            .and(cmp(col("bio"), BinaryOp::Eq, lit("x")));
        let split = split_of(&expr);
        assert_eq!(split.native.unwrap().to_string(), "g0.id = 1");
        assert!(matches!(split.residual, Some(FilterExpr::Compare { .. })));
    }

    #[test]
    fn test_or_rules() {
        let exact = cmp(col("id"), BinaryOp::Eq, lit(1)).or(cmp(col("id"), BinaryOp::Eq, lit(2)));
        let split = split_of(&exact);
        assert_eq!(split.native.unwrap().to_string(), "g0.id = 1 OR g0.id = 2");
        assert!(split.residual.is_none());

        let superset = cmp(col("id"), BinaryOp::Eq, lit(1))
            .or(cmp(col("number"), BinaryOp::Eq, lit("555")));
        let split = split_of(&superset);
        assert_eq!(
            split.native.unwrap().to_string(),
            "g0.id = 1 OR g0.phones.number = '555'"
        );
        assert!(matches!(split.residual, Some(FilterExpr::Or(ref items)) if items.len() == 2));

        let residual = cmp(col("id"), BinaryOp::Eq, lit(1)).or(cmp(col("bio"), BinaryOp::Eq, lit("x")));
        let split = split_of(&residual);
        assert!(split.native.is_none());
        assert!(matches!(split.residual, Some(FilterExpr::Or(_))));
    }

    #[test]
    fn test_not_rules() {
        let exact = cmp(col("id"), BinaryOp::Eq, lit(1))
            .or(cmp(col("id"), BinaryOp::Eq, lit(2)))
            .negate();
        assert_eq!(native(&exact).unwrap(), "NOT (g0.id = 1 OR g0.id = 2)");

        let repeated = cmp(col("number"), BinaryOp::Eq, lit("555")).negate();
        let split = split_of(&repeated);
        assert!(split.native.is_none());
        assert!(matches!(split.residual, Some(FilterExpr::Not(_))));
    }

    #[test]
    fn test_nested_groups_are_parenthesised() {
        let expr = cmp(col("id"), BinaryOp::Eq, lit(1))
            .or(cmp(col("id"), BinaryOp::Eq, lit(2)))
            .and(col("name").in_list(vec!["a".into(), "b".into()], true));
        assert_eq!(
            native(&expr).unwrap(),
            "(g0.id = 1 OR g0.id = 2) AND g0.name NOT IN ('a', 'b')"
        );
    }

    #[test]
    fn test_is_null_is_native() {
        let expr = Expression::unary(UnaryOp::IsNotNull, col("name"));
        assert_eq!(native(&expr).unwrap(), "g0.name IS NOT NULL");
    }

    #[test]
    fn test_errors() {
        let splitter_bindings = bindings();
        let splitter = FilterSplitter::new(&splitter_bindings);
        assert!(matches!(
            splitter.split(&cmp(col("missing"), BinaryOp::Eq, lit(1))),
            Err(TranslationError::UnknownColumn { .. })
        ));
        assert!(matches!(
            splitter.split(&Expression::binary(col("id"), BinaryOp::Add, lit(1))),
            Err(TranslationError::UnsupportedExpression(_))
        ));
    }
}
