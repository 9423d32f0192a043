//! Relational query representation.
//!
//! A [`RelationalQuery`] is what the relational planner hands over: an ordered
//! projection, the queried table, child tables joined as nesting, an optional
//! filter tree, and row limit/offset. It is immutable input to translation.

use docbridge_common::types::Value;

/// A table reference, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Table name in the relational schema.
    pub name: String,
    /// Alias used by column qualifiers.
    pub alias: Option<String>,
}

impl TableRef {
    /// Creates an unaliased reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Creates an aliased reference.
    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Returns the name column qualifiers use for this reference.
    #[must_use]
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A column reference, optionally qualified by a table name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Qualifier.
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    /// Creates an unqualified reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    /// Creates a qualified reference.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A column value.
    Column(ColumnRef),

    /// A literal value.
    Literal(Value),

    /// Binary operation.
    Binary {
        /// Left operand.
        left: Box<Expression>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expression>,
    },

    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expression>,
    },

    /// Membership in a literal list.
    In {
        /// Tested expression.
        expr: Box<Expression>,
        /// Candidate values.
        list: Vec<Value>,
        /// `NOT IN`.
        negated: bool,
    },

    /// SQL pattern match (`%` and `_` wildcards).
    Like {
        /// Tested expression.
        expr: Box<Expression>,
        /// Pattern.
        pattern: String,
        /// `NOT LIKE`.
        negated: bool,
    },
}

impl Expression {
    /// An unqualified column.
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(ColumnRef::new(name))
    }

    /// A qualified column.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column(ColumnRef::qualified(table, name))
    }

    /// A literal.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A binary operation.
    pub fn binary(left: Expression, op: BinaryOp, right: Expression) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// A unary operation.
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// `self AND other`.
    pub fn and(self, other: Expression) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    /// `self OR other`.
    pub fn or(self, other: Expression) -> Self {
        Self::binary(self, BinaryOp::Or, other)
    }

    /// `NOT self`.
    pub fn negate(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    /// `self IN (list)` or `self NOT IN (list)`.
    pub fn in_list(self, list: Vec<Value>, negated: bool) -> Self {
        Self::In {
            expr: Box::new(self),
            list,
            negated,
        }
    }

    /// `self LIKE pattern` or `self NOT LIKE pattern`.
    pub fn like(self, pattern: impl Into<String>, negated: bool) -> Self {
        Self::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Mod,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical NOT.
    Not,
    /// Numeric negation.
    Neg,
    /// IS NULL.
    IsNull,
    /// IS NOT NULL.
    IsNotNull,
}

/// A relational read query.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalQuery {
    /// Projected columns, in output order.
    pub select: Vec<ColumnRef>,
    /// Queried table.
    pub from: TableRef,
    /// Child tables stored inside `from`'s documents.
    pub joins: Vec<TableRef>,
    /// Filter.
    pub filter: Option<Expression>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

impl RelationalQuery {
    /// Starts a query over `from` with an empty projection.
    pub fn select_from(from: TableRef) -> Self {
        Self {
            select: Vec::new(),
            from,
            joins: Vec::new(),
            filter: None,
            limit: None,
            offset: None,
        }
    }

    /// Appends an unqualified column to the projection.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.select.push(ColumnRef::new(name));
        self
    }

    /// Appends a qualified column to the projection.
    pub fn qualified(mut self, table: impl Into<String>, name: impl Into<String>) -> Self {
        self.select.push(ColumnRef::qualified(table, name));
        self
    }

    /// Joins a nested child table.
    pub fn join(mut self, table: TableRef) -> Self {
        self.joins.push(table);
        self
    }

    /// Sets the filter.
    pub fn filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the row limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the row offset.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns every table reference, `from` first.
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::once(&self.from).chain(self.joins.iter())
    }
}
