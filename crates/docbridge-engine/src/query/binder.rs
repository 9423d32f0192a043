//! Table and column binding.
//!
//! Binds every table reference of a query (the queried table and the child
//! tables joined as nesting) to the document shape of the queried table, and
//! resolves column references against the bound tables.

use std::sync::Arc;

use docbridge_common::utils::error::{Error, Result, TranslationError};
use docbridge_core::schema::{FieldId, ShapeColumn, TableShape};

use crate::alias::AliasResolver;
use crate::execution::ExecutionContext;
use crate::query::plan::{ColumnRef, RelationalQuery, TableRef};

/// A table reference bound to a node of the queried document.
#[derive(Debug, Clone)]
pub struct BoundTable {
    /// Name column qualifiers use (alias or table name).
    pub reference: String,
    /// Name of the table backing the reference.
    pub table: String,
    /// Message node holding the table's rows.
    pub node: FieldId,
}

/// The tables of one query, bound to a single document shape.
#[derive(Debug, Clone)]
pub struct Bindings {
    shape: Arc<TableShape>,
    tables: Vec<BoundTable>,
}

impl Bindings {
    /// Returns the shape of the queried document.
    #[must_use]
    pub fn shape(&self) -> &Arc<TableShape> {
        &self.shape
    }

    /// Returns the bound tables, queried table first.
    #[must_use]
    pub fn tables(&self) -> &[BoundTable] {
        &self.tables
    }

    /// Resolves a column reference.
    ///
    /// # Errors
    ///
    /// Unknown qualifiers fail with `UnknownTable`, unknown columns with
    /// `UnknownColumn`, and unqualified names found on several tables with
    /// `AmbiguousColumn`.
    pub fn column(&self, column: &ColumnRef) -> std::result::Result<&ShapeColumn, TranslationError> {
        if let Some(qualifier) = &column.table {
            let bound = self
                .tables
                .iter()
                .find(|t| &t.reference == qualifier)
                .ok_or_else(|| TranslationError::UnknownTable(qualifier.clone()))?;
            return self
                .shape
                .column(&bound.table, &column.name)
                .ok_or_else(|| TranslationError::UnknownColumn {
                    table: qualifier.clone(),
                    column: column.name.clone(),
                });
        }

        let mut found: Option<&ShapeColumn> = None;
        for bound in &self.tables {
            let Some(candidate) = self.shape.column(&bound.table, &column.name) else {
                continue;
            };
            match found {
                None => found = Some(candidate),
                // The same physical table bound twice is not ambiguous.
                Some(existing) if existing.field == candidate.field => {}
                Some(_) => return Err(TranslationError::AmbiguousColumn(column.name.clone())),
            }
        }
        found.ok_or_else(|| TranslationError::UnknownColumn {
            table: self.tables[0].reference.clone(),
            column: column.name.clone(),
        })
    }
}

/// Binds the tables of a query through the alias resolver.
pub struct Binder<'a> {
    resolver: &'a AliasResolver,
    ctx: &'a ExecutionContext,
}

impl<'a> Binder<'a> {
    /// Creates a binder.
    #[must_use]
    pub fn new(resolver: &'a AliasResolver, ctx: &'a ExecutionContext) -> Self {
        Self { resolver, ctx }
    }

    /// Binds `query.from` and every joined table.
    ///
    /// # Errors
    ///
    /// Fails when a table is not in the schema, a joined table lives in a
    /// different document than the queried one, or a reference name is used
    /// twice.
    pub fn bind(&self, query: &RelationalQuery) -> Result<Bindings> {
        let shape = self.resolve(&query.from)?;
        let root = BoundTable {
            reference: query.from.reference_name().to_string(),
            table: shape.table().to_string(),
            node: shape.table_node(shape.table()).unwrap_or_else(|| shape.root()),
        };
        let mut tables = vec![root];

        for join in &query.joins {
            if tables.iter().any(|t| t.reference == join.reference_name()) {
                return Err(TranslationError::InvalidQuery(format!(
                    "table reference {} is used twice",
                    join.reference_name()
                ))
                .into());
            }
            let joined = self.resolve(join)?;
            let node = (joined.document_type() == shape.document_type())
                .then(|| shape.table_node(joined.table()))
                .flatten()
                .ok_or_else(|| TranslationError::UnsupportedJoin {
                    root: query.from.name.clone(),
                    joined: join.name.clone(),
                })?;
            tables.push(BoundTable {
                reference: join.reference_name().to_string(),
                table: joined.table().to_string(),
                node,
            });
        }

        Ok(Bindings { shape, tables })
    }

    fn resolve(&self, table: &TableRef) -> Result<Arc<TableShape>> {
        match self.resolver.resolve(self.ctx, table) {
            Ok(shape) => Ok(shape),
            Err(e @ Error::Translation(_)) => Err(e),
            Err(e) => {
                // Degraded mode: continue with the schema's own view of the
                // table, which may be stale if its alias was swapped.
                tracing::warn!(
                    "Failed to resolve table {}, falling back to its unaliased shape: {}",
                    table.name,
                    e
                );
                self.resolver.derive_unaliased(&table.name)
            }
        }
    }
}
