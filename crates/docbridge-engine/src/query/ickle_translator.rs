//! Relational query to Ickle translator.
//!
//! Produces the native query string, the ordered projected fields, the
//! residual filter, and the paging decision for one execution.

use std::sync::Arc;

use docbridge_common::types::ColumnType;
use docbridge_common::utils::error::{Result, TranslationError};
use docbridge_core::execution::ResidualFilter;
use docbridge_core::schema::{FieldId, TableShape};
use smallvec::SmallVec;

use super::binder::Bindings;
use super::plan::RelationalQuery;
use super::pushdown::{ENTITY_ALIAS, FilterSplitter, NativeExpr};

/// One output column, resolved to a document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    /// Column name as requested.
    pub name: String,
    /// Table owning the column.
    pub table: String,
    /// Leaf field holding the value.
    pub field: FieldId,
    /// Dotted field path below the document root.
    pub path: String,
    /// Declared type.
    pub column_type: ColumnType,
}

/// The translated form of a relational query.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    /// Ickle query string.
    pub query: String,
    /// Root document type.
    pub document_type: String,
    /// Cache holding the documents, when not the connection default.
    pub cache_name: Option<String>,
    /// Output columns, in projection order.
    pub projected: Vec<ProjectedColumn>,
    /// Predicate evaluated per row, when the store cannot evaluate all of it.
    pub residual: Option<ResidualFilter>,
    /// Table nodes the query ranges over.
    pub scope: SmallVec<[FieldId; 4]>,
    /// Maximum rows to return.
    pub row_limit: Option<usize>,
    /// Rows to skip.
    pub row_offset: usize,
    /// Whether limit and offset are applied by the store. The query string
    /// never carries them; the stream passes them as the start offset and
    /// max results of each page request.
    pub native_paging: bool,
    /// Shape of the queried document.
    pub shape: Arc<TableShape>,
}

impl TranslatedQuery {
    /// Returns the projected fields, in output order.
    #[must_use]
    pub fn fields(&self) -> Vec<FieldId> {
        self.projected.iter().map(|c| c.field).collect()
    }

    /// Returns the number of output columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.projected.len()
    }
}

/// Translates a relational query over bound tables.
///
/// # Errors
///
/// Fails before any remote call on an empty projection, unknown tables or
/// columns, and filter constructs that are not predicates.
pub fn translate(query: &RelationalQuery, bindings: &Bindings) -> Result<TranslatedQuery> {
    if query.select.is_empty() {
        return Err(TranslationError::InvalidQuery("empty projection".to_string()).into());
    }
    let shape = Arc::clone(bindings.shape());

    let projected = query
        .select
        .iter()
        .map(|column| -> std::result::Result<ProjectedColumn, TranslationError> {
            let resolved = bindings.column(column)?;
            Ok(ProjectedColumn {
                name: column.name.clone(),
                table: resolved.table.clone(),
                field: resolved.field,
                path: shape.path(resolved.field),
                column_type: resolved.column_type,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let (native, residual) = match &query.filter {
        Some(filter) => {
            let split = FilterSplitter::new(bindings).split(filter)?;
            (split.native, split.residual.map(ResidualFilter::new))
        }
        None => (None, None),
    };

    let scope: SmallVec<[FieldId; 4]> = bindings.tables().iter().map(|t| t.node).collect();
    let unwinds = projected.iter().any(|c| shape.is_under_repeated(c.field))
        || scope.iter().any(|node| shape.is_under_repeated(*node));
    let native_paging = residual.is_none() && !unwinds;

    let query_string = render(shape.document_type(), native.as_ref());
    tracing::debug!(
        "translated query over {}: {} (residual: {}, native paging: {})",
        shape.table(),
        query_string,
        residual.is_some(),
        native_paging
    );

    Ok(TranslatedQuery {
        query: query_string,
        document_type: shape.document_type().to_string(),
        cache_name: shape.cache_name().map(str::to_string),
        projected,
        residual,
        scope,
        row_limit: query.limit,
        row_offset: query.offset.unwrap_or(0),
        native_paging,
        shape,
    })
}

fn render(document_type: &str, native: Option<&NativeExpr>) -> String {
    match native {
        Some(condition) => format!("FROM {document_type} {ENTITY_ALIAS} WHERE {condition}"),
        None => format!("FROM {document_type} {ENTITY_ALIAS}"),
    }
}
