//! Error taxonomy.
//!
//! Every failure of a query execution surfaces as a single [`Error`] wrapping
//! the specific cause:
//!
//! - [`TranslationError`] - the relational query cannot be translated; raised
//!   before any remote call.
//! - [`SchemaError`] - the remote store rejected a protobuf schema, or the
//!   relational schema is inconsistent.
//! - [`DecodeError`] - a fetched document does not parse against the expected
//!   shape.
//! - [`StreamError`] - transport failure while paging.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A query execution failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The relational query could not be translated.
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// A schema was rejected or is inconsistent.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A document could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Paging through the remote result set failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns whether this failure happened before anything was fetched.
    #[must_use]
    pub fn is_pre_execution(&self) -> bool {
        matches!(self, Self::Translation(_) | Self::Schema(_))
    }
}

/// Translation of a relational query failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// The table is not part of the schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The column does not exist on the referenced table.
    #[error("unknown column: {table}.{column}")]
    UnknownColumn {
        /// Table (or alias) the column was looked up in.
        table: String,
        /// Column name.
        column: String,
    },

    /// An unqualified column name exists on more than one table in scope.
    #[error("ambiguous column: {0}")]
    AmbiguousColumn(String),

    /// The joined table is not nested inside the queried document.
    #[error("table {joined} is not nested in the document of {root}")]
    UnsupportedJoin {
        /// The root table of the query.
        root: String,
        /// The joined table.
        joined: String,
    },

    /// The filter uses a construct neither pushed down nor evaluable locally.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// The query itself is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A schema problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The remote store rejected a protobuf schema file.
    #[error("protobuf schema {identifier} rejected: {errors}")]
    Rejected {
        /// Identifier of the schema file.
        identifier: String,
        /// Errors reported by the store.
        errors: String,
    },

    /// No protobuf schema was supplied.
    #[error("no protobuf schema resource supplied")]
    MissingResource,

    /// A document type name is not known to the store.
    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),

    /// A table definition in the relational schema is inconsistent.
    #[error("invalid table {table}: {reason}")]
    InvalidTable {
        /// Table name.
        table: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// A document could not be decoded against the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended in the middle of a field.
    #[error("truncated document in field {field}")]
    Truncated {
        /// Field being read.
        field: String,
    },

    /// Malformed wire data (bad varint, bad key).
    #[error("malformed document: {0}")]
    Wire(String),

    /// The wire type does not match the declared field type.
    #[error("field {field}: expected wire type {expected}, found {found}")]
    WireTypeMismatch {
        /// Field being read.
        field: String,
        /// Wire type the shape expects.
        expected: String,
        /// Wire type found in the document.
        found: String,
    },

    /// A string field holds invalid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field being read.
        field: String,
    },

    /// Protobuf groups are not supported.
    #[error("unsupported group encoding at tag {0}")]
    UnsupportedGroup(u32),
}

/// Paging through the remote result set failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A page fetch failed.
    #[error("page fetch from cache {cache} failed: {reason}")]
    Fetch {
        /// Cache name.
        cache: String,
        /// Transport-reported reason.
        reason: String,
    },

    /// The named cache does not exist.
    #[error("cache not found: {0}")]
    CacheNotFound(String),
}
