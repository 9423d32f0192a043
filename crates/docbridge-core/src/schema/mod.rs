//! Relational view of the protobuf schema.
//!
//! A [`Schema`] is the catalog of relational tables exposed over the remote
//! cache. Root tables map one-to-one onto a document type; nested tables map
//! onto an embedded message field of their parent table (repeated or not),
//! which is how child rows stored inside a parent document are joined.
//!
//! [`TableShape`] is the per-query, resolved form of a table: an arena of field
//! nodes describing the whole document the table lives in.

mod shape;

pub use shape::{FieldId, FieldKind, FieldNode, ShapeColumn, ShapeTable, TableShape};

use docbridge_common::types::ColumnType;
use docbridge_common::utils::error::SchemaError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A scalar column backed by one protobuf field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Relational column name.
    pub name: String,
    /// Protobuf field name (defaults to the column name).
    pub field: String,
    /// Protobuf field number.
    pub tag: u32,
    /// Declared protobuf type.
    pub column_type: ColumnType,
    /// Whether the field is a repeated scalar.
    #[serde(default)]
    pub repeated: bool,
    /// Whether the remote store indexes the field, so it may appear in a
    /// native `WHERE` clause.
    #[serde(default = "default_searchable")]
    pub searchable: bool,
}

fn default_searchable() -> bool {
    true
}

impl Column {
    /// Creates a searchable, singular column whose field name equals its name.
    pub fn new(name: impl Into<String>, tag: u32, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            field: name.clone(),
            name,
            tag,
            column_type,
            repeated: false,
            searchable: true,
        }
    }

    /// Sets the protobuf field name.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Marks the column as a repeated scalar.
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Marks the column as not indexed by the remote store.
    pub fn not_searchable(mut self) -> Self {
        self.searchable = false;
        self
    }
}

/// Link from a nested table to the parent field that embeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    /// Parent table name.
    pub table: String,
    /// Field name in the parent message.
    pub field: String,
    /// Field number in the parent message.
    pub tag: u32,
    /// Whether the parent holds a list of these messages.
    pub repeated: bool,
}

/// A relational table over a protobuf message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Fully qualified protobuf message name.
    pub message: String,
    /// Cache holding the documents, when not the connection default.
    #[serde(default)]
    pub cache_name: Option<String>,
    /// Scalar columns, in declaration order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Set for tables embedded in a parent document.
    #[serde(default)]
    pub parent: Option<ParentLink>,
}

impl Table {
    /// Creates a root table: one row per document of `message`.
    pub fn root(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            cache_name: None,
            columns: Vec::new(),
            parent: None,
        }
    }

    /// Creates a table embedded in `parent` through field `field`/`tag`.
    pub fn nested(
        name: impl Into<String>,
        message: impl Into<String>,
        parent: impl Into<String>,
        field: impl Into<String>,
        tag: u32,
        repeated: bool,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            cache_name: None,
            columns: Vec::new(),
            parent: Some(ParentLink {
                table: parent.into(),
                field: field.into(),
                tag,
                repeated,
            }),
        }
    }

    /// Sets the cache the documents live in.
    pub fn with_cache(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = Some(cache_name.into());
        self
    }

    /// Appends a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the column with the given name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// The catalog of tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    tables: IndexMap<String, Table>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table with the same name.
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Builder form of [`Schema::add_table`].
    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Returns a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Returns all tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Returns the tables directly embedded in `parent`, in declaration order.
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Table> + 'a {
        self.tables
            .values()
            .filter(move |t| t.parent.as_ref().is_some_and(|p| p.table == parent))
    }

    /// Follows parent links up to the root table of `name`'s document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidTable`] on a dangling or cyclic parent link.
    pub fn root_of(&self, name: &str) -> Result<Option<&Table>, SchemaError> {
        let Some(mut current) = self.table(name) else {
            return Ok(None);
        };
        let mut hops = 0;
        while let Some(link) = &current.parent {
            hops += 1;
            if hops > self.tables.len() {
                return Err(SchemaError::InvalidTable {
                    table: name.to_string(),
                    reason: "cyclic parent links".to_string(),
                });
            }
            current = self.table(&link.table).ok_or_else(|| SchemaError::InvalidTable {
                table: current.name.clone(),
                reason: format!("parent table {} does not exist", link.table),
            })?;
        }
        Ok(Some(current))
    }
}
