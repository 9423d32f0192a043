//! Resolved table shapes.
//!
//! A [`TableShape`] describes the complete document a table lives in as an
//! arena of [`FieldNode`]s addressed by [`FieldId`]. Nested and repeated
//! structure is expressed through parent/child indices, so a shape never owns
//! pointers into itself.
//!
//! ```text
//! Person (root, tutorial.Person)
//! ├── id      #1 int32
//! ├── name    #2 string
//! └── phones  #4 tutorial.PhoneNumber  [repeated]   <- table Phone
//!     ├── number #1 string
//!     └── type   #2 enum
//! ```

use std::fmt;

use docbridge_common::types::ColumnType;
use docbridge_common::utils::error::SchemaError;
use smallvec::SmallVec;

use super::{Schema, Table};

/// Index of a node in a [`TableShape`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl FieldId {
    /// Returns the arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a field node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A scalar of the given type.
    Scalar(ColumnType),
    /// An embedded message of the given type.
    Message {
        /// Fully qualified message name.
        type_name: String,
    },
}

/// One field of the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    /// Protobuf field name (the message name for the root).
    pub name: String,
    /// Field number in the parent message (0 for the root).
    pub tag: u32,
    /// Scalar or message.
    pub kind: FieldKind,
    /// Whether the field repeats.
    pub repeated: bool,
    /// Enclosing message node.
    pub parent: Option<FieldId>,
    /// Child nodes, for message nodes.
    pub children: SmallVec<[FieldId; 8]>,
    /// Distance from the root.
    pub depth: u16,
}

impl FieldNode {
    /// Returns whether this node is an embedded message.
    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self.kind, FieldKind::Message { .. })
    }
}

/// A relational column resolved to its leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeColumn {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Leaf node holding the value.
    pub field: FieldId,
    /// Declared type.
    pub column_type: ColumnType,
    /// Whether the remote store indexes the field.
    pub searchable: bool,
}

/// A relational table resolved to the message node holding its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeTable {
    /// Table name.
    pub name: String,
    /// Message node of the table (the root for root tables).
    pub node: FieldId,
}

/// Canonical, immutable description of a queried table and its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    table: String,
    document_type: String,
    cache_name: Option<String>,
    nodes: Vec<FieldNode>,
    tables: Vec<ShapeTable>,
    columns: Vec<ShapeColumn>,
}

impl TableShape {
    /// Derives the shape of `table` from the schema.
    ///
    /// The arena covers the whole document of the table's root, including
    /// every nested table, so a child table and its parent share one layout.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidTable`] if the table is unknown or its
    /// parent links are broken.
    pub fn derive(schema: &Schema, table: &str) -> Result<Self, SchemaError> {
        let root = schema
            .root_of(table)?
            .ok_or_else(|| SchemaError::InvalidTable {
                table: table.to_string(),
                reason: "not defined in schema".to_string(),
            })?;

        let mut shape = Self {
            table: table.to_string(),
            document_type: root.message.clone(),
            cache_name: root.cache_name.clone(),
            nodes: Vec::new(),
            tables: Vec::new(),
            columns: Vec::new(),
        };
        let root_id = shape.push_node(FieldNode {
            name: root.message.clone(),
            tag: 0,
            kind: FieldKind::Message {
                type_name: root.message.clone(),
            },
            repeated: false,
            parent: None,
            children: SmallVec::new(),
            depth: 0,
        });
        shape.add_table(schema, root, root_id, 0)?;
        Ok(shape)
    }

    fn push_node(&mut self, node: FieldNode) -> FieldId {
        let id = FieldId(self.nodes.len() as u32);
        if let Some(parent) = node.parent {
            self.nodes[parent.index()].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    fn add_table(
        &mut self,
        schema: &Schema,
        table: &Table,
        node: FieldId,
        depth: u16,
    ) -> Result<(), SchemaError> {
        if self.tables.iter().any(|t| t.name == table.name) {
            return Err(SchemaError::InvalidTable {
                table: table.name.clone(),
                reason: "table appears twice in one document".to_string(),
            });
        }
        self.tables.push(ShapeTable {
            name: table.name.clone(),
            node,
        });

        for column in &table.columns {
            if self.child_by_tag(node, column.tag).is_some() {
                return Err(SchemaError::InvalidTable {
                    table: table.name.clone(),
                    reason: format!("field number {} used twice", column.tag),
                });
            }
            let field = self.push_node(FieldNode {
                name: column.field.clone(),
                tag: column.tag,
                kind: FieldKind::Scalar(column.column_type),
                repeated: column.repeated,
                parent: Some(node),
                children: SmallVec::new(),
                depth: depth + 1,
            });
            self.columns.push(ShapeColumn {
                table: table.name.clone(),
                name: column.name.clone(),
                field,
                column_type: column.column_type,
                searchable: column.searchable,
            });
        }

        for child in schema.children_of(&table.name) {
            let Some(link) = &child.parent else { continue };
            if self.child_by_tag(node, link.tag).is_some() {
                return Err(SchemaError::InvalidTable {
                    table: child.name.clone(),
                    reason: format!("field number {} used twice in {}", link.tag, table.name),
                });
            }
            let child_node = self.push_node(FieldNode {
                name: link.field.clone(),
                tag: link.tag,
                kind: FieldKind::Message {
                    type_name: child.message.clone(),
                },
                repeated: link.repeated,
                parent: Some(node),
                children: SmallVec::new(),
                depth: depth + 1,
            });
            self.add_table(schema, child, child_node, depth + 1)?;
        }
        Ok(())
    }

    /// Returns the table this shape was resolved for.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the root document type name.
    #[must_use]
    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    /// Returns the cache holding the documents, if not the default one.
    #[must_use]
    pub fn cache_name(&self) -> Option<&str> {
        self.cache_name.as_deref()
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> FieldId {
        FieldId(0)
    }

    /// Returns a node by id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this shape.
    #[must_use]
    pub fn node(&self, id: FieldId) -> &FieldNode {
        &self.nodes[id.index()]
    }

    /// Returns the number of nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the child of a message node with the given field number.
    #[must_use]
    pub fn child_by_tag(&self, parent: FieldId, tag: u32) -> Option<FieldId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.node(*c).tag == tag)
    }

    /// Returns all columns of all tables in the document.
    #[must_use]
    pub fn columns(&self) -> &[ShapeColumn] {
        &self.columns
    }

    /// Looks up a column of a table embedded in this document.
    #[must_use]
    pub fn column(&self, table: &str, name: &str) -> Option<&ShapeColumn> {
        self.columns
            .iter()
            .find(|c| c.table == table && c.name == name)
    }

    /// Returns the columns owned by one table, in declaration order.
    pub fn columns_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ShapeColumn> + 'a {
        self.columns.iter().filter(move |c| c.table == table)
    }

    /// Returns the tables embedded in this document, root first.
    #[must_use]
    pub fn tables(&self) -> &[ShapeTable] {
        &self.tables
    }

    /// Returns the message node of a table in this document.
    #[must_use]
    pub fn table_node(&self, table: &str) -> Option<FieldId> {
        self.tables.iter().find(|t| t.name == table).map(|t| t.node)
    }

    /// Returns the column resolved to a leaf node, if any.
    #[must_use]
    pub fn column_for_field(&self, field: FieldId) -> Option<&ShapeColumn> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Returns the chain of nodes from just below the root down to `id`.
    #[must_use]
    pub fn lineage(&self, id: FieldId) -> SmallVec<[FieldId; 4]> {
        let mut chain = SmallVec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root() {
                break;
            }
            chain.push(node);
            current = self.node(node).parent;
        }
        chain.reverse();
        chain
    }

    /// Returns the repeated nodes among `id` and its ancestors, outermost first.
    #[must_use]
    pub fn repeated_lineage(&self, id: FieldId) -> SmallVec<[FieldId; 4]> {
        self.lineage(id)
            .into_iter()
            .filter(|n| self.node(*n).repeated)
            .collect()
    }

    /// Returns the innermost repeated node among `id` and its ancestors.
    #[must_use]
    pub fn nearest_repeated(&self, id: FieldId) -> Option<FieldId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.node(node).repeated {
                return Some(node);
            }
            current = self.node(node).parent;
        }
        None
    }

    /// Returns whether `id` or any ancestor repeats.
    #[must_use]
    pub fn is_under_repeated(&self, id: FieldId) -> bool {
        self.nearest_repeated(id).is_some()
    }

    /// Returns the dotted field path of `id` relative to the root.
    #[must_use]
    pub fn path(&self, id: FieldId) -> String {
        let names: Vec<&str> = self
            .lineage(id)
            .iter()
            .map(|n| self.node(*n).name.as_str())
            .collect();
        names.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn schema() -> Schema {
        Schema::new()
            .with_table(
                Table::root("Person", "tutorial.Person")
                    .with_cache("people")
                    .with_column(Column::new("id", 1, ColumnType::Int32))
                    .with_column(Column::new("name", 2, ColumnType::String)),
            )
            .with_table(
                Table::nested("Phone", "tutorial.PhoneNumber", "Person", "phones", 4, true)
                    .with_column(Column::new("number", 1, ColumnType::String))
                    .with_column(Column::new("type", 2, ColumnType::Enum)),
            )
            .with_table(
                Table::nested("Address", "tutorial.Address", "Person", "address", 5, false)
                    .with_column(Column::new("city", 1, ColumnType::String)),
            )
    }

    #[test]
    fn test_derive_root_covers_nested_tables() {
        let shape = TableShape::derive(&schema(), "Person").unwrap();
        assert_eq!(shape.table(), "Person");
        assert_eq!(shape.document_type(), "tutorial.Person");
        assert_eq!(shape.cache_name(), Some("people"));
        assert_eq!(shape.tables().len(), 3);
        assert_eq!(shape.columns().len(), 5);

        let number = shape.column("Phone", "number").unwrap();
        assert_eq!(shape.path(number.field), "phones.number");
        assert!(shape.is_under_repeated(number.field));

        let city = shape.column("Address", "city").unwrap();
        assert_eq!(shape.path(city.field), "address.city");
        assert!(!shape.is_under_repeated(city.field));
    }

    #[test]
    fn test_derive_nested_table_uses_root_document() {
        let shape = TableShape::derive(&schema(), "Phone").unwrap();
        assert_eq!(shape.table(), "Phone");
        assert_eq!(shape.document_type(), "tutorial.Person");
        let phones = shape.table_node("Phone").unwrap();
        assert!(shape.node(phones).repeated);
        assert_eq!(shape.nearest_repeated(phones), Some(phones));
    }

    #[test]
    fn test_unknown_table() {
        assert!(TableShape::derive(&schema(), "Nope").is_err());
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let schema = Schema::new().with_table(
            Table::root("T", "x.T")
                .with_column(Column::new("a", 1, ColumnType::Int32))
                .with_column(Column::new("b", 1, ColumnType::Int32)),
        );
        assert!(TableShape::derive(&schema, "T").is_err());
    }

    #[test]
    fn test_child_lookup_by_tag() {
        let shape = TableShape::derive(&schema(), "Person").unwrap();
        let phones = shape.child_by_tag(shape.root(), 4).unwrap();
        assert_eq!(shape.node(phones).name, "phones");
        assert!(shape.child_by_tag(shape.root(), 99).is_none());
        assert_eq!(shape.repeated_lineage(shape.child_by_tag(phones, 1).unwrap()).as_slice(), &[phones]);
    }
}
