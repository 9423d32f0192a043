//! Row marshaller: decodes documents of one shape and flattens them into rows.
//!
//! A document becomes one row per *binding*. A binding picks one element of
//! every repeated group the projection involves: the repeated nodes on the
//! path to any projected field and to any table the query ranges over.
//! Sibling groups combine as a cartesian product in the order they are first
//! referenced, nested groups expand in place, and elements keep their wire
//! order. A group with zero elements produces no bindings.
//!
//! The residual filter never adds groups. A predicate leaf that reads through
//! a repeated element the binding leaves open holds when any element passes,
//! as the store-side matcher evaluates it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use docbridge_common::types::Value;
use docbridge_common::utils::error::DecodeError;
use smallvec::SmallVec;

use super::filter::{FieldSource, ResidualFilter};
use crate::document::{Document, Field, Message, decode_document};
use crate::schema::{FieldId, TableShape};

static NEXT_MARSHALLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one marshaller build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarshallerId(u64);

impl MarshallerId {
    fn next() -> Self {
        Self(NEXT_MARSHALLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A flat relational row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(Vec<Value>);

impl Row {
    /// Creates a row from values in column order.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a column value.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Returns the values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Consumes the row.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Precomputed projection: output fields and the groups to unwind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionPlan {
    fields: Vec<FieldId>,
    groups: SmallVec<[FieldId; 4]>,
}

impl ProjectionPlan {
    /// Returns the projected leaf fields, in output order.
    #[must_use]
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Returns the repeated groups unwound per document, outermost first.
    #[must_use]
    pub fn groups(&self) -> &[FieldId] {
        &self.groups
    }

    /// Returns the row arity.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

/// Stateless decoder and flattener for one table shape.
#[derive(Debug)]
pub struct RowMarshaller {
    id: MarshallerId,
    shape: Arc<TableShape>,
    residual: Option<ResidualFilter>,
    scope: SmallVec<[FieldId; 4]>,
}

impl RowMarshaller {
    /// Builds a marshaller for `shape`, ranging over the shape's own table.
    #[must_use]
    pub fn build(shape: Arc<TableShape>, residual: Option<ResidualFilter>) -> Self {
        let scope = shape.table_node(shape.table()).into_iter().collect();
        Self {
            id: MarshallerId::next(),
            shape,
            residual,
            scope,
        }
    }

    /// Adds table nodes the query ranges over (joined child tables).
    #[must_use]
    pub fn with_scope(mut self, tables: impl IntoIterator<Item = FieldId>) -> Self {
        for node in tables {
            if !self.scope.contains(&node) {
                self.scope.push(node);
            }
        }
        self
    }

    /// Returns this build's identity.
    #[must_use]
    pub fn id(&self) -> MarshallerId {
        self.id
    }

    /// Returns the document type the marshaller decodes.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.shape.document_type()
    }

    /// Returns the shape.
    #[must_use]
    pub fn shape(&self) -> &Arc<TableShape> {
        &self.shape
    }

    /// Returns the residual filter, if any.
    #[must_use]
    pub fn residual(&self) -> Option<&ResidualFilter> {
        self.residual.as_ref()
    }

    /// Decodes raw document bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the bytes are not a valid document of
    /// this shape.
    pub fn decode(&self, raw: &[u8]) -> Result<Document, DecodeError> {
        decode_document(&self.shape, raw)
    }

    /// Returns true when the document has at least one binding that passes
    /// the residual filter, or when there is no residual filter.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        let Some(residual) = &self.residual else {
            return true;
        };
        let groups = self.groups_for(&[]);
        bindings(&self.shape, document, Binding::default(), &groups)
            .iter()
            .any(|binding| residual.keep(&self.bound(document, binding)))
    }

    /// Plans a projection of `fields`, in order.
    #[must_use]
    pub fn plan(&self, fields: &[FieldId]) -> ProjectionPlan {
        ProjectionPlan {
            fields: fields.to_vec(),
            groups: self.groups_for(fields),
        }
    }

    /// Flattens a document into rows of `fields`, dropping bindings that fail
    /// the residual filter.
    #[must_use]
    pub fn project(&self, document: &Document, fields: &[FieldId]) -> Vec<Row> {
        self.project_with(&self.plan(fields), document)
    }

    /// Like [`project`](Self::project) with a precomputed plan.
    #[must_use]
    pub fn project_with(&self, plan: &ProjectionPlan, document: &Document) -> Vec<Row> {
        bindings(&self.shape, document, Binding::default(), &plan.groups)
            .into_iter()
            .filter_map(|binding| {
                let row = self.bound(document, &binding);
                let kept = self.residual.as_ref().is_none_or(|r| r.keep(&row));
                kept.then(|| Row(plan.fields.iter().map(|f| row.value(*f)).collect()))
            })
            .collect()
    }

    fn groups_for(&self, targets: &[FieldId]) -> SmallVec<[FieldId; 4]> {
        let mut groups: SmallVec<[FieldId; 4]> = SmallVec::new();
        for target in targets.iter().chain(self.scope.iter()) {
            for node in self.shape.repeated_lineage(*target) {
                if !groups.contains(&node) {
                    groups.push(node);
                }
            }
        }
        groups.sort_by_key(|g| self.shape.node(*g).depth);
        groups
    }

    fn bound<'a, 'd>(&'a self, document: &'d Document, binding: &'a Binding<'d>) -> BoundRow<'a, 'd> {
        BoundRow {
            shape: &self.shape,
            document,
            binding,
        }
    }
}

/// Extends `start` with one element of each group in turn.
fn bindings<'d>(
    shape: &TableShape,
    document: &'d Document,
    start: Binding<'d>,
    groups: &[FieldId],
) -> Vec<Binding<'d>> {
    let mut bindings = vec![start];
    for group in groups {
        let mut expanded = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let Some(container) = container_of(shape, document, binding, *group) else {
                continue;
            };
            for element in container.get(*group) {
                let mut next = binding.clone();
                next.0.push((*group, element));
                expanded.push(next);
            }
        }
        bindings = expanded;
        if bindings.is_empty() {
            break;
        }
    }
    bindings
}

/// Walks from the root to the message that directly holds `node`.
fn container_of<'d>(
    shape: &TableShape,
    document: &'d Document,
    binding: &Binding<'d>,
    node: FieldId,
) -> Option<&'d Message> {
    let lineage = shape.lineage(node);
    let mut message = document.root();
    for step in &lineage[..lineage.len().saturating_sub(1)] {
        let field = if shape.node(*step).repeated {
            binding.get(*step)?
        } else {
            message.last(*step)?
        };
        message = field.as_message()?;
    }
    Some(message)
}

#[derive(Debug, Clone, Default)]
struct Binding<'d>(SmallVec<[(FieldId, &'d Field); 4]>);

impl<'d> Binding<'d> {
    fn get(&self, group: FieldId) -> Option<&'d Field> {
        self.0.iter().find(|(g, _)| *g == group).map(|(_, f)| *f)
    }
}

struct BoundRow<'a, 'd> {
    shape: &'a TableShape,
    document: &'d Document,
    binding: &'a Binding<'d>,
}

impl FieldSource for BoundRow<'_, '_> {
    fn value(&self, field: FieldId) -> Value {
        let lineage = self.shape.lineage(field);
        let mut message = self.document.root();
        let mut current: Option<&Field> = None;
        for step in &lineage {
            if let Some(parent) = current {
                match parent {
                    Field::Message(m) => message = m,
                    Field::Scalar(_) => return Value::Null,
                }
            }
            let occurrence = if self.shape.node(*step).repeated {
                self.binding
                    .get(*step)
                    .or_else(|| message.get(*step).first())
            } else {
                message.last(*step)
            };
            match occurrence {
                Some(found) => current = Some(found),
                None => return Value::Null,
            }
        }
        match current {
            Some(Field::Scalar(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    fn any_element(
        &self,
        fields: &[FieldId],
        test: &mut dyn FnMut(&dyn Fn(FieldId) -> Value) -> Option<bool>,
    ) -> Option<bool> {
        let mut open: SmallVec<[FieldId; 4]> = SmallVec::new();
        for field in fields {
            for node in self.shape.repeated_lineage(*field) {
                if self.binding.get(node).is_none() && !open.contains(&node) {
                    open.push(node);
                }
            }
        }
        if open.is_empty() {
            return test(&|field| self.value(field));
        }
        open.sort_by_key(|g| self.shape.node(*g).depth);

        let expanded = bindings(self.shape, self.document, self.binding.clone(), &open);
        if expanded.is_empty() {
            return test(&|field| {
                let under_open = self.shape.repeated_lineage(field).into_iter().any(|n| open.contains(&n));
                if under_open { Value::Null } else { self.value(field) }
            });
        }
        let mut unknown = false;
        for binding in &expanded {
            let row = BoundRow {
                shape: self.shape,
                document: self.document,
                binding,
            };
            match test(&|field| row.value(field)) {
                Some(true) => return Some(true),
                None => unknown = true,
                Some(false) => {}
            }
        }
        if unknown { None } else { Some(false) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ProtoWriter;
    use crate::execution::filter::{CompareOp, FilterExpr, Operand};
    use crate::schema::{Column, Schema, Table};
    use docbridge_common::types::ColumnType;

    fn schema() -> Schema {
        Schema::new()
            .with_table(
                Table::root("Person", "tutorial.Person")
                    .with_column(Column::new("id", 1, ColumnType::Int32))
                    .with_column(Column::new("name", 2, ColumnType::String))
                    .with_column(Column::new("tags", 7, ColumnType::Int32).repeated()),
            )
            .with_table(
                Table::nested("Phone", "tutorial.PhoneNumber", "Person", "phones", 4, true)
                    .with_column(Column::new("number", 1, ColumnType::String))
                    .with_column(Column::new("kind", 2, ColumnType::Enum)),
            )
            .with_table(
                Table::nested("Address", "tutorial.Address", "Person", "address", 5, false)
                    .with_column(Column::new("city", 1, ColumnType::String)),
            )
    }

    fn phone(number: &str, kind: i32) -> ProtoWriter {
        ProtoWriter::new().string(1, number).int32(2, kind)
    }

    fn person() -> Vec<u8> {
        ProtoWriter::new()
            .int32(1, 1)
            .string(2, "Alice")
            .message(4, phone("555-1", 0))
            .message(4, phone("555-2", 1))
            .message(4, phone("555-3", 0))
            .packed_int32(7, &[10, 20])
            .finish()
            .to_vec()
    }

    fn field(shape: &TableShape, table: &str, column: &str) -> FieldId {
        shape.column(table, column).unwrap().field
    }

    #[test]
    fn test_unwind_repeated_group() {
        let shape = Arc::new(TableShape::derive(&schema(), "Phone").unwrap());
        let marshaller = RowMarshaller::build(Arc::clone(&shape), None);
        let doc = marshaller.decode(&person()).unwrap();

        let fields = [
            field(&shape, "Person", "id"),
            field(&shape, "Person", "name"),
            field(&shape, "Phone", "number"),
        ];
        let rows = marshaller.project(&doc, &fields);
        assert_eq!(rows.len(), 3);
        for (row, number) in rows.iter().zip(["555-1", "555-2", "555-3"]) {
            assert_eq!(row.len(), 3);
            assert_eq!(row.get(0), Some(&Value::Int64(1)));
            assert_eq!(row.get(1), Some(&Value::from("Alice")));
            assert_eq!(row.get(2), Some(&Value::from(number)));
        }
    }

    #[test]
    fn test_root_table_without_repeated_fields_is_one_row() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let marshaller = RowMarshaller::build(Arc::clone(&shape), None);
        let doc = marshaller.decode(&person()).unwrap();
        let rows = marshaller.project(&doc, &[field(&shape, "Person", "name"), field(&shape, "Address", "city")]);
        assert_eq!(rows, vec![Row::new(vec![Value::from("Alice"), Value::Null])]);
    }

    #[test]
    fn test_sibling_groups_form_cartesian_product() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let marshaller = RowMarshaller::build(Arc::clone(&shape), None);
        let doc = marshaller.decode(&person()).unwrap();
        let rows = marshaller.project(&doc, &[field(&shape, "Phone", "number"), field(&shape, "Person", "tags")]);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].values(), &[Value::from("555-1"), Value::Int64(10)]);
        assert_eq!(rows[1].values(), &[Value::from("555-1"), Value::Int64(20)]);
        assert_eq!(rows[5].values(), &[Value::from("555-3"), Value::Int64(20)]);
    }

    #[test]
    fn test_empty_group_yields_no_rows() {
        let shape = Arc::new(TableShape::derive(&schema(), "Phone").unwrap());
        let marshaller = RowMarshaller::build(Arc::clone(&shape), None);
        let raw = ProtoWriter::new().int32(1, 2).string(2, "Bob").finish();
        let doc = marshaller.decode(&raw).unwrap();
        assert!(marshaller.project(&doc, &[field(&shape, "Person", "name")]).is_empty());
    }

    #[test]
    fn test_residual_filters_per_element() {
        let shape = Arc::new(TableShape::derive(&schema(), "Phone").unwrap());
        let kind = field(&shape, "Phone", "kind");
        let residual = ResidualFilter::new(FilterExpr::Compare {
            left: Operand::Field(kind),
            op: CompareOp::Eq,
            right: Operand::Literal(Value::Int64(0)),
        });
        let marshaller = RowMarshaller::build(Arc::clone(&shape), Some(residual));
        let doc = marshaller.decode(&person()).unwrap();
        assert!(marshaller.matches(&doc));

        let rows = marshaller.project(&doc, &[field(&shape, "Phone", "number")]);
        assert_eq!(
            rows,
            vec![
                Row::new(vec![Value::from("555-1")]),
                Row::new(vec![Value::from("555-3")])
            ]
        );
    }

    #[test]
    fn test_matches_rejects_when_no_element_passes() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let residual = ResidualFilter::new(FilterExpr::Compare {
            left: Operand::Field(field(&shape, "Phone", "number")),
            op: CompareOp::Eq,
            right: Operand::Literal(Value::from("555-9")),
        });
        let marshaller = RowMarshaller::build(Arc::clone(&shape), Some(residual));
        let doc = marshaller.decode(&person()).unwrap();
        assert!(!marshaller.matches(&doc));
        assert!(marshaller.project(&doc, &[field(&shape, "Person", "id")]).is_empty());
    }

    #[test]
    fn test_residual_on_unprojected_repeated_field_does_not_unwind() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let tags = field(&shape, "Person", "tags");
        let over = |bound: i64| {
            ResidualFilter::new(FilterExpr::Compare {
                left: Operand::Field(tags),
                op: CompareOp::Gt,
                right: Operand::Literal(Value::Int64(bound)),
            })
        };
        let id = [field(&shape, "Person", "id")];

        for (bound, expected) in [(5, 1), (15, 1), (30, 0)] {
            let marshaller = RowMarshaller::build(Arc::clone(&shape), Some(over(bound)));
            let doc = marshaller.decode(&person()).unwrap();
            let plan = marshaller.plan(&id);
            assert!(plan.groups().is_empty());
            assert_eq!(marshaller.project_with(&plan, &doc).len(), expected, "tags > {bound}");
            assert_eq!(marshaller.matches(&doc), expected == 1);
        }
    }

    #[test]
    fn test_residual_on_unjoined_table_holds_for_any_element() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let residual = ResidualFilter::new(FilterExpr::And(vec![
            FilterExpr::Compare {
                left: Operand::Field(field(&shape, "Phone", "kind")),
                op: CompareOp::Eq,
                right: Operand::Literal(Value::Int64(1)),
            },
            FilterExpr::Compare {
                left: Operand::Field(field(&shape, "Phone", "number")),
                op: CompareOp::Eq,
                right: Operand::Literal(Value::from("555-3")),
            },
        ]));
        let marshaller = RowMarshaller::build(Arc::clone(&shape), Some(residual));
        let doc = marshaller.decode(&person()).unwrap();

        // Each leaf is satisfied by a different phone.
        let rows = marshaller.project(&doc, &[field(&shape, "Person", "name"), field(&shape, "Address", "city")]);
        assert_eq!(rows, vec![Row::new(vec![Value::from("Alice"), Value::Null])]);
    }

    #[test]
    fn test_residual_on_empty_repeated_field_reads_null() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let residual = ResidualFilter::new(FilterExpr::IsNull {
            operand: Operand::Field(field(&shape, "Phone", "number")),
            negated: false,
        });
        let marshaller = RowMarshaller::build(Arc::clone(&shape), Some(residual));
        let raw = ProtoWriter::new().int32(1, 2).string(2, "Bob").finish();
        let doc = marshaller.decode(&raw).unwrap();
        assert_eq!(marshaller.project(&doc, &[field(&shape, "Person", "id")]).len(), 1);

        let doc = marshaller.decode(&person()).unwrap();
        assert!(marshaller.project(&doc, &[field(&shape, "Person", "id")]).is_empty());
    }

    #[test]
    fn test_scope_unwinds_joined_table() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let phones = shape.table_node("Phone").unwrap();
        let marshaller = RowMarshaller::build(Arc::clone(&shape), None).with_scope([phones]);
        let doc = marshaller.decode(&person()).unwrap();
        let plan = marshaller.plan(&[field(&shape, "Person", "id")]);
        assert_eq!(plan.groups(), &[phones]);
        assert_eq!(marshaller.project_with(&plan, &doc).len(), 3);
    }

    #[test]
    fn test_ids_are_unique_per_build() {
        let shape = Arc::new(TableShape::derive(&schema(), "Person").unwrap());
        let a = RowMarshaller::build(Arc::clone(&shape), None);
        let b = RowMarshaller::build(shape, None);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.type_name(), "tutorial.Person");
    }
}
