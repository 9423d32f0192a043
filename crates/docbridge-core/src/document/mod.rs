//! Decoded documents and the protobuf wire codec.
//!
//! The remote cache stores schema-less protobuf bytes. A [`Document`] is the
//! result of reading those bytes against a [`TableShape`]: every known field is
//! kept under its [`FieldId`], repeated fields keep their wire order, unknown
//! fields are skipped.
//!
//! [`TableShape`]: crate::schema::TableShape

mod decode;
mod writer;

pub use decode::decode_document;
pub use writer::ProtoWriter;

use docbridge_common::types::Value;
use docbridge_common::utils::hash::FastHashMap;
use smallvec::SmallVec;

use crate::schema::FieldId;

/// One occurrence of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A scalar value.
    Scalar(Value),
    /// An embedded message.
    Message(Message),
}

impl Field {
    /// Returns the embedded message, if this is one.
    #[must_use]
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            Self::Scalar(_) => None,
        }
    }

    /// Returns the scalar value, if this is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Message(_) => None,
        }
    }
}

/// A decoded message: field occurrences keyed by shape node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    fields: FastHashMap<FieldId, SmallVec<[Field; 1]>>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an occurrence of a field.
    pub fn push(&mut self, field: FieldId, value: Field) {
        self.fields.entry(field).or_default().push(value);
    }

    /// Returns all occurrences of a field, in wire order.
    #[must_use]
    pub fn get(&self, field: FieldId) -> &[Field] {
        self.fields.get(&field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Returns the effective value of a singular field (last occurrence wins).
    #[must_use]
    pub fn last(&self, field: FieldId) -> Option<&Field> {
        self.get(field).last()
    }

    /// Returns the number of distinct fields present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A decoded root document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    type_name: String,
    root: Message,
}

impl Document {
    /// Wraps a decoded root message.
    #[must_use]
    pub fn new(type_name: impl Into<String>, root: Message) -> Self {
        Self {
            type_name: type_name.into(),
            root,
        }
    }

    /// Returns the document type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the root message.
    #[must_use]
    pub fn root(&self) -> &Message {
        &self.root
    }
}
