//! # docbridge-core
//!
//! Core layer for Docbridge: table shapes, protobuf documents, and the
//! per-query execution primitives that turn documents into relational rows.
//!
//! This crate depends only on `docbridge-common`.
//!
//! ## Modules
//!
//! - [`schema`] - Relational tables over document types, resolved into shapes
//! - [`document`] - Decoded documents and the protobuf wire codec
//! - [`execution`] - Residual filters, row marshallers, marshaller registry

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod document;
pub mod execution;
pub mod schema;

// Re-export commonly used types
pub use document::{Document, ProtoWriter};
pub use execution::{
    FilterExpr, MarshallerId, MarshallerRegistry, ResidualFilter, Row, RowMarshaller,
};
pub use schema::{Column, FieldId, Schema, Table, TableShape};
