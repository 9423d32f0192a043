//! Core type definitions for Docbridge.
//!
//! - Cell values ([`Value`]) carried by rows, literals and decoded documents
//! - Declared column types ([`ColumnType`]), one per protobuf scalar type

mod column_type;
mod value;

pub use column_type::ColumnType;
pub use value::Value;
