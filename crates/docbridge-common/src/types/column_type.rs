//! Declared column types.

use serde::{Deserialize, Serialize};

/// The declared type of a column, one variant per protobuf scalar type.
///
/// The variant decides both how a field is read off the wire and which
/// [`Value`](super::Value) it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// `bool`
    Bool,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `sint32` (zigzag)
    SInt32,
    /// `sint64` (zigzag)
    SInt64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    SFixed32,
    /// `sfixed64`
    SFixed64,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `string`
    String,
    /// `bytes`
    Bytes,
    /// Protobuf enum, surfaced as its integer value.
    Enum,
}

impl ColumnType {
    /// Returns the protobuf name of this type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::SInt32 => "sint32",
            Self::SInt64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::SFixed32 => "sfixed32",
            Self::SFixed64 => "sfixed64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Enum => "enum",
        }
    }

    /// Returns whether values of this type decode to a number.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Bool | Self::String | Self::Bytes)
    }

    /// Returns whether this is the string type.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String)
    }

    /// Returns whether repeated fields of this type may use packed encoding.
    #[must_use]
    pub fn is_packable(&self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }
}
