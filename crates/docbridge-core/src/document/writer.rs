//! Protobuf document encoder.
//!
//! Used to seed caches and to build fixtures; the read path never encodes.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use prost::encoding::{WireType, encode_key, encode_varint};

/// Builds a protobuf message field by field.
///
/// ```
/// use docbridge_core::document::ProtoWriter;
///
/// let phone = ProtoWriter::new().string(1, "555-0100");
/// let person = ProtoWriter::new()
///     .int32(1, 42)
///     .string(2, "Alice")
///     .message(4, phone)
///     .finish();
/// assert!(!person.is_empty());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ProtoWriter {
    buf: BytesMut,
}

impl ProtoWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn varint_field(mut self, tag: u32, value: u64) -> Self {
        encode_key(tag, WireType::Varint, &mut self.buf);
        encode_varint(value, &mut self.buf);
        self
    }

    /// Writes a `bool` field.
    #[must_use]
    pub fn bool(self, tag: u32, value: bool) -> Self {
        self.varint_field(tag, u64::from(value))
    }

    /// Writes an `int32` (or enum) field.
    #[must_use]
    pub fn int32(self, tag: u32, value: i32) -> Self {
        self.varint_field(tag, i64::from(value) as u64)
    }

    /// Writes an `int64` field.
    #[must_use]
    pub fn int64(self, tag: u32, value: i64) -> Self {
        self.varint_field(tag, value as u64)
    }

    /// Writes a `uint32`/`uint64` field.
    #[must_use]
    pub fn uint64(self, tag: u32, value: u64) -> Self {
        self.varint_field(tag, value)
    }

    /// Writes a zigzag-encoded `sint64` (or `sint32`) field.
    #[must_use]
    pub fn sint64(self, tag: u32, value: i64) -> Self {
        self.varint_field(tag, ((value << 1) ^ (value >> 63)) as u64)
    }

    /// Writes a `fixed32`/`sfixed32` field.
    #[must_use]
    pub fn fixed32(mut self, tag: u32, value: u32) -> Self {
        let mut raw = [0u8; 4];
        LittleEndian::write_u32(&mut raw, value);
        encode_key(tag, WireType::ThirtyTwoBit, &mut self.buf);
        self.buf.put_slice(&raw);
        self
    }

    /// Writes a `fixed64`/`sfixed64` field.
    #[must_use]
    pub fn fixed64(mut self, tag: u32, value: u64) -> Self {
        let mut raw = [0u8; 8];
        LittleEndian::write_u64(&mut raw, value);
        encode_key(tag, WireType::SixtyFourBit, &mut self.buf);
        self.buf.put_slice(&raw);
        self
    }

    /// Writes a `float` field.
    #[must_use]
    pub fn float(self, tag: u32, value: f32) -> Self {
        self.fixed32(tag, value.to_bits())
    }

    /// Writes a `double` field.
    #[must_use]
    pub fn double(self, tag: u32, value: f64) -> Self {
        self.fixed64(tag, value.to_bits())
    }

    /// Writes a `bytes` field.
    #[must_use]
    pub fn bytes(mut self, tag: u32, value: &[u8]) -> Self {
        encode_key(tag, WireType::LengthDelimited, &mut self.buf);
        encode_varint(value.len() as u64, &mut self.buf);
        self.buf.put_slice(value);
        self
    }

    /// Writes a `string` field.
    #[must_use]
    pub fn string(self, tag: u32, value: &str) -> Self {
        self.bytes(tag, value.as_bytes())
    }

    /// Writes an embedded message field.
    #[must_use]
    pub fn message(self, tag: u32, message: ProtoWriter) -> Self {
        let body = message.finish();
        self.bytes(tag, &body)
    }

    /// Writes a packed repeated `int32` field.
    #[must_use]
    pub fn packed_int32(self, tag: u32, values: &[i32]) -> Self {
        let mut body = BytesMut::new();
        for value in values {
            encode_varint(i64::from(*value) as u64, &mut body);
        }
        self.bytes(tag, &body)
    }

    /// Returns the encoded message.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
