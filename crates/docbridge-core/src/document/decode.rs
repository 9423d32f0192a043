//! Recursive-descent protobuf decoding against a table shape.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Buf;
use docbridge_common::types::{ColumnType, Value};
use docbridge_common::utils::error::DecodeError;
use prost::encoding::{WireType, decode_key, decode_varint};

use super::{Document, Field, Message};
use crate::schema::{FieldId, FieldKind, TableShape};

/// Decodes raw protobuf bytes into a [`Document`] of the shape's root type.
///
/// # Errors
///
/// Returns a [`DecodeError`] on malformed wire data or on a field whose wire
/// type contradicts the shape.
pub fn decode_document(shape: &TableShape, raw: &[u8]) -> Result<Document, DecodeError> {
    let root = Decoder { shape }.message(shape.root(), raw)?;
    Ok(Document::new(shape.document_type(), root))
}

struct Decoder<'s> {
    shape: &'s TableShape,
}

impl Decoder<'_> {
    fn message(&self, node: FieldId, mut buf: &[u8]) -> Result<Message, DecodeError> {
        let mut message = Message::new();
        while buf.has_remaining() {
            let (tag, wire_type) =
                decode_key(&mut buf).map_err(|e| DecodeError::Wire(e.to_string()))?;

            let Some(child) = self.shape.child_by_tag(node, tag) else {
                skip_field(tag, wire_type, &mut buf)?;
                continue;
            };

            let child_node = self.shape.node(child);
            match &child_node.kind {
                FieldKind::Message { .. } => {
                    expect_wire_type(&child_node.name, WireType::LengthDelimited, wire_type)?;
                    let body = length_delimited(&child_node.name, &mut buf)?;
                    message.push(child, Field::Message(self.message(child, body)?));
                }
                FieldKind::Scalar(column_type) => {
                    let column_type = *column_type;
                    if wire_type == WireType::LengthDelimited && column_type.is_packable() {
                        let mut packed = length_delimited(&child_node.name, &mut buf)?;
                        while packed.has_remaining() {
                            let value = scalar(&child_node.name, column_type, &mut packed)?;
                            message.push(child, Field::Scalar(value));
                        }
                    } else {
                        expect_wire_type(&child_node.name, wire_type_of(column_type), wire_type)?;
                        let value = scalar(&child_node.name, column_type, &mut buf)?;
                        message.push(child, Field::Scalar(value));
                    }
                }
            }
        }
        Ok(message)
    }
}

/// Returns the wire type a scalar of `column_type` is encoded with.
pub(crate) fn wire_type_of(column_type: ColumnType) -> WireType {
    match column_type {
        ColumnType::Bool
        | ColumnType::Int32
        | ColumnType::Int64
        | ColumnType::UInt32
        | ColumnType::UInt64
        | ColumnType::SInt32
        | ColumnType::SInt64
        | ColumnType::Enum => WireType::Varint,
        ColumnType::Fixed32 | ColumnType::SFixed32 | ColumnType::Float => WireType::ThirtyTwoBit,
        ColumnType::Fixed64 | ColumnType::SFixed64 | ColumnType::Double => WireType::SixtyFourBit,
        ColumnType::String | ColumnType::Bytes => WireType::LengthDelimited,
    }
}

fn expect_wire_type(field: &str, expected: WireType, found: WireType) -> Result<(), DecodeError> {
    if expected == found {
        Ok(())
    } else {
        Err(DecodeError::WireTypeMismatch {
            field: field.to_string(),
            expected: format!("{expected:?}"),
            found: format!("{found:?}"),
        })
    }
}

fn varint(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    decode_varint(buf).map_err(|e| DecodeError::Wire(e.to_string()))
}

fn length_delimited<'a>(field: &str, buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = usize::try_from(varint(buf)?).map_err(|_| truncated(field))?;
    if len > buf.len() {
        return Err(truncated(field));
    }
    let (body, rest) = buf.split_at(len);
    *buf = rest;
    Ok(body)
}

fn fixed<'a, const N: usize>(field: &str, buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    if buf.len() < N {
        return Err(truncated(field));
    }
    let (bytes, rest) = buf.split_at(N);
    *buf = rest;
    Ok(bytes)
}

fn truncated(field: &str) -> DecodeError {
    DecodeError::Truncated {
        field: field.to_string(),
    }
}

fn zigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn scalar(field: &str, column_type: ColumnType, buf: &mut &[u8]) -> Result<Value, DecodeError> {
    let value = match column_type {
        ColumnType::Bool => Value::Bool(varint(buf)? != 0),
        ColumnType::Int32 | ColumnType::Enum => Value::Int64(i64::from(varint(buf)? as i32)),
        ColumnType::Int64 => Value::Int64(varint(buf)? as i64),
        ColumnType::UInt64 => Value::from(varint(buf)?),
        ColumnType::UInt32 => Value::Int64(i64::from(varint(buf)? as u32)),
        ColumnType::SInt32 => Value::Int64(i64::from(zigzag(varint(buf)?) as i32)),
        ColumnType::SInt64 => Value::Int64(zigzag(varint(buf)?)),
        ColumnType::Fixed32 => Value::Int64(i64::from(LittleEndian::read_u32(fixed::<4>(field, buf)?))),
        ColumnType::SFixed32 => Value::Int64(i64::from(LittleEndian::read_i32(fixed::<4>(field, buf)?))),
        ColumnType::Float => Value::Float64(f64::from(LittleEndian::read_f32(fixed::<4>(field, buf)?))),
        ColumnType::Fixed64 => Value::from(LittleEndian::read_u64(fixed::<8>(field, buf)?)),
        ColumnType::SFixed64 => Value::Int64(LittleEndian::read_i64(fixed::<8>(field, buf)?)),
        ColumnType::Double => Value::Float64(LittleEndian::read_f64(fixed::<8>(field, buf)?)),
        ColumnType::String => {
            let bytes = length_delimited(field, buf)?;
            let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 {
                field: field.to_string(),
            })?;
            Value::String(text.into())
        }
        ColumnType::Bytes => Value::Bytes(length_delimited(field, buf)?.into()),
    };
    Ok(value)
}

fn skip_field(tag: u32, wire_type: WireType, buf: &mut &[u8]) -> Result<(), DecodeError> {
    let field = format!("#{tag}");
    match wire_type {
        WireType::Varint => {
            varint(buf)?;
        }
        WireType::SixtyFourBit => {
            fixed::<8>(&field, buf)?;
        }
        WireType::ThirtyTwoBit => {
            fixed::<4>(&field, buf)?;
        }
        WireType::LengthDelimited => {
            length_delimited(&field, buf)?;
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(DecodeError::UnsupportedGroup(tag));
        }
    }
    Ok(())
}
