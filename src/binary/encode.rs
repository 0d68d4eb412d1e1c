//! Binary protobuf encoding.
//!
//! Serialization is two traversals over the same message: a size pass that
//! computes the exact output length, then an encode pass that writes into a
//! buffer reserved to that length. The two passes must agree byte-for-byte;
//! a disagreement is a bug, not a recoverable error.

// Casts here sign-extend or widen between integer representations.
#![allow(clippy::as_conversions)]

use std::convert::Infallible;

use bytes::BufMut;

use crate::descriptor::{FieldDescriptor, FieldKind, Label, MapKind, ScalarKind, Syntax};
use crate::error::EncodeError;
use crate::value::{DynamicMessage, MapKey, Value};
use crate::varint::{encode_varint, encoded_varint_len, zigzag_encode_32, zigzag_encode_64};
use crate::visitor::{traverse, Visitor};
use crate::wire::{encode_key, encoded_key_len, FieldKey, WireType, MAX_MESSAGE_SIZE};

/// Serializes `message`, validating proto2 required fields first.
pub fn encode_to_vec(message: &DynamicMessage) -> Result<Vec<u8>, EncodeError> {
    check_required(message)?;
    let len = encoded_len(message);
    if len > MAX_MESSAGE_SIZE {
        return Err(EncodeError::TooLarge);
    }
    let mut buf = Vec::with_capacity(len);
    run(traverse(message, &mut EncodeVisitor { buf: &mut buf }));
    // The size pass promised exactly this many bytes.
    assert_eq!(buf.len(), len, "size pass and encode pass disagree");
    Ok(buf)
}

/// The exact serialized length of `message`, without its own length prefix.
pub fn encoded_len(message: &DynamicMessage) -> usize {
    let mut visitor = SizeVisitor { total: 0 };
    run(traverse(message, &mut visitor));
    visitor.total
}

/// Discharges an infallible traversal result.
fn run(result: Result<(), Infallible>) {
    match result {
        Ok(()) => (),
        Err(never) => match never {},
    }
}

fn check_required(message: &DynamicMessage) -> Result<(), EncodeError> {
    if message.descriptor().syntax() == Syntax::Proto2 {
        for field in message.descriptor().fields() {
            if field.label == Label::Required && !message.has(field.number) {
                return Err(EncodeError::MissingRequiredField(field.name.clone()));
            }
        }
    }
    for (_, value) in message.fields() {
        check_required_value(value)?;
    }
    for ext in message.extensions() {
        check_required_value(&ext.value)?;
    }
    Ok(())
}

fn check_required_value(value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Message(nested) => check_required(nested),
        Value::List(items) => items.iter().try_for_each(check_required_value),
        Value::Map(entries) => entries.values().try_for_each(check_required_value),
        _ => Ok(()),
    }
}

struct SizeVisitor {
    total: usize,
}

impl Visitor for SizeVisitor {
    type Error = Infallible;

    fn visit_field(&mut self, field: &FieldDescriptor, value: &Value) -> Result<(), Infallible> {
        self.total += field_encoded_len(field, value);
        Ok(())
    }

    fn visit_unknown(&mut self, raw: &[u8]) -> Result<(), Infallible> {
        self.total += raw.len();
        Ok(())
    }
}

struct EncodeVisitor<'a, B: BufMut> {
    buf: &'a mut B,
}

impl<B: BufMut> Visitor for EncodeVisitor<'_, B> {
    type Error = Infallible;

    fn visit_field(&mut self, field: &FieldDescriptor, value: &Value) -> Result<(), Infallible> {
        encode_field(field, value, self.buf);
        Ok(())
    }

    fn visit_unknown(&mut self, raw: &[u8]) -> Result<(), Infallible> {
        self.buf.put_slice(raw);
        Ok(())
    }
}

/// Serialized length of one populated field, keys included.
pub(crate) fn field_encoded_len(field: &FieldDescriptor, value: &Value) -> usize {
    let key_len = encoded_key_len(field.number);
    match &field.kind {
        FieldKind::Map(map) => match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| {
                    let body = map_entry_len(map, k, v);
                    key_len + encoded_varint_len(body as u64) + body
                })
                .sum(),
            _ => 0,
        },
        FieldKind::Scalar(kind) => match value {
            Value::List(items) if field.packed && kind.is_packable() => {
                let payload: usize = items.iter().map(|v| scalar_len(*kind, v)).sum();
                key_len + encoded_varint_len(payload as u64) + payload
            }
            Value::List(items) => items
                .iter()
                .map(|v| key_len + scalar_len(*kind, v))
                .sum(),
            single => key_len + scalar_len(*kind, single),
        },
        FieldKind::Enum(_) => match value {
            Value::List(items) if field.packed => {
                let payload: usize = items.iter().map(enum_len).sum();
                key_len + encoded_varint_len(payload as u64) + payload
            }
            Value::List(items) => items.iter().map(|v| key_len + enum_len(v)).sum(),
            single => key_len + enum_len(single),
        },
        FieldKind::Message(_) => match value {
            Value::List(items) => items
                .iter()
                .map(|v| key_len + message_len_prefixed(v))
                .sum(),
            single => key_len + message_len_prefixed(single),
        },
        FieldKind::Group(_) => match value {
            // A group is bracketed by start and end keys of the same number.
            Value::List(items) => items
                .iter()
                .map(|v| 2 * key_len + message_body_len(v))
                .sum(),
            single => 2 * key_len + message_body_len(single),
        },
    }
}

/// Writes one populated field, keys included.
pub(crate) fn encode_field<B: BufMut>(field: &FieldDescriptor, value: &Value, buf: &mut B) {
    let number = field.number;
    match &field.kind {
        FieldKind::Map(map) => {
            if let Value::Map(entries) = value {
                for (k, v) in entries {
                    let body = map_entry_len(map, k, v);
                    encode_key(FieldKey::new(number, WireType::Len), buf);
                    encode_varint(body as u64, buf);
                    encode_map_entry(map, k, v, buf);
                }
            }
        }
        FieldKind::Scalar(kind) => match value {
            Value::List(items) if field.packed && kind.is_packable() => {
                let payload: usize = items.iter().map(|v| scalar_len(*kind, v)).sum();
                encode_key(FieldKey::new(number, WireType::Len), buf);
                encode_varint(payload as u64, buf);
                for item in items {
                    encode_scalar(*kind, item, buf);
                }
            }
            Value::List(items) => {
                for item in items {
                    encode_key(FieldKey::new(number, kind.wire_type()), buf);
                    encode_scalar(*kind, item, buf);
                }
            }
            single => {
                encode_key(FieldKey::new(number, kind.wire_type()), buf);
                encode_scalar(*kind, single, buf);
            }
        },
        FieldKind::Enum(_) => match value {
            Value::List(items) if field.packed => {
                let payload: usize = items.iter().map(enum_len).sum();
                encode_key(FieldKey::new(number, WireType::Len), buf);
                encode_varint(payload as u64, buf);
                for item in items {
                    encode_varint(enum_repr(item), buf);
                }
            }
            Value::List(items) => {
                for item in items {
                    encode_key(FieldKey::new(number, WireType::Varint), buf);
                    encode_varint(enum_repr(item), buf);
                }
            }
            single => {
                encode_key(FieldKey::new(number, WireType::Varint), buf);
                encode_varint(enum_repr(single), buf);
            }
        },
        FieldKind::Message(_) => match value {
            Value::List(items) => {
                for item in items {
                    encode_message_field(number, item, buf);
                }
            }
            single => encode_message_field(number, single, buf),
        },
        FieldKind::Group(_) => match value {
            Value::List(items) => {
                for item in items {
                    encode_group_field(number, item, buf);
                }
            }
            single => encode_group_field(number, single, buf),
        },
    }
}

fn encode_message_field<B: BufMut>(number: u32, value: &Value, buf: &mut B) {
    encode_key(FieldKey::new(number, WireType::Len), buf);
    encode_varint(message_body_len(value) as u64, buf);
    if let Value::Message(nested) = value {
        run(traverse(nested, &mut EncodeVisitor { buf }));
    }
}

fn encode_group_field<B: BufMut>(number: u32, value: &Value, buf: &mut B) {
    encode_key(FieldKey::new(number, WireType::StartGroup), buf);
    if let Value::Message(nested) = value {
        run(traverse(nested, &mut EncodeVisitor { buf }));
    }
    encode_key(FieldKey::new(number, WireType::EndGroup), buf);
}

fn message_body_len(value: &Value) -> usize {
    match value {
        Value::Message(nested) => encoded_len(nested),
        _ => 0,
    }
}

fn message_len_prefixed(value: &Value) -> usize {
    let body = message_body_len(value);
    encoded_varint_len(body as u64) + body
}

/// Entry body length with default halves omitted; message values always
/// emit.
fn map_entry_len(map: &MapKind, key: &MapKey, value: &Value) -> usize {
    let mut len = 0;
    if !map_key_is_default(key) {
        len += encoded_key_len(1) + map_key_len(map.key, key);
    }
    match &map.value {
        FieldKind::Message(_) => {
            len += encoded_key_len(2) + message_len_prefixed(value);
        }
        FieldKind::Enum(_) => {
            if !value.is_default(&map.value) {
                len += encoded_key_len(2) + enum_len(value);
            }
        }
        FieldKind::Scalar(kind) => {
            if !value.is_default(&map.value) {
                len += encoded_key_len(2) + scalar_len(*kind, value);
            }
        }
        _ => {}
    }
    len
}

fn encode_map_entry<B: BufMut>(map: &MapKind, key: &MapKey, value: &Value, buf: &mut B) {
    if !map_key_is_default(key) {
        encode_key(FieldKey::new(1, map.key.wire_type()), buf);
        encode_map_key(map.key, key, buf);
    }
    match &map.value {
        FieldKind::Message(_) => encode_message_field(2, value, buf),
        FieldKind::Enum(_) => {
            if !value.is_default(&map.value) {
                encode_key(FieldKey::new(2, WireType::Varint), buf);
                encode_varint(enum_repr(value), buf);
            }
        }
        FieldKind::Scalar(kind) => {
            if !value.is_default(&map.value) {
                encode_key(FieldKey::new(2, kind.wire_type()), buf);
                encode_scalar(*kind, value, buf);
            }
        }
        _ => {}
    }
}

fn map_key_is_default(key: &MapKey) -> bool {
    match key {
        MapKey::Bool(v) => !v,
        MapKey::I32(v) => *v == 0,
        MapKey::I64(v) => *v == 0,
        MapKey::U32(v) => *v == 0,
        MapKey::U64(v) => *v == 0,
        MapKey::String(v) => v.is_empty(),
    }
}

fn map_key_len(kind: ScalarKind, key: &MapKey) -> usize {
    match key {
        MapKey::String(v) => encoded_varint_len(v.len() as u64) + v.len(),
        _ => scalar_len(kind, &key.to_value()),
    }
}

fn encode_map_key<B: BufMut>(kind: ScalarKind, key: &MapKey, buf: &mut B) {
    match key {
        MapKey::String(v) => {
            encode_varint(v.len() as u64, buf);
            buf.put_slice(v.as_bytes());
        }
        _ => encode_scalar(kind, &key.to_value(), buf),
    }
}

/// Enum numbers encode as varints sign-extended to 64 bits, so negative
/// values always take 10 bytes.
fn enum_repr(value: &Value) -> u64 {
    match value {
        Value::Enum(n) => i64::from(*n) as u64,
        _ => 0,
    }
}

fn enum_len(value: &Value) -> usize {
    encoded_varint_len(enum_repr(value))
}

/// Serialized length of one scalar value, without its key.
pub(crate) fn scalar_len(kind: ScalarKind, value: &Value) -> usize {
    match kind.wire_type() {
        WireType::Varint => encoded_varint_len(varint_repr(kind, value)),
        WireType::Fixed32 => 4,
        WireType::Fixed64 => 8,
        WireType::Len => {
            let len = match value {
                Value::String(v) => v.len(),
                Value::Bytes(v) => v.len(),
                _ => 0,
            };
            encoded_varint_len(len as u64) + len
        }
        WireType::StartGroup | WireType::EndGroup => 0,
    }
}

/// Writes one scalar value, without its key.
pub(crate) fn encode_scalar<B: BufMut>(kind: ScalarKind, value: &Value, buf: &mut B) {
    match kind {
        ScalarKind::Bool
        | ScalarKind::Int32
        | ScalarKind::Int64
        | ScalarKind::UInt32
        | ScalarKind::UInt64
        | ScalarKind::SInt32
        | ScalarKind::SInt64 => {
            encode_varint(varint_repr(kind, value), buf);
        }
        ScalarKind::Fixed32 => {
            if let Value::U32(v) = value {
                buf.put_u32_le(*v);
            }
        }
        ScalarKind::SFixed32 => {
            if let Value::I32(v) = value {
                buf.put_i32_le(*v);
            }
        }
        ScalarKind::Float => {
            if let Value::F32(v) = value {
                buf.put_u32_le(v.to_bits());
            }
        }
        ScalarKind::Fixed64 => {
            if let Value::U64(v) = value {
                buf.put_u64_le(*v);
            }
        }
        ScalarKind::SFixed64 => {
            if let Value::I64(v) = value {
                buf.put_i64_le(*v);
            }
        }
        ScalarKind::Double => {
            if let Value::F64(v) = value {
                buf.put_u64_le(v.to_bits());
            }
        }
        ScalarKind::String => {
            if let Value::String(v) = value {
                encode_varint(v.len() as u64, buf);
                buf.put_slice(v.as_bytes());
            }
        }
        ScalarKind::Bytes => {
            if let Value::Bytes(v) = value {
                encode_varint(v.len() as u64, buf);
                buf.put_slice(v);
            }
        }
    }
}

/// The u64 a varint scalar puts on the wire. `int32` sign-extends through
/// 64 bits, which is why negative `int32` values cost 10 bytes.
fn varint_repr(kind: ScalarKind, value: &Value) -> u64 {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(v)) => u64::from(*v),
        (ScalarKind::Int32, Value::I32(v)) => i64::from(*v) as u64,
        (ScalarKind::Int64, Value::I64(v)) => *v as u64,
        (ScalarKind::UInt32, Value::U32(v)) => u64::from(*v),
        (ScalarKind::UInt64, Value::U64(v)) => *v,
        (ScalarKind::SInt32, Value::I32(v)) => u64::from(zigzag_encode_32(*v)),
        (ScalarKind::SInt64, Value::I64(v)) => zigzag_encode_64(*v),
        _ => 0,
    }
}
