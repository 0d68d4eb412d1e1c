//! Binary protobuf decoding.
//!
//! The decoder wraps a [`Scanner`] with field-number/wire-type bookkeeping:
//! each key read off the wire is dispatched to a typed decode operation
//! chosen by the field's descriptor. A wire-type mismatch is caught at the
//! per-field boundary and the raw bytes are rerouted to the unknown-field
//! set; every other error aborts the whole decode.

// Casts here truncate varints into narrower integer widths deliberately.
#![allow(clippy::as_conversions)]

use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;

use crate::binary::scan::Scanner;
use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, Label, MapKind, MessageDescriptor, ScalarKind,
    Syntax,
};
use crate::error::DecodeError;
use crate::extensions::ExtensionRegistry;
use crate::value::{DynamicMessage, MapKey, Value};
use crate::varint::{encode_varint, zigzag_decode_32, zigzag_decode_64};
use crate::wire::{FieldKey, WireType, MAX_MESSAGE_SIZE};

/// Knobs for one binary decode call.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Maximum message nesting before the decode fails with
    /// [`DecodeError::MessageDepthLimit`]. Recursion depth equals nesting
    /// depth, so this is the stack-overflow safeguard for adversarial input.
    pub message_depth_limit: usize,
    /// Drop unknown fields even for proto2 messages.
    pub discard_unknown_fields: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            message_depth_limit: 100,
            discard_unknown_fields: false,
        }
    }
}

/// Decodes one message from `bytes`, which must contain exactly one
/// serialized message.
pub fn decode_message(
    descriptor: &Arc<MessageDescriptor>,
    bytes: &[u8],
    options: &DecodeOptions,
) -> Result<DynamicMessage, DecodeError> {
    decode_inner(descriptor, bytes, options, None)
}

/// Like [`decode_message`], consulting `extensions` for field numbers the
/// descriptor does not recognize.
pub fn decode_message_with_extensions(
    descriptor: &Arc<MessageDescriptor>,
    bytes: &[u8],
    options: &DecodeOptions,
    extensions: &ExtensionRegistry,
) -> Result<DynamicMessage, DecodeError> {
    decode_inner(descriptor, bytes, options, Some(extensions))
}

fn decode_inner(
    descriptor: &Arc<MessageDescriptor>,
    bytes: &[u8],
    options: &DecodeOptions,
    extensions: Option<&ExtensionRegistry>,
) -> Result<DynamicMessage, DecodeError> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(DecodeError::TooLarge);
    }
    let mut message = DynamicMessage::new(descriptor.clone());
    let mut scanner = Scanner::new(bytes);
    let mut decoder = Decoder {
        options,
        extensions,
        depth: 0,
    };
    decoder.merge_fields(&mut scanner, &mut message, None)?;
    check_required(&message)?;
    Ok(message)
}

/// Per-call decoder state. Created per top-level decode and carried through
/// every nested message, group, and map entry.
struct Decoder<'o, 'r> {
    options: &'o DecodeOptions,
    extensions: Option<&'r ExtensionRegistry>,
    depth: usize,
}

impl Decoder<'_, '_> {
    fn enter(&mut self) -> Result<(), DecodeError> {
        if self.depth >= self.options.message_depth_limit {
            return Err(DecodeError::MessageDepthLimit);
        }
        self.depth += 1;
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    fn preserves_unknown(&self, descriptor: &MessageDescriptor) -> bool {
        descriptor.syntax() == Syntax::Proto2 && !self.options.discard_unknown_fields
    }

    /// The field loop. `group` carries the field number whose end-group key
    /// terminates this scope; `None` means plain end-of-input terminates.
    fn merge_fields(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        group: Option<u32>,
    ) -> Result<(), DecodeError> {
        loop {
            let Some(key) = scanner.read_key()? else {
                if group.is_some() {
                    // Group never saw its terminator.
                    return Err(DecodeError::Truncated);
                }
                break;
            };
            if key.wire_type == WireType::EndGroup {
                match group {
                    Some(number) if key.number == number => break,
                    Some(_) => {
                        return Err(DecodeError::MalformedProtobuf("mismatched end-group"))
                    }
                    None => return Err(DecodeError::MalformedProtobuf("end-group without start")),
                }
            }
            self.decode_one(scanner, message, key)?;
        }
        Ok(())
    }

    /// Decodes one key/value record, including the schema-mismatch recovery
    /// that turns incompatible fields into unknown bytes.
    fn decode_one(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        let descriptor = message.descriptor().clone();

        if let Some(field) = descriptor.field(key.number) {
            let value_start = scanner.position();
            match self.decode_field(scanner, message, field, key) {
                Ok(()) => Ok(()),
                Err(DecodeError::SchemaMismatch { .. }) => {
                    // Rewind and re-skip so the raw value bytes survive a
                    // round-trip instead of aborting the decode.
                    scanner.rewind_to(value_start);
                    let raw = scanner.skip_value(key)?;
                    if self.preserves_unknown(&descriptor) {
                        message.unknown_mut().push_field(key, raw);
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            }
        } else if let Some(ext) = self
            .extensions
            .and_then(|r| r.by_number(descriptor.full_name(), key.number))
            .cloned()
        {
            let value_start = scanner.position();
            match self.decode_extension(scanner, message, &ext, key) {
                Ok(()) => Ok(()),
                Err(DecodeError::SchemaMismatch { .. }) => {
                    scanner.rewind_to(value_start);
                    let raw = scanner.skip_value(key)?;
                    if self.preserves_unknown(&descriptor) {
                        message.unknown_mut().push_field(key, raw);
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            }
        } else {
            let raw = scanner.skip_value(key)?;
            if self.preserves_unknown(&descriptor) {
                message.unknown_mut().push_field(key, raw);
            }
            Ok(())
        }
    }

    fn decode_field(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        match &field.kind {
            FieldKind::Map(map) => self.decode_map_field(scanner, message, field.number, map, key),
            _ if field.label == Label::Repeated => {
                self.decode_repeated_field(scanner, message, field, key)
            }
            _ => self.decode_singular_field(scanner, message, field, key),
        }
    }

    fn decode_singular_field(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        match &field.kind {
            FieldKind::Scalar(kind) => {
                expect_wire(key, kind.wire_type())?;
                let value = decode_scalar(scanner, *kind)?;
                message.set(field.number, value);
            }
            FieldKind::Enum(desc) => {
                expect_wire(key, WireType::Varint)?;
                let number = self.decode_enum_number(scanner, message, desc)?;
                message.set(field.number, Value::Enum(number));
            }
            FieldKind::Message(desc) => {
                expect_wire(key, WireType::Len)?;
                let span = scanner.read_length_delimited()?;
                self.merge_nested(message, field, desc, |decoder, nested| {
                    let mut sub = Scanner::new(span);
                    decoder.merge_fields(&mut sub, nested, None)
                })?;
            }
            FieldKind::Group(desc) => {
                expect_wire(key, WireType::StartGroup)?;
                self.merge_nested(message, field, desc, |decoder, nested| {
                    decoder.merge_fields(scanner, nested, Some(key.number))
                })?;
            }
            FieldKind::Map(_) => unreachable!("maps dispatch through decode_map_field"),
        }
        Ok(())
    }

    /// Decodes into an existing nested message (protobuf merge semantics) or
    /// a fresh one on first occurrence.
    fn merge_nested(
        &mut self,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
        desc: &Arc<MessageDescriptor>,
        decode: impl FnOnce(&mut Self, &mut DynamicMessage) -> Result<(), DecodeError>,
    ) -> Result<(), DecodeError> {
        self.enter()?;
        if !matches!(message.get(field.number), Some(Value::Message(_))) {
            message.set(
                field.number,
                Value::Message(DynamicMessage::new(desc.clone())),
            );
        }
        let Some(Value::Message(nested)) = message.get_mut(field.number) else {
            unreachable!("just ensured a message value");
        };
        let result = decode(self, nested);
        self.exit();
        result
    }

    /// Reads one enum varint. Proto2 messages treat values the schema does
    /// not name as unknown fields; proto3 keeps the raw number.
    fn decode_enum_number(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &DynamicMessage,
        desc: &EnumDescriptor,
    ) -> Result<i32, DecodeError> {
        let number = truncate_i32(scanner.read_varint()?);
        if message.descriptor().syntax() == Syntax::Proto2 && desc.name(number).is_none() {
            return Err(DecodeError::SchemaMismatch {
                actual: WireType::Varint,
            });
        }
        Ok(number)
    }

    fn decode_repeated_field(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        match &field.kind {
            FieldKind::Scalar(kind) => {
                if key.wire_type == WireType::Len && kind.is_packable() {
                    // A packed span appends every element from one record.
                    let span = scanner.read_length_delimited()?;
                    if let Some(width) = kind.fixed_width() {
                        if span.len() % width != 0 {
                            return Err(DecodeError::MalformedProtobuf(
                                "packed span is not a multiple of the element width",
                            ));
                        }
                    }
                    let mut sub = Scanner::new(span);
                    while !sub.is_at_end() {
                        let value = decode_scalar(&mut sub, *kind)?;
                        message.append(field.number, value);
                    }
                } else if key.wire_type == kind.wire_type() {
                    let value = decode_scalar(scanner, *kind)?;
                    message.append(field.number, value);
                } else {
                    return Err(DecodeError::SchemaMismatch {
                        actual: key.wire_type,
                    });
                }
            }
            FieldKind::Enum(desc) => self.decode_repeated_enum(scanner, message, field, desc.clone(), key)?,
            FieldKind::Message(desc) => {
                expect_wire(key, WireType::Len)?;
                let span = scanner.read_length_delimited()?;
                self.enter()?;
                let mut nested = DynamicMessage::new(desc.clone());
                let mut sub = Scanner::new(span);
                let result = self.merge_fields(&mut sub, &mut nested, None);
                self.exit();
                result?;
                message.append(field.number, Value::Message(nested));
            }
            FieldKind::Group(desc) => {
                expect_wire(key, WireType::StartGroup)?;
                self.enter()?;
                let mut nested = DynamicMessage::new(desc.clone());
                let result = self.merge_fields(scanner, &mut nested, Some(key.number));
                self.exit();
                result?;
                message.append(field.number, Value::Message(nested));
            }
            FieldKind::Map(_) => unreachable!("maps dispatch through decode_map_field"),
        }
        Ok(())
    }

    /// Repeated enums are the one deliberately special case in the design:
    /// a packed span may hold values the receiving enum does not name, and
    /// those must survive a re-serialize. Known values are appended;
    /// unrecognized ones are re-encoded into a synthetic packed unknown
    /// field under the original field number.
    fn decode_repeated_enum(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
        desc: Arc<EnumDescriptor>,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        let proto2 = message.descriptor().syntax() == Syntax::Proto2;
        match key.wire_type {
            WireType::Varint => {
                let number = truncate_i32(scanner.read_varint()?);
                if proto2 && desc.name(number).is_none() {
                    return Err(DecodeError::SchemaMismatch {
                        actual: key.wire_type,
                    });
                }
                message.append(field.number, Value::Enum(number));
            }
            WireType::Len => {
                let span = scanner.read_length_delimited()?;
                let mut sub = Scanner::new(span);
                let mut extras: SmallVec<[i32; 8]> = SmallVec::new();
                while !sub.is_at_end() {
                    let number = truncate_i32(sub.read_varint()?);
                    if proto2 && desc.name(number).is_none() {
                        extras.push(number);
                    } else {
                        message.append(field.number, Value::Enum(number));
                    }
                }
                if !extras.is_empty() && !self.options.discard_unknown_fields {
                    let mut payload = Vec::with_capacity(extras.len());
                    for extra in &extras {
                        // Enum varints are sign-extended to 64 bits.
                        encode_varint(i64::from(*extra) as u64, &mut payload);
                    }
                    message
                        .unknown_mut()
                        .push_length_delimited(field.number, &payload);
                }
            }
            other => {
                return Err(DecodeError::SchemaMismatch { actual: other });
            }
        }
        Ok(())
    }

    /// Each map entry is a 2-field message: field 1 the key, field 2 the
    /// value. Missing halves default; unknown fields inside an entry are
    /// silently dropped (intentional protobuf map semantics, unlike the
    /// top-level unknown set).
    fn decode_map_field(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        number: u32,
        map: &MapKind,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        expect_wire(key, WireType::Len)?;
        let span = scanner.read_length_delimited()?;
        let mut sub = Scanner::new(span);

        let mut entry_key: Option<MapKey> = None;
        let mut entry_value: Option<Value> = None;
        let mut drop_entry = false;

        while let Some(field_key) = sub.read_key()? {
            match field_key.number {
                1 if field_key.wire_type == map.key.wire_type() => {
                    entry_key = Some(MapKey::from_value(decode_scalar(&mut sub, map.key)?));
                }
                2 => match &map.value {
                    FieldKind::Scalar(kind) if field_key.wire_type == kind.wire_type() => {
                        entry_value = Some(decode_scalar(&mut sub, *kind)?);
                    }
                    FieldKind::Enum(desc) if field_key.wire_type == WireType::Varint => {
                        let value = truncate_i32(sub.read_varint()?);
                        if message.descriptor().syntax() == Syntax::Proto2
                            && desc.name(value).is_none()
                        {
                            // Proto2 drops the whole entry for an enum value
                            // it does not name.
                            drop_entry = true;
                        } else {
                            entry_value = Some(Value::Enum(value));
                        }
                    }
                    FieldKind::Message(desc) if field_key.wire_type == WireType::Len => {
                        let nested_span = sub.read_length_delimited()?;
                        self.enter()?;
                        let mut nested = DynamicMessage::new(desc.clone());
                        let mut nested_scanner = Scanner::new(nested_span);
                        let result = self.merge_fields(&mut nested_scanner, &mut nested, None);
                        self.exit();
                        result?;
                        entry_value = Some(Value::Message(nested));
                    }
                    _ => {
                        sub.skip_value(field_key)?;
                    }
                },
                _ => {
                    sub.skip_value(field_key)?;
                }
            }
        }

        if !drop_entry {
            let entry_key = entry_key.unwrap_or_else(|| MapKey::default_for(map.key));
            let entry_value = entry_value.unwrap_or_else(|| Value::default_for(&map.value));
            message.insert_map_entry(number, entry_key, entry_value);
        }
        Ok(())
    }

    /// Extensions decode like regular fields but land in the extension set.
    /// Maps cannot be extensions, so only scalar/enum/message/group shapes
    /// appear here.
    fn decode_extension(
        &mut self,
        scanner: &mut Scanner<'_>,
        message: &mut DynamicMessage,
        ext: &Arc<FieldDescriptor>,
        key: FieldKey,
    ) -> Result<(), DecodeError> {
        let repeated = ext.label == Label::Repeated;
        match &ext.kind {
            FieldKind::Scalar(kind) => {
                if repeated && key.wire_type == WireType::Len && kind.is_packable() {
                    let span = scanner.read_length_delimited()?;
                    if let Some(width) = kind.fixed_width() {
                        if span.len() % width != 0 {
                            return Err(DecodeError::MalformedProtobuf(
                                "packed span is not a multiple of the element width",
                            ));
                        }
                    }
                    let mut sub = Scanner::new(span);
                    while !sub.is_at_end() {
                        let value = decode_scalar(&mut sub, *kind)?;
                        append_extension(message, ext, value);
                    }
                } else {
                    expect_wire(key, kind.wire_type())?;
                    let value = decode_scalar(scanner, *kind)?;
                    if repeated {
                        append_extension(message, ext, value);
                    } else {
                        message.set_extension(ext.clone(), value);
                    }
                }
            }
            FieldKind::Enum(desc) => {
                expect_wire(key, WireType::Varint)?;
                let number = self.decode_enum_number(scanner, message, desc)?;
                if repeated {
                    append_extension(message, ext, Value::Enum(number));
                } else {
                    message.set_extension(ext.clone(), Value::Enum(number));
                }
            }
            FieldKind::Message(desc) => {
                expect_wire(key, WireType::Len)?;
                let span = scanner.read_length_delimited()?;
                self.enter()?;
                let mut nested = match (repeated, message.get_extension(ext.number)) {
                    (false, Some(Value::Message(existing))) => existing.clone(),
                    _ => DynamicMessage::new(desc.clone()),
                };
                let mut sub = Scanner::new(span);
                let result = self.merge_fields(&mut sub, &mut nested, None);
                self.exit();
                result?;
                if repeated {
                    append_extension(message, ext, Value::Message(nested));
                } else {
                    message.set_extension(ext.clone(), Value::Message(nested));
                }
            }
            FieldKind::Group(desc) => {
                expect_wire(key, WireType::StartGroup)?;
                self.enter()?;
                let mut nested = DynamicMessage::new(desc.clone());
                let result = self.merge_fields(scanner, &mut nested, Some(key.number));
                self.exit();
                result?;
                if repeated {
                    append_extension(message, ext, Value::Message(nested));
                } else {
                    message.set_extension(ext.clone(), Value::Message(nested));
                }
            }
            FieldKind::Map(_) => unreachable!("map fields cannot be extensions"),
        }
        Ok(())
    }
}

fn append_extension(message: &mut DynamicMessage, ext: &Arc<FieldDescriptor>, value: Value) {
    match message.get_extension_mut(ext.number) {
        Some(existing) => {
            if let Value::List(list) = &mut existing.value {
                list.push(value);
            } else {
                existing.value = Value::List(vec![value]);
            }
        }
        None => message.set_extension(ext.clone(), Value::List(vec![value])),
    }
}

#[inline(always)]
fn expect_wire(key: FieldKey, expected: WireType) -> Result<(), DecodeError> {
    if key.wire_type == expected {
        Ok(())
    } else {
        Err(DecodeError::SchemaMismatch {
            actual: key.wire_type,
        })
    }
}

/// One generic scalar decode, parameterized over the closed set of
/// primitive type tags.
pub(crate) fn decode_scalar(
    scanner: &mut Scanner<'_>,
    kind: ScalarKind,
) -> Result<Value, DecodeError> {
    let value = match kind {
        ScalarKind::Bool => Value::Bool(scanner.read_varint()? != 0),
        ScalarKind::Int32 => Value::I32(truncate_i32(scanner.read_varint()?)),
        ScalarKind::Int64 => Value::I64(scanner.read_varint()? as i64),
        ScalarKind::UInt32 => Value::U32(scanner.read_varint()? as u32),
        ScalarKind::UInt64 => Value::U64(scanner.read_varint()?),
        ScalarKind::SInt32 => Value::I32(zigzag_decode_32(scanner.read_varint()? as u32)),
        ScalarKind::SInt64 => Value::I64(zigzag_decode_64(scanner.read_varint()?)),
        ScalarKind::Fixed32 => Value::U32(scanner.read_fixed32()?),
        ScalarKind::Fixed64 => Value::U64(scanner.read_fixed64()?),
        ScalarKind::SFixed32 => Value::I32(scanner.read_fixed32()? as i32),
        ScalarKind::SFixed64 => Value::I64(scanner.read_fixed64()? as i64),
        ScalarKind::Float => Value::F32(f32::from_bits(scanner.read_fixed32()?)),
        ScalarKind::Double => Value::F64(f64::from_bits(scanner.read_fixed64()?)),
        ScalarKind::String => {
            let span = scanner.read_length_delimited()?;
            let text = std::str::from_utf8(span).map_err(|_| DecodeError::InvalidUtf8)?;
            Value::String(text.to_owned())
        }
        ScalarKind::Bytes => Value::Bytes(Bytes::copy_from_slice(scanner.read_length_delimited()?)),
    };
    Ok(value)
}

#[inline(always)]
fn truncate_i32(value: u64) -> i32 {
    value as u32 as i32
}

/// Post-parse required-field check over the fully merged tree. Running it
/// per nested span would reject a required field supplied across two
/// occurrences of the same singular message, which merge semantics allow.
fn check_required(message: &DynamicMessage) -> Result<(), DecodeError> {
    if message.descriptor().syntax() == Syntax::Proto2 {
        for field in message.descriptor().fields() {
            if field.label == Label::Required && !message.has(field.number) {
                return Err(DecodeError::MissingRequiredField(field.name.clone()));
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

fn check_required_value(value: &Value) -> Result<(), DecodeError> {
    match value {
        Value::Message(nested) => check_required(nested),
        Value::List(items) => items.iter().try_for_each(check_required_value),
        Value::Map(entries) => entries.values().try_for_each(check_required_value),
        _ => Ok(()),
    }
}
