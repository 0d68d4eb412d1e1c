//! JSON to message decoding, per the proto3 canonical JSON mapping.
//!
//! Field names resolve through the JSON-name table first and proto names
//! second. `null` leaves a field unset (except `google.protobuf.Value` and
//! `google.protobuf.NullValue`, which represent it). Unlike the binary
//! decoder, a second member of the same oneof is an error here: JSON carries
//! field names, so the conflict is visible and reportable.

use std::sync::Arc;

use bytes::Bytes;

use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, Label, MapKind, MessageDescriptor, ScalarKind,
};
use crate::error::DecodeError;
use crate::extensions::ExtensionRegistry;
use crate::json::base64;
use crate::json::scan::{
    parse_f32, parse_f64, parse_i32, parse_i64, parse_u32, parse_u64, JsonScanner, JsonToken,
};
use crate::json::well_known;
use crate::value::{DynamicMessage, MapKey, Value};

/// Knobs for one JSON decode call.
#[derive(Debug, Clone, Copy)]
pub struct JsonDecodeOptions {
    /// Skip unknown object members and unrecognized enum names instead of
    /// failing. JSON has no unknown-field preservation; skipped means gone.
    pub ignore_unknown_fields: bool,
    /// Maximum message nesting before the decode fails.
    pub message_depth_limit: usize,
}

impl Default for JsonDecodeOptions {
    fn default() -> Self {
        JsonDecodeOptions {
            ignore_unknown_fields: false,
            message_depth_limit: 100,
        }
    }
}

/// Decodes one message from `text`, which must hold exactly one JSON value.
pub fn decode_json(
    descriptor: &Arc<MessageDescriptor>,
    text: &str,
    options: &JsonDecodeOptions,
) -> Result<DynamicMessage, DecodeError> {
    decode_inner(descriptor, text, options, None)
}

/// Like [`decode_json`], resolving bracketed `[full.name]` members through
/// `extensions`.
pub fn decode_json_with_extensions(
    descriptor: &Arc<MessageDescriptor>,
    text: &str,
    options: &JsonDecodeOptions,
    extensions: &ExtensionRegistry,
) -> Result<DynamicMessage, DecodeError> {
    decode_inner(descriptor, text, options, Some(extensions))
}

fn decode_inner(
    descriptor: &Arc<MessageDescriptor>,
    text: &str,
    options: &JsonDecodeOptions,
    extensions: Option<&ExtensionRegistry>,
) -> Result<DynamicMessage, DecodeError> {
    let mut scanner = JsonScanner::new(text);
    let mut decoder = JsonDecoder {
        options,
        extensions,
        depth: 0,
    };
    let mut message = DynamicMessage::new(descriptor.clone());
    decoder.decode_message(&mut scanner, &mut message)?;
    if !scanner.is_at_end() {
        return Err(DecodeError::TrailingGarbage(scanner.remaining()));
    }
    Ok(message)
}

pub(crate) struct JsonDecoder<'o, 'r> {
    pub(crate) options: &'o JsonDecodeOptions,
    extensions: Option<&'r ExtensionRegistry>,
    depth: usize,
}

impl JsonDecoder<'_, '_> {
    pub(crate) fn enter(&mut self) -> Result<(), DecodeError> {
        if self.depth >= self.options.message_depth_limit {
            return Err(DecodeError::MessageDepthLimit);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Decodes one JSON value into `message`, dispatching well-known types
    /// to their special representations.
    pub(crate) fn decode_message(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        message: &mut DynamicMessage,
    ) -> Result<(), DecodeError> {
        if let Some(kind) = well_known::classify(message.descriptor().full_name()) {
            return well_known::decode(self, kind, scanner, message);
        }
        self.decode_plain_object(scanner, message)
    }

    pub(crate) fn decode_plain_object(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        message: &mut DynamicMessage,
    ) -> Result<(), DecodeError> {
        scanner.expect(JsonToken::ObjectStart)?;
        if *scanner.peek()? == JsonToken::ObjectEnd {
            scanner.next()?;
            return Ok(());
        }
        loop {
            let name = match scanner.next()? {
                JsonToken::String(name) => name,
                _ => return Err(DecodeError::MalformedJson("expected object key")),
            };
            scanner.expect(JsonToken::Colon)?;
            self.decode_member(scanner, message, &name)?;
            match scanner.next()? {
                JsonToken::Comma => continue,
                JsonToken::ObjectEnd => break,
                _ => return Err(DecodeError::MalformedJson("expected ',' or '}'")),
            }
        }
        Ok(())
    }

    fn decode_member(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        message: &mut DynamicMessage,
        name: &str,
    ) -> Result<(), DecodeError> {
        let descriptor = message.descriptor().clone();

        // Extensions appear as bracketed full names: "[my.pkg.ext_field]".
        if let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
            if let Some(ext) = self
                .extensions
                .and_then(|r| r.by_name(descriptor.full_name(), inner))
                .cloned()
            {
                return self.decode_extension_member(scanner, message, &ext);
            }
            return self.unknown_member(scanner, name);
        }

        match descriptor.field_by_any_name(name) {
            Some(field) => self.decode_field_member(scanner, message, field),
            None => self.unknown_member(scanner, name),
        }
    }

    fn unknown_member(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        name: &str,
    ) -> Result<(), DecodeError> {
        if self.options.ignore_unknown_fields {
            self.skip_value(scanner)
        } else {
            Err(DecodeError::UnknownField(name.to_owned()))
        }
    }

    fn decode_field_member(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
    ) -> Result<(), DecodeError> {
        if *scanner.peek()? == JsonToken::Null && !well_known::accepts_null(&field.kind) {
            scanner.next()?;
            return Ok(());
        }
        if let Some(oneof) = field.oneof {
            if message.oneof_member(oneof).is_some() {
                return Err(DecodeError::ConflictingOneof(
                    message.descriptor().oneof_name(oneof).to_owned(),
                ));
            }
        }

        if let FieldKind::Map(map) = &field.kind {
            let entries = self.decode_map(scanner, map)?;
            message.set(field.number, Value::Map(entries));
        } else if field.label == Label::Repeated {
            let items = self.decode_array(scanner, &field.kind)?;
            message.set(field.number, Value::List(items));
        } else if let Some(value) = self.decode_singular(scanner, &field.kind)? {
            message.set(field.number, value);
        }
        Ok(())
    }

    fn decode_extension_member(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        message: &mut DynamicMessage,
        ext: &Arc<FieldDescriptor>,
    ) -> Result<(), DecodeError> {
        if *scanner.peek()? == JsonToken::Null && !well_known::accepts_null(&ext.kind) {
            scanner.next()?;
            return Ok(());
        }
        if ext.label == Label::Repeated {
            let items = self.decode_array(scanner, &ext.kind)?;
            message.set_extension(ext.clone(), Value::List(items));
        } else if let Some(value) = self.decode_singular(scanner, &ext.kind)? {
            message.set_extension(ext.clone(), value);
        }
        Ok(())
    }

    pub(crate) fn decode_array(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        kind: &FieldKind,
    ) -> Result<Vec<Value>, DecodeError> {
        scanner.expect(JsonToken::ArrayStart)?;
        let mut items = Vec::new();
        if *scanner.peek()? == JsonToken::ArrayEnd {
            scanner.next()?;
            return Ok(items);
        }
        loop {
            if *scanner.peek()? == JsonToken::Null && !well_known::accepts_null(kind) {
                return Err(DecodeError::MalformedJson("null array element"));
            }
            if let Some(value) = self.decode_singular(scanner, kind)? {
                items.push(value);
            }
            match scanner.next()? {
                JsonToken::Comma => continue,
                JsonToken::ArrayEnd => break,
                _ => return Err(DecodeError::MalformedJson("expected ',' or ']'")),
            }
        }
        Ok(items)
    }

    fn decode_map(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        map: &MapKind,
    ) -> Result<std::collections::BTreeMap<MapKey, Value>, DecodeError> {
        scanner.expect(JsonToken::ObjectStart)?;
        let mut entries = std::collections::BTreeMap::new();
        if *scanner.peek()? == JsonToken::ObjectEnd {
            scanner.next()?;
            return Ok(entries);
        }
        loop {
            let raw_key = match scanner.next()? {
                JsonToken::String(key) => key,
                _ => return Err(DecodeError::MalformedJson("expected map key")),
            };
            let key = parse_map_key(map.key, &raw_key)?;
            scanner.expect(JsonToken::Colon)?;
            if let Some(value) = self.decode_singular(scanner, &map.value)? {
                entries.insert(key, value);
            }
            match scanner.next()? {
                JsonToken::Comma => continue,
                JsonToken::ObjectEnd => break,
                _ => return Err(DecodeError::MalformedJson("expected ',' or '}'")),
            }
        }
        Ok(entries)
    }

    /// Decodes one value of the given kind. `None` means the value was
    /// legally skipped (an unrecognized enum name under
    /// `ignore_unknown_fields`).
    pub(crate) fn decode_singular(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        kind: &FieldKind,
    ) -> Result<Option<Value>, DecodeError> {
        match kind {
            FieldKind::Scalar(scalar) => self.decode_scalar(scanner, *scalar).map(Some),
            FieldKind::Enum(desc) => self.decode_enum(scanner, desc),
            FieldKind::Message(desc) | FieldKind::Group(desc) => {
                self.enter()?;
                let mut nested = DynamicMessage::new(desc.clone());
                let result = self.decode_message(scanner, &mut nested);
                self.exit();
                result?;
                Ok(Some(Value::Message(nested)))
            }
            FieldKind::Map(_) => unreachable!("map values cannot themselves be maps"),
        }
    }

    pub(crate) fn decode_scalar(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        kind: ScalarKind,
    ) -> Result<Value, DecodeError> {
        let token = scanner.next()?;
        let value = match kind {
            ScalarKind::Bool => match token {
                JsonToken::True => Value::Bool(true),
                JsonToken::False => Value::Bool(false),
                _ => return Err(DecodeError::MalformedJson("expected boolean")),
            },
            ScalarKind::Int32 | ScalarKind::SInt32 | ScalarKind::SFixed32 => {
                Value::I32(parse_i32(numeric_text(&token)?)?)
            }
            ScalarKind::Int64 | ScalarKind::SInt64 | ScalarKind::SFixed64 => {
                Value::I64(parse_i64(numeric_text(&token)?)?)
            }
            ScalarKind::UInt32 | ScalarKind::Fixed32 => {
                Value::U32(parse_u32(numeric_text(&token)?)?)
            }
            ScalarKind::UInt64 | ScalarKind::Fixed64 => {
                Value::U64(parse_u64(numeric_text(&token)?)?)
            }
            ScalarKind::Float => Value::F32(parse_f32(numeric_text(&token)?)?),
            ScalarKind::Double => Value::F64(parse_f64(numeric_text(&token)?)?),
            ScalarKind::String => match token {
                JsonToken::String(text) => Value::String(text),
                _ => return Err(DecodeError::MalformedJson("expected string")),
            },
            ScalarKind::Bytes => match token {
                JsonToken::String(text) => Value::Bytes(Bytes::from(base64::decode(&text)?)),
                _ => return Err(DecodeError::MalformedJson("expected base64 string")),
            },
        };
        Ok(value)
    }

    fn decode_enum(
        &mut self,
        scanner: &mut JsonScanner<'_>,
        desc: &EnumDescriptor,
    ) -> Result<Option<Value>, DecodeError> {
        match scanner.next()? {
            JsonToken::String(name) => match desc.number(&name) {
                Some(number) => Ok(Some(Value::Enum(number))),
                None if self.options.ignore_unknown_fields => Ok(None),
                None => Err(DecodeError::UnrecognizedEnumValue {
                    enum_name: desc.full_name().to_owned(),
                }),
            },
            JsonToken::Number(raw) => Ok(Some(Value::Enum(parse_i32(raw)?))),
            JsonToken::Null if desc.full_name() == "google.protobuf.NullValue" => {
                Ok(Some(Value::Enum(0)))
            }
            _ => Err(DecodeError::MalformedJson("expected enum value")),
        }
    }

    /// Structurally skips one JSON value.
    pub(crate) fn skip_value(&mut self, scanner: &mut JsonScanner<'_>) -> Result<(), DecodeError> {
        let mut depth = 0usize;
        loop {
            match scanner.next()? {
                JsonToken::ObjectStart | JsonToken::ArrayStart => {
                    depth += 1;
                    if depth > self.options.message_depth_limit {
                        return Err(DecodeError::MessageDepthLimit);
                    }
                }
                JsonToken::ObjectEnd | JsonToken::ArrayEnd => {
                    if depth == 0 {
                        return Err(DecodeError::MalformedJson("unexpected close"));
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                JsonToken::Comma | JsonToken::Colon => {
                    if depth == 0 {
                        return Err(DecodeError::MalformedJson("unexpected token"));
                    }
                }
                _ => {
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// JSON map keys are always strings; the text inside must parse as the key
/// scalar type.
fn parse_map_key(kind: ScalarKind, text: &str) -> Result<MapKey, DecodeError> {
    let key = match kind {
        ScalarKind::Bool => match text {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(DecodeError::MalformedJson("invalid boolean map key")),
        },
        ScalarKind::Int32 | ScalarKind::SInt32 | ScalarKind::SFixed32 => {
            MapKey::I32(parse_i32(text)?)
        }
        ScalarKind::Int64 | ScalarKind::SInt64 | ScalarKind::SFixed64 => {
            MapKey::I64(parse_i64(text)?)
        }
        ScalarKind::UInt32 | ScalarKind::Fixed32 => MapKey::U32(parse_u32(text)?),
        ScalarKind::UInt64 | ScalarKind::Fixed64 => MapKey::U64(parse_u64(text)?),
        ScalarKind::String => MapKey::String(text.to_owned()),
        _ => return Err(DecodeError::MalformedJson("invalid map key type")),
    };
    Ok(key)
}

fn numeric_text<'t>(token: &'t JsonToken<'_>) -> Result<&'t str, DecodeError> {
    match token {
        JsonToken::Number(raw) => Ok(raw),
        // Quoted numbers are accepted for every numeric field.
        JsonToken::String(text) => Ok(text),
        _ => Err(DecodeError::MalformedJson("expected number")),
    }
}
