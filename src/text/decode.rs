//! Text format to message decoding.
//!
//! Fields resolve by proto name; groups resolve by their message's short
//! name. Extensions appear bracketed (`[my.pkg.ext_field]`). Repeated
//! fields accept both repeated occurrences and `[a, b, c]` list syntax,
//! and map fields decode entry messages with `key`/`value` members. As in
//! JSON, setting two members of one oneof is an error.

use std::sync::Arc;

use bytes::Bytes;

use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, Label, MapKind, MessageDescriptor, ScalarKind,
};
use crate::error::DecodeError;
use crate::extensions::ExtensionRegistry;
use crate::text::scan::TextScanner;
use crate::value::{DynamicMessage, MapKey, Value};

/// Knobs for one text decode call.
#[derive(Debug, Clone, Copy)]
pub struct TextDecodeOptions {
    /// Skip fields and extensions the schema does not name instead of
    /// failing.
    pub ignore_unknown_fields: bool,
    /// Maximum message nesting before the decode fails.
    pub message_depth_limit: usize,
}

impl Default for TextDecodeOptions {
    fn default() -> Self {
        TextDecodeOptions {
            ignore_unknown_fields: false,
            message_depth_limit: 100,
        }
    }
}

/// Decodes one message from text format.
pub fn decode_text(
    descriptor: &Arc<MessageDescriptor>,
    text: &str,
    options: &TextDecodeOptions,
) -> Result<DynamicMessage, DecodeError> {
    decode_inner(descriptor, text, options, None)
}

/// Like [`decode_text`], resolving bracketed extension names through
/// `extensions`.
pub fn decode_text_with_extensions(
    descriptor: &Arc<MessageDescriptor>,
    text: &str,
    options: &TextDecodeOptions,
    extensions: &ExtensionRegistry,
) -> Result<DynamicMessage, DecodeError> {
    decode_inner(descriptor, text, options, Some(extensions))
}

fn decode_inner(
    descriptor: &Arc<MessageDescriptor>,
    text: &str,
    options: &TextDecodeOptions,
    extensions: Option<&ExtensionRegistry>,
) -> Result<DynamicMessage, DecodeError> {
    let mut scanner = TextScanner::new(text);
    let mut decoder = TextDecoder {
        options,
        extensions,
        depth: 0,
    };
    let mut message = DynamicMessage::new(descriptor.clone());
    decoder.decode_fields(&mut scanner, &mut message, None)?;
    Ok(message)
}

struct TextDecoder<'o, 'r> {
    options: &'o TextDecodeOptions,
    extensions: Option<&'r ExtensionRegistry>,
    depth: usize,
}

impl TextDecoder<'_, '_> {
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

    /// The field loop: top-level runs to end of input, nested bodies run to
    /// their closing `}` or `>`.
    fn decode_fields(
        &mut self,
        scanner: &mut TextScanner<'_>,
        message: &mut DynamicMessage,
        terminator: Option<u8>,
    ) -> Result<(), DecodeError> {
        loop {
            match terminator {
                None => {
                    if scanner.is_at_end() {
                        break;
                    }
                }
                Some(close) => {
                    if scanner.is_at_end() {
                        return Err(DecodeError::MalformedText("unterminated message"));
                    }
                    if scanner.try_consume(close) {
                        break;
                    }
                }
            }
            self.decode_field(scanner, message)?;
            // Fields may be separated by an optional ',' or ';'.
            let _ = scanner.try_consume(b',') || scanner.try_consume(b';');
        }
        Ok(())
    }

    fn decode_field(
        &mut self,
        scanner: &mut TextScanner<'_>,
        message: &mut DynamicMessage,
    ) -> Result<(), DecodeError> {
        let descriptor = message.descriptor().clone();

        if scanner.try_consume(b'[') {
            let name = scanner.next_extension_name()?;
            return match self
                .extensions
                .and_then(|r| r.by_name(descriptor.full_name(), name))
                .cloned()
            {
                Some(ext) => self.decode_extension_value(scanner, message, &ext),
                None if self.options.ignore_unknown_fields => self.skip_unknown_value(scanner),
                None => Err(DecodeError::UnknownField(format!("[{name}]"))),
            };
        }

        let name = scanner.next_identifier()?;
        let field = descriptor
            .field_by_proto_name(name)
            .or_else(|| find_group_field(&descriptor, name));
        match field {
            Some(field) => self.decode_field_value(scanner, message, field),
            None if self.options.ignore_unknown_fields => self.skip_unknown_value(scanner),
            None => Err(DecodeError::UnknownField(name.to_owned())),
        }
    }

    fn decode_field_value(
        &mut self,
        scanner: &mut TextScanner<'_>,
        message: &mut DynamicMessage,
        field: &FieldDescriptor,
    ) -> Result<(), DecodeError> {
        if let Some(oneof) = field.oneof {
            if message.oneof_member(oneof).is_some() {
                return Err(DecodeError::ConflictingOneof(
                    message.descriptor().oneof_name(oneof).to_owned(),
                ));
            }
        }

        if let FieldKind::Map(map) = &field.kind {
            return self.decode_map_value(scanner, message, field.number, map);
        }

        self.expect_separator(scanner, &field.kind)?;
        if field.label == Label::Repeated {
            if scanner.try_consume(b'[') {
                if scanner.try_consume(b']') {
                    if !message.has(field.number) {
                        message.set(field.number, Value::List(Vec::new()));
                    }
                    return Ok(());
                }
                loop {
                    let value = self.decode_element(scanner, &field.kind)?;
                    message.append(field.number, value);
                    if scanner.try_consume(b']') {
                        break;
                    }
                    scanner.expect(b',', "expected ',' or ']'")?;
                }
            } else {
                let value = self.decode_element(scanner, &field.kind)?;
                message.append(field.number, value);
            }
        } else {
            let value = self.decode_element(scanner, &field.kind)?;
            message.set(field.number, value);
        }
        Ok(())
    }

    fn decode_extension_value(
        &mut self,
        scanner: &mut TextScanner<'_>,
        message: &mut DynamicMessage,
        ext: &Arc<FieldDescriptor>,
    ) -> Result<(), DecodeError> {
        self.expect_separator(scanner, &ext.kind)?;
        if ext.label == Label::Repeated {
            if scanner.try_consume(b'[') {
                if scanner.try_consume(b']') {
                    return Ok(());
                }
                loop {
                    let value = self.decode_element(scanner, &ext.kind)?;
                    append_extension(message, ext, value);
                    if scanner.try_consume(b']') {
                        break;
                    }
                    scanner.expect(b',', "expected ',' or ']'")?;
                }
            } else {
                let value = self.decode_element(scanner, &ext.kind)?;
                append_extension(message, ext, value);
            }
        } else {
            let value = self.decode_element(scanner, &ext.kind)?;
            message.set_extension(ext.clone(), value);
        }
        Ok(())
    }

    /// `:` is mandatory before scalar values and optional before message
    /// bodies.
    fn expect_separator(
        &mut self,
        scanner: &mut TextScanner<'_>,
        kind: &FieldKind,
    ) -> Result<(), DecodeError> {
        match kind {
            FieldKind::Message(_) | FieldKind::Group(_) | FieldKind::Map(_) => {
                let _ = scanner.try_consume(b':');
                Ok(())
            }
            _ => scanner.expect(b':', "expected ':'"),
        }
    }

    fn decode_element(
        &mut self,
        scanner: &mut TextScanner<'_>,
        kind: &FieldKind,
    ) -> Result<Value, DecodeError> {
        match kind {
            FieldKind::Scalar(scalar) => self.decode_scalar(scanner, *scalar),
            FieldKind::Enum(desc) => self.decode_enum(scanner, desc),
            FieldKind::Message(desc) | FieldKind::Group(desc) => self.decode_nested(scanner, desc),
            FieldKind::Map(_) => unreachable!("maps dispatch through decode_map_value"),
        }
    }

    fn decode_nested(
        &mut self,
        scanner: &mut TextScanner<'_>,
        desc: &Arc<MessageDescriptor>,
    ) -> Result<Value, DecodeError> {
        self.enter()?;
        let result = (|| {
            let close = if scanner.try_consume(b'{') {
                b'}'
            } else {
                scanner.expect(b'<', "expected '{' or '<'")?;
                b'>'
            };
            let mut nested = DynamicMessage::new(desc.clone());
            self.decode_fields(scanner, &mut nested, Some(close))?;
            Ok(Value::Message(nested))
        })();
        self.exit();
        result
    }

    fn decode_scalar(
        &mut self,
        scanner: &mut TextScanner<'_>,
        kind: ScalarKind,
    ) -> Result<Value, DecodeError> {
        let value = match kind {
            ScalarKind::Bool => Value::Bool(scanner.next_bool()?),
            ScalarKind::Int32 | ScalarKind::SInt32 | ScalarKind::SFixed32 => {
                Value::I32(scanner.next_i32()?)
            }
            ScalarKind::Int64 | ScalarKind::SInt64 | ScalarKind::SFixed64 => {
                Value::I64(scanner.next_i64()?)
            }
            ScalarKind::UInt32 | ScalarKind::Fixed32 => Value::U32(scanner.next_u32()?),
            ScalarKind::UInt64 | ScalarKind::Fixed64 => Value::U64(scanner.next_u64()?),
            ScalarKind::Float => Value::F32(scanner.next_f32()?),
            ScalarKind::Double => Value::F64(scanner.next_f64()?),
            ScalarKind::String => {
                let bytes = scanner.next_bytes()?;
                Value::String(String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?)
            }
            ScalarKind::Bytes => Value::Bytes(Bytes::from(scanner.next_bytes()?)),
        };
        Ok(value)
    }

    fn decode_enum(
        &mut self,
        scanner: &mut TextScanner<'_>,
        desc: &EnumDescriptor,
    ) -> Result<Value, DecodeError> {
        match scanner.peek_byte() {
            Some(b'-' | b'0'..=b'9') => Ok(Value::Enum(scanner.next_i32()?)),
            _ => {
                let name = scanner.next_identifier()?;
                desc.number(name)
                    .map(Value::Enum)
                    .ok_or_else(|| DecodeError::UnrecognizedEnumValue {
                        enum_name: desc.full_name().to_owned(),
                    })
            }
        }
    }

    /// One or more `{key: k value: v}` entry messages; missing halves
    /// default.
    fn decode_map_value(
        &mut self,
        scanner: &mut TextScanner<'_>,
        message: &mut DynamicMessage,
        number: u32,
        map: &MapKind,
    ) -> Result<(), DecodeError> {
        let _ = scanner.try_consume(b':');
        if scanner.try_consume(b'[') {
            if scanner.try_consume(b']') {
                return Ok(());
            }
            loop {
                self.decode_map_entry(scanner, message, number, map)?;
                if scanner.try_consume(b']') {
                    break;
                }
                scanner.expect(b',', "expected ',' or ']'")?;
            }
            Ok(())
        } else {
            self.decode_map_entry(scanner, message, number, map)
        }
    }

    fn decode_map_entry(
        &mut self,
        scanner: &mut TextScanner<'_>,
        message: &mut DynamicMessage,
        number: u32,
        map: &MapKind,
    ) -> Result<(), DecodeError> {
        self.enter()?;
        let result = (|| {
            let close = if scanner.try_consume(b'{') {
                b'}'
            } else {
                scanner.expect(b'<', "expected '{' or '<'")?;
                b'>'
            };
            let mut entry_key: Option<MapKey> = None;
            let mut entry_value: Option<Value> = None;
            loop {
                if scanner.is_at_end() {
                    return Err(DecodeError::MalformedText("unterminated map entry"));
                }
                if scanner.try_consume(close) {
                    break;
                }
                match scanner.next_identifier()? {
                    "key" => {
                        scanner.expect(b':', "expected ':'")?;
                        let value = self.decode_scalar(scanner, map.key)?;
                        entry_key = Some(MapKey::from_value(value));
                    }
                    "value" => {
                        self.expect_separator(scanner, &map.value)?;
                        entry_value = Some(self.decode_element(scanner, &map.value)?);
                    }
                    _ => return Err(DecodeError::MalformedText("unknown map entry field")),
                }
                let _ = scanner.try_consume(b',') || scanner.try_consume(b';');
            }
            let entry_key = entry_key.unwrap_or_else(|| MapKey::default_for(map.key));
            let entry_value = entry_value.unwrap_or_else(|| Value::default_for(&map.value));
            message.insert_map_entry(number, entry_key, entry_value);
            Ok(())
        })();
        self.exit();
        result
    }

    /// Skips one unknown field value without a schema.
    fn skip_unknown_value(&mut self, scanner: &mut TextScanner<'_>) -> Result<(), DecodeError> {
        let had_colon = scanner.try_consume(b':');
        match scanner.peek_byte() {
            Some(b'{' | b'<') => self.skip_nested(scanner),
            Some(b'[') if had_colon => {
                scanner.try_consume(b'[');
                if scanner.try_consume(b']') {
                    return Ok(());
                }
                loop {
                    self.skip_scalar_or_nested(scanner)?;
                    if scanner.try_consume(b']') {
                        return Ok(());
                    }
                    scanner.expect(b',', "expected ',' or ']'")?;
                }
            }
            Some(_) if had_colon => self.skip_scalar_token(scanner),
            _ => Err(DecodeError::MalformedText("expected ':'")),
        }
    }

    fn skip_scalar_or_nested(&mut self, scanner: &mut TextScanner<'_>) -> Result<(), DecodeError> {
        match scanner.peek_byte() {
            Some(b'{' | b'<') => self.skip_nested(scanner),
            _ => self.skip_scalar_token(scanner),
        }
    }

    fn skip_scalar_token(&mut self, scanner: &mut TextScanner<'_>) -> Result<(), DecodeError> {
        match scanner.peek_byte() {
            Some(b'"' | b'\'') => {
                scanner.next_bytes()?;
                Ok(())
            }
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'_') => {
                scanner.next_identifier()?;
                Ok(())
            }
            Some(_) => scanner.skip_number(),
            None => Err(DecodeError::MalformedText("expected value")),
        }
    }

    fn skip_nested(&mut self, scanner: &mut TextScanner<'_>) -> Result<(), DecodeError> {
        let mut depth = 0usize;
        loop {
            match scanner.peek_byte() {
                None => return Err(DecodeError::MalformedText("unterminated message")),
                Some(open @ (b'{' | b'<')) => {
                    scanner.try_consume(open);
                    depth += 1;
                    if depth > self.options.message_depth_limit {
                        return Err(DecodeError::MessageDepthLimit);
                    }
                }
                Some(close @ (b'}' | b'>')) => {
                    scanner.try_consume(close);
                    if depth == 0 {
                        return Err(DecodeError::MalformedText("unexpected close"));
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(b'"' | b'\'') => {
                    scanner.next_bytes()?;
                }
                Some(byte) => {
                    scanner.try_consume(byte);
                }
            }
        }
    }
}

/// Groups appear in text under their message's short name.
fn find_group_field<'d>(
    descriptor: &'d MessageDescriptor,
    name: &str,
) -> Option<&'d FieldDescriptor> {
    descriptor.fields().iter().find(|field| {
        matches!(&field.kind, FieldKind::Group(desc)
            if desc.full_name().rsplit('.').next() == Some(name))
    })
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
