//! Message to text format encoding.
//!
//! Output is the multi-line debug form: one `name: value` line per field
//! occurrence, two-space indentation, nested messages in braces. Unlike
//! JSON, preserved unknown fields are printed (by field number) unless
//! disabled.

// char-to-u32 casts for octal escapes.
#![allow(clippy::as_conversions)]

use std::convert::Infallible;

use crate::binary::scan::Scanner;
use crate::descriptor::{FieldDescriptor, FieldKind};
use crate::error::DecodeError;
use crate::value::{DynamicMessage, MapKey, Value};
use crate::visitor::{traverse, Visitor};
use crate::wire::WireType;

/// Knobs for text encoding.
#[derive(Debug, Clone, Copy)]
pub struct TextEncodeOptions {
    /// Print preserved unknown fields by field number.
    pub print_unknown_fields: bool,
}

impl Default for TextEncodeOptions {
    fn default() -> Self {
        TextEncodeOptions {
            print_unknown_fields: true,
        }
    }
}

/// Serializes `message` as text format with default options.
pub fn encode_text(message: &DynamicMessage) -> String {
    encode_text_with_options(message, &TextEncodeOptions::default())
}

pub fn encode_text_with_options(message: &DynamicMessage, options: &TextEncodeOptions) -> String {
    let mut out = String::new();
    emit_message(message, options, &mut out, 0);
    out
}

fn emit_message(
    message: &DynamicMessage,
    options: &TextEncodeOptions,
    out: &mut String,
    indent: usize,
) {
    let mut visitor = TextEncodeVisitor {
        out,
        options,
        indent,
    };
    match traverse(message, &mut visitor) {
        Ok(()) => (),
        Err(never) => match never {},
    }
}

struct TextEncodeVisitor<'a> {
    out: &'a mut String,
    options: &'a TextEncodeOptions,
    indent: usize,
}

impl Visitor for TextEncodeVisitor<'_> {
    type Error = Infallible;

    fn visit_field(&mut self, field: &FieldDescriptor, value: &Value) -> Result<(), Infallible> {
        match value {
            Value::List(items) => {
                for item in items {
                    self.emit_single(field, item);
                }
            }
            Value::Map(entries) => {
                if let FieldKind::Map(map) = &field.kind {
                    for (key, entry) in entries {
                        self.push_indent();
                        self.out.push_str(&field.name);
                        self.out.push_str(" {\n");
                        self.indent += 1;

                        self.push_indent();
                        self.out.push_str("key: ");
                        emit_scalar(&key.to_value(), self.out);
                        self.out.push('\n');

                        match (&map.value, entry) {
                            (FieldKind::Message(_), Value::Message(nested)) => {
                                self.push_indent();
                                self.out.push_str("value {\n");
                                emit_message(nested, self.options, self.out, self.indent + 1);
                                self.push_indent();
                                self.out.push_str("}\n");
                            }
                            (FieldKind::Enum(desc), Value::Enum(number)) => {
                                self.push_indent();
                                self.out.push_str("value: ");
                                match desc.name(*number) {
                                    Some(name) => self.out.push_str(name),
                                    None => self.out.push_str(&number.to_string()),
                                }
                                self.out.push('\n');
                            }
                            (_, scalar) => {
                                self.push_indent();
                                self.out.push_str("value: ");
                                emit_scalar(scalar, self.out);
                                self.out.push('\n');
                            }
                        }

                        self.indent -= 1;
                        self.push_indent();
                        self.out.push_str("}\n");
                    }
                }
            }
            single => self.emit_single(field, single),
        }
        Ok(())
    }

    fn visit_unknown(&mut self, raw: &[u8]) -> Result<(), Infallible> {
        if self.options.print_unknown_fields {
            let mut scanner = Scanner::new(raw);
            // Unknown bytes were validated on the way in; a parse error here
            // just truncates the printout.
            let _ = self.emit_unknown_fields(&mut scanner, None);
        }
        Ok(())
    }
}

impl TextEncodeVisitor<'_> {
    fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn field_label(field: &FieldDescriptor) -> String {
        if field.is_extension {
            return format!("[{}]", field.name);
        }
        if let FieldKind::Group(desc) = &field.kind {
            // Groups print under their message's short name.
            if let Some(short) = desc.full_name().rsplit('.').next() {
                return short.to_owned();
            }
        }
        field.name.clone()
    }

    fn emit_single(&mut self, field: &FieldDescriptor, value: &Value) {
        let label = Self::field_label(field);
        match (&field.kind, value) {
            (FieldKind::Message(_) | FieldKind::Group(_), Value::Message(nested)) => {
                self.push_indent();
                self.out.push_str(&label);
                self.out.push_str(" {\n");
                emit_message(nested, self.options, self.out, self.indent + 1);
                self.push_indent();
                self.out.push_str("}\n");
            }
            (FieldKind::Enum(desc), Value::Enum(number)) => {
                self.push_indent();
                self.out.push_str(&label);
                self.out.push_str(": ");
                match desc.name(*number) {
                    Some(name) => self.out.push_str(name),
                    None => self.out.push_str(&number.to_string()),
                }
                self.out.push('\n');
            }
            (_, scalar) => {
                self.push_indent();
                self.out.push_str(&label);
                self.out.push_str(": ");
                emit_scalar(scalar, self.out);
                self.out.push('\n');
            }
        }
    }

    /// Prints raw unknown fields as `number: value` lines. `group` is the
    /// field number whose end-group key terminates this scope.
    fn emit_unknown_fields(
        &mut self,
        scanner: &mut Scanner<'_>,
        group: Option<u32>,
    ) -> Result<(), DecodeError> {
        while let Some(key) = scanner.read_key()? {
            match key.wire_type {
                WireType::Varint => {
                    let value = scanner.read_varint()?;
                    self.push_indent();
                    self.out.push_str(&format!("{}: {}\n", key.number, value));
                }
                WireType::Fixed32 => {
                    let value = scanner.read_fixed32()?;
                    self.push_indent();
                    self.out
                        .push_str(&format!("{}: 0x{:08x}\n", key.number, value));
                }
                WireType::Fixed64 => {
                    let value = scanner.read_fixed64()?;
                    self.push_indent();
                    self.out
                        .push_str(&format!("{}: 0x{:016x}\n", key.number, value));
                }
                WireType::Len => {
                    let span = scanner.read_length_delimited()?;
                    self.push_indent();
                    self.out.push_str(&format!("{}: ", key.number));
                    emit_bytes_literal(span, self.out);
                    self.out.push('\n');
                }
                WireType::StartGroup => {
                    self.push_indent();
                    self.out.push_str(&format!("{} {{\n", key.number));
                    self.indent += 1;
                    self.emit_unknown_fields(scanner, Some(key.number))?;
                    self.indent -= 1;
                    self.push_indent();
                    self.out.push_str("}\n");
                }
                WireType::EndGroup => {
                    return if group == Some(key.number) {
                        Ok(())
                    } else {
                        Err(DecodeError::MalformedProtobuf("mismatched end-group"))
                    };
                }
            }
        }
        if group.is_some() {
            return Err(DecodeError::Truncated);
        }
        Ok(())
    }
}

fn emit_scalar(value: &Value, out: &mut String) {
    match value {
        Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Value::I32(v) => out.push_str(&v.to_string()),
        Value::I64(v) => out.push_str(&v.to_string()),
        Value::U32(v) => out.push_str(&v.to_string()),
        Value::U64(v) => out.push_str(&v.to_string()),
        Value::F32(v) => emit_float(f64::from(*v), out),
        Value::F64(v) => emit_float(*v, out),
        Value::String(v) => emit_string_literal(v, out),
        Value::Bytes(v) => emit_bytes_literal(v, out),
        Value::Enum(v) => out.push_str(&v.to_string()),
        // Containers are handled a level up.
        Value::Message(_) | Value::List(_) | Value::Map(_) => {}
    }
}

fn emit_float(value: f64, out: &mut String) {
    if value.is_nan() {
        out.push_str("nan");
    } else if value == f64::INFINITY {
        out.push_str("inf");
    } else if value == f64::NEG_INFINITY {
        out.push_str("-inf");
    } else {
        out.push_str(&value.to_string());
    }
}

/// Strings print as UTF-8 with C escapes for quotes, backslash, and
/// control characters.
fn emit_string_literal(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Bytes print with octal escapes for anything outside printable ASCII.
fn emit_bytes_literal(data: &[u8], out: &mut String) {
    out.push('"');
    for &byte in data {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out.push('"');
}
