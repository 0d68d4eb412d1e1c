//! Message to JSON encoding, per the proto3 canonical JSON mapping.
//!
//! Field emission rides the same visitor traversal as the binary encoder,
//! so output is always in ascending field-number order. Unknown fields have
//! no JSON representation and are dropped.

// char-to-u32 casts for \uXXXX escapes.
#![allow(clippy::as_conversions)]

use crate::descriptor::{FieldDescriptor, FieldKind};
use crate::error::EncodeError;
use crate::json::base64;
use crate::json::well_known;
use crate::value::{DynamicMessage, MapKey, Value};
use crate::visitor::{traverse, Visitor};

/// Knobs for one JSON encode call.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncodeOptions {
    /// Emit enum values as their numbers even when the schema names them.
    pub always_print_enums_as_ints: bool,
    /// Use the proto field names instead of the lowerCamelCase JSON names.
    pub preserve_proto_field_names: bool,
    /// Emit 64-bit integers as JSON numbers instead of quoted strings.
    ///
    /// The canonical mapping quotes them because interoperating JSON
    /// parsers read numbers as doubles and corrupt values above 2^53.
    pub always_print_int64s_as_numbers: bool,
}

/// Serializes `message` as one JSON value.
pub fn encode_json(
    message: &DynamicMessage,
    options: &JsonEncodeOptions,
) -> Result<String, EncodeError> {
    let mut writer = JsonWriter::new();
    encode_message(message, options, &mut writer)?;
    Ok(writer.into_string())
}

pub(crate) fn encode_message(
    message: &DynamicMessage,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    if let Some(kind) = well_known::classify(message.descriptor().full_name()) {
        return well_known::encode(kind, message, options, writer);
    }
    writer.begin_object();
    traverse(message, &mut JsonFieldVisitor { writer, options })?;
    writer.end_object();
    Ok(())
}

struct JsonFieldVisitor<'a> {
    writer: &'a mut JsonWriter,
    options: &'a JsonEncodeOptions,
}

impl Visitor for JsonFieldVisitor<'_> {
    type Error = EncodeError;

    fn visit_field(&mut self, field: &FieldDescriptor, value: &Value) -> Result<(), EncodeError> {
        if field.is_extension {
            self.writer.member(&format!("[{}]", field.name));
        } else if self.options.preserve_proto_field_names {
            self.writer.member(&field.name);
        } else {
            self.writer.member(&field.json_name);
        }
        encode_value(&field.kind, value, self.options, self.writer)
    }
}

pub(crate) fn encode_value(
    kind: &FieldKind,
    value: &Value,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    match (kind, value) {
        (FieldKind::Map(map), Value::Map(entries)) => {
            writer.begin_object();
            for (key, entry) in entries {
                writer.member(&map_key_text(key));
                encode_single(&map.value, entry, options, writer)?;
            }
            writer.end_object();
            Ok(())
        }
        (_, Value::List(items)) => {
            writer.begin_array();
            for item in items {
                writer.element();
                encode_single(kind, item, options, writer)?;
            }
            writer.end_array();
            Ok(())
        }
        _ => encode_single(kind, value, options, writer),
    }
}

fn encode_single(
    kind: &FieldKind,
    value: &Value,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    match (kind, value) {
        (FieldKind::Enum(desc), Value::Enum(number)) => {
            if desc.full_name() == "google.protobuf.NullValue" {
                writer.write_raw("null");
            } else if options.always_print_enums_as_ints {
                writer.write_raw(&number.to_string());
            } else if let Some(name) = desc.name(*number) {
                writer.write_string(name);
            } else {
                // Numbers the schema does not name fall back to integers.
                writer.write_raw(&number.to_string());
            }
            Ok(())
        }
        (FieldKind::Message(_) | FieldKind::Group(_), Value::Message(nested)) => {
            encode_message(nested, options, writer)
        }
        (_, scalar) => {
            write_scalar(scalar, options, writer);
            Ok(())
        }
    }
}

pub(crate) fn write_scalar(value: &Value, options: &JsonEncodeOptions, writer: &mut JsonWriter) {
    match value {
        Value::Bool(v) => writer.write_raw(if *v { "true" } else { "false" }),
        Value::I32(v) => writer.write_raw(&v.to_string()),
        Value::U32(v) => writer.write_raw(&v.to_string()),
        Value::I64(v) => writer.write_int64(&v.to_string(), options),
        Value::U64(v) => writer.write_int64(&v.to_string(), options),
        Value::F32(v) => writer.write_float(f64::from(*v), &shortest_f32(*v)),
        Value::F64(v) => writer.write_float(*v, &shortest_f64(*v)),
        Value::String(v) => writer.write_string(v),
        Value::Bytes(v) => writer.write_bytes(v),
        Value::Enum(v) => writer.write_raw(&v.to_string()),
        // Containers are handled a level up.
        Value::Message(_) | Value::List(_) | Value::Map(_) => {}
    }
}

fn shortest_f32(value: f32) -> String {
    value.to_string()
}

fn shortest_f64(value: f64) -> String {
    value.to_string()
}

fn map_key_text(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => if *v { "true" } else { "false" }.to_owned(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

/// Minimal JSON output buffer with comma bookkeeping.
pub(crate) struct JsonWriter {
    out: String,
    /// One entry per open container: whether it has members yet.
    stack: Vec<bool>,
}

impl JsonWriter {
    pub(crate) fn new() -> JsonWriter {
        JsonWriter {
            out: String::new(),
            stack: Vec::new(),
        }
    }

    pub(crate) fn into_string(self) -> String {
        debug_assert!(self.stack.is_empty(), "unbalanced containers");
        self.out
    }

    pub(crate) fn begin_object(&mut self) {
        self.out.push('{');
        self.stack.push(false);
    }

    pub(crate) fn end_object(&mut self) {
        self.stack.pop();
        self.out.push('}');
    }

    pub(crate) fn begin_array(&mut self) {
        self.out.push('[');
        self.stack.push(false);
    }

    pub(crate) fn end_array(&mut self) {
        self.stack.pop();
        self.out.push(']');
    }

    fn separate(&mut self) {
        if let Some(has_members) = self.stack.last_mut() {
            if *has_members {
                self.out.push(',');
            }
            *has_members = true;
        }
    }

    /// Starts an object member: separator, quoted key, colon.
    pub(crate) fn member(&mut self, name: &str) {
        self.separate();
        self.write_quoted(name);
        self.out.push(':');
    }

    /// Starts an array element.
    pub(crate) fn element(&mut self) {
        self.separate();
    }

    pub(crate) fn write_raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub(crate) fn write_string(&mut self, text: &str) {
        self.write_quoted(text);
    }

    /// 64-bit integers are quoted by default; see
    /// [`JsonEncodeOptions::always_print_int64s_as_numbers`].
    pub(crate) fn write_int64(&mut self, decimal: &str, options: &JsonEncodeOptions) {
        if options.always_print_int64s_as_numbers {
            self.out.push_str(decimal);
        } else {
            self.out.push('"');
            self.out.push_str(decimal);
            self.out.push('"');
        }
    }

    /// Non-finite floats have no JSON number form and encode as strings.
    pub(crate) fn write_float(&mut self, value: f64, finite_text: &str) {
        if value.is_nan() {
            self.out.push_str("\"NaN\"");
        } else if value == f64::INFINITY {
            self.out.push_str("\"Infinity\"");
        } else if value == f64::NEG_INFINITY {
            self.out.push_str("\"-Infinity\"");
        } else {
            self.out.push_str(finite_text);
        }
    }

    pub(crate) fn write_bytes(&mut self, data: &[u8]) {
        self.out.push('"');
        base64::encode(data, &mut self.out);
        self.out.push('"');
    }

    fn write_quoted(&mut self, text: &str) {
        self.out.push('"');
        for ch in text.chars() {
            match ch {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                '\u{8}' => self.out.push_str("\\b"),
                '\u{c}' => self.out.push_str("\\f"),
                c if (c as u32) < 0x20 => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }
}
