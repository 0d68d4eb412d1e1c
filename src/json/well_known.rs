//! Special JSON shapes for `google.protobuf.*` well-known types.
//!
//! A Timestamp is an RFC 3339 string, a Duration is `"1.500s"`, a wrapper
//! collapses to its bare inner value, Struct/Value/ListValue mirror free-form
//! JSON, and a FieldMask is a comma-joined string of lowerCamelCase paths.
//! Any is not mapped: it needs a type registry this crate does not carry.
//!
//! Dispatch is by the message's full name; the caller's descriptors still
//! supply the field catalog, so recursion into `Value` and `Struct` reuses
//! the nested descriptors they reference.

// Nanosecond casts between i32/u32 after explicit range checks.
#![allow(clippy::as_conversions)]

use chrono::{DateTime, SecondsFormat, Utc};

use crate::descriptor::{json_name, FieldKind, ScalarKind};
use crate::error::{DecodeError, EncodeError};
use crate::json::decode::JsonDecoder;
use crate::json::encode::{encode_message, write_scalar, JsonEncodeOptions, JsonWriter};
use crate::json::scan::{parse_f64, JsonScanner, JsonToken};
use crate::value::{DynamicMessage, MapKey, Value};

/// `0001-01-01T00:00:00Z`.
const TIMESTAMP_MIN_SECONDS: i64 = -62_135_596_800;
/// `9999-12-31T23:59:59Z`.
const TIMESTAMP_MAX_SECONDS: i64 = 253_402_300_799;
/// About 10,000 years, the Duration range bound.
const DURATION_MAX_SECONDS: i64 = 315_576_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WellKnown {
    Timestamp,
    Duration,
    BoolValue,
    Int32Value,
    Int64Value,
    UInt32Value,
    UInt64Value,
    FloatValue,
    DoubleValue,
    StringValue,
    BytesValue,
    Struct,
    Value,
    ListValue,
    FieldMask,
    Empty,
}

pub(crate) fn classify(full_name: &str) -> Option<WellKnown> {
    let short = full_name.strip_prefix("google.protobuf.")?;
    let kind = match short {
        "Timestamp" => WellKnown::Timestamp,
        "Duration" => WellKnown::Duration,
        "BoolValue" => WellKnown::BoolValue,
        "Int32Value" => WellKnown::Int32Value,
        "Int64Value" => WellKnown::Int64Value,
        "UInt32Value" => WellKnown::UInt32Value,
        "UInt64Value" => WellKnown::UInt64Value,
        "FloatValue" => WellKnown::FloatValue,
        "DoubleValue" => WellKnown::DoubleValue,
        "StringValue" => WellKnown::StringValue,
        "BytesValue" => WellKnown::BytesValue,
        "Struct" => WellKnown::Struct,
        "Value" => WellKnown::Value,
        "ListValue" => WellKnown::ListValue,
        "FieldMask" => WellKnown::FieldMask,
        "Empty" => WellKnown::Empty,
        _ => return None,
    };
    Some(kind)
}

/// Whether JSON `null` is a value for this field rather than absence.
pub(crate) fn accepts_null(kind: &FieldKind) -> bool {
    match kind {
        FieldKind::Message(desc) => desc.full_name() == "google.protobuf.Value",
        FieldKind::Enum(desc) => desc.full_name() == "google.protobuf.NullValue",
        _ => false,
    }
}

fn wrapper_scalar(kind: WellKnown) -> Option<ScalarKind> {
    let scalar = match kind {
        WellKnown::BoolValue => ScalarKind::Bool,
        WellKnown::Int32Value => ScalarKind::Int32,
        WellKnown::Int64Value => ScalarKind::Int64,
        WellKnown::UInt32Value => ScalarKind::UInt32,
        WellKnown::UInt64Value => ScalarKind::UInt64,
        WellKnown::FloatValue => ScalarKind::Float,
        WellKnown::DoubleValue => ScalarKind::Double,
        WellKnown::StringValue => ScalarKind::String,
        WellKnown::BytesValue => ScalarKind::Bytes,
        _ => return None,
    };
    Some(scalar)
}

pub(crate) fn decode(
    decoder: &mut JsonDecoder<'_, '_>,
    kind: WellKnown,
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    if let Some(scalar) = wrapper_scalar(kind) {
        let value = decoder.decode_scalar(scanner, scalar)?;
        message.set(1, value);
        return Ok(());
    }
    match kind {
        WellKnown::Timestamp => decode_timestamp(scanner, message),
        WellKnown::Duration => decode_duration(scanner, message),
        WellKnown::Struct => decode_struct(decoder, scanner, message),
        WellKnown::Value => decode_value(decoder, scanner, message),
        WellKnown::ListValue => decode_list_value(decoder, scanner, message),
        WellKnown::FieldMask => decode_field_mask(scanner, message),
        WellKnown::Empty => decoder.decode_plain_object(scanner, message),
        _ => unreachable!("wrappers handled above"),
    }
}

fn expect_string(scanner: &mut JsonScanner<'_>) -> Result<String, DecodeError> {
    match scanner.next()? {
        JsonToken::String(text) => Ok(text),
        _ => Err(DecodeError::MalformedJson("expected string")),
    }
}

fn decode_timestamp(
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    let text = expect_string(scanner)?;
    let parsed = DateTime::parse_from_rfc3339(&text)
        .map_err(|_| DecodeError::MalformedJson("invalid RFC 3339 timestamp"))?;
    let utc = parsed.with_timezone(&Utc);
    let seconds = utc.timestamp();
    if !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds) {
        return Err(DecodeError::MalformedJson("timestamp out of range"));
    }
    message.set(1, Value::I64(seconds));
    message.set(2, Value::I32(utc.timestamp_subsec_nanos() as i32));
    Ok(())
}

fn decode_duration(
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    let text = expect_string(scanner)?;
    let body = text
        .strip_suffix('s')
        .ok_or(DecodeError::MalformedJson("duration must end in 's'"))?;
    let (negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || fraction.len() > 9
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(DecodeError::MalformedJson("invalid duration"));
    }
    let mut seconds: i64 = whole
        .parse()
        .map_err(|_| DecodeError::MalformedJson("invalid duration"))?;
    let mut nanos: i32 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<9}");
        padded
            .parse()
            .map_err(|_| DecodeError::MalformedJson("invalid duration"))?
    };
    if negative {
        seconds = -seconds;
        nanos = -nanos;
    }
    if seconds.abs() > DURATION_MAX_SECONDS {
        return Err(DecodeError::MalformedJson("duration out of range"));
    }
    message.set(1, Value::I64(seconds));
    message.set(2, Value::I32(nanos));
    Ok(())
}

/// `Struct` is field 1: `map<string, Value>`; the map's value descriptor
/// supplies the `Value` message type for recursion.
fn decode_struct(
    decoder: &mut JsonDecoder<'_, '_>,
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    let Some(FieldKind::Map(map)) = message.descriptor().field(1).map(|f| f.kind.clone()) else {
        return Err(DecodeError::MalformedJson(
            "Struct descriptor lacks its fields map",
        ));
    };
    let FieldKind::Message(value_desc) = &map.value else {
        return Err(DecodeError::MalformedJson(
            "Struct descriptor lacks its fields map",
        ));
    };

    scanner.expect(JsonToken::ObjectStart)?;
    if *scanner.peek()? == JsonToken::ObjectEnd {
        scanner.next()?;
        return Ok(());
    }
    loop {
        let key = expect_string(scanner)?;
        scanner.expect(JsonToken::Colon)?;
        decoder.enter()?;
        let mut nested = DynamicMessage::new(value_desc.clone());
        let result = decoder.decode_message(scanner, &mut nested);
        decoder.exit();
        result?;
        message.insert_map_entry(1, MapKey::String(key), Value::Message(nested));
        match scanner.next()? {
            JsonToken::Comma => continue,
            JsonToken::ObjectEnd => break,
            _ => return Err(DecodeError::MalformedJson("expected ',' or '}'")),
        }
    }
    Ok(())
}

/// `Value` is a oneof: 1 null_value, 2 number_value, 3 string_value,
/// 4 bool_value, 5 struct_value, 6 list_value. The JSON token type picks
/// the member.
fn decode_value(
    decoder: &mut JsonDecoder<'_, '_>,
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    match scanner.peek()? {
        JsonToken::Null => {
            scanner.next()?;
            message.set(1, Value::Enum(0));
        }
        JsonToken::True | JsonToken::False => {
            let set = matches!(scanner.next()?, JsonToken::True);
            message.set(4, Value::Bool(set));
        }
        JsonToken::Number(_) => {
            let JsonToken::Number(raw) = scanner.next()? else {
                unreachable!("just peeked a number");
            };
            message.set(2, Value::F64(parse_f64(raw)?));
        }
        JsonToken::String(_) => {
            let text = expect_string(scanner)?;
            message.set(3, Value::String(text));
        }
        JsonToken::ObjectStart => {
            let nested = decode_nested_message(decoder, scanner, message, 5)?;
            message.set(5, Value::Message(nested));
        }
        JsonToken::ArrayStart => {
            let nested = decode_nested_message(decoder, scanner, message, 6)?;
            message.set(6, Value::Message(nested));
        }
        _ => return Err(DecodeError::MalformedJson("invalid Value")),
    }
    Ok(())
}

fn decode_nested_message(
    decoder: &mut JsonDecoder<'_, '_>,
    scanner: &mut JsonScanner<'_>,
    message: &DynamicMessage,
    number: u32,
) -> Result<DynamicMessage, DecodeError> {
    let Some(FieldKind::Message(desc)) = message.descriptor().field(number).map(|f| f.kind.clone())
    else {
        return Err(DecodeError::MalformedJson("incomplete Value descriptor"));
    };
    decoder.enter()?;
    let mut nested = DynamicMessage::new(desc);
    let result = decoder.decode_message(scanner, &mut nested);
    decoder.exit();
    result?;
    Ok(nested)
}

fn decode_list_value(
    decoder: &mut JsonDecoder<'_, '_>,
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    let Some(field) = message.descriptor().field(1).cloned() else {
        return Err(DecodeError::MalformedJson("incomplete ListValue descriptor"));
    };
    let items = decoder.decode_array(scanner, &field.kind)?;
    message.set(1, Value::List(items));
    Ok(())
}

fn decode_field_mask(
    scanner: &mut JsonScanner<'_>,
    message: &mut DynamicMessage,
) -> Result<(), DecodeError> {
    let text = expect_string(scanner)?;
    let mut paths = Vec::new();
    if !text.is_empty() {
        for path in text.split(',') {
            paths.push(Value::String(camel_to_snake(path)?));
        }
    }
    message.set(1, Value::List(paths));
    Ok(())
}

fn camel_to_snake(path: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '_' {
            return Err(DecodeError::MalformedJson(
                "field mask path is not lowerCamelCase",
            ));
        }
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

fn get_i64(message: &DynamicMessage, number: u32) -> i64 {
    match message.get(number) {
        Some(Value::I64(v)) => *v,
        _ => 0,
    }
}

fn get_i32(message: &DynamicMessage, number: u32) -> i32 {
    match message.get(number) {
        Some(Value::I32(v)) => *v,
        _ => 0,
    }
}

pub(crate) fn encode(
    kind: WellKnown,
    message: &DynamicMessage,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    if let Some(scalar) = wrapper_scalar(kind) {
        let value = message
            .get(1)
            .cloned()
            .unwrap_or_else(|| Value::default_for_scalar(scalar));
        write_scalar(&value, options, writer);
        return Ok(());
    }
    match kind {
        WellKnown::Timestamp => encode_timestamp(message, writer),
        WellKnown::Duration => encode_duration(message, writer),
        WellKnown::Struct => encode_struct(message, options, writer),
        WellKnown::Value => encode_value(message, options, writer),
        WellKnown::ListValue => encode_list_value(message, options, writer),
        WellKnown::FieldMask => encode_field_mask(message, writer),
        WellKnown::Empty => {
            writer.write_raw("{}");
            Ok(())
        }
        _ => unreachable!("wrappers handled above"),
    }
}

fn encode_timestamp(message: &DynamicMessage, writer: &mut JsonWriter) -> Result<(), EncodeError> {
    let seconds = get_i64(message, 1);
    let nanos = get_i32(message, 2);
    if !(0..=999_999_999).contains(&nanos)
        || !(TIMESTAMP_MIN_SECONDS..=TIMESTAMP_MAX_SECONDS).contains(&seconds)
    {
        return Err(EncodeError::OutOfRange("google.protobuf.Timestamp"));
    }
    let datetime = DateTime::<Utc>::from_timestamp(seconds, nanos as u32)
        .ok_or(EncodeError::OutOfRange("google.protobuf.Timestamp"))?;
    writer.write_string(&datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    Ok(())
}

fn encode_duration(message: &DynamicMessage, writer: &mut JsonWriter) -> Result<(), EncodeError> {
    let seconds = get_i64(message, 1);
    let nanos = get_i32(message, 2);
    if seconds.abs() > DURATION_MAX_SECONDS || nanos.abs() > 999_999_999 {
        return Err(EncodeError::OutOfRange("google.protobuf.Duration"));
    }
    if seconds != 0 && nanos != 0 && (seconds < 0) != (nanos < 0) {
        // Mixed signs cannot render as a single signed decimal.
        return Err(EncodeError::OutOfRange("google.protobuf.Duration"));
    }
    let sign = if seconds < 0 || nanos < 0 { "-" } else { "" };
    let whole = seconds.unsigned_abs();
    let frac = nanos.unsigned_abs();
    let text = if frac == 0 {
        format!("{sign}{whole}s")
    } else if frac % 1_000_000 == 0 {
        format!("{sign}{whole}.{:03}s", frac / 1_000_000)
    } else if frac % 1_000 == 0 {
        format!("{sign}{whole}.{:06}s", frac / 1_000)
    } else {
        format!("{sign}{whole}.{frac:09}s")
    };
    writer.write_string(&text);
    Ok(())
}

fn encode_struct(
    message: &DynamicMessage,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    writer.begin_object();
    if let Some(Value::Map(entries)) = message.get(1) {
        for (key, value) in entries {
            let MapKey::String(name) = key else { continue };
            writer.member(name);
            match value {
                Value::Message(nested) => encode_message(nested, options, writer)?,
                _ => writer.write_raw("null"),
            }
        }
    }
    writer.end_object();
    Ok(())
}

fn encode_value(
    message: &DynamicMessage,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    // One set member at most; an empty Value renders as null.
    if message.get(1).is_some() {
        writer.write_raw("null");
    } else if let Some(Value::F64(number)) = message.get(2) {
        writer.write_float(*number, &number.to_string());
    } else if let Some(Value::String(text)) = message.get(3) {
        writer.write_string(text);
    } else if let Some(Value::Bool(flag)) = message.get(4) {
        writer.write_raw(if *flag { "true" } else { "false" });
    } else if let Some(Value::Message(nested)) = message.get(5) {
        encode_message(nested, options, writer)?;
    } else if let Some(Value::Message(nested)) = message.get(6) {
        encode_message(nested, options, writer)?;
    } else {
        writer.write_raw("null");
    }
    Ok(())
}

fn encode_list_value(
    message: &DynamicMessage,
    options: &JsonEncodeOptions,
    writer: &mut JsonWriter,
) -> Result<(), EncodeError> {
    writer.begin_array();
    if let Some(Value::List(items)) = message.get(1) {
        for item in items {
            writer.element();
            match item {
                Value::Message(nested) => encode_message(nested, options, writer)?,
                _ => writer.write_raw("null"),
            }
        }
    }
    writer.end_array();
    Ok(())
}

fn encode_field_mask(message: &DynamicMessage, writer: &mut JsonWriter) -> Result<(), EncodeError> {
    let mut joined = String::new();
    if let Some(Value::List(paths)) = message.get(1) {
        for (index, path) in paths.iter().enumerate() {
            if index > 0 {
                joined.push(',');
            }
            if let Value::String(path) = path {
                joined.push_str(&json_name(path));
            }
        }
    }
    writer.write_string(&joined);
    Ok(())
}
