//! Wire-format engine for Google's Protocol Buffers, aka
//! [protobuf](https://protobuf.dev).
//!
//! This crate converts between an in-memory message representation and three
//! wire encodings: binary protobuf, proto3-canonical JSON, and the proto text
//! format. It is the low-level half of a protobuf runtime: the byte and token
//! scanners, the per-wire-type field dispatch, and the visitor protocol that
//! walks a message's fields in field-number order.
//!
//! What a message looks like is described at runtime by a
//! [`descriptor::MessageDescriptor`] — an ordered catalog of field numbers,
//! types, and cardinalities, normally produced by a code generator or a
//! schema loader. The engine itself never assumes a concrete message layout;
//! it reads and writes [`value::DynamicMessage`] values and talks to encoders
//! through the [`visitor::Visitor`] trait.

#![deny(clippy::as_conversions)]

pub mod binary;
pub mod descriptor;
pub mod error;
pub mod extensions;
pub mod json;
pub mod text;
pub mod unknown;
pub mod value;
pub mod varint;
pub mod visitor;
pub mod wire;

mod util;

pub use crate::binary::decode::{decode_message, decode_message_with_extensions, DecodeOptions};
pub use crate::binary::encode::{encode_to_vec, encoded_len};
pub use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, Label, MapKind, MessageDescriptor, ScalarKind,
    Syntax,
};
pub use crate::error::{DecodeError, EncodeError};
pub use crate::extensions::ExtensionRegistry;
pub use crate::json::decode::{decode_json, decode_json_with_extensions, JsonDecodeOptions};
pub use crate::json::encode::{encode_json, JsonEncodeOptions};
pub use crate::text::decode::{decode_text, decode_text_with_extensions, TextDecodeOptions};
pub use crate::text::encode::{encode_text, encode_text_with_options, TextEncodeOptions};
pub use crate::unknown::UnknownFields;
pub use crate::value::{DynamicMessage, MapKey, Value};
pub use crate::visitor::{traverse, traverse_async, AsyncVisitor, Visitor};
