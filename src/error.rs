//! Structured error values for decoding and encoding.
//!
//! Errors are deterministic functions of the input bytes: there is no retry
//! logic anywhere in this crate, and a failed decode never yields a partial
//! message. The one deliberate exception to "abort on error" is
//! [`DecodeError::SchemaMismatch`], which the binary decoder catches at the
//! per-field boundary and converts into "preserve the raw bytes as an
//! unknown field" — that rule is what gives protobuf its forward/backward
//! schema compatibility.

use thiserror::Error;

use crate::wire::WireType;

/// Failure while decoding any of the three wire formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Structurally invalid tag, varint, or group nesting.
    #[error("malformed protobuf: {0}")]
    MalformedProtobuf(&'static str),

    /// A varint ran past 10 bytes or overflowed 64 bits.
    #[error("varint overflows 64 bits")]
    MalformedVarint,

    /// The buffer ended in the middle of a field.
    #[error("unexpected end of input mid-field")]
    Truncated,

    /// Extra bytes remained after a complete top-level message.
    #[error("{0} trailing bytes after a complete message")]
    TrailingGarbage(usize),

    /// The wire type on the wire does not match the field's declared type.
    ///
    /// Recoverable: the binary decoder treats the field as unknown instead of
    /// aborting. Every other variant aborts the whole decode.
    #[error("wire type {actual:?} does not match the declared field type")]
    SchemaMismatch { actual: WireType },

    /// A string field holds bytes that are not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// Lexically or structurally invalid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(&'static str),

    /// A JSON number violates the RFC 7159 grammar or does not fit the
    /// requested integer/float width.
    #[error("malformed JSON number")]
    MalformedJsonNumber,

    /// Lexically or structurally invalid text format.
    #[error("malformed text format: {0}")]
    MalformedText(&'static str),

    /// A text-format number literal is out of range for its field.
    #[error("number literal out of range or malformed")]
    MalformedNumber,

    /// JSON or text named an enum value the schema does not define.
    #[error("unrecognized value for enum '{enum_name}'")]
    UnrecognizedEnumValue { enum_name: String },

    /// A second member of the same oneof was set (JSON and text only; binary
    /// decoding silently overwrites).
    #[error("conflicting members of oneof '{0}'")]
    ConflictingOneof(String),

    /// JSON or text named a field the schema does not define and
    /// `ignore_unknown_fields` was not set.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// Message nesting exceeded the configured depth limit.
    #[error("message nesting exceeds the depth limit")]
    MessageDepthLimit,

    /// A proto2 `required` field was absent at the end of a decode.
    #[error("missing required field '{0}'")]
    MissingRequiredField(String),

    /// The input or a length prefix exceeds the 2 GiB wire-format ceiling.
    #[error("message exceeds the 2 GiB wire limit")]
    TooLarge,
}

/// Failure while encoding.
///
/// Binary encoding itself is infallible once a message exists; these arise
/// from pre-flight checks and from well-known types whose JSON shape only
/// covers part of their field range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The encoded message would exceed the 2 GiB wire-format ceiling.
    #[error("message exceeds the 2 GiB wire limit")]
    TooLarge,

    /// A proto2 `required` field is absent.
    #[error("missing required field '{0}'")]
    MissingRequiredField(String),

    /// A well-known type holds a value outside its JSON-representable range.
    #[error("{0} is outside its JSON-representable range")]
    OutOfRange(&'static str),
}
