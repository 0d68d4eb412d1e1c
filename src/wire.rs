//! Field keys and wire types for the binary protobuf format.

// Casts here move between a validated 3-bit discriminant and integer widths.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;
use crate::varint::{encode_varint, encoded_varint_len};

/// Minimum legal protobuf field number.
pub const MIN_FIELD_NUMBER: u32 = 1;
/// Maximum legal protobuf field number.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
/// Wire-format ceiling: a serialized message may not exceed 2 GiB - 1.
pub const MAX_MESSAGE_SIZE: usize = 0x7fff_ffff;

/// Denotes the shape of a field's payload in an encoded protobuf message.
///
/// Every key-value pair on the wire is a record of field number, wire type,
/// and payload; the wire type says how to find the end of the payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer.
    ///
    /// Used for: `int32`, `int64`, `uint32`, `uint64`, `sint32`, `sint64`,
    /// `bool`, `enum`.
    Varint = 0,
    /// 64-bit little-endian payload.
    ///
    /// Used for: `fixed64`, `sfixed64`, `double`.
    Fixed64 = 1,
    /// Length-prefixed payload.
    ///
    /// Used for: `string`, `bytes`, embedded messages, packed `repeated`
    /// fields, map entries.
    Len = 2,
    /// Group start (proto2, deprecated but still decoded).
    StartGroup = 3,
    /// Group end.
    EndGroup = 4,
    /// 32-bit little-endian payload.
    ///
    /// Used for: `fixed32`, `sfixed32`, `float`.
    Fixed32 = 5,
}

impl WireType {
    /// Try to decode a [`WireType`] from the 3 low bits of a field key.
    #[inline(always)]
    pub fn try_from_val(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(DecodeError::MalformedProtobuf("invalid wire type")),
        }
    }

    /// The raw 3-bit value for this wire type.
    #[inline(always)]
    pub const fn into_val(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = DecodeError;

    #[inline(always)]
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        WireType::try_from_val(value)
    }
}

/// A decoded field key: field number plus wire type.
///
/// Packed on the wire as `(number << 3) | wire_type` in a single varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    pub number: u32,
    pub wire_type: WireType,
}

impl FieldKey {
    /// Builds a key from parts. The number must already be a legal field
    /// number; this is an encoding-side constructor, not a validator.
    #[inline(always)]
    pub fn new(number: u32, wire_type: WireType) -> Self {
        debug_assert!((MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&number));
        FieldKey { number, wire_type }
    }

    /// Validates a raw key read off the wire.
    ///
    /// Field number zero and out-of-range wire types are structural errors.
    #[inline(always)]
    pub fn try_from_raw(raw: u32) -> Result<Self, DecodeError> {
        let wire_type = WireType::try_from_val((raw & 0b111) as u8)?;
        let number = raw >> 3;
        if number < MIN_FIELD_NUMBER {
            return Err(DecodeError::MalformedProtobuf("field number is zero"));
        }
        Ok(FieldKey { number, wire_type })
    }

    /// The packed on-wire representation of this key.
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        (self.number << 3) | self.wire_type.into_val() as u32
    }
}

/// Encodes a field key into `buf`. Hot path: called once per field.
#[inline(always)]
pub fn encode_key<B: bytes::BufMut>(key: FieldKey, buf: &mut B) {
    encode_varint(u64::from(key.raw()), buf);
}

/// The encoded length of a field key with the given field number.
///
/// The wire type lives in the low 3 bits and never changes the length.
#[inline(always)]
pub fn encoded_key_len(number: u32) -> usize {
    encoded_varint_len(u64::from(number) << 3)
}
