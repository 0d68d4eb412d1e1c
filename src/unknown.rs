//! Preservation of fields the current schema does not recognize.
//!
//! Unknown fields are kept as raw tag+value bytes in original encounter
//! order so a re-serialize round-trip reproduces them verbatim. Proto2
//! messages preserve them; proto3 messages drop them. Map entries drop them
//! unconditionally (intentional protobuf map semantics).

// usize -> u64 casts for length prefixes are lossless on supported targets.
#![allow(clippy::as_conversions)]

use crate::varint::{encode_varint, encoded_varint_len};
use crate::wire::{encode_key, FieldKey, WireType};

/// An accumulated byte sequence of raw unknown fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFields {
    data: Vec<u8>,
}

impl UnknownFields {
    pub fn new() -> Self {
        UnknownFields::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The raw bytes, exactly as they will be re-emitted.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends pre-encoded bytes that already include their field keys.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends one field: its key followed by the raw value bytes.
    pub fn push_field(&mut self, key: FieldKey, raw_value: &[u8]) {
        encode_key(key, &mut self.data);
        self.data.extend_from_slice(raw_value);
    }

    /// Appends a length-delimited field, e.g. the synthetic packed span the
    /// decoder builds for unrecognized enum values.
    pub fn push_length_delimited(&mut self, number: u32, payload: &[u8]) {
        encode_key(FieldKey::new(number, WireType::Len), &mut self.data);
        encode_varint(payload.len() as u64, &mut self.data);
        self.data.extend_from_slice(payload);
    }

    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }

    pub fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_reencode() {
        let mut unknown = UnknownFields::new();
        unknown.push_field(FieldKey::new(7, WireType::Varint), &[0xac, 0x02]);
        unknown.push_length_delimited(9, b"abc");

        // key 7/varint = 0x38, key 9/len = 0x4a
        let expected = [0x38, 0xac, 0x02, 0x4a, 0x03, b'a', b'b', b'c'];
        assert_eq!(unknown.as_bytes(), &expected);
        assert_eq!(unknown.encoded_len(), expected.len());

        let mut out = Vec::new();
        unknown.encode(&mut out);
        assert_eq!(out, expected);
    }
}
