//! The lowest-level cursor over a raw byte buffer.
//!
//! A [`Scanner`] is a borrowed, non-owning view: it advances a position and
//! never reallocates or mutates the underlying bytes. All arithmetic is
//! bounds-checked; input is untrusted.

// Casts here truncate varints into narrower integer widths deliberately.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;
use crate::util::likely;
use crate::varint::decode_varint;
use crate::wire::{FieldKey, WireType, MAX_MESSAGE_SIZE};

/// Nesting limit for skipping groups we know nothing about. The decoder
/// enforces its own configurable limit for recognized fields; this guards
/// the schema-free skip path against adversarial nesting.
const SKIP_GROUP_DEPTH_LIMIT: usize = 100;

/// A cursor over one immutable byte buffer, alive for a single decode call.
#[derive(Debug)]
pub struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Scanner<'a> {
        Scanner { buf, pos: 0 }
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline(always)]
    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Current read position, for rewind-and-skip of unconsumed fields.
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the cursor back to a previously observed position.
    #[inline(always)]
    pub fn rewind_to(&mut self, pos: usize) {
        debug_assert!(pos <= self.pos, "rewind may only move backwards");
        self.pos = pos;
    }

    /// Reads one field key. Returns `None` at clean end-of-input.
    #[inline]
    pub fn read_key(&mut self) -> Result<Option<FieldKey>, DecodeError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let raw = self.read_varint()?;
        // Keys must fit in 32 bits: max tag is 2^29-1, so the max raw key is
        // exactly u32::MAX.
        let raw = u32::try_from(raw)
            .map_err(|_| DecodeError::MalformedProtobuf("field key exceeds 32 bits"))?;
        FieldKey::try_from_raw(raw).map(Some)
    }

    #[inline]
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let (value, read) = decode_varint(&self.buf[self.pos..])?;
        self.pos += read;
        Ok(value)
    }

    #[inline]
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let end = self.pos.checked_add(4).ok_or(DecodeError::Truncated)?;
        if likely(end <= self.buf.len()) {
            let bytes: [u8; 4] = self.buf[self.pos..end].try_into().expect("4-byte slice");
            self.pos = end;
            Ok(u32::from_le_bytes(bytes))
        } else {
            Err(DecodeError::Truncated)
        }
    }

    #[inline]
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let end = self.pos.checked_add(8).ok_or(DecodeError::Truncated)?;
        if likely(end <= self.buf.len()) {
            let bytes: [u8; 8] = self.buf[self.pos..end].try_into().expect("8-byte slice");
            self.pos = end;
            Ok(u64::from_le_bytes(bytes))
        } else {
            Err(DecodeError::Truncated)
        }
    }

    /// Reads a varint length prefix followed by that many bytes.
    ///
    /// The returned span borrows from the underlying buffer; callers copy
    /// out of it (or recurse into it with a fresh sub-scanner) before the
    /// enclosing decode returns.
    #[inline]
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        if len > MAX_MESSAGE_SIZE as u64 {
            return Err(DecodeError::TooLarge);
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(DecodeError::Truncated);
        }
        let span = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(span)
    }

    /// Advances past one value of the given key's wire type, returning the
    /// raw bytes skipped (without the key). Used both for unknown fields and
    /// for schema-mismatch recovery.
    pub fn skip_value(&mut self, key: FieldKey) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        match key.wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.read_fixed64()?;
            }
            WireType::Len => {
                self.read_length_delimited()?;
            }
            WireType::StartGroup => {
                self.skip_group(key.number, 0)?;
            }
            WireType::EndGroup => {
                return Err(DecodeError::MalformedProtobuf("end-group without start"));
            }
            WireType::Fixed32 => {
                self.read_fixed32()?;
            }
        }
        Ok(&self.buf[start..self.pos])
    }

    /// Skips fields until the end-group key matching `number`.
    fn skip_group(&mut self, number: u32, depth: usize) -> Result<(), DecodeError> {
        if depth >= SKIP_GROUP_DEPTH_LIMIT {
            return Err(DecodeError::MessageDepthLimit);
        }
        loop {
            let key = self.read_key()?.ok_or(DecodeError::Truncated)?;
            match key.wire_type {
                WireType::EndGroup => {
                    return if key.number == number {
                        Ok(())
                    } else {
                        Err(DecodeError::MalformedProtobuf("mismatched end-group"))
                    };
                }
                WireType::StartGroup => self.skip_group(key.number, depth + 1)?,
                WireType::Varint => {
                    self.read_varint()?;
                }
                WireType::Fixed64 => {
                    self.read_fixed64()?;
                }
                WireType::Len => {
                    self.read_length_delimited()?;
                }
                WireType::Fixed32 => {
                    self.read_fixed32()?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_end_returns_none() {
        let mut scanner = Scanner::new(&[]);
        assert_eq!(scanner.read_key().unwrap(), None);
    }

    #[test]
    fn read_tag_then_varint() {
        // Field 1, varint, value 300: 08 AC 02.
        let mut scanner = Scanner::new(&[0x08, 0xac, 0x02]);
        let key = scanner.read_key().unwrap().unwrap();
        assert_eq!(key.number, 1);
        assert_eq!(key.wire_type, WireType::Varint);
        assert_eq!(scanner.read_varint().unwrap(), 300);
        assert!(scanner.is_at_end());
    }

    #[test]
    fn fixed_width_truncation() {
        let mut scanner = Scanner::new(&[1, 2, 3]);
        assert_eq!(scanner.read_fixed32(), Err(DecodeError::Truncated));

        let mut scanner = Scanner::new(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(scanner.read_fixed64(), Err(DecodeError::Truncated));

        let mut scanner = Scanner::new(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(scanner.read_fixed32().unwrap(), 0x1234_5678);
    }

    #[test]
    fn length_delimited_bounds() {
        let mut scanner = Scanner::new(&[0x03, b'a', b'b', b'c', 0xff]);
        assert_eq!(scanner.read_length_delimited().unwrap(), b"abc");
        assert_eq!(scanner.remaining(), 1);

        // Declared length runs past the buffer.
        let mut scanner = Scanner::new(&[0x05, b'a', b'b']);
        assert_eq!(scanner.read_length_delimited(), Err(DecodeError::Truncated));

        // Length prefix above the 2 GiB ceiling.
        let mut scanner = Scanner::new(&[0x80, 0x80, 0x80, 0x80, 0x08]);
        assert_eq!(scanner.read_length_delimited(), Err(DecodeError::TooLarge));
    }

    #[test]
    fn skip_returns_raw_span() {
        // Field 2, len "hi" followed by field 3 varint 1.
        let bytes = [0x12, 0x02, b'h', b'i', 0x18, 0x01];
        let mut scanner = Scanner::new(&bytes);
        let key = scanner.read_key().unwrap().unwrap();
        let raw = scanner.skip_value(key).unwrap();
        assert_eq!(raw, &[0x02, b'h', b'i']);

        let key = scanner.read_key().unwrap().unwrap();
        assert_eq!(key.number, 3);
        let raw = scanner.skip_value(key).unwrap();
        assert_eq!(raw, &[0x01]);
        assert!(scanner.is_at_end());
    }

    #[test]
    fn skip_nested_groups() {
        // group 1 { group 2 { field 3 varint 5 } }
        let bytes = [
            0x0b, // 1 start-group
            0x13, // 2 start-group
            0x18, 0x05, // 3 varint 5
            0x14, // 2 end-group
            0x0c, // 1 end-group
        ];
        let mut scanner = Scanner::new(&bytes);
        let key = scanner.read_key().unwrap().unwrap();
        let raw = scanner.skip_value(key).unwrap();
        assert_eq!(raw, &bytes[1..]);
        assert!(scanner.is_at_end());
    }

    #[test]
    fn group_errors() {
        // End-group with the wrong number.
        let bytes = [0x0b, 0x1c]; // 1 start-group, 3 end-group
        let mut scanner = Scanner::new(&bytes);
        let key = scanner.read_key().unwrap().unwrap();
        assert!(matches!(
            scanner.skip_value(key),
            Err(DecodeError::MalformedProtobuf(_))
        ));

        // Missing terminator.
        let bytes = [0x0b, 0x18, 0x05];
        let mut scanner = Scanner::new(&bytes);
        let key = scanner.read_key().unwrap().unwrap();
        assert_eq!(scanner.skip_value(key), Err(DecodeError::Truncated));

        // Bare end-group.
        let bytes = [0x0c];
        let mut scanner = Scanner::new(&bytes);
        let key = scanner.read_key().unwrap().unwrap();
        assert!(matches!(
            scanner.skip_value(key),
            Err(DecodeError::MalformedProtobuf(_))
        ));
    }

    #[test]
    fn key_over_32_bits_rejected() {
        // Varint 2^32 as a key.
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x10];
        let mut scanner = Scanner::new(&bytes);
        assert!(matches!(
            scanner.read_key(),
            Err(DecodeError::MalformedProtobuf(_))
        ));
    }
}
