//! Base-128 variable-length integer encoding and the zig-zag signed mapping.

// This module uses `as` casts which have been reviewed for correctness: every
// cast either truncates deliberately (LEB128 groups are 7 bits) or widens.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;
use crate::util::likely;

/// Maximum number of bytes a 64-bit varint occupies on the wire.
pub const MAX_VARINT_LEN: usize = 10;

/// Decodes a varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed. Fails with
/// [`DecodeError::Truncated`] if the input ends before the final byte and
/// with [`DecodeError::MalformedVarint`] if the encoding runs past 10 bytes
/// or overflows 64 bits.
#[inline]
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), DecodeError> {
    // Fast path: single byte varints are by far the most common.
    if likely(!data.is_empty() && data[0] < 0x80) {
        return Ok((u64::from(data[0]), 1));
    }

    let mut value: u64 = 0;
    for (i, &b) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        if i == MAX_VARINT_LEN - 1 {
            // The 10th byte may only contribute the single remaining bit.
            if b > 0x01 {
                return Err(DecodeError::MalformedVarint);
            }
            value |= u64::from(b) << 63;
            return Ok((value, MAX_VARINT_LEN));
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b < 0x80 {
            return Ok((value, i + 1));
        }
    }
    Err(DecodeError::Truncated)
}

/// Encodes `value` as a varint, returning the number of bytes written.
#[inline]
pub fn encode_varint<B: bytes::BufMut>(value: u64, buf: &mut B) -> usize {
    let mut value = value;
    let mut written = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        written += 1;
        if value == 0 {
            buf.put_u8(byte);
            return written;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// The number of bytes `value` occupies when varint encoded.
///
/// LEB128 packs 7 bits per byte, so the answer is `ceil(significant_bits / 7)`
/// with a minimum of one byte for zero. `leading_zeros` compiles to a single
/// instruction and the table lookup avoids a division.
#[inline]
pub fn encoded_varint_len(value: u64) -> usize {
    #[rustfmt::skip]
    const LZ_TO_LEN: [u8; 65] = [
        10,                                         // 0:     64 bits -> 10 bytes
        9, 9, 9, 9, 9, 9, 9,                        // 1-7:   63-57 bits -> 9 bytes
        8, 8, 8, 8, 8, 8, 8,                        // 8-14:  56-50 bits -> 8 bytes
        7, 7, 7, 7, 7, 7, 7,                        // 15-21: 49-43 bits -> 7 bytes
        6, 6, 6, 6, 6, 6, 6,                        // 22-28: 42-36 bits -> 6 bytes
        5, 5, 5, 5, 5, 5, 5,                        // 29-35: 35-29 bits -> 5 bytes
        4, 4, 4, 4, 4, 4, 4,                        // 36-42: 28-22 bits -> 4 bytes
        3, 3, 3, 3, 3, 3, 3,                        // 43-49: 21-15 bits -> 3 bytes
        2, 2, 2, 2, 2, 2, 2,                        // 50-56: 14-8 bits  -> 2 bytes
        1, 1, 1, 1, 1, 1, 1, 1,                     // 57-64: 7-0 bits   -> 1 byte
    ];
    usize::from(LZ_TO_LEN[value.leading_zeros() as usize])
}

/// Zig-zag maps signed integers onto unsigned ones so small-magnitude
/// negative numbers stay short under varint encoding: 0 -> 0, -1 -> 1,
/// 1 -> 2, -2 -> 3, ...
///
/// The arithmetic goes through the unsigned representation so `i64::MIN`
/// round-trips without intermediate overflow.
#[inline]
pub const fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) as u64) ^ ((n >> 63) as u64)
}

/// Inverse of [`zigzag_encode_64`].
#[inline]
pub const fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}

#[inline]
pub const fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) as u32) ^ ((n >> 31) as u32)
}

#[inline]
pub const fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use proptest::property_test;

    use super::*;

    #[track_caller]
    fn roundtrip(value: u64, expected_len: usize) {
        let mut buf = Vec::new();
        let written = encode_varint(value, &mut buf);
        assert_eq!(written, expected_len, "encode length");
        assert_eq!(encoded_varint_len(value), expected_len, "computed length");

        let (decoded, read) = decode_varint(&buf).unwrap();
        assert_eq!(decoded, value, "value");
        assert_eq!(read, expected_len, "decode length");
    }

    #[test]
    fn smoketest_varint() {
        roundtrip(0, 1);
        roundtrip(1, 1);
        roundtrip(127, 1);
        roundtrip(128, 2);
        roundtrip(300, 2);
        roundtrip(16_383, 2);
        roundtrip(16_384, 3);
        // First value that needs the 9th byte.
        roundtrip(72_057_594_037_927_937, 9);
        roundtrip(u64::MAX, 10);
    }

    #[test]
    fn varint_truncated() {
        assert_eq!(decode_varint(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_varint(&[0x80]), Err(DecodeError::Truncated));
        assert_eq!(
            decode_varint(&[0x80, 0x80, 0x80]),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn varint_overflow() {
        // 10 continuation bytes: no terminator within the limit.
        let bytes = [0x80u8; 11];
        assert_eq!(decode_varint(&bytes), Err(DecodeError::MalformedVarint));

        // 10th byte contributes more than the one remaining bit.
        let mut bytes = [0xffu8; 10];
        bytes[9] = 0x02;
        assert_eq!(decode_varint(&bytes), Err(DecodeError::MalformedVarint));

        // u64::MAX itself still decodes.
        let mut bytes = [0xffu8; 10];
        bytes[9] = 0x01;
        assert_eq!(decode_varint(&bytes), Ok((u64::MAX, 10)));
    }

    #[test]
    fn zigzag_spec_values() {
        // From the protobuf encoding guide.
        assert_eq!(zigzag_encode_32(0), 0);
        assert_eq!(zigzag_encode_32(-1), 1);
        assert_eq!(zigzag_encode_32(1), 2);
        assert_eq!(zigzag_encode_32(-2), 3);
        assert_eq!(zigzag_encode_32(2147483647), 4294967294);
        assert_eq!(zigzag_encode_32(-2147483648), 4294967295);
    }

    #[test]
    fn zigzag_extremes() {
        assert_eq!(zigzag_decode_64(zigzag_encode_64(i64::MIN)), i64::MIN);
        assert_eq!(zigzag_decode_64(zigzag_encode_64(i64::MAX)), i64::MAX);
        assert_eq!(zigzag_decode_32(zigzag_encode_32(i32::MIN)), i32::MIN);
        assert_eq!(zigzag_decode_32(zigzag_encode_32(i32::MAX)), i32::MAX);
    }

    #[property_test]
    fn proptest_varint_roundtrip(value: u64) {
        let mut buf = Vec::new();
        let written = encode_varint(value, &mut buf);
        prop_assert_eq!(written, encoded_varint_len(value));

        let (decoded, read) = decode_varint(&buf).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(read, written);
        prop_assert!((1..=MAX_VARINT_LEN).contains(&read));
    }

    #[property_test]
    fn proptest_zigzag_bijection(value: i64) {
        prop_assert_eq!(zigzag_decode_64(zigzag_encode_64(value)), value);
    }

    #[property_test]
    fn proptest_zigzag_bijection_32(value: i32) {
        prop_assert_eq!(zigzag_decode_32(zigzag_encode_32(value)), value);
    }
}
