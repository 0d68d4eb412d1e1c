//! Base64 for `bytes` fields in JSON.
//!
//! Encoding always uses the standard alphabet with padding. Decoding accepts
//! both the standard and URL-safe alphabets, with or without padding, per
//! the canonical JSON mapping.

// Byte-to-sextet table indexing requires as casts.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub(crate) fn encode(data: &[u8], out: &mut String) {
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied().unwrap_or(0);
        let b2 = chunk.get(2).copied().unwrap_or(0);

        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char);
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[(b2 & 0x3f) as usize] as char);
        } else {
            out.push('=');
        }
    }
}

fn sextet(byte: u8) -> Option<u8> {
    match byte {
        b'A'..=b'Z' => Some(byte - b'A'),
        b'a'..=b'z' => Some(byte - b'a' + 26),
        b'0'..=b'9' => Some(byte - b'0' + 52),
        // Standard and URL-safe alphabets are both accepted.
        b'+' | b'-' => Some(62),
        b'/' | b'_' => Some(63),
        _ => None,
    }
}

pub(crate) fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(text.len() / 4 * 3);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut chars = 0usize;
    let mut padding = false;

    for &byte in text.as_bytes() {
        if byte == b'=' {
            padding = true;
            continue;
        }
        if padding {
            return Err(DecodeError::MalformedJson("base64 data after padding"));
        }
        let Some(value) = sextet(byte) else {
            return Err(DecodeError::MalformedJson("invalid base64 character"));
        };
        acc = (acc << 6) | u32::from(value);
        bits += 6;
        chars += 1;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }

    // A lone trailing sextet cannot carry a full byte.
    if chars % 4 == 1 {
        return Err(DecodeError::MalformedJson("truncated base64"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8], expected: &str) {
        let mut text = String::new();
        encode(data, &mut text);
        assert_eq!(text, expected);
        assert_eq!(decode(&text).unwrap(), data);
    }

    #[test]
    fn padded_roundtrips() {
        roundtrip(b"", "");
        roundtrip(&[0], "AA==");
        roundtrip(&[0, 0, 0], "AAAA");
        roundtrip(b"f", "Zg==");
        roundtrip(b"fo", "Zm8=");
        roundtrip(b"foo", "Zm9v");
        roundtrip(b"foobar", "Zm9vYmFy");
    }

    #[test]
    fn accepts_unpadded_and_url_safe() {
        assert_eq!(decode("Zg").unwrap(), b"f");
        assert_eq!(decode("-_8").unwrap(), &[0xfb, 0xff]);
        assert_eq!(decode("+/8=").unwrap(), &[0xfb, 0xff]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("Z").is_err());
        assert!(decode("Zg=Z").is_err());
        assert!(decode("Zg!?").is_err());
    }
}
