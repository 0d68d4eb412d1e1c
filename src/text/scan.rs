//! Text format tokenizer.
//!
//! The text format is the debug syntax: `field: value` pairs, `{}` or `<>`
//! message nesting, `#` line comments, C-style string literals with octal
//! and hex escapes, and adjacent literal concatenation. The scanner exposes
//! typed pulls; number literals accept decimal, hex (`0x`), and octal
//! (leading zero) radices.

// Escape processing and radix parsing truncate through integer widths.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;

#[derive(Debug)]
pub struct TextScanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> TextScanner<'a> {
    pub fn new(text: &'a str) -> TextScanner<'a> {
        TextScanner {
            input: text.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&byte) = self.input.get(self.pos) {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'#' => {
                    while let Some(&b) = self.input.get(self.pos) {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    pub fn is_at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos == self.input.len()
    }

    /// The next significant byte, without consuming it.
    pub fn peek_byte(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    /// Consumes `byte` if it is next.
    pub fn try_consume(&mut self, byte: u8) -> bool {
        if self.peek_byte() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, byte: u8, what: &'static str) -> Result<(), DecodeError> {
        if self.try_consume(byte) {
            Ok(())
        } else {
            Err(DecodeError::MalformedText(what))
        }
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn next_identifier(&mut self) -> Result<&'a str, DecodeError> {
        self.skip_whitespace();
        let start = self.pos;
        if matches!(self.input.get(self.pos), Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')) {
            self.pos += 1;
            while matches!(
                self.input.get(self.pos),
                Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
            ) {
                self.pos += 1;
            }
        }
        if start == self.pos {
            return Err(DecodeError::MalformedText("expected identifier"));
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| DecodeError::MalformedText("expected identifier"))
    }

    /// Dotted name between `[` and `]`, the `[` already consumed.
    pub fn next_extension_name(&mut self) -> Result<&'a str, DecodeError> {
        self.skip_whitespace();
        let start = self.pos;
        while matches!(
            self.input.get(self.pos),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.')
        ) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(DecodeError::MalformedText("expected extension name"));
        }
        let name = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| DecodeError::MalformedText("expected extension name"))?;
        self.expect(b']', "expected ']'")?;
        Ok(name)
    }

    fn parse_unsigned(&mut self) -> Result<u64, DecodeError> {
        let (radix, mut seen) = if self.input[self.pos..].starts_with(b"0x")
            || self.input[self.pos..].starts_with(b"0X")
        {
            self.pos += 2;
            (16u64, false)
        } else if self.input.get(self.pos) == Some(&b'0')
            && matches!(self.input.get(self.pos + 1), Some(b'0'..=b'7'))
        {
            self.pos += 1;
            (8, true)
        } else {
            (10, false)
        };

        let mut value: u64 = 0;
        while let Some(&byte) = self.input.get(self.pos) {
            let digit = match byte {
                b'0'..=b'9' => u64::from(byte - b'0'),
                b'a'..=b'f' if radix == 16 => u64::from(byte - b'a' + 10),
                b'A'..=b'F' if radix == 16 => u64::from(byte - b'A' + 10),
                _ => break,
            };
            if digit >= radix {
                return Err(DecodeError::MalformedNumber);
            }
            value = value
                .checked_mul(radix)
                .and_then(|v| v.checked_add(digit))
                .ok_or(DecodeError::MalformedNumber)?;
            seen = true;
            self.pos += 1;
        }
        if !seen {
            return Err(DecodeError::MalformedNumber);
        }
        Ok(value)
    }

    pub fn next_u64(&mut self) -> Result<u64, DecodeError> {
        self.skip_whitespace();
        self.parse_unsigned()
    }

    pub fn next_i64(&mut self) -> Result<i64, DecodeError> {
        self.skip_whitespace();
        let negative = self.try_consume(b'-');
        if negative {
            self.skip_whitespace();
        }
        let magnitude = self.parse_unsigned()?;
        if negative {
            if magnitude > i64::MIN.unsigned_abs() {
                return Err(DecodeError::MalformedNumber);
            }
            Ok((magnitude as i64).wrapping_neg())
        } else {
            i64::try_from(magnitude).map_err(|_| DecodeError::MalformedNumber)
        }
    }

    pub fn next_u32(&mut self) -> Result<u32, DecodeError> {
        u32::try_from(self.next_u64()?).map_err(|_| DecodeError::MalformedNumber)
    }

    pub fn next_i32(&mut self) -> Result<i32, DecodeError> {
        i32::try_from(self.next_i64()?).map_err(|_| DecodeError::MalformedNumber)
    }

    pub fn next_f64(&mut self) -> Result<f64, DecodeError> {
        self.skip_whitespace();
        let negative = self.try_consume(b'-');
        if negative {
            self.skip_whitespace();
        }
        let magnitude = if matches!(self.input.get(self.pos), Some(b'i' | b'I' | b'n' | b'N')) {
            let word = self.next_identifier()?;
            match word.to_ascii_lowercase().as_str() {
                "inf" | "infinity" => f64::INFINITY,
                "nan" => f64::NAN,
                _ => return Err(DecodeError::MalformedNumber),
            }
        } else {
            self.parse_float_literal()?
        };
        Ok(if negative { -magnitude } else { magnitude })
    }

    pub fn next_f32(&mut self) -> Result<f32, DecodeError> {
        let value = self.next_f64()?;
        if value.is_finite() && value.abs() > f64::from(f32::MAX) {
            return Err(DecodeError::MalformedNumber);
        }
        Ok(value as f32)
    }

    /// `digits[.digits][(e|E)[+-]digits]` with an optional `f` suffix.
    fn parse_float_literal(&mut self) -> Result<f64, DecodeError> {
        let start = self.pos;
        while matches!(self.input.get(self.pos), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.input.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            while matches!(self.input.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.input.get(self.pos), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.input.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.input.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if start == self.pos {
            return Err(DecodeError::MalformedNumber);
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| DecodeError::MalformedNumber)?;
        let value: f64 = text.parse().map_err(|_| DecodeError::MalformedNumber)?;
        // C-style float suffix.
        if matches!(self.input.get(self.pos), Some(b'f' | b'F')) {
            self.pos += 1;
        }
        Ok(value)
    }

    /// Consumes one numeric token without interpreting it, for skipping
    /// unknown fields.
    pub fn skip_number(&mut self) -> Result<(), DecodeError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.input.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while matches!(
            self.input.get(self.pos),
            Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' | b'x' | b'X' | b'.' | b'+' | b'-')
        ) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(DecodeError::MalformedText("expected value"));
        }
        Ok(())
    }

    pub fn next_bool(&mut self) -> Result<bool, DecodeError> {
        match self.peek_byte() {
            Some(b'0') => {
                self.pos += 1;
                Ok(false)
            }
            Some(b'1') => {
                self.pos += 1;
                Ok(true)
            }
            _ => match self.next_identifier()? {
                "true" | "True" | "t" => Ok(true),
                "false" | "False" | "f" => Ok(false),
                _ => Err(DecodeError::MalformedText("expected boolean")),
            },
        }
    }

    /// One or more adjacent string literals, concatenated into raw bytes.
    pub fn next_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        if !matches!(self.peek_byte(), Some(b'"' | b'\'')) {
            return Err(DecodeError::MalformedText("expected string literal"));
        }
        while let Some(quote @ (b'"' | b'\'')) = self.peek_byte() {
            self.pos += 1;
            self.parse_string_literal(quote, &mut out)?;
        }
        Ok(out)
    }

    fn parse_string_literal(&mut self, quote: u8, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        loop {
            let Some(&byte) = self.input.get(self.pos) else {
                return Err(DecodeError::MalformedText("unterminated string"));
            };
            self.pos += 1;
            match byte {
                b if b == quote => return Ok(()),
                b'\n' => return Err(DecodeError::MalformedText("newline in string literal")),
                b'\\' => self.parse_escape(out)?,
                b => out.push(b),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        let Some(&byte) = self.input.get(self.pos) else {
            return Err(DecodeError::MalformedText("unterminated escape"));
        };
        self.pos += 1;
        match byte {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'?' => out.push(b'?'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'0'..=b'7' => {
                // Up to three octal digits, first already read.
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.input.get(self.pos) {
                        Some(&d @ b'0'..=b'7') => {
                            value = (value << 3) | u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                if value > 0xff {
                    return Err(DecodeError::MalformedText("octal escape out of range"));
                }
                out.push(value as u8);
            }
            b'x' | b'X' => {
                // One or two hex digits.
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match self.input.get(self.pos).and_then(|&b| hex_digit(b)) {
                        Some(d) => {
                            value = (value << 4) | d;
                            self.pos += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return Err(DecodeError::MalformedText("invalid hex escape"));
                }
                out.push(value as u8);
            }
            b'u' => {
                let code = self.hex_code(4)?;
                if (0xd800..=0xdfff).contains(&code) {
                    return Err(DecodeError::MalformedText("surrogate in \\u escape"));
                }
                self.push_code_point(code, out)?;
            }
            b'U' => {
                let code = self.hex_code(8)?;
                self.push_code_point(code, out)?;
            }
            _ => return Err(DecodeError::MalformedText("invalid escape")),
        }
        Ok(())
    }

    fn hex_code(&mut self, digits: usize) -> Result<u32, DecodeError> {
        let mut value: u32 = 0;
        for _ in 0..digits {
            let digit = self
                .input
                .get(self.pos)
                .and_then(|&b| hex_digit(b))
                .ok_or(DecodeError::MalformedText("invalid unicode escape"))?;
            value = (value << 4) | digit;
            self.pos += 1;
        }
        Ok(value)
    }

    fn push_code_point(&mut self, code: u32, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        let ch =
            char::from_u32(code).ok_or(DecodeError::MalformedText("invalid unicode escape"))?;
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

fn hex_digit(byte: u8) -> Option<u32> {
    match byte {
        b'0'..=b'9' => Some(u32::from(byte - b'0')),
        b'a'..=b'f' => Some(u32::from(byte - b'a' + 10)),
        b'A'..=b'F' => Some(u32::from(byte - b'A' + 10)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_and_comments() {
        let mut scanner = TextScanner::new("# leading comment\n  field_one: 3");
        assert_eq!(scanner.next_identifier().unwrap(), "field_one");
        assert!(scanner.try_consume(b':'));
        assert_eq!(scanner.next_i32().unwrap(), 3);
        assert!(scanner.is_at_end());
    }

    #[test]
    fn number_radices() {
        let mut scanner = TextScanner::new("0x1f 017 42 -0x10");
        assert_eq!(scanner.next_u64().unwrap(), 31);
        assert_eq!(scanner.next_u64().unwrap(), 15);
        assert_eq!(scanner.next_u64().unwrap(), 42);
        assert_eq!(scanner.next_i64().unwrap(), -16);
    }

    #[test]
    fn integer_bounds() {
        let mut scanner = TextScanner::new("-9223372036854775808");
        assert_eq!(scanner.next_i64().unwrap(), i64::MIN);
        let mut scanner = TextScanner::new("-9223372036854775809");
        assert_eq!(scanner.next_i64(), Err(DecodeError::MalformedNumber));
        let mut scanner = TextScanner::new("4294967296");
        assert_eq!(scanner.next_u32(), Err(DecodeError::MalformedNumber));
    }

    #[test]
    fn floats() {
        let mut scanner = TextScanner::new("1.5 2e3 3f -inf nan");
        assert_eq!(scanner.next_f64().unwrap(), 1.5);
        assert_eq!(scanner.next_f64().unwrap(), 2000.0);
        assert_eq!(scanner.next_f32().unwrap(), 3.0);
        assert_eq!(scanner.next_f64().unwrap(), f64::NEG_INFINITY);
        assert!(scanner.next_f64().unwrap().is_nan());
    }

    #[test]
    fn string_escapes_and_concatenation() {
        // '\101\102' is "AB"; adjacent literals concatenate.
        let mut scanner = TextScanner::new(r#"'\101\102' "\x43" '\n\t'"#);
        assert_eq!(scanner.next_bytes().unwrap(), b"ABC\n\t");
    }

    #[test]
    fn unicode_escapes() {
        let mut scanner = TextScanner::new(r#""é \U0001F600""#);
        let bytes = scanner.next_bytes().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\u{e9} \u{1f600}");

        let mut scanner = TextScanner::new(r#""\ud800""#);
        assert!(scanner.next_bytes().is_err());
    }

    #[test]
    fn booleans() {
        let mut scanner = TextScanner::new("true false t f True False 1 0");
        for expected in [true, false, true, false, true, false, true, false] {
            assert_eq!(scanner.next_bool().unwrap(), expected);
        }
    }
}
