//! JSON tokenizer.
//!
//! A [`JsonScanner`] pulls one token at a time from a borrowed string slice.
//! Strings are unescaped eagerly (including `\uXXXX` surrogate pairs);
//! numbers are validated against the RFC 7159 grammar but kept as raw text
//! so the decoder can parse them at the exact integer width the field wants.

// Numeric range checks below move between float and integer widths.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;

/// One JSON lexeme. Number spans borrow from the input.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonToken<'a> {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    Comma,
    Colon,
    String(String),
    Number(&'a str),
    True,
    False,
    Null,
}

#[derive(Debug)]
pub struct JsonScanner<'a> {
    input: &'a str,
    pos: usize,
    peeked: Option<JsonToken<'a>>,
}

impl<'a> JsonScanner<'a> {
    pub fn new(input: &'a str) -> JsonScanner<'a> {
        JsonScanner {
            input,
            pos: 0,
            peeked: None,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn skip_whitespace(&mut self) {
        while let Some(&b) = self.bytes().get(self.pos) {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    /// Whether only whitespace remains. Meaningful only between values.
    pub fn is_at_end(&mut self) -> bool {
        self.peeked.is_none() && {
            self.skip_whitespace();
            self.pos == self.input.len()
        }
    }

    /// Bytes left after the last consumed token, for trailing-garbage
    /// reporting.
    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    /// Looks at the next token without consuming it.
    pub fn peek(&mut self) -> Result<&JsonToken<'a>, DecodeError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.as_ref().expect("just filled"))
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Result<JsonToken<'a>, DecodeError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.lex()
    }

    /// Consumes the next token and checks it is `expected`.
    pub fn expect(&mut self, expected: JsonToken<'_>) -> Result<(), DecodeError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(DecodeError::MalformedJson("unexpected token"))
        }
    }

    fn lex(&mut self) -> Result<JsonToken<'a>, DecodeError> {
        self.skip_whitespace();
        let Some(&byte) = self.bytes().get(self.pos) else {
            return Err(DecodeError::MalformedJson("unexpected end of input"));
        };
        match byte {
            b'{' => {
                self.pos += 1;
                Ok(JsonToken::ObjectStart)
            }
            b'}' => {
                self.pos += 1;
                Ok(JsonToken::ObjectEnd)
            }
            b'[' => {
                self.pos += 1;
                Ok(JsonToken::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(JsonToken::ArrayEnd)
            }
            b',' => {
                self.pos += 1;
                Ok(JsonToken::Comma)
            }
            b':' => {
                self.pos += 1;
                Ok(JsonToken::Colon)
            }
            b'"' => self.lex_string().map(JsonToken::String),
            b't' => {
                self.expect_keyword("true")?;
                Ok(JsonToken::True)
            }
            b'f' => {
                self.expect_keyword("false")?;
                Ok(JsonToken::False)
            }
            b'n' => {
                self.expect_keyword("null")?;
                Ok(JsonToken::Null)
            }
            b'-' | b'0'..=b'9' => self.lex_number().map(JsonToken::Number),
            _ => Err(DecodeError::MalformedJson("unexpected character")),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), DecodeError> {
        if self.input[self.pos..].starts_with(keyword) {
            self.pos += keyword.len();
            Ok(())
        } else {
            Err(DecodeError::MalformedJson("invalid keyword"))
        }
    }

    /// Scans one string literal, resolving escapes.
    fn lex_string(&mut self) -> Result<String, DecodeError> {
        debug_assert_eq!(self.bytes()[self.pos], b'"');
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.input[self.pos..];
            let Some(ch) = rest.chars().next() else {
                return Err(DecodeError::MalformedJson("unterminated string"));
            };
            match ch {
                '"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                '\\' => {
                    self.pos += 1;
                    out.push(self.lex_escape()?);
                }
                c if (c as u32) < 0x20 => {
                    return Err(DecodeError::MalformedJson("raw control character in string"));
                }
                c => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn lex_escape(&mut self) -> Result<char, DecodeError> {
        let Some(&byte) = self.bytes().get(self.pos) else {
            return Err(DecodeError::MalformedJson("unterminated escape"));
        };
        self.pos += 1;
        match byte {
            b'"' => Ok('"'),
            b'\\' => Ok('\\'),
            b'/' => Ok('/'),
            b'b' => Ok('\u{8}'),
            b'f' => Ok('\u{c}'),
            b'n' => Ok('\n'),
            b'r' => Ok('\r'),
            b't' => Ok('\t'),
            b'u' => self.lex_unicode_escape(),
            _ => Err(DecodeError::MalformedJson("invalid escape")),
        }
    }

    fn hex4(&mut self) -> Result<u32, DecodeError> {
        let end = self.pos + 4;
        let digits = self
            .input
            .get(self.pos..end)
            .ok_or(DecodeError::MalformedJson("unterminated \\u escape"))?;
        let value = u32::from_str_radix(digits, 16)
            .map_err(|_| DecodeError::MalformedJson("invalid \\u escape"))?;
        self.pos = end;
        Ok(value)
    }

    /// One `\uXXXX` escape, pairing UTF-16 surrogates.
    fn lex_unicode_escape(&mut self) -> Result<char, DecodeError> {
        let first = self.hex4()?;
        match first {
            0xd800..=0xdbff => {
                // High surrogate: a low surrogate escape must follow.
                if self.bytes().get(self.pos) != Some(&b'\\')
                    || self.bytes().get(self.pos + 1) != Some(&b'u')
                {
                    return Err(DecodeError::MalformedJson("unpaired surrogate"));
                }
                self.pos += 2;
                let second = self.hex4()?;
                if !(0xdc00..=0xdfff).contains(&second) {
                    return Err(DecodeError::MalformedJson("unpaired surrogate"));
                }
                let code = 0x10000 + ((first - 0xd800) << 10) + (second - 0xdc00);
                char::from_u32(code).ok_or(DecodeError::MalformedJson("invalid code point"))
            }
            0xdc00..=0xdfff => Err(DecodeError::MalformedJson("unpaired surrogate")),
            _ => char::from_u32(first).ok_or(DecodeError::MalformedJson("invalid code point")),
        }
    }

    /// Validates one number against the RFC 7159 grammar and returns its raw
    /// span.
    fn lex_number(&mut self) -> Result<&'a str, DecodeError> {
        let start = self.pos;
        let bytes = self.bytes();
        let mut pos = self.pos;

        if bytes.get(pos) == Some(&b'-') {
            pos += 1;
        }
        // Integer part: a single zero, or a nonzero digit run. Leading
        // zeros are not JSON.
        match bytes.get(pos) {
            Some(b'0') => pos += 1,
            Some(b'1'..=b'9') => {
                while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                    pos += 1;
                }
            }
            _ => return Err(DecodeError::MalformedJsonNumber),
        }
        if bytes.get(pos) == Some(&b'.') {
            pos += 1;
            if !matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                return Err(DecodeError::MalformedJsonNumber);
            }
            while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                pos += 1;
            }
        }
        if matches!(bytes.get(pos), Some(b'e' | b'E')) {
            pos += 1;
            if matches!(bytes.get(pos), Some(b'+' | b'-')) {
                pos += 1;
            }
            if !matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                return Err(DecodeError::MalformedJsonNumber);
            }
            while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                pos += 1;
            }
        }
        self.pos = pos;
        Ok(&self.input[start..pos])
    }
}

/// Exact values up to 2^53 survive a float round-trip; integer lexemes with
/// fraction or exponent parts go through f64 and must land on an integer
/// inside that window.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

pub(crate) fn parse_i64(text: &str) -> Result<i64, DecodeError> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(value);
    }
    let value: f64 = text.parse().map_err(|_| DecodeError::MalformedJsonNumber)?;
    if value.fract() != 0.0 || value.abs() > MAX_SAFE_INTEGER {
        return Err(DecodeError::MalformedJsonNumber);
    }
    Ok(value as i64)
}

pub(crate) fn parse_u64(text: &str) -> Result<u64, DecodeError> {
    if let Ok(value) = text.parse::<u64>() {
        return Ok(value);
    }
    let value: f64 = text.parse().map_err(|_| DecodeError::MalformedJsonNumber)?;
    if value.fract() != 0.0 || value < 0.0 || value > MAX_SAFE_INTEGER {
        return Err(DecodeError::MalformedJsonNumber);
    }
    Ok(value as u64)
}

pub(crate) fn parse_i32(text: &str) -> Result<i32, DecodeError> {
    i32::try_from(parse_i64(text)?).map_err(|_| DecodeError::MalformedJsonNumber)
}

pub(crate) fn parse_u32(text: &str) -> Result<u32, DecodeError> {
    u32::try_from(parse_u64(text)?).map_err(|_| DecodeError::MalformedJsonNumber)
}

pub(crate) fn parse_f64(text: &str) -> Result<f64, DecodeError> {
    match text {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => text.parse().map_err(|_| DecodeError::MalformedJsonNumber),
    }
}

pub(crate) fn parse_f32(text: &str) -> Result<f32, DecodeError> {
    let value = parse_f64(text)?;
    if value.is_finite() && value.abs() > f64::from(f32::MAX) {
        // Finite doubles that overflow f32 are an error, not infinity.
        return Err(DecodeError::MalformedJsonNumber);
    }
    Ok(value as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<JsonToken<'_>> {
        let mut scanner = JsonScanner::new(input);
        let mut out = Vec::new();
        while !scanner.is_at_end() {
            out.push(scanner.next().unwrap());
        }
        out
    }

    #[test]
    fn structural_tokens() {
        assert_eq!(
            tokens(r#"{"a": [1, true, null]}"#),
            vec![
                JsonToken::ObjectStart,
                JsonToken::String("a".to_owned()),
                JsonToken::Colon,
                JsonToken::ArrayStart,
                JsonToken::Number("1"),
                JsonToken::Comma,
                JsonToken::True,
                JsonToken::Comma,
                JsonToken::Null,
                JsonToken::ArrayEnd,
                JsonToken::ObjectEnd,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#""a\nb\t\"c\" é""#),
            vec![JsonToken::String("a\nb\t\"c\" \u{e9}".to_owned())]
        );
        // Escaped surrogate pair for U+1F600.
        assert_eq!(
            tokens("\"\\ud83d\\ude00\""),
            vec![JsonToken::String("\u{1f600}".to_owned())]
        );
        assert_eq!(
            tokens(r#""😀""#),
            vec![JsonToken::String("\u{1f600}".to_owned())]
        );
    }

    #[test]
    fn unpaired_surrogates_rejected() {
        let mut scanner = JsonScanner::new(r#""\ud83d""#);
        assert!(scanner.next().is_err());
        let mut scanner = JsonScanner::new(r#""\ude00""#);
        assert!(scanner.next().is_err());
    }

    #[test]
    fn number_grammar() {
        assert_eq!(tokens("0"), vec![JsonToken::Number("0")]);
        assert_eq!(tokens("-1.5e+3"), vec![JsonToken::Number("-1.5e+3")]);

        for bad in ["01", "-", "1.", ".5", "1e", "+1"] {
            let mut scanner = JsonScanner::new(bad);
            assert!(scanner.next().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn typed_number_parsing() {
        assert_eq!(parse_i64("-9223372036854775808").unwrap(), i64::MIN);
        assert_eq!(parse_u64("18446744073709551615").unwrap(), u64::MAX);
        assert_eq!(parse_i32("1e3").unwrap(), 1000);
        assert_eq!(parse_i64("2.000").unwrap(), 2);
        assert!(parse_i64("1.5").is_err());
        assert!(parse_i32("2147483648").is_err());
        assert!(parse_u32("-1").is_err());
        assert!(parse_f64("NaN").unwrap().is_nan());
        assert_eq!(parse_f64("-Infinity").unwrap(), f64::NEG_INFINITY);
        assert!(parse_f32("3.5e38").is_err());
    }
}
