//! Decoding of character matchers and rendering of byte literals.

use std::fmt::{Display, Write};

/// A decoded range bound.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Bound {
    Narrow(u8),
    /// A code point that does not fit into a single byte.
    Wide(u32),
}

/// Decodes a literal matcher: a single character or `x`-prefixed hex segments.
pub fn decode_literal(src: &str) -> Result<Vec<u8>, &'static str> {
    let mut chars = src.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Err("empty string"),
        (Some(_), None) => Ok(src.as_bytes().to_vec()),
        _ => decode_hex(src),
    }
}

/// Decodes one or more `xHH..` segments.
///
/// Every segment is read big-endian; trailing zero bytes of a segment wider
/// than one byte are padding, so `x4100x4200` is the two bytes `AB`.
pub fn decode_hex(src: &str) -> Result<Vec<u8>, &'static str> {
    let Some(rest) = src.strip_prefix('x') else {
        return Err("unrecognized hex prefix, expected `x`");
    };

    let mut out = Vec::new();
    for segment in rest.split('x') {
        let start = out.len();
        decode_segment(segment, &mut out)?;
        let end = out[start..]
            .iter()
            .rposition(|&b| b != 0)
            .map_or(start + 1, |last| start + last + 1);
        out.truncate(end);
    }

    Ok(out)
}

fn decode_segment(segment: &str, out: &mut Vec<u8>) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty hex segment");
    }
    if !segment.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("invalid hex digit");
    }
    if segment.len() % 2 != 0 {
        return Err("hex segment must have an even number of digits");
    }

    for pair in segment.as_bytes().chunks(2) {
        let byte = (hex_value(pair[0]) << 4) | hex_value(pair[1]);
        out.push(byte);
    }
    Ok(())
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => unreachable!("Digits are validated"),
    }
}

/// Decodes a range bound: one character or a single hex segment read as a code point.
pub fn decode_bound(src: &str) -> Result<Bound, &'static str> {
    let mut chars = src.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Err("empty range bound"),
        (Some(c), None) => match u8::try_from(c) {
            Ok(byte) if c.is_ascii() => Ok(Bound::Narrow(byte)),
            _ => Ok(Bound::Wide(c as u32)),
        },
        _ => {
            let Some(digits) = src.strip_prefix('x') else {
                return Err("range bound must be one character or an `x`-prefixed hex code");
            };
            if digits.contains('x') {
                return Err("range bound must be a single character");
            }

            let mut bytes = Vec::new();
            decode_segment(digits, &mut bytes)?;

            let leading = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
            let significant = &bytes[leading..];
            if significant.len() > 4 {
                return Err("hex code point out of range");
            }

            let value = significant
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32);
            match u8::try_from(value) {
                Ok(byte) => Ok(Bound::Narrow(byte)),
                Err(_) => Ok(Bound::Wide(value)),
            }
        }
    }
}

/// Renders `bytes` as a Rust byte string literal.
pub fn display_byte_string(bytes: &[u8]) -> impl Display + '_ {
    ByteString(bytes)
}

struct ByteString<'a>(&'a [u8]);

impl Display for ByteString<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("b\"")?;
        for &byte in self.0 {
            for c in std::ascii::escape_default(byte) {
                f.write_char(c as char)?;
            }
        }
        f.write_char('"')
    }
}
