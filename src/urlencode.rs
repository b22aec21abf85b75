//! Percent-decoding and encoding for query strings and urlencoded form bodies.
//!
//! Structured like the corpus's other zero-copy query parsers (e.g. the `Query` parser in
//! `maker_web`): a small, dependency-free scanner over raw bytes, reporting a typed error
//! rather than panicking on malformed input.

use std::{error, fmt};

/// Errors produced while percent-decoding a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A `%` was not followed by two hex digits.
    TruncatedEscape,
    /// The decoded bytes were not valid UTF-8.
    InvalidUtf8,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TruncatedEscape => write!(f, "truncated '%XX' escape sequence"),
            Error::InvalidUtf8 => write!(f, "decoded bytes are not valid UTF-8"),
        }
    }
}

/// Decodes a `+`/`%XX`-encoded token into a UTF-8 string, per RFC 3986 `application/x-www-form-urlencoded` conventions.
pub fn decode(input: &str) -> Result<String, Error> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if i + 2 >= bytes.len() {
                    return Err(Error::TruncatedEscape);
                }
                let hi = hex_val(bytes[i + 1]).ok_or(Error::TruncatedEscape)?;
                let lo = hex_val(bytes[i + 2]).ok_or(Error::TruncatedEscape)?;
                out.push((hi << 4) | lo);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| Error::InvalidUtf8)
}

/// Encodes a string using `%XX` for every byte that isn't alphanumeric, and `+` for space.
/// The inverse of [`decode`], used by tests to assert the round-trip property.
pub fn encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b' ' => out.push('+'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_plus_as_space() {
        assert_eq!(decode("a+b").unwrap(), "a b");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(decode("user%40example.com").unwrap(), "user@example.com");
    }

    #[test]
    fn truncated_escape_is_an_error() {
        assert_eq!(decode("abc%4").unwrap_err(), Error::TruncatedEscape);
        assert_eq!(decode("abc%").unwrap_err(), Error::TruncatedEscape);
    }

    #[test]
    fn passes_through_plain_alnum() {
        assert_eq!(decode("hello123").unwrap(), "hello123");
    }

    proptest! {
        #[test]
        fn round_trip(s in ".*") {
            let encoded = encode(&s);
            prop_assert_eq!(decode(&encoded).unwrap(), s);
        }
    }
}
