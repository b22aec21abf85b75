//! A minimal `multipart/form-data` body parser.
//!
//! Boundary-delimited per RFC 7578, scanned with `memchr` the way the corpus's other
//! byte-oriented parsers avoid allocating a copy of the whole body up front.

use std::{error, fmt};

use memchr::memmem;

/// One decoded multipart field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub value: Vec<u8>,
}

/// Errors raised while parsing a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A part's header block had no `Content-Disposition: form-data` header.
    MissingDisposition,
    /// `Content-Disposition` had no `name="..."` parameter.
    MissingName,
    /// A part's headers were not terminated by a blank line.
    UnterminatedHeaders,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingDisposition => write!(f, "part is missing a Content-Disposition header"),
            Error::MissingName => write!(f, "Content-Disposition is missing its name parameter"),
            Error::UnterminatedHeaders => write!(f, "part headers have no terminating blank line"),
        }
    }
}

/// Extracts the `boundary` parameter from a `Content-Type: multipart/form-data; boundary=...`
/// header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let param = param.trim();
        param
            .strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

/// Parses a multipart body into its constituent fields. The preamble before the first
/// boundary and the epilogue after the closing boundary are discarded, per RFC 7578.
pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Field>, Error> {
    let delimiter = format!("--{}", boundary);
    let delim = delimiter.as_bytes();

    let starts: Vec<usize> = memmem::find_iter(body, delim).collect();
    let mut fields = Vec::new();

    for window in starts.windows(2) {
        let part_start = window[0] + delim.len();
        let part_end = window[1];
        if part_end <= part_start {
            continue;
        }
        let mut part = &body[part_start..part_end];
        // Each delimiter line is immediately followed by CRLF, and the part before the
        // next delimiter carries a trailing CRLF of its own; trim both.
        part = trim_leading_crlf(part);
        part = trim_trailing_crlf(part);
        if part.is_empty() {
            continue;
        }
        // A closing boundary is `--boundary--`; its "part" starts with `--` and has no body.
        if part.starts_with(b"--") {
            break;
        }
        fields.push(parse_part(part)?);
    }

    Ok(fields)
}

fn trim_leading_crlf(buf: &[u8]) -> &[u8] {
    buf.strip_prefix(b"\r\n").unwrap_or(buf)
}

fn trim_trailing_crlf(buf: &[u8]) -> &[u8] {
    buf.strip_suffix(b"\r\n").unwrap_or(buf)
}

fn parse_part(part: &[u8]) -> Result<Field, Error> {
    let header_end = memmem::find(part, b"\r\n\r\n").ok_or(Error::UnterminatedHeaders)?;
    let header_block = &part[..header_end];
    let value = part[header_end + 4..].to_vec();

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in header_block.split(|b| *b == b'\n') {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches('\r').trim();
        if let Some(rest) = ci_strip_prefix(line, "content-disposition:") {
            for param in rest.split(';').skip(1) {
                let param = param.trim();
                if let Some(v) = param.strip_prefix("name=") {
                    name = Some(unquote(v));
                } else if let Some(v) = param.strip_prefix("filename=") {
                    filename = Some(unquote(v));
                }
            }
        } else if let Some(rest) = ci_strip_prefix(line, "content-type:") {
            content_type = Some(rest.trim().to_string());
        }
    }

    let name = name.ok_or(Error::MissingName)?;
    if name.is_empty() {
        return Err(Error::MissingDisposition);
    }

    Ok(Field {
        name,
        filename,
        content_type,
        value,
    })
}

fn ci_strip_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches('"').to_string()
}
