//! The per-request response buffer: accumulated headers and body, flushed once.

use bytes::{Bytes, BytesMut};

/// Accumulates a CGI-style response and serializes it to the client exactly once.
///
/// Headers are kept in an insertion-ordered `Vec` rather than a `HashMap`: cardinality is
/// tiny per request and order must be preserved in the wire output.
///
/// `finalize()` is deliberately synchronous: it only builds the wire bytes and flips
/// `flushed`, so the sandbox's tree-walking interpreter (itself synchronous) can call it
/// directly from its `flush()` builtin. The caller (the worker task) performs the actual
/// `write_all` against the socket once `finalize()` hands back `Some(bytes)`.
pub struct ResponseState {
    out_headers: Vec<(String, String)>,
    out_body: BytesMut,
    flushed: bool,
    terminate: bool,
}

impl ResponseState {
    pub fn new() -> ResponseState {
        ResponseState {
            out_headers: Vec::new(),
            out_body: BytesMut::new(),
            flushed: false,
            terminate: false,
        }
    }

    /// Sets or replaces a response header. Trims whitespace from both key and value and
    /// title-cases the key (`content-type` → `Content-Type`). Setting `Location` implicitly
    /// sets `Status` to `302 Found`, unless a status has already been set.
    pub fn set_header(&mut self, key: &str, value: &str, replace: bool) {
        if self.flushed {
            return;
        }
        let key = title_case(key.trim());
        let value = value.trim().to_string();

        if let Some(existing) = self.out_headers.iter_mut().find(|(k, _)| *k == key) {
            if !replace {
                return;
            }
            existing.1 = value.clone();
        } else {
            self.out_headers.push((key.clone(), value.clone()));
        }

        if key == "Location" && !self.out_headers.iter().any(|(k, _)| k == "Status") {
            self.out_headers.push(("Status".to_string(), "302 Found".to_string()));
        }
    }

    /// Appends to the response body. Dropped silently once flushed.
    pub fn puts(&mut self, data: &[u8]) {
        if self.flushed {
            return;
        }
        self.out_body.extend_from_slice(data);
    }

    /// Sets the cooperative termination flag; the template FSM checks this after every
    /// fragment execution and stops early without error when it is set.
    pub fn set_terminate(&mut self) {
        self.terminate = true;
    }

    pub fn should_terminate(&self) -> bool {
        self.terminate
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Replaces the entire body with a standard error page: `500`/`404` status plus a
    /// `<pre>msg</pre>` body. Used by `die()` and by locator/worker failure paths.
    pub fn set_error_page(&mut self, status: &str, message: &str) {
        if self.flushed {
            return;
        }
        self.out_headers.retain(|(k, _)| k != "Status");
        self.out_headers.insert(0, ("Status".to_string(), status.to_string()));
        self.out_body.clear();
        self.out_body
            .extend_from_slice(format!("<pre>{}</pre>", escape_pre(message)).as_bytes());
    }

    /// Applies defaults and serializes headers + blank line + body into one buffer,
    /// marking the response flushed. Idempotent: returns `None` on every call after the
    /// first, matching `flush()`'s "calling it N times writes once" contract.
    pub fn finalize(&mut self) -> Option<Bytes> {
        if self.flushed {
            return None;
        }
        self.flushed = true;

        if !self.out_headers.iter().any(|(k, _)| k == "Status") {
            self.out_headers.insert(0, ("Status".to_string(), "200".to_string()));
        }
        // "Content-type" (lowercase t) is the exact historical casing this default has
        // always used, distinct from the title-cased form `header()` would produce.
        if !self
            .out_headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            self.out_headers
                .push(("Content-type".to_string(), "text/html;charset=utf-8".to_string()));
        }

        let mut wire = BytesMut::new();
        for (k, v) in &self.out_headers {
            wire.extend_from_slice(k.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(v.as_bytes());
            wire.extend_from_slice(b"\n");
        }
        wire.extend_from_slice(b"\n");
        wire.extend_from_slice(&self.out_body);

        Some(wire.freeze())
    }
}

impl Default for ResponseState {
    fn default() -> Self {
        Self::new()
    }
}

fn title_case(key: &str) -> String {
    key.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn escape_pre(message: &str) -> String {
    message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_applies_defaults() {
        let mut resp = ResponseState::new();
        resp.puts(b"hi");
        let wire = resp.finalize().unwrap();
        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert!(text.starts_with("Status: 200\n"));
        assert!(text.contains("Content-type: text/html;charset=utf-8\n"));
        assert!(text.ends_with("\n\nhi"));
    }

    #[test]
    fn location_implies_302() {
        let mut resp = ResponseState::new();
        resp.set_header("location", "/elsewhere", true);
        assert!(resp
            .out_headers
            .iter()
            .any(|(k, v)| k == "Status" && v == "302 Found"));
    }

    #[test]
    fn replace_false_does_not_overwrite() {
        let mut resp = ResponseState::new();
        resp.set_header("X-Count", "1", true);
        resp.set_header("X-Count", "2", false);
        assert_eq!(
            resp.out_headers.iter().find(|(k, _)| k == "X-Count").unwrap().1,
            "1"
        );
    }

    #[test]
    fn puts_and_header_after_flush_are_dropped() {
        let mut resp = ResponseState::new();
        let first = resp.finalize().unwrap();
        resp.puts(b"late");
        resp.set_header("X-Late", "yes", true);
        assert!(resp.finalize().is_none());
        assert!(!String::from_utf8(first.to_vec()).unwrap().contains("late"));
    }

    #[test]
    fn title_cases_hyphenated_keys() {
        assert_eq!(title_case("content-type"), "Content-Type");
        assert_eq!(title_case("x-custom-header"), "X-Custom-Header");
    }
}
