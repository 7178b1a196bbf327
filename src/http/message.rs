//! `HTTPRequest`/`HTTPResponse` and the case-insensitive header multimap
//! (`spec.md` §3).
//!
//! Grounded on `teacher_src/header.rs`'s header-name interning idea, scaled
//! down: rather than a registry of typed header structs, headers here are
//! plain `(String, String)` pairs compared case-insensitively, matching
//! `original_source/co_async/http/http_server_utils.hpp`'s simpler
//! string-keyed map.

use crate::http::uri::URI;

/// `Http10` defaults `Connection` to close; `Http11` defaults to
/// keep-alive (`spec.md` §6, `SPEC_FULL.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }

    pub fn default_keep_alive(self) -> bool {
        matches!(self, HttpVersion::Http11)
    }
}

/// A case-insensitive, order-preserving, multi-valued header collection.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers { entries: Vec::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// First value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An incoming request (`spec.md` §3: "method (uppercase verb), URI (path +
/// params), headers").
#[derive(Debug, Clone)]
pub struct HTTPRequest {
    pub method: String,
    pub uri: URI,
    pub version: HttpVersion,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HTTPRequest {
    /// `true` unless the client sent `Connection: close`, or the request is
    /// HTTP/1.0 without an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version.default_keep_alive(),
        }
    }
}

/// An outgoing response (`spec.md` §3: "status (integer), headers, body (or
/// streamed)").
#[derive(Debug, Clone)]
pub struct HTTPResponse {
    pub status: u16,
    pub headers: Headers,
}

impl HTTPResponse {
    pub fn new(status: u16) -> HTTPResponse {
        HTTPResponse {
            status,
            headers: Headers::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> HTTPResponse {
        self.headers.insert(key, value);
        self
    }
}

/// The IANA reason phrase for a handful of statuses this server actually
/// emits; anything else falls back to a generic label.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_get_is_case_insensitive() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn http10_defaults_to_close_http11_to_keep_alive() {
        assert!(!HttpVersion::Http10.default_keep_alive());
        assert!(HttpVersion::Http11.default_keep_alive());
    }
}
