//! HTTP/1.1 Message Types
//!
//! This module defines the request and response types exchanged between the
//! connection layer, the wire-grammar parser, and the application handler.
//!
//! ## Message Format
//!
//! An HTTP/1.1 message is a request line (or status line), a block of
//! `name: value` header lines, a blank line, and an optional body whose
//! length is announced by the `Content-Length` header:
//!
//! ```text
//! GET /path?query HTTP/1.1\r\n
//! host: example.com\r\n
//! accept-encoding: gzip\r\n
//! \r\n
//! ```
//!
//! Header names are case-insensitive on the wire; the parser lowercases them
//! so lookups through [`Request::header`] use lowercase names throughout.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// The CRLF line terminator used by the HTTP wire format
pub const CRLF: &[u8] = b"\r\n";

/// Well-known header names (lowercase, the form the parser stores them in)
pub mod header {
    pub const CONNECTION: &str = "connection";
    pub const CONTENT_ENCODING: &str = "content-encoding";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const ACCEPT_ENCODING: &str = "accept-encoding";
}

/// A parsed HTTP request.
///
/// Produced by the protocol parser, consumed by a
/// [`RequestHandler`](crate::handler::RequestHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method (`GET`, `POST`, ...), as sent by the client
    pub method: String,

    /// Path component of the request target
    pub path: String,

    /// Raw query string (text after `?`), empty when absent
    pub query: String,

    /// Protocol version from the request line, e.g. `HTTP/1.1`
    pub version: String,

    /// Header map with lowercased names
    pub headers: BTreeMap<String, String>,

    /// Request body (empty unless a `Content-Length` announced one)
    pub body: Bytes,
}

impl Request {
    /// Looks up a header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// An HTTP response under construction.
///
/// The connection layer fills in the `Connection` and `Content-Encoding`
/// headers before serialization; `Content-Length` is derived from the body
/// by the serializer and never needs to be set by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Numeric status code, e.g. `200`
    pub status: u16,

    /// Reason phrase for the status line, e.g. `OK`
    pub reason: String,

    /// Header map (lowercase names, serialized in sorted order)
    pub headers: BTreeMap<String, String>,

    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Creates an empty response with the given status line.
    ///
    /// # Example
    /// ```
    /// use emberhttp::protocol::Response;
    /// let resp = Response::new(404, "Not Found");
    /// ```
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `200 OK` response with a `text/plain` body.
    pub fn text(body: impl Into<Bytes>) -> Self {
        let mut resp = Self::new(200, "OK");
        resp.set_header(header::CONTENT_TYPE, "text/plain; charset=utf-8");
        resp.body = body.into();
        resp
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Looks up a header by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.reason)
    }
}

/// Connection environment handed to the request handler: who is talking to
/// whom for this exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Address and port this server accepted the connection on
    pub local_addr: SocketAddr,

    /// Address and port of the remote peer
    pub peer_addr: SocketAddr,
}

impl Environment {
    pub fn new(local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            peer_addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_lookup() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "example.com".to_string());

        let request = Request {
            method: "GET".to_string(),
            path: "/".to_string(),
            query: String::new(),
            version: "HTTP/1.1".to_string(),
            headers,
            body: Bytes::new(),
        };

        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.header("accept-encoding"), None);
    }

    #[test]
    fn test_response_set_header_replaces() {
        let mut resp = Response::new(200, "OK");
        resp.set_header(header::CONNECTION, "keep-alive");
        resp.set_header(header::CONNECTION, "close");
        assert_eq!(resp.header(header::CONNECTION), Some("close"));
    }

    #[test]
    fn test_response_text_sets_content_type() {
        let resp = Response::text("hello");
        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.header(header::CONTENT_TYPE),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(resp.body, Bytes::from("hello"));
    }

    #[test]
    fn test_response_display() {
        let resp = Response::new(413, "Payload Too Large");
        assert_eq!(resp.to_string(), "413 Payload Too Large");
    }
}
