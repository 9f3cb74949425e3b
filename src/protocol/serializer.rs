//! HTTP/1.1 Response Serializer
//!
//! Turns a [`Response`] value into the exact byte sequence that goes on the
//! wire: status line, header block, blank line, body.
//!
//! `Content-Length` is always computed from the body so the value on the
//! wire can never disagree with what is actually sent. Headers are emitted
//! in sorted order (the header map is a `BTreeMap`), which keeps the output
//! deterministic and easy to assert on in tests.

use crate::protocol::types::{header, Response, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

/// Serializes a response into wire bytes.
///
/// # Example
///
/// ```
/// use emberhttp::protocol::{serialize, Response};
///
/// let resp = Response::new(204, "No Content");
/// let bytes = serialize(&resp);
/// assert!(bytes.starts_with(b"HTTP/1.1 204 No Content\r\n"));
/// ```
pub fn serialize(response: &Response) -> Bytes {
    let mut out = BytesMut::with_capacity(128 + response.body.len());

    out.put_slice(format!("HTTP/1.1 {} {}", response.status, response.reason).as_bytes());
    out.put_slice(CRLF);

    for (name, value) in &response.headers {
        // Content-Length is derived below, never taken from the map.
        if name == header::CONTENT_LENGTH {
            continue;
        }
        out.put_slice(name.as_bytes());
        out.put_slice(b": ");
        out.put_slice(value.as_bytes());
        out.put_slice(CRLF);
    }

    out.put_slice(format!("content-length: {}", response.body.len()).as_bytes());
    out.put_slice(CRLF);
    out.put_slice(CRLF);
    out.put_slice(&response.body);

    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_status_line() {
        let resp = Response::new(404, "Not Found");
        let bytes = serialize(&resp);
        assert!(bytes.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn test_serialize_headers_and_body() {
        let mut resp = Response::text("hello");
        resp.set_header(header::CONNECTION, "keep-alive");

        let text = String::from_utf8(serialize(&resp).to_vec()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\n\
             connection: keep-alive\r\n\
             content-type: text/plain; charset=utf-8\r\n\
             content-length: 5\r\n\
             \r\n\
             hello"
        );
    }

    #[test]
    fn test_serialize_empty_body_has_zero_length() {
        let resp = Response::new(400, "Bad Request");
        let text = String::from_utf8(serialize(&resp).to_vec()).unwrap();
        assert!(text.contains("content-length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_serialize_ignores_stale_content_length() {
        let mut resp = Response::text("four");
        resp.set_header(header::CONTENT_LENGTH, "9999");

        let text = String::from_utf8(serialize(&resp).to_vec()).unwrap();
        assert!(text.contains("content-length: 4\r\n"));
        assert!(!text.contains("9999"));
    }

    #[test]
    fn test_serialize_headers_sorted() {
        let mut resp = Response::new(200, "OK");
        resp.set_header("x-b", "2");
        resp.set_header("x-a", "1");

        let text = String::from_utf8(serialize(&resp).to_vec()).unwrap();
        let a = text.find("x-a: 1").unwrap();
        let b = text.find("x-b: 2").unwrap();
        assert!(a < b);
    }
}
