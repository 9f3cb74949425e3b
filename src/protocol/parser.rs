//! Incremental HTTP/1.1 Request Parser
//!
//! This module turns the raw bytes accumulated by a connection into
//! structured [`Request`] values, one frame at a time.
//!
//! ## How the Parser Works
//!
//! The parser inspects a buffer prefix and returns one of three verdicts:
//! - `Ok(Some((request, frame_size)))` - One full request parsed;
//!   `frame_size` is exactly how many leading bytes it occupied
//! - `Ok(None)` - The buffer does not yet hold one full request
//! - `Err(ParseError)` - The leading bytes cannot form a valid request
//!
//! This design allows the caller to:
//! 1. Append incoming network data to a buffer
//! 2. Call `parse()` to attempt framing
//! 3. If successful, advance the buffer by `frame_size` bytes
//! 4. If incomplete, wait for more data
//! 5. If error, answer `400 Bad Request` and disconnect the client
//!
//! The parser never mutates the buffer; consuming the frame is the
//! caller's job. A message is complete once the header block terminator
//! (`\r\n\r\n`) has arrived together with the number of body bytes the
//! `Content-Length` header announces.

use crate::protocol::types::Request;
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that make the leading bytes unusable as an HTTP request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The request line is not `<method> <target> <version>`
    #[error("malformed request line: {0:?}")]
    BadRequestLine(String),

    /// A header line has no `name: value` shape
    #[error("malformed header line: {0:?}")]
    BadHeaderLine(String),

    /// `Content-Length` is present but not a base-10 integer
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// The announced body exceeds [`MAX_CONTENT_SIZE`]
    #[error("content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: usize, max: usize },

    /// The header block is not valid UTF-8
    #[error("invalid UTF-8 in header block: {0}")]
    InvalidUtf8(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum request content length the parser accepts (64 MiB)
pub const MAX_CONTENT_SIZE: usize = 64 * 1024 * 1024;

/// The stateless HTTP/1.1 request parser.
///
/// # Example
///
/// ```
/// use emberhttp::protocol::RequestParser;
///
/// let buf = b"GET /status HTTP/1.1\r\nhost: localhost\r\n\r\n";
/// let (request, frame_size) = RequestParser::parse(buf).unwrap().unwrap();
/// assert_eq!(request.method, "GET");
/// assert_eq!(frame_size, buf.len());
/// ```
#[derive(Debug, Default)]
pub struct RequestParser;

impl RequestParser {
    /// Attempts to frame one request from the front of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((request, frame_size)))` - one complete request
    /// - `Ok(None)` - incomplete, need more bytes
    /// - `Err(e)` - the stream is not valid HTTP
    pub fn parse(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
        // The request is incomplete until the header terminator arrives.
        let head_end = match find_header_end(buf) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let head = std::str::from_utf8(&buf[..head_end])
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let (method, target, version) = parse_request_line(request_line)?;

        let mut headers = BTreeMap::new();
        for line in lines {
            let colon = line
                .find(':')
                .ok_or_else(|| ParseError::BadHeaderLine(line.to_string()))?;
            let name = line[..colon].trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(ParseError::BadHeaderLine(line.to_string()));
            }
            let value = line[colon + 1..].trim().to_string();
            headers.insert(name, value);
        }

        let content_length = match headers.get(super::types::header::CONTENT_LENGTH) {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(value.clone()))?,
            None => 0,
        };

        if content_length > MAX_CONTENT_SIZE {
            return Err(ParseError::ContentTooLarge {
                size: content_length,
                max: MAX_CONTENT_SIZE,
            });
        }

        // Frame = header block + terminator + announced body.
        let body_start = head_end + 4;
        let frame_size = body_start + content_length;
        if buf.len() < frame_size {
            return Ok(None);
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target.to_string(), String::new()),
        };

        let request = Request {
            method: method.to_string(),
            path,
            query,
            version: version.to_string(),
            headers,
            body: Bytes::copy_from_slice(&buf[body_start..frame_size]),
        };

        Ok(Some((request, frame_size)))
    }
}

/// Splits a request line into method, target and version.
fn parse_request_line(line: &str) -> ParseResult<(&str, &str, &str)> {
    let mut parts = line.split(' ').filter(|part| !part.is_empty());

    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) => (method, target, version),
        _ => return Err(ParseError::BadRequestLine(line.to_string())),
    };

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::BadRequestLine(line.to_string()));
    }

    Ok((method, target, version))
}

/// Finds the start of the `\r\n\r\n` header terminator.
#[inline]
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Helper function to frame a single request from bytes.
///
/// This is a convenience function for simple use cases.
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(Request, usize)>> {
    RequestParser::parse(buf)
}
