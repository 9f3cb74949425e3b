//! HTTP/1.1 Wire Grammar
//!
//! This module implements the subset of the HTTP/1.1 wire format the server
//! core needs: framing requests out of a byte stream and serializing
//! responses back onto it.
//!
//! ## Overview
//!
//! TCP delivers a continuous byte stream with no message boundaries, so the
//! parser's central job is framing: deciding where one request ends and the
//! next begins. Requests are framed by the `\r\n\r\n` header terminator plus
//! the `Content-Length` header; chunked transfer encoding is not supported.
//!
//! ## Modules
//!
//! - `types`: `Request`, `Response` and `Environment` values
//! - `parser`: incremental request framing over a buffer prefix
//! - `serializer`: response-to-bytes conversion
//!
//! ## Example
//!
//! ```
//! use emberhttp::protocol::{parse_request, serialize, Response};
//!
//! // Framing incoming data
//! let data = b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n";
//! let (request, frame_size) = parse_request(data).unwrap().unwrap();
//! assert_eq!(frame_size, data.len());
//!
//! // Producing a response
//! let bytes = serialize(&Response::text("hi"));
//! ```

pub mod parser;
pub mod serializer;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_request, ParseError, ParseResult, RequestParser, MAX_CONTENT_SIZE};
pub use serializer::serialize;
pub use types::{header, Environment, Request, Response};
