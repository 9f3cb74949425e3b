//! Request Handler Module
//!
//! This module defines the seam between the connection core and the
//! application: a [`RequestHandler`] receives each framed request together
//! with its connection [`Environment`] and returns the response to send.
//!
//! ## Architecture
//!
//! ```text
//! Client bytes
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ RequestParser   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ RequestHandler  │  (this module - application code)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ serialize()     │  (protocol module)
//! └─────────────────┘
//! ```
//!
//! ## Error Policy
//!
//! `handle` is infallible by signature: an implementation that can fail must
//! map its own errors to a 4xx/5xx [`Response`]. A handler error never tears
//! down the connection; only protocol violations do that.

use crate::protocol::{Environment, Request, Response};

/// Turns parsed requests into responses.
///
/// Implementations are shared across all connections, so they must be
/// `Send + Sync`; the connection layer holds them behind an `Arc`.
pub trait RequestHandler: Send + Sync {
    /// Produces the response for one request.
    ///
    /// Must not block indefinitely: the connection processes its requests
    /// sequentially and a stalled handler stalls every pipelined request
    /// behind it.
    fn handle(&self, request: &Request, env: &Environment) -> Response;
}

/// Plain functions and closures work as handlers directly.
///
/// # Example
///
/// ```
/// use emberhttp::handler::RequestHandler;
/// use emberhttp::protocol::{Environment, Request, Response};
///
/// let handler = |request: &Request, _env: &Environment| {
///     Response::text(format!("you asked for {}", request.path))
/// };
/// let _: &dyn RequestHandler = &handler;
/// ```
impl<F> RequestHandler for F
where
    F: Fn(&Request, &Environment) -> Response + Send + Sync,
{
    fn handle(&self, request: &Request, env: &Environment) -> Response {
        self(request, env)
    }
}

/// A minimal built-in handler that echoes the request line back.
///
/// Used by the `emberhttp` binary as its default application and by tests
/// that need a predictable response body.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle(&self, request: &Request, env: &Environment) -> Response {
        Response::text(format!(
            "{} {} from {}\n",
            request.method, request.path, env.peer_addr
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::BTreeMap;

    fn test_request(method: &str, path: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            query: String::new(),
            version: "HTTP/1.1".to_string(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    fn test_env() -> Environment {
        Environment::new(
            "127.0.0.1:8080".parse().unwrap(),
            "127.0.0.1:50000".parse().unwrap(),
        )
    }

    #[test]
    fn test_echo_handler_reflects_request_line() {
        let response = EchoHandler.handle(&test_request("GET", "/status"), &test_env());
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            Bytes::from("GET /status from 127.0.0.1:50000\n")
        );
    }

    #[test]
    fn test_closure_as_handler() {
        let handler = |_: &Request, _: &Environment| Response::new(204, "No Content");
        let response = handler.handle(&test_request("GET", "/"), &test_env());
        assert_eq!(response.status, 204);
    }
}
