//! webserv - concurrent HTTP/1.1 server core
//!
//! Accepts TCP connections, parses requests incrementally, hands them to an
//! application [`Handler`](server::Handler) and writes the responses back,
//! with keep-alive, pipelining and graceful shutdown.

pub mod config;
pub mod error;
pub mod http;
pub mod server;

pub use config::Config;
pub use error::{BindError, CloseReason, HandlerError, ParseError, TransportError};
pub use http::request::{Method, Request, Version};
pub use http::response::{Body, Response, StatusCode};
pub use server::{Handler, Server};
