//! Error taxonomy for the server.
//!
//! Errors never cross a connection boundary: parse and handler errors are
//! turned into synthesized responses, transport errors end the connection,
//! and the connection manager only ever sees a [`CloseReason`].

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::http::response::StatusCode;

/// The listening socket could not be set up. Fatal at startup.
#[derive(Debug, Error)]
#[error("failed to bind {addr}: {source}")]
pub struct BindError {
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// Malformed or oversized request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    BadStartLine,
    #[error("malformed header line")]
    BadHeader,
    #[error("invalid body length")]
    BadLength,
    #[error("header section exceeds limit")]
    HeadersTooLarge,
    #[error("body exceeds limit")]
    BodyTooLarge,
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
}

impl ParseError {
    /// Status of the response synthesized for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::HeadersTooLarge => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ParseError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::UnsupportedVersion => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ParseError::BadStartLine
            | ParseError::BadHeader
            | ParseError::BadLength
            | ParseError::UnexpectedEof => StatusCode::BAD_REQUEST,
        }
    }
}

/// A handler failed to produce a response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed: {0:#}")]
    Failed(anyhow::Error),
    #[error("handler panicked")]
    Panicked,
    #[error("handler exceeded {0:?}")]
    TimedOut(Duration),
}

/// The byte stream itself failed. Always fatal to the connection.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(#[from] pub io::Error);

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the stream between requests.
    PeerClosed,
    /// The last exchange was not persistent.
    NotPersistent,
    /// No complete request arrived within the idle timeout.
    IdleTimeout,
    /// Input was rejected with an error response.
    Parse(ParseError),
    /// A handler overran its budget.
    HandlerTimeout,
    /// Reading or writing the transport failed.
    Transport(io::ErrorKind),
    /// Server shutdown closed an idle connection.
    Shutdown,
    /// Turned away because the connection limit was reached.
    Rejected,
    /// Aborted after the shutdown grace period ran out.
    ForceClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::NotPersistent => f.write_str("not persistent"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::Parse(e) => write!(f, "parse error: {e}"),
            CloseReason::HandlerTimeout => f.write_str("handler timeout"),
            CloseReason::Transport(kind) => write!(f, "transport error: {kind}"),
            CloseReason::Shutdown => f.write_str("shutdown"),
            CloseReason::Rejected => f.write_str("rejected"),
            CloseReason::ForceClosed => f.write_str("force closed"),
        }
    }
}
