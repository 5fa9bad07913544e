//! HTTP/1.x protocol implementation.
//!
//! # Architecture
//!
//! - **`connection`**: per-client state machine driving parse, dispatch and write
//! - **`parser`**: incremental request parser, resumable across partial reads
//! - **`chunked`**: chunked transfer-encoding decoder used by the parser
//! - **`headers`**: ordered, duplicate-preserving header list
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: serializes responses and writes them to the transport
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │  ReadingRequest  │ ← Wait for a complete request
//!        └──────┬───────────┘
//!               │ Request parsed
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Run the handler
//!        └──────┬───────────┘
//!               │ Response ready (or error response for bad input)
//!               ▼
//!        ┌──────────────────┐
//!        │ WritingResponse  │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → ReadingRequest (same connection)
//!               └─ Close → Closing → Closed
//! ```

pub mod chunked;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
