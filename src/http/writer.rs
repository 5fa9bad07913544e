use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::http::request::{Method, Request, Version};
use crate::http::response::{Body, Response};

/// Every response goes out with this status-line version. The request
/// version only decides framing and connection semantics.
const HTTP_VERSION: &str = "HTTP/1.1";

/// What the writer needs to know about the exchange a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteContext {
    pub version: Version,
    /// The request was `HEAD`; no body bytes may follow the headers.
    pub head_request: bool,
    /// Whether the connection stays open after this response.
    pub keep_alive: bool,
}

impl WriteContext {
    pub fn for_request(request: &Request, keep_alive: bool) -> Self {
        Self {
            version: request.version,
            head_request: request.method == Method::HEAD,
            keep_alive,
        }
    }

    /// Context for an error response sent before any request was understood.
    pub fn closing() -> Self {
        Self {
            version: Version::Http11,
            head_request: false,
            keep_alive: false,
        }
    }
}

/// A serialized response.
#[derive(Debug, Clone)]
pub struct Serialized {
    pub bytes: Bytes,
    /// The response carried a body that could not be sent (HEAD request or
    /// a status that forbids one) and was dropped.
    pub body_dropped: bool,
}

enum Framing {
    /// No body on the wire.
    None,
    /// Bytes written as-is; `Content-Length` delimits them.
    Raw,
    Chunked,
}

/// Serializes `resp` into wire bytes.
///
/// `Content-Length` or `Transfer-Encoding: chunked` is added from the body
/// unless the response already sets framing; caller values are kept.
/// Responses to HEAD, and 1xx/204/304 responses, never carry a body.
///
/// # Example
///
/// ```
/// # use webserv::http::response::{Response, StatusCode};
/// # use webserv::http::request::Version;
/// # use webserv::http::writer::{serialize, WriteContext};
/// let resp = Response::new(StatusCode::OK)
///     .header("Content-Type", "text/plain")
///     .body("hi")
///     .build();
/// let ctx = WriteContext { version: Version::Http11, head_request: false, keep_alive: true };
/// let out = serialize(&resp, &ctx);
/// assert_eq!(
///     &out.bytes[..],
///     b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi"
/// );
/// ```
pub fn serialize(resp: &Response, ctx: &WriteContext) -> Serialized {
    let mut buf = BytesMut::with_capacity(256 + resp.body.len()).writer();

    let forbids_body = resp.status.forbids_body();
    let send_body = !forbids_body && !ctx.head_request;
    let body_dropped = !send_body && !resp.body.is_empty();

    // Status line
    let _ = write!(
        buf,
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.reason_phrase()
    );

    // Headers
    for (k, v) in resp.headers.iter() {
        if forbids_body && is_framing_header(k) {
            continue;
        }
        let _ = write!(buf, "{}: {}\r\n", k, v);
    }

    let framing = if !send_body {
        Framing::None
    } else if resp.headers.has_token("Transfer-Encoding", "chunked") {
        Framing::Chunked
    } else if resp.headers.contains("Content-Length") || resp.headers.contains("Transfer-Encoding") {
        Framing::Raw
    } else {
        match &resp.body {
            Body::Chunked(_) if ctx.version == Version::Http11 => {
                let _ = write!(buf, "Transfer-Encoding: chunked\r\n");
                Framing::Chunked
            }
            body => {
                let _ = write!(buf, "Content-Length: {}\r\n", body.len());
                Framing::Raw
            }
        }
    };

    if !resp.headers.contains("Connection") {
        match (ctx.version, ctx.keep_alive) {
            (Version::Http11, false) => {
                let _ = write!(buf, "Connection: close\r\n");
            }
            (Version::Http10, true) => {
                let _ = write!(buf, "Connection: keep-alive\r\n");
            }
            _ => {}
        }
    }

    // Header/body separator
    let mut buf = buf.into_inner();
    buf.put_slice(b"\r\n");

    // Body
    match framing {
        Framing::None => {}
        Framing::Raw => {
            for chunk in body_chunks(&resp.body) {
                buf.put_slice(chunk);
            }
        }
        Framing::Chunked => {
            let mut w = buf.writer();
            for chunk in body_chunks(&resp.body).filter(|c| !c.is_empty()) {
                let _ = write!(w, "{:X}\r\n", chunk.len());
                let _ = w.write_all(chunk);
                let _ = w.write_all(b"\r\n");
            }
            let _ = w.write_all(b"0\r\n\r\n");
            buf = w.into_inner();
        }
    }

    Serialized {
        bytes: buf.freeze(),
        body_dropped,
    }
}

fn is_framing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("Content-Length") || name.eq_ignore_ascii_case("Transfer-Encoding")
}

fn body_chunks(body: &Body) -> Box<dyn Iterator<Item = &[u8]> + '_> {
    match body {
        Body::Empty => Box::new(std::iter::empty()),
        Body::Full(b) => Box::new(std::iter::once(&b[..])),
        Body::Chunked(chunks) => Box::new(chunks.iter().map(|c| &c[..])),
    }
}

/// Serialized response bytes plus how many of them reached the transport.
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(serialized: Serialized) -> Self {
        Self {
            buffer: serialized.bytes,
            written: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.written
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(TransportError(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "connection closed while writing",
                )));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
