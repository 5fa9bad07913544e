//! Incremental HTTP/1.x request parser.
//!
//! Bytes are pushed in as they arrive from the transport and complete
//! requests are pulled out. Partial input stays buffered between calls, so
//! the same requests come out regardless of how the stream was split.

use bytes::{Buf, BytesMut};

use crate::error::ParseError;
use crate::http::chunked::Dechunker;
use crate::http::headers::Headers;
use crate::http::request::{Method, Request, Version, is_token};

/// Size limits enforced while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Request line plus header section, terminators included.
    pub max_header_bytes: usize,
    /// Declared or de-chunked body length.
    pub max_body_bytes: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 8192,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// How the body of the current request is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// `Content-Length` framing, with this many bytes still to read.
    Length(usize),
    Chunked(Dechunker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingStartLine,
    AwaitingHeaders,
    AwaitingBody(BodyMode),
    /// A request was just produced.
    Complete,
    /// Sticky; the parser produces nothing more.
    Error(ParseError),
}

/// Outcome of [`RequestParser::feed`].
#[derive(Debug)]
pub enum Feed {
    NeedMore,
    Requests(Vec<Request>),
}

struct Head {
    method: Method,
    target: String,
    version: Version,
    headers: Headers,
}

pub struct RequestParser {
    limits: ParserLimits,
    buf: BytesMut,
    /// How far `buf` was already searched for a line end.
    scanned: usize,
    state: ParserState,
    head: Option<Head>,
    /// Header section bytes of the current request, or trailer bytes once
    /// the body has started.
    head_bytes: usize,
    body: BytesMut,
    trailers: Headers,
}

impl RequestParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            limits,
            buf: BytesMut::with_capacity(4096),
            scanned: 0,
            state: ParserState::AwaitingStartLine,
            head: None,
            head_bytes: 0,
            body: BytesMut::new(),
            trailers: Headers::new(),
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Number of bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True between requests with nothing buffered.
    pub fn is_idle(&self) -> bool {
        matches!(
            self.state,
            ParserState::AwaitingStartLine | ParserState::Complete
        ) && self.buf.is_empty()
    }

    /// Appends received bytes without parsing them.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends `bytes` and parses every request they complete.
    ///
    /// When an error follows one or more complete requests, those requests
    /// are returned first and the error is reported by the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Feed, ParseError> {
        if let ParserState::Error(e) = self.state {
            return Err(e);
        }
        self.push(bytes);

        let mut requests = Vec::new();
        loop {
            match self.next_request() {
                Ok(Some(req)) => requests.push(req),
                Ok(None) => break,
                Err(e) if requests.is_empty() => return Err(e),
                Err(_) => break,
            }
        }

        if requests.is_empty() {
            Ok(Feed::NeedMore)
        } else {
            Ok(Feed::Requests(requests))
        }
    }

    /// Parses the next complete request out of the buffered bytes.
    ///
    /// `Ok(None)` means more input is needed.
    pub fn next_request(&mut self) -> Result<Option<Request>, ParseError> {
        match self.state {
            ParserState::Error(e) => return Err(e),
            ParserState::Complete => self.state = ParserState::AwaitingStartLine,
            _ => {}
        }

        loop {
            let progressed = match self.step() {
                Ok(progressed) => progressed,
                Err(e) => {
                    self.state = ParserState::Error(e);
                    return Err(e);
                }
            };

            if self.state == ParserState::Complete {
                return self.take_request().map(Some);
            }
            if !progressed {
                return Ok(None);
            }
        }
    }

    /// Signals end of input.
    ///
    /// Clean only between requests; anything partially received is an
    /// `UnexpectedEof`.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        if let ParserState::Error(e) = self.state {
            return Err(e);
        }
        if self.is_idle() {
            return Ok(());
        }
        self.state = ParserState::Error(ParseError::UnexpectedEof);
        Err(ParseError::UnexpectedEof)
    }

    fn step(&mut self) -> Result<bool, ParseError> {
        match self.state {
            ParserState::AwaitingStartLine => self.read_start_line(),
            ParserState::AwaitingHeaders => self.read_header_line(),
            ParserState::AwaitingBody(mode) => self.read_body(mode),
            ParserState::Complete | ParserState::Error(_) => Ok(false),
        }
    }

    /// Takes the next line, charging it to the header byte budget.
    fn take_head_line(&mut self) -> Result<Option<BytesMut>, ParseError> {
        let before = self.buf.len();
        match take_line(&mut self.buf, &mut self.scanned) {
            Some(line) => {
                self.head_bytes += before - self.buf.len();
                if self.head_bytes > self.limits.max_header_bytes {
                    return Err(ParseError::HeadersTooLarge);
                }
                Ok(Some(line))
            }
            None if self.head_bytes + self.buf.len() > self.limits.max_header_bytes => {
                Err(ParseError::HeadersTooLarge)
            }
            None => Ok(None),
        }
    }

    fn read_start_line(&mut self) -> Result<bool, ParseError> {
        let Some(line) = self.take_head_line()? else {
            return Ok(false);
        };
        // Empty lines ahead of a request line are tolerated.
        if line.is_empty() {
            self.head_bytes = 0;
            return Ok(true);
        }

        self.head = Some(parse_start_line(&line)?);
        self.state = ParserState::AwaitingHeaders;
        Ok(true)
    }

    fn read_header_line(&mut self) -> Result<bool, ParseError> {
        let Some(line) = self.take_head_line()? else {
            return Ok(false);
        };

        let Some(head) = self.head.as_mut() else {
            return Err(ParseError::BadStartLine);
        };

        if !line.is_empty() {
            if matches!(line[0], b' ' | b'\t') {
                // obs-fold
                return Err(ParseError::BadHeader);
            }
            let (name, value) = parse_field(&line)?;
            head.headers.append(name, value);
            return Ok(true);
        }

        let mode = body_mode(&head.headers, &self.limits)?;
        self.head_bytes = 0;
        self.state = match mode {
            None | Some(BodyMode::Length(0)) => ParserState::Complete,
            Some(mode) => ParserState::AwaitingBody(mode),
        };
        Ok(true)
    }

    fn read_body(&mut self, mode: BodyMode) -> Result<bool, ParseError> {
        match mode {
            BodyMode::Length(left) => {
                if self.buf.is_empty() {
                    return Ok(false);
                }
                let n = self.buf.len().min(left);
                self.body.extend_from_slice(&self.buf[..n]);
                self.buf.advance(n);

                self.state = if n == left {
                    ParserState::Complete
                } else {
                    ParserState::AwaitingBody(BodyMode::Length(left - n))
                };
                Ok(true)
            }
            BodyMode::Chunked(mut dechunker) => {
                let done = dechunker.decode(
                    &mut self.buf,
                    &mut self.body,
                    &mut self.trailers,
                    &mut self.head_bytes,
                    &self.limits,
                )?;
                self.state = if done {
                    ParserState::Complete
                } else {
                    ParserState::AwaitingBody(BodyMode::Chunked(dechunker))
                };
                Ok(done)
            }
        }
    }

    fn take_request(&mut self) -> Result<Request, ParseError> {
        let head = self.head.take().ok_or(ParseError::BadStartLine)?;
        self.head_bytes = 0;
        self.scanned = 0;

        Ok(Request {
            method: head.method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            body: self.body.split().freeze(),
            trailers: std::mem::take(&mut self.trailers),
        })
    }
}

/// Splits one line off the front of `buf`, without its terminator.
///
/// Lines end in LF with an optional preceding CR. `scanned` remembers how
/// much of `buf` was already searched so repeated calls on a growing buffer
/// stay linear.
pub(crate) fn take_line(buf: &mut BytesMut, scanned: &mut usize) -> Option<BytesMut> {
    let start = (*scanned).min(buf.len());
    match buf[start..].iter().position(|b| *b == b'\n') {
        Some(i) => {
            let mut line = buf.split_to(start + i + 1);
            *scanned = 0;
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            Some(line)
        }
        None => {
            *scanned = buf.len();
            None
        }
    }
}

fn parse_start_line(line: &[u8]) -> Result<Head, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::BadStartLine)?;

    let mut parts = line.split([' ', '\t']).filter(|p| !p.is_empty());
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::BadStartLine);
    };

    let method = Method::from_token(method).ok_or(ParseError::BadStartLine)?;

    if target.is_empty() || target.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(ParseError::BadStartLine);
    }

    Ok(Head {
        method,
        target: target.to_string(),
        version: parse_version(version)?,
        headers: Headers::new(),
    })
}

fn parse_version(s: &str) -> Result<Version, ParseError> {
    let digits = s
        .strip_prefix("HTTP/")
        .map(str::as_bytes)
        .ok_or(ParseError::BadStartLine)?;

    match digits {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            match (*major, *minor) {
                (b'1', b'0') => Ok(Version::Http10),
                // Later 1.x minors are served as 1.1.
                (b'1', _) => Ok(Version::Http11),
                _ => Err(ParseError::UnsupportedVersion),
            }
        }
        _ => Err(ParseError::BadStartLine),
    }
}

/// Parses a `name: value` field line.
pub(crate) fn parse_field(line: &[u8]) -> Result<(String, String), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::BadHeader)?;
    let (name, value) = line.split_once(':').ok_or(ParseError::BadHeader)?;

    if !is_token(name) {
        return Err(ParseError::BadHeader);
    }

    let value = value.trim_matches(|c| c == ' ' || c == '\t');
    if value.chars().any(|c| c.is_ascii_control() && c != '\t') {
        return Err(ParseError::BadHeader);
    }

    Ok((name.to_string(), value.to_string()))
}

/// Decides body framing from the header section.
///
/// `Transfer-Encoding: chunked` wins over `Content-Length`, which is then
/// ignored.
fn body_mode(headers: &Headers, limits: &ParserLimits) -> Result<Option<BodyMode>, ParseError> {
    if headers.has_token("Transfer-Encoding", "chunked") {
        return Ok(Some(BodyMode::Chunked(Dechunker::new())));
    }

    let mut length: Option<usize> = None;
    for value in headers.get_all("Content-Length").flat_map(|v| v.split(',')) {
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::BadLength);
        }
        // All digits, so the only failure left is overflow.
        let n = value.parse::<usize>().map_err(|_| ParseError::BodyTooLarge)?;
        match length {
            Some(prev) if prev != n => return Err(ParseError::BadLength),
            _ => length = Some(n),
        }
    }

    match length {
        Some(n) if n > limits.max_body_bytes => Err(ParseError::BodyTooLarge),
        Some(n) => Ok(Some(BodyMode::Length(n))),
        None => Ok(None),
    }
}
