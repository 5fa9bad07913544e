//! Decoder for chunked transfer-encoding.

use bytes::{Buf, BytesMut};

use crate::error::ParseError;
use crate::http::headers::Headers;
use crate::http::parser::{ParserLimits, parse_field, take_line};

/// Longest chunk-size line accepted, extensions included.
const MAX_SIZE_LINE: usize = 1024;

/// Where the decoder is within a chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dechunker {
    /// Expecting a `<hex-size>[;ext]` line.
    Size,
    /// Inside chunk data, with this many bytes left.
    Data(usize),
    /// Expecting the CRLF that closes a chunk's data.
    DataEnd,
    /// After the zero-size chunk, reading trailer lines until an empty one.
    Trailer,
    /// Terminator seen.
    Ended,
}

impl Default for Dechunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Dechunker {
    pub fn new() -> Self {
        Dechunker::Size
    }

    /// Consumes as much of `src` as belongs to the body.
    ///
    /// Payload bytes go to `out` and trailer fields to `trailers`;
    /// `trailer_bytes` tracks the trailer section against the header limit.
    /// Returns `Ok(true)` once the terminating chunk and trailers are read.
    pub fn decode(
        &mut self,
        src: &mut BytesMut,
        out: &mut BytesMut,
        trailers: &mut Headers,
        trailer_bytes: &mut usize,
        limits: &ParserLimits,
    ) -> Result<bool, ParseError> {
        loop {
            let more = match *self {
                Dechunker::Size => self.read_size(src, out, limits)?,
                Dechunker::Data(_) => self.read_data(src, out),
                Dechunker::DataEnd => self.expect_crlf(src)?,
                Dechunker::Trailer => self.read_trailer(src, trailers, trailer_bytes, limits)?,
                Dechunker::Ended => return Ok(true),
            };

            if !more {
                return Ok(false);
            }
        }
    }

    fn read_size(
        &mut self,
        src: &mut BytesMut,
        out: &BytesMut,
        limits: &ParserLimits,
    ) -> Result<bool, ParseError> {
        let line = match take_line(src, &mut 0) {
            Some(line) => line,
            None if src.len() > MAX_SIZE_LINE => return Err(ParseError::BadLength),
            None => return Ok(false),
        };
        if line.len() > MAX_SIZE_LINE {
            return Err(ParseError::BadLength);
        }

        let size_part = match line.iter().position(|b| *b == b';') {
            Some(i) => &line[..i],
            None => &line[..],
        };
        let size = std::str::from_utf8(size_part)
            .map_err(|_| ParseError::BadLength)?
            .trim_matches(|c| c == ' ' || c == '\t');

        if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::BadLength);
        }
        let digits = size.trim_start_matches('0');
        let size = if digits.is_empty() {
            0
        } else {
            usize::from_str_radix(digits, 16).map_err(|_| ParseError::BodyTooLarge)?
        };

        if out.len().saturating_add(size) > limits.max_body_bytes {
            return Err(ParseError::BodyTooLarge);
        }

        *self = if size == 0 {
            Dechunker::Trailer
        } else {
            Dechunker::Data(size)
        };
        Ok(true)
    }

    fn read_data(&mut self, src: &mut BytesMut, out: &mut BytesMut) -> bool {
        let Dechunker::Data(left) = self else {
            return false;
        };
        if src.is_empty() {
            return false;
        }

        let n = src.len().min(*left);
        out.extend_from_slice(&src[..n]);
        src.advance(n);
        *left -= n;

        if *left == 0 {
            *self = Dechunker::DataEnd;
        }
        true
    }

    fn expect_crlf(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        match src.first() {
            None => Ok(false),
            Some(b'\n') => {
                src.advance(1);
                *self = Dechunker::Size;
                Ok(true)
            }
            Some(b'\r') => match src.get(1) {
                None => Ok(false),
                Some(b'\n') => {
                    src.advance(2);
                    *self = Dechunker::Size;
                    Ok(true)
                }
                Some(_) => Err(ParseError::BadLength),
            },
            Some(_) => Err(ParseError::BadLength),
        }
    }

    fn read_trailer(
        &mut self,
        src: &mut BytesMut,
        trailers: &mut Headers,
        trailer_bytes: &mut usize,
        limits: &ParserLimits,
    ) -> Result<bool, ParseError> {
        let before = src.len();
        let line = match take_line(src, &mut 0) {
            Some(line) => line,
            None if *trailer_bytes + src.len() > limits.max_header_bytes => {
                return Err(ParseError::HeadersTooLarge);
            }
            None => return Ok(false),
        };

        *trailer_bytes += before - src.len();
        if *trailer_bytes > limits.max_header_bytes {
            return Err(ParseError::HeadersTooLarge);
        }

        if line.is_empty() {
            *self = Dechunker::Ended;
        } else {
            let (name, value) = parse_field(&line)?;
            trailers.append(name, value);
        }
        Ok(true)
    }
}
