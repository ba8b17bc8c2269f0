//! Incremental HTTP/1.x request parser.
//!
//! The parser owns no socket and no buffer: the connection appends whatever it
//! reads to a `BytesMut` and pulls [`ParseEvent`]s out of it until the parser
//! asks for more data. Bytes are consumed from the front of the buffer as they
//! are recognised, so anything left over after `MessageComplete` belongs to the
//! next pipelined request.

use crate::http::request::{Method, RequestHead};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::HashMap;
use thiserror::Error;

/// Largest request line plus header block we are willing to buffer.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid request line or header block")]
    InvalidRequest,
    #[error("unsupported method")]
    InvalidMethod,
    #[error("invalid header")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("invalid chunk framing")]
    InvalidChunk,
    #[error("request head exceeds {MAX_HEAD_SIZE} bytes")]
    HeadTooLarge,
}

#[derive(Debug)]
pub enum ParseEvent {
    HeadersComplete(RequestHead),
    Body(Bytes),
    MessageComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for the first byte of a request.
    Start,
    Headers,
    Body { remaining: usize },
    ChunkSize,
    ChunkData { remaining: usize },
    /// CRLF that terminates a chunk's data.
    ChunkDataEnd,
    Trailers,
    Complete,
}

#[derive(Debug)]
pub struct RequestParser {
    state: ParserState,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Start,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Prepares for the next request on the same connection.
    pub fn reset(&mut self) {
        self.state = ParserState::Start;
    }

    /// Pulls the next event out of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, or once the current
    /// message is complete and the parser has not been reset.
    pub fn next_event(&mut self, buf: &mut BytesMut) -> Result<Option<ParseEvent>, ParseError> {
        loop {
            match self.state {
                ParserState::Start => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    self.state = ParserState::Headers;
                }

                ParserState::Headers => {
                    let Some((head, consumed)) = parse_head(&buf[..])? else {
                        if buf.len() > MAX_HEAD_SIZE {
                            return Err(ParseError::HeadTooLarge);
                        }
                        return Ok(None);
                    };
                    buf.advance(consumed);

                    self.state = if head.is_chunked() {
                        ParserState::ChunkSize
                    } else {
                        let length = head
                            .content_length()
                            .map_err(|_| ParseError::InvalidContentLength)?
                            .unwrap_or(0);
                        ParserState::Body { remaining: length }
                    };
                    return Ok(Some(ParseEvent::HeadersComplete(head)));
                }

                ParserState::Body { remaining } => {
                    if remaining == 0 {
                        self.state = ParserState::Complete;
                        return Ok(Some(ParseEvent::MessageComplete));
                    }
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(buf.len());
                    self.state = ParserState::Body {
                        remaining: remaining - take,
                    };
                    return Ok(Some(ParseEvent::Body(buf.split_to(take).freeze())));
                }

                ParserState::ChunkSize => match httparse::parse_chunk_size(&buf[..]) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        buf.advance(consumed);
                        self.state = if size == 0 {
                            ParserState::Trailers
                        } else {
                            let remaining =
                                usize::try_from(size).map_err(|_| ParseError::InvalidChunk)?;
                            ParserState::ChunkData { remaining }
                        };
                    }
                    Ok(httparse::Status::Partial) => {
                        if buf.len() > MAX_HEAD_SIZE {
                            return Err(ParseError::InvalidChunk);
                        }
                        return Ok(None);
                    }
                    Err(_) => return Err(ParseError::InvalidChunk),
                },

                ParserState::ChunkData { remaining } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(buf.len());
                    self.state = if take == remaining {
                        ParserState::ChunkDataEnd
                    } else {
                        ParserState::ChunkData {
                            remaining: remaining - take,
                        }
                    };
                    return Ok(Some(ParseEvent::Body(buf.split_to(take).freeze())));
                }

                ParserState::ChunkDataEnd => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ParseError::InvalidChunk);
                    }
                    buf.advance(2);
                    self.state = ParserState::ChunkSize;
                }

                ParserState::Trailers => {
                    // Trailer fields are skipped; an empty line ends the message.
                    let Some(line_end) = buf.windows(2).position(|w| w == b"\r\n") else {
                        if buf.len() > MAX_HEAD_SIZE {
                            return Err(ParseError::HeadTooLarge);
                        }
                        return Ok(None);
                    };
                    buf.advance(line_end + 2);
                    if line_end == 0 {
                        self.state = ParserState::Complete;
                        return Ok(Some(ParseEvent::MessageComplete));
                    }
                }

                ParserState::Complete => return Ok(None),
            }
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, ParseError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut storage);

    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::HeaderName | httparse::Error::HeaderValue) => {
            return Err(ParseError::InvalidHeader);
        }
        Err(httparse::Error::TooManyHeaders) => return Err(ParseError::HeadTooLarge),
        Err(_) => return Err(ParseError::InvalidRequest),
    };

    let method = req
        .method
        .and_then(Method::from_str)
        .ok_or(ParseError::InvalidMethod)?;
    let target = req.path.ok_or(ParseError::InvalidRequest)?.to_string();
    let version = match req.version {
        Some(0) => "HTTP/1.0",
        Some(1) => "HTTP/1.1",
        _ => return Err(ParseError::InvalidRequest),
    };

    let mut headers = HashMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let value = std::str::from_utf8(header.value).map_err(|_| ParseError::InvalidHeader)?;
        headers.insert(header.name.to_string(), value.trim().to_string());
    }

    Ok(Some((
        RequestHead {
            method,
            target,
            version: version.to_string(),
            headers,
        },
        consumed,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
        let mut parser = RequestParser::new();

        let Some(ParseEvent::HeadersComplete(head)) = parser.next_event(&mut buf).unwrap() else {
            panic!("expected headers");
        };
        assert_eq!(head.path(), "/");
        assert_eq!(head.header("host"), Some("example.com"));
        assert!(matches!(
            parser.next_event(&mut buf).unwrap(),
            Some(ParseEvent::MessageComplete)
        ));
        assert!(buf.is_empty());
        assert_eq!(parser.state(), ParserState::Complete);
    }

    #[test]
    fn complete_parser_waits_for_reset() {
        let mut buf = BytesMut::from(&b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n"[..]);
        let mut parser = RequestParser::new();

        parser.next_event(&mut buf).unwrap();
        parser.next_event(&mut buf).unwrap();
        assert!(parser.next_event(&mut buf).unwrap().is_none());

        parser.reset();
        let Some(ParseEvent::HeadersComplete(head)) = parser.next_event(&mut buf).unwrap() else {
            panic!("expected second request");
        };
        assert_eq!(head.path(), "/b");
    }
}
