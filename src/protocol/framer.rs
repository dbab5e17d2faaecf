//! Incremental message framing.
//!
//! [`Framer`] reconstructs discrete messages from an arbitrarily chunked
//! byte stream. State persists between [`feed`](Framer::feed) calls: a
//! header may arrive one byte at a time, a body may span many deliveries,
//! and a single delivery may complete several messages.

use std::collections::HashSet;
use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use super::header::{find_terminator, HeaderBlock};
use super::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, DEFLATE, HEADER_TERMINATOR, IDENTITY, UID};

/// Wire-format violations. All of these are fatal to the session.
#[derive(Error, Debug)]
pub enum FramingError {
    /// The accumulator exceeded the header limit with no terminator in sight.
    #[error("maximum header length exceeded: read {read}/{limit}")]
    HeaderTooLong {
        /// Bytes accumulated so far.
        read: usize,
        /// Configured maximum header length.
        limit: usize,
    },

    /// Header text could not be parsed at all.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Every message must declare its body length.
    #[error("missing content-length header")]
    MissingContentLength,

    /// `content-length` was present but not a decimal integer.
    #[error("unparsable content-length: {0:?}")]
    InvalidContentLength(String),

    /// Declared content length exceeds the configured maximum.
    #[error("specified content length too large: {declared}/{limit}")]
    OversizedContent {
        /// Length the peer declared.
        declared: usize,
        /// Configured maximum message size.
        limit: usize,
    },

    /// `content-encoding` named a transform this engine does not speak.
    #[error("content encoding {0:?} not supported")]
    UnsupportedEncoding(String),
}

/// Body transfer encoding negotiated per message via `content-encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    /// Body bytes are the message text itself.
    #[default]
    Identity,
    /// Body bytes are a deflate stream; inflate before decoding.
    Deflate,
}

impl ContentEncoding {
    fn parse(value: Option<&str>) -> Result<Self, FramingError> {
        match value {
            None => Ok(ContentEncoding::Identity),
            Some(v) if v.eq_ignore_ascii_case(IDENTITY) => Ok(ContentEncoding::Identity),
            Some(v) if v.eq_ignore_ascii_case(DEFLATE) => Ok(ContentEncoding::Deflate),
            Some(other) => Err(FramingError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// One complete message extracted from the stream.
#[derive(Debug)]
pub struct Frame {
    /// Correlation token from the `uid` header, `0` when absent.
    pub uid: u64,
    /// Transfer encoding of `body`.
    pub encoding: ContentEncoding,
    /// Start line of the header block, empty when there was none.
    pub start_line: String,
    /// Exactly `content-length` raw body bytes.
    pub body: Bytes,
}

enum FramerState {
    AwaitingHeader,
    AwaitingBody {
        remaining: usize,
        uid: u64,
        encoding: ContentEncoding,
        start_line: String,
    },
}

/// Incremental framing state machine.
///
/// `AwaitingHeader -> AwaitingBody -> AwaitingHeader`, one cycle per
/// message. The accumulator is append-only between messages; consumed
/// header and body text is dropped as soon as it is used.
pub struct Framer {
    buf: BytesMut,
    /// Terminator scan resumes here, so already-searched text is skipped.
    scan_from: usize,
    body: BytesMut,
    state: FramerState,
    /// Encodings the peer has advertised via `accept-encoding`. Persists
    /// across messages for the life of the session.
    accepted: HashSet<String>,
    max_header_len: usize,
    max_message_size: usize,
}

impl Framer {
    /// Create a framer enforcing the given limits.
    pub fn new(max_header_len: usize, max_message_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_header_len),
            scan_from: 0,
            body: BytesMut::new(),
            state: FramerState::AwaitingHeader,
            accepted: HashSet::new(),
            max_header_len,
            max_message_size,
        }
    }

    /// Append newly delivered bytes and extract every complete message.
    ///
    /// Messages are pushed onto `frames` in wire order. Returns an error on
    /// the first wire-format violation; the framer must not be fed again
    /// after that.
    pub fn feed(&mut self, chunk: &[u8], frames: &mut Vec<Frame>) -> Result<(), FramingError> {
        self.buf.extend_from_slice(chunk);

        loop {
            match &mut self.state {
                FramerState::AwaitingHeader => {
                    let Some(header_len) = find_terminator(&self.buf, self.scan_from) else {
                        if self.buf.len() > self.max_header_len {
                            return Err(FramingError::HeaderTooLong {
                                read: self.buf.len(),
                                limit: self.max_header_len,
                            });
                        }
                        // Back up so a terminator split across deliveries is
                        // still found.
                        self.scan_from =
                            self.buf.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
                        return Ok(());
                    };

                    let block = HeaderBlock::parse(&self.buf, header_len)?;
                    self.buf.advance(header_len);
                    self.scan_from = 0;

                    let (remaining, uid, encoding) = self.extract_fields(&block)?;
                    self.body.clear();
                    self.body.reserve(remaining);
                    self.state = FramerState::AwaitingBody {
                        remaining,
                        uid,
                        encoding,
                        start_line: block.start_line,
                    };
                },
                FramerState::AwaitingBody {
                    remaining,
                    uid,
                    encoding,
                    start_line,
                } => {
                    let take = (*remaining).min(self.buf.len());
                    self.body.extend_from_slice(&self.buf[..take]);
                    self.buf.advance(take);
                    *remaining -= take;

                    if *remaining > 0 {
                        return Ok(());
                    }

                    frames.push(Frame {
                        uid: *uid,
                        encoding: *encoding,
                        start_line: mem::take(start_line),
                        body: self.body.split().freeze(),
                    });
                    self.state = FramerState::AwaitingHeader;
                },
            }
        }
    }

    /// Pull the message metadata out of a completed header block.
    fn extract_fields(
        &mut self,
        block: &HeaderBlock,
    ) -> Result<(usize, u64, ContentEncoding), FramingError> {
        let length_field = block
            .get(CONTENT_LENGTH)
            .ok_or(FramingError::MissingContentLength)?;
        let content_length: usize = length_field
            .parse()
            .map_err(|_| FramingError::InvalidContentLength(length_field.to_string()))?;

        if content_length > self.max_message_size {
            return Err(FramingError::OversizedContent {
                declared: content_length,
                limit: self.max_message_size,
            });
        }

        let uid = block.get(UID).and_then(|v| v.parse().ok()).unwrap_or(0);
        let encoding = ContentEncoding::parse(block.get(CONTENT_ENCODING))?;

        if let Some(list) = block.get(ACCEPT_ENCODING) {
            for entry in list.split(',') {
                self.accepted.insert(entry.trim().to_lowercase());
            }
        }

        Ok((content_length, uid, encoding))
    }

    /// Has the peer advertised support for `encoding` via `accept-encoding`?
    pub fn peer_accepts(&self, encoding: &str) -> bool {
        self.accepted.contains(encoding)
    }

    /// Bytes currently buffered and not yet consumed by framing.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
