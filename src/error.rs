//! Framewire error types.
//!
//! Errors are split along the fault lines of the protocol design:
//!
//! - [`FramingError`] covers violations of the wire format itself. These are
//!   always fatal to the session that produced them, because once framing is
//!   wrong the byte stream can no longer be trusted to be self-delimiting.
//! - `Decode` covers a well-framed body the message codec cannot parse. These
//!   are recovered locally (the message is dropped) until a session exhausts
//!   its bad-transmission allowance.
//! - `BadClient` is the terminal verdict: it names the peer and the reason,
//!   and is surfaced to the owning server for connection teardown.
//!
//! The `Framing` variant preserves the full error chain via `#[source]`,
//! enabling debugging tools to display complete error context.

use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::FramingError;

/// Framewire errors.
#[derive(Error, Debug)]
pub enum FramewireError {
    /// Wire-format violation. Always fatal to the session.
    #[error("Framing error: {0}")]
    Framing(#[source] FramingError),

    /// A peer has been judged abusive or broken and must be evicted.
    #[error("Bad client {peer}: {reason}")]
    BadClient {
        /// Remote address of the offending connection.
        peer: SocketAddr,
        /// Human-readable cause, surfaced to the owning server.
        reason: String,
    },

    /// The message codec could not parse a fully-framed body.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The message codec could not serialize a response.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Compression operation failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompression operation failed (corrupt or oversized deflate stream).
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Operation on a connection this server does not know.
    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for framewire operations
pub type Result<T> = std::result::Result<T, FramewireError>;

impl From<FramingError> for FramewireError {
    fn from(err: FramingError) -> Self {
        FramewireError::Framing(err)
    }
}

impl From<toml::de::Error> for FramewireError {
    fn from(err: toml::de::Error) -> Self {
        FramewireError::Config(err.to_string())
    }
}

impl FramewireError {
    /// True if this error must terminate the session that raised it.
    ///
    /// Decode and encode failures are locally recoverable; everything
    /// touching the framing layer or the compressed byte stream is not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FramewireError::Framing(_)
                | FramewireError::BadClient { .. }
                | FramewireError::Decompression(_)
        )
    }
}
