//! Wire protocol: incremental framing and per-connection sessions.
//!
//! The wire format is text-based and line-oriented: an optional start line,
//! one or more `key:value` header lines, a blank-line terminator, then a raw
//! body of exactly `content-length` bytes (possibly deflate-compressed).
//!
//! ```text
//! [optional start-line]\r\n
//! key: value\r\n
//! ...
//! \r\n
//! <body, exactly content-length bytes>
//! ```
//!
//! # Message Flow
//!
//! ```text
//! I/O thread                     Worker thread
//!    |                                |
//!    |-- feed_bytes(chunk) ------+    |
//!    |   frame -> inflate ->     |    |
//!    |   decode -> enqueue       |    |
//!    |                           v    |
//!    |                      [RequestQueue]
//!    |                                |-- process_queued_messages()
//!    |                                |   dequeue -> perform ->
//!    |<------- enqueue_for_write -----|   frame response (+deflate)
//! ```
//!
//! # Framer State Machine
//!
//! ```text
//!                 header terminator found
//! [AwaitingHeader] ─────────────────────> [AwaitingBody]
//!        ^                                      │
//!        │         content-length bytes consumed│
//!        └──────────────────────────────────────┘
//! ```
//!
//! Correctness never depends on delivery chunk boundaries: a message may be
//! split across arbitrarily many [`Framer::feed`] calls, and one call may
//! yield several complete messages.

mod framer;
mod guard;
mod header;
mod session;

pub use framer::{ContentEncoding, Frame, Framer, FramingError};
pub use guard::BadClientGuard;
pub use header::HeaderBlock;
pub use session::Session;

/// Header field carrying the body length in bytes (required on every message)
pub const CONTENT_LENGTH: &str = "content-length";

/// Header field carrying the caller-assigned correlation token (optional)
pub const UID: &str = "uid";

/// Header field naming the body's transfer encoding (optional)
pub const CONTENT_ENCODING: &str = "content-encoding";

/// Header field listing encodings the peer accepts, comma-separated (optional)
pub const ACCEPT_ENCODING: &str = "accept-encoding";

/// The deflate transfer encoding token
pub const DEFLATE: &str = "deflate";

/// The identity (no-op) transfer encoding token
pub const IDENTITY: &str = "identity";

/// Header line delimiter
pub const CRLF: &str = "\r\n";

/// Header block terminator: the first blank line ends the header
pub const HEADER_TERMINATOR: &str = "\r\n\r\n";
