//! # Framewire - Session Engine for Length-Delimited Messaging
//!
//! Per-connection session management for an HTTP-like framed protocol over
//! persistent TCP streams: incremental header parsing, content-length-driven
//! body accumulation, optional deflate compression, bounded-pool
//! backpressure, FIFO dispatch, and bad-client eviction.
//!
//! ## Architecture
//!
//! ```text
//! bytes ──> Framer ──> [inflate] ──> MessageCodec ──> PooledRequest
//!                                                          │
//!                                                    RequestQueue
//!                                                          │
//!            write path <── [deflate] <── framing <── Dispatcher
//!                                                          │
//!                                                   ServiceHandler
//! ```
//!
//! The engine never blocks the network reactor: the only intentional
//! blocking point is [`ResourcePool::acquire`], which is how backpressure
//! propagates from resource scarcity back to producers.
//!
//! ## Wire Format
//!
//! Text-based, line-oriented header plus raw body:
//!
//! ```text
//! [optional start-line]\r\n
//! key: value\r\n
//! ...
//! \r\n
//! <body, exactly content-length bytes, possibly deflate-compressed>
//! ```
//!
//! | Header             | Required | Meaning                                 |
//! |--------------------|----------|-----------------------------------------|
//! | `content-length`   | yes      | Body byte length after any compression  |
//! | `uid`              | no       | Correlation token echoed in responses   |
//! | `content-encoding` | no       | `identity` (default) or `deflate`       |
//! | `accept-encoding`  | no       | Encodings the peer accepts, comma-sep   |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use framewire::{Config, ConnectionId, HandlerRegistry, JsonCodec, SessionManager};
//!
//! let codec = Arc::new(JsonCodec::<Request, Response>::new());
//! let mut registry = HandlerRegistry::new();
//! registry.register("ping", |req, peer| Some(Response::pong(req)));
//!
//! let manager = SessionManager::new(codec, Arc::new(registry), io, Config::default());
//!
//! // I/O path, whenever bytes arrive:
//! manager.feed_bytes(conn, &chunk)?;
//!
//! // Worker path:
//! manager.process_queued_messages(conn)?;
//! ```
//!
//! ## Failure Policy
//!
//! | Fault                               | Consequence                        |
//! |-------------------------------------|------------------------------------|
//! | Header too long, no terminator      | Fatal, immediate eviction          |
//! | Unparsable / missing content-length | Fatal, immediate eviction          |
//! | Declared length over the maximum    | Fatal, immediate eviction          |
//! | Unsupported content-encoding        | Fatal, immediate eviction          |
//! | Corrupt deflate stream              | Fatal, immediate eviction          |
//! | Codec decode failure                | Dropped; counter-gated eviction    |
//! | No valid message in the idle window | Watchdog eviction                  |
//!
//! ## Modules
//!
//! - [`protocol`]: incremental framing and per-connection sessions
//! - [`codec`]: message marshalling seam and the deflate transform
//! - [`dispatch`]: request queue, service handler seam, handler registry
//! - [`pool`]: bounded object pools with blocking acquire
//! - [`server`]: session registry and the I/O backend seam
//! - [`config`]: configuration management
//! - [`error`]: error types and result alias

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use codec::{DeflateCodec, JsonCodec, MessageCodec};
pub use config::{Config, LimitsConfig, PoolConfig};
pub use dispatch::{HandlerRegistry, MessageKind, RequestQueue, ServiceHandler};
pub use error::{FramewireError, Result};
pub use pool::{PooledRequest, ResourcePool};
pub use protocol::{ContentEncoding, Frame, Framer, FramingError, HeaderBlock, Session};
pub use server::{ConnectionId, IoBackend, SessionManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
