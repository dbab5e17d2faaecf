//! Per-connection protocol sessions.
//!
//! One [`Session`] exists per connected client. The network I/O path feeds
//! it raw bytes; a worker drains its request queue and sends responses. The
//! session owns every per-connection buffer: the framing accumulator, the
//! compression scratch, the outgoing staging area, and the pooled request
//! wrappers.
//!
//! Locking: each shared buffer group has exactly one mutex (inbound framer,
//! compression scratch, outgoing staging, request queue), held only for the
//! duration of the mutation and never across a blocking call. The only
//! intentional blocking point is the request-pool acquire, which is how
//! backpressure reaches the producer.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{DeflateCodec, MessageCodec};
use crate::config::Config;
use crate::dispatch::{RequestQueue, ServiceHandler};
use crate::error::{FramewireError, Result};
use crate::pool::{request_pool, PooledRequest, ResourcePool};
use crate::server::{ConnectionId, IoBackend};

use super::framer::{ContentEncoding, Frame, Framer};
use super::guard::BadClientGuard;
use super::{CONTENT_ENCODING, CONTENT_LENGTH, DEFLATE, HEADER_TERMINATOR, UID};

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex
        .lock()
        .unwrap_or_else(|_| panic!("session {what} mutex poisoned"))
}

/// Staging buffers for outgoing frames, reused across messages.
struct OutgoingBuffers {
    header: String,
    compressed: Vec<u8>,
}

/// Per-connection session and protocol engine.
///
/// Not re-entrant on a single connection's byte stream: exactly one header
/// parse is in flight per session, which the inbound lock enforces.
pub struct Session<C: MessageCodec> {
    id: String,
    conn: ConnectionId,
    peer: SocketAddr,
    codec: Arc<C>,
    handler: Arc<dyn ServiceHandler<C>>,
    io: Arc<dyn IoBackend>,
    inbound: Mutex<Framer>,
    zip: Mutex<DeflateCodec>,
    outbound: Mutex<OutgoingBuffers>,
    queue: RequestQueue<C::Request>,
    requests: ResourcePool<PooledRequest<C::Request>>,
    guard: Mutex<BadClientGuard>,
    /// Peer advertised deflate support; once set it stays set.
    deflate_advertised: AtomicBool,
    /// Session is being torn down; push updates become no-ops.
    invalidating: AtomicBool,
    /// Serializes dispatch so requests complete in submission order even
    /// with several workers calling in.
    dispatch_gate: Mutex<()>,
}

impl<C: MessageCodec> Session<C> {
    /// Create a session for a freshly accepted connection.
    pub fn new(
        conn: ConnectionId,
        peer: SocketAddr,
        codec: Arc<C>,
        handler: Arc<dyn ServiceHandler<C>>,
        io: Arc<dyn IoBackend>,
        config: &Config,
    ) -> Self {
        let limits = config.limits;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conn,
            peer,
            codec,
            handler,
            io,
            inbound: Mutex::new(Framer::new(limits.max_header_len, limits.max_message_size)),
            zip: Mutex::new(DeflateCodec::new(limits.max_message_size)),
            outbound: Mutex::new(OutgoingBuffers {
                header: String::with_capacity(limits.max_header_len),
                compressed: Vec::new(),
            }),
            queue: RequestQueue::new(),
            requests: request_pool(
                config.pools.request_pool_initial,
                config.pools.request_pool_max,
            ),
            guard: Mutex::new(BadClientGuard::new(
                limits.max_transmission_errors,
                limits.idle_timeout(),
            )),
            deflate_advertised: AtomicBool::new(false),
            invalidating: AtomicBool::new(false),
            dispatch_gate: Mutex::new(()),
        }
    }

    /// Session id used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The connection this session serves.
    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    /// Remote address of the peer.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Ingest newly delivered bytes from the I/O path.
    ///
    /// Extracts every complete message, inflates deflate bodies, decodes
    /// them, and enqueues the results for dispatch. Returns the number of
    /// requests enqueued. A fatal error means the caller must tear the
    /// connection down; the session is already marked invalidating.
    pub fn feed_bytes(&self, chunk: &[u8]) -> Result<usize> {
        let mut frames = Vec::new();
        {
            let mut framer = lock(&self.inbound, "inbound");
            if let Err(e) = framer.feed(chunk, &mut frames) {
                return Err(self.fatal(e.to_string()));
            }
            if framer.peer_accepts(DEFLATE) {
                self.deflate_advertised.store(true, Ordering::Relaxed);
            }
        }

        let mut enqueued = 0;
        for frame in frames {
            if self.ingest(frame)? {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// Decode one complete frame and enqueue it. `Ok(false)` is a locally
    /// recovered decode failure.
    fn ingest(&self, frame: Frame) -> Result<bool> {
        let text = match frame.encoding {
            ContentEncoding::Identity => match std::str::from_utf8(&frame.body) {
                Ok(text) => text.to_owned(),
                Err(_) => return self.decode_failed(frame.uid, "body is not valid UTF-8"),
            },
            ContentEncoding::Deflate => {
                match lock(&self.zip, "zip").decompress(&frame.body) {
                    Ok(text) => text,
                    // A corrupt deflate stream means the byte stream can no
                    // longer be trusted to be self-delimiting.
                    Err(e) => {
                        return Err(self.fatal(format!("content was not encoded properly: {e}")))
                    },
                }
            },
        };

        match self.codec.decode(&text) {
            Ok(request) => {
                lock(&self.guard, "guard").record_valid();
                // Blocks when the pool is exhausted: backpressure from
                // resource scarcity back to the byte producer.
                let mut pooled = self.requests.acquire();
                pooled.load(request, frame.uid);
                self.queue.enqueue(pooled);
                Ok(true)
            },
            Err(e) => self.decode_failed(frame.uid, &e.to_string()),
        }
    }

    fn decode_failed(&self, uid: u64, cause: &str) -> Result<bool> {
        let mut guard = lock(&self.guard, "guard");
        let exhausted = guard.record_failure();
        let count = guard.bad_transmissions();
        drop(guard);

        tracing::warn!(
            session = %self.id,
            peer = %self.peer,
            uid,
            bad_transmissions = count,
            cause,
            "dropping message that could not be decoded"
        );

        if exhausted {
            Err(self.fatal(format!("too many bad transmissions: {count}")))
        } else {
            Ok(false)
        }
    }

    /// Drain the request queue, dispatching each request to the service
    /// handler and framing its response. Requests are serviced one at a
    /// time, in submission order.
    pub fn process_queued_messages(&self) {
        let _gate = lock(&self.dispatch_gate, "dispatch");

        while let Some(mut pooled) = self.queue.dequeue() {
            let uid = pooled.uid();
            let Some(request) = pooled.take_message() else {
                self.recycle(pooled);
                continue;
            };

            match self.handler.perform(request, self.peer) {
                Some(response) => {
                    if let Err(e) = self.send_response(uid, &response) {
                        tracing::warn!(
                            session = %self.id,
                            peer = %self.peer,
                            uid,
                            error = %e,
                            "failed to frame response"
                        );
                    }
                },
                None => {
                    // Fire-and-forget message; nothing goes back.
                    tracing::debug!(session = %self.id, uid, "handler produced no response");
                },
            }

            self.recycle(pooled);
        }
    }

    fn recycle(&self, mut pooled: PooledRequest<C::Request>) {
        if pooled.is_disposable() {
            pooled.clear();
            self.requests.release(pooled);
        } else {
            // Retained by the application; the wrapper leaves the pool's
            // accounting via an explicit release of a fresh one.
            self.requests.release(PooledRequest::new());
        }
    }

    /// Frame a response to a dispatched request, echoing its uid.
    fn send_response(&self, uid: u64, response: &C::Response) -> Result<()> {
        let text = self.codec.encode(response)?;
        self.frame_outgoing(Some(uid), &text)
    }

    /// Frame a server-initiated push message outside the request/response
    /// cycle. No-op once the session is marked for teardown.
    pub fn push_update(&self, update: &C::Response) -> Result<()> {
        if self.invalidating.load(Ordering::Relaxed) {
            return Ok(());
        }
        let text = self.codec.encode(update)?;
        self.frame_outgoing(None, &text)
    }

    /// Build header + body into a pooled buffer and hand it to the write
    /// path. Compresses when the peer has advertised deflate support.
    fn frame_outgoing(&self, uid: Option<u64>, text: &str) -> Result<()> {
        let use_deflate = self.deflate_advertised.load(Ordering::Relaxed);
        let mut out = lock(&self.outbound, "outbound");
        let OutgoingBuffers { header, compressed } = &mut *out;

        let body_len = if use_deflate {
            lock(&self.zip, "zip").compress(text, compressed)?;
            compressed.len()
        } else {
            text.len()
        };

        header.clear();
        let _ = write!(header, "{CONTENT_LENGTH}:{body_len}");
        if let Some(uid) = uid {
            let _ = write!(header, "\r\n{UID}:{uid}");
        }
        if use_deflate {
            let _ = write!(header, "\r\n{CONTENT_ENCODING}:{DEFLATE}");
        }
        header.push_str(HEADER_TERMINATOR);

        let mut buffer = self.io.acquire_buffer();
        buffer.clear();
        buffer.extend_from_slice(header.as_bytes());
        if use_deflate {
            buffer.extend_from_slice(compressed);
        } else {
            buffer.extend_from_slice(text.as_bytes());
        }

        self.io.enqueue_for_write(self.conn, buffer);
        Ok(())
    }

    /// Is at least one decoded request waiting for dispatch?
    pub fn message_waiting(&self) -> bool {
        self.queue.message_waiting()
    }

    /// Consecutive decode failures since the last valid message.
    pub fn bad_transmissions(&self) -> u32 {
        lock(&self.guard, "guard").bad_transmissions()
    }

    /// Has the idle watchdog expired for this session?
    pub fn idle_expired(&self) -> bool {
        lock(&self.guard, "guard").idle_expired()
    }

    /// True once the session has been marked for teardown.
    pub fn is_invalidating(&self) -> bool {
        self.invalidating.load(Ordering::Relaxed)
    }

    /// Mark the session for teardown and force-clear its queue, recycling
    /// every pooled wrapper.
    pub fn invalidate(&self) {
        self.invalidating.store(true, Ordering::Relaxed);
        for mut pooled in self.queue.drain() {
            pooled.clear();
            self.requests.release(pooled);
        }
    }

    fn fatal(&self, reason: String) -> FramewireError {
        self.invalidate();
        FramewireError::BadClient {
            peer: self.peer,
            reason,
        }
    }
}
