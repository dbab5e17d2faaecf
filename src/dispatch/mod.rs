//! Request queuing and dispatch.
//!
//! The queue is the hand-off between the thread appending incoming bytes
//! and the worker draining decoded requests. The `message_waiting` flag
//! mirrors queue non-emptiness so an external scheduler can decide whether
//! to invoke the dispatcher without touching the queue structure; both the
//! flag and the FIFO live behind one lock so the 0→1 and 1→0 transitions
//! can never race a concurrent peek into a lost wakeup.
//!
//! [`HandlerRegistry`] is the startup-built dispatch table: message-kind
//! string to handler function, resolved by lookup.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use crate::codec::MessageCodec;
use crate::pool::PooledRequest;

/// FIFO of decoded requests awaiting dispatch.
pub struct RequestQueue<M> {
    inner: Mutex<QueueState<M>>,
}

struct QueueState<M> {
    items: VecDeque<PooledRequest<M>>,
    message_waiting: bool,
}

impl<M> RequestQueue<M> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::new(),
                message_waiting: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<M>> {
        self.inner.lock().expect("request queue mutex poisoned")
    }

    /// Append a request. Non-blocking; bounded only by memory.
    pub fn enqueue(&self, request: PooledRequest<M>) {
        let mut state = self.lock();
        state.items.push_back(request);
        state.message_waiting = true;
    }

    /// Pop the oldest request, or `None` when empty. Non-blocking.
    pub fn dequeue(&self) -> Option<PooledRequest<M>> {
        let mut state = self.lock();
        let request = state.items.pop_front();
        if state.items.is_empty() {
            state.message_waiting = false;
        }
        request
    }

    /// Is at least one request waiting?
    pub fn message_waiting(&self) -> bool {
        self.lock().message_waiting
    }

    /// Requests currently queued.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// True when no requests are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Remove and return everything queued, for session teardown.
    pub fn drain(&self) -> Vec<PooledRequest<M>> {
        let mut state = self.lock();
        state.message_waiting = false;
        state.items.drain(..).collect()
    }
}

impl<M> Default for RequestQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// The application service layer: executes one decoded request.
///
/// Returning `None` marks the request fire-and-forget: no response frame is
/// emitted for it. A failing service should signal failure *inside* its
/// response type; errors here are part of the response contract, not a
/// protocol fault.
pub trait ServiceHandler<C: MessageCodec>: Send + Sync {
    /// Execute `request` on behalf of `peer`, optionally producing a
    /// response to frame back.
    fn perform(&self, request: C::Request, peer: SocketAddr) -> Option<C::Response>;
}

/// Requests that can name their own dispatch kind.
pub trait MessageKind {
    /// The message-type identifier used for registry lookup.
    fn kind(&self) -> &str;
}

type HandlerFn<C> = Box<
    dyn Fn(<C as MessageCodec>::Request, SocketAddr) -> Option<<C as MessageCodec>::Response>
        + Send
        + Sync,
>;

/// Explicit dispatch table mapping message kinds to handler functions.
///
/// Built once at startup, resolved by lookup at dispatch time. A request
/// whose kind has no registered handler is dropped with a warning and no
/// response.
pub struct HandlerRegistry<C: MessageCodec> {
    handlers: HashMap<String, HandlerFn<C>>,
}

impl<C: MessageCodec> HandlerRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for requests of `kind`. Replaces any previous
    /// handler for that kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(C::Request, SocketAddr) -> Option<C::Response> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: MessageCodec> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ServiceHandler<C> for HandlerRegistry<C>
where
    C: MessageCodec,
    C::Request: MessageKind,
{
    fn perform(&self, request: C::Request, peer: SocketAddr) -> Option<C::Response> {
        let kind = request.kind().to_owned();
        match self.handlers.get(&kind) {
            Some(handler) => handler(request, peer),
            None => {
                tracing::warn!(%peer, kind, "no handler registered for message kind");
                None
            },
        }
    }
}
