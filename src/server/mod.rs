//! Session hosting: the server-side registry of live sessions.
//!
//! [`SessionManager`] owns one [`Session`] per connected client and routes
//! the three engine entry points by connection id:
//!
//! - `feed_bytes` — invoked by the I/O layer whenever new bytes arrive;
//! - `process_queued_messages` — invoked by a worker scheduler to drain and
//!   dispatch pending requests;
//! - `push_update` — invoked by application logic for unsolicited
//!   server→client pushes.
//!
//! Fatal client errors evict the offending session and surface as
//! `Err(BadClient { peer, reason })` to the I/O caller, which owns the
//! actual connection teardown. The idle watchdog is driven by calling
//! [`SessionManager::sweep_idle`] on a timer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use bytes::BytesMut;

use crate::codec::MessageCodec;
use crate::config::Config;
use crate::dispatch::ServiceHandler;
use crate::error::{FramewireError, Result};
use crate::protocol::Session;

/// Identifies one accepted connection for the life of the process.
///
/// Assigned by the I/O layer; the engine only ever uses it as a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The external write path.
///
/// Outgoing frames are built into buffers drawn from the backend (which is
/// expected to pool them server-wide) and handed back for asynchronous
/// writing; the backend releases a buffer to its pool once the socket write
/// completes.
pub trait IoBackend: Send + Sync {
    /// Draw an empty outgoing buffer from the server-wide pool.
    fn acquire_buffer(&self) -> BytesMut;

    /// Hand a completed frame to the write path for `conn`.
    fn enqueue_for_write(&self, conn: ConnectionId, buffer: BytesMut);
}

/// Manages the sessions of all live connections.
pub struct SessionManager<C: MessageCodec> {
    sessions: RwLock<HashMap<ConnectionId, Arc<Session<C>>>>,
    codec: Arc<C>,
    handler: Arc<dyn ServiceHandler<C>>,
    io: Arc<dyn IoBackend>,
    config: Config,
}

impl<C: MessageCodec> SessionManager<C> {
    /// Create a manager wiring every future session to the given
    /// collaborators.
    pub fn new(
        codec: Arc<C>,
        handler: Arc<dyn ServiceHandler<C>>,
        io: Arc<dyn IoBackend>,
        config: Config,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            codec,
            handler,
            io,
            config,
        }
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ConnectionId, Arc<Session<C>>>> {
        self.sessions.read().expect("session map lock poisoned")
    }

    fn write_sessions(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<Session<C>>>> {
        self.sessions.write().expect("session map lock poisoned")
    }

    /// Create and register a session for a freshly accepted connection.
    pub fn accept_connection(&self, conn: ConnectionId, peer: SocketAddr) -> Arc<Session<C>> {
        let session = Arc::new(Session::new(
            conn,
            peer,
            Arc::clone(&self.codec),
            Arc::clone(&self.handler),
            Arc::clone(&self.io),
            &self.config,
        ));
        self.write_sessions().insert(conn, Arc::clone(&session));
        tracing::info!(%conn, %peer, session = %session.id(), "client connected");
        session
    }

    /// Look up the session serving `conn`.
    pub fn session(&self, conn: ConnectionId) -> Option<Arc<Session<C>>> {
        self.read_sessions().get(&conn).cloned()
    }

    /// Route newly arrived bytes to the owning session.
    ///
    /// On a fatal client error the session has already been evicted when
    /// this returns; the caller must close the underlying connection.
    pub fn feed_bytes(&self, conn: ConnectionId, chunk: &[u8]) -> Result<usize> {
        let session = self
            .session(conn)
            .ok_or(FramewireError::UnknownConnection(conn.0))?;

        match session.feed_bytes(chunk) {
            Ok(enqueued) => Ok(enqueued),
            Err(e) => {
                self.evict(conn, &e);
                Err(e)
            },
        }
    }

    /// Drain and dispatch every request queued for `conn`.
    pub fn process_queued_messages(&self, conn: ConnectionId) -> Result<()> {
        let session = self
            .session(conn)
            .ok_or(FramewireError::UnknownConnection(conn.0))?;
        session.process_queued_messages();
        Ok(())
    }

    /// Drain every session with work pending. Convenience for a single
    /// worker sweeping all connections.
    pub fn process_all_queued_messages(&self) {
        let pending: Vec<Arc<Session<C>>> = self
            .read_sessions()
            .values()
            .filter(|s| s.message_waiting())
            .cloned()
            .collect();
        for session in pending {
            session.process_queued_messages();
        }
    }

    /// Frame an unsolicited server→client push for `conn`.
    pub fn push_update(&self, conn: ConnectionId, update: &C::Response) -> Result<()> {
        let session = self
            .session(conn)
            .ok_or(FramewireError::UnknownConnection(conn.0))?;
        session.push_update(update)
    }

    /// Tear down the session for an orderly disconnect.
    pub fn disconnect(&self, conn: ConnectionId) {
        if let Some(session) = self.write_sessions().remove(&conn) {
            session.invalidate();
            tracing::info!(%conn, peer = %session.peer(), "client disconnected");
        }
    }

    /// Evict every session whose idle watchdog has expired. Returns the
    /// evicted connections so the I/O layer can close them.
    pub fn sweep_idle(&self) -> Vec<(ConnectionId, SocketAddr)> {
        let expired: Vec<Arc<Session<C>>> = self
            .read_sessions()
            .values()
            .filter(|s| s.idle_expired())
            .cloned()
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for session in expired {
            let reason = FramewireError::BadClient {
                peer: session.peer(),
                reason: "no valid message within the idle window".to_string(),
            };
            self.evict(session.connection(), &reason);
            evicted.push((session.connection(), session.peer()));
        }
        evicted
    }

    fn evict(&self, conn: ConnectionId, cause: &FramewireError) {
        if let Some(session) = self.write_sessions().remove(&conn) {
            session.invalidate();
            tracing::warn!(%conn, peer = %session.peer(), %cause, "evicting client");
        }
    }

    /// Live session count.
    pub fn count(&self) -> usize {
        self.read_sessions().len()
    }
}
