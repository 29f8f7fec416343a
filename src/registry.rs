use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::message::ServerFrame;

/// Server-assigned identity of a single live connection. Distinct from the
/// user identity: one user may hold many connections at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Delivery endpoint for one live connection: the sender side of its
/// outbound queue. Pushing is a non-blocking enqueue; the connection's own
/// writer task drains the queue onto the socket, so a slow socket can never
/// stall the caller.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueues a frame for this connection. Fails only when the
    /// connection's receive half is gone (it is shutting down).
    pub fn push(&self, frame: ServerFrame) -> AppResult<()> {
        self.tx.send(frame).map_err(|_| {
            AppError::Dispatch(format!("Outbound queue closed for connection {}", self.id))
        })
    }
}

/// Concurrency-safe mapping from user identity to that user's live
/// connection set. Owned by the server process for its entire lifetime and
/// only ever reached through these operations.
///
/// Contention is partitioned across the map's shard locks, so fan-out to
/// one user does not serialize against registrations of another.
pub struct ConnectionRegistry {
    inner: DashMap<String, HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Adds the connection to the user's set. Idempotent for the same
    /// (user, connection) pair.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) {
        self.inner
            .entry(user_id.to_string())
            .or_default()
            .insert(handle.id(), handle);
    }

    /// Removes exactly that connection; deletes the user's entry when the
    /// set empties. Safe to call on a connection already removed.
    pub fn unregister(&self, user_id: &str, connection_id: ConnectionId) {
        if let Some(mut conns) = self.inner.get_mut(user_id) {
            conns.remove(&connection_id);
        }
        // Emptiness is re-checked under the shard lock, so a registration
        // racing this call keeps the entry alive.
        self.inner.remove_if(user_id, |_, conns| conns.is_empty());
    }

    /// Current live connection set for the user; empty if offline or
    /// unknown. Returns clones of the queue handles and never touches a
    /// socket.
    pub fn lookup(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.inner
            .get(user_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of users currently holding at least one live connection.
    pub fn online_user_count(&self) -> usize {
        self.inner.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
