pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Process-unique identifier for a single WebSocket connection.
/// Used to detect stale disconnects: a close callback for a connection that
/// has already been superseded must not evict the newer entry.
pub type ConnectionId = u64;

/// Routing entry for an identified user: the connection that currently
/// receives point-to-point events addressed to that user.
#[derive(Clone)]
struct PeerEntry {
    conn_id: ConnectionId,
    sender: ConnectionSender,
}

/// Connection registry: the single piece of shared mutable state on the
/// real-time path. Owned by AppState and passed explicitly to the
/// connection-lifecycle handler and the relays.
///
/// Two views of the connections:
/// - `all`: every open socket, keyed by ConnectionId. Presence broadcasts go
///   here, so sockets that never identified themselves still see the online
///   set.
/// - `peers`: one routing entry per user id, last-connect-wins. A second
///   connection from the same user replaces the entry; the superseded socket
///   stays in `all` (orphaned for routing, not closed).
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    all: DashMap<ConnectionId, ConnectionSender>,
    peers: DashMap<String, PeerEntry>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened socket and hand back its id.
    /// Every connection is attached, identified or not.
    pub fn attach(&self, sender: ConnectionSender) -> ConnectionId {
        let conn_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.all.insert(conn_id, sender);
        conn_id
    }

    /// Stop tracking a socket entirely. Called once, on actor exit.
    pub fn detach(&self, conn_id: ConnectionId) {
        self.inner.all.remove(&conn_id);
    }

    /// Route a user id to this connection, replacing any existing entry
    /// (last-connect-wins). The caller is responsible for the presence
    /// rebroadcast that every registry mutation triggers.
    pub fn register(&self, user_id: &str, conn_id: ConnectionId, sender: ConnectionSender) {
        self.inner.peers.insert(
            user_id.to_string(),
            PeerEntry { conn_id, sender },
        );
        tracing::debug!(user_id = %user_id, conn_id, "Connection registered");
    }

    /// Remove the routing entry for `user_id`, but only if it still points at
    /// `conn_id`. A stale disconnect (the entry was superseded by a newer
    /// connection) is a no-op. Returns whether the registry changed.
    pub fn unregister(&self, user_id: &str, conn_id: ConnectionId) -> bool {
        let removed = self
            .inner
            .peers
            .remove_if(user_id, |_, entry| entry.conn_id == conn_id)
            .is_some();
        if removed {
            tracing::debug!(user_id = %user_id, conn_id, "Connection unregistered");
        } else {
            tracing::debug!(user_id = %user_id, conn_id, "Stale disconnect ignored");
        }
        removed
    }

    /// Resolve the live connection for a user, if any. Absence means
    /// "deliver via persistence only" — callers must not treat it as an error.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionSender> {
        self.inner.peers.get(user_id).map(|e| e.sender.clone())
    }

    /// Snapshot of the online set: the user ids with a routed connection.
    /// Recomputed on every call, never stored.
    pub fn online_users(&self) -> Vec<String> {
        self.inner.peers.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of every open socket's sender, for full broadcasts.
    pub fn all_senders(&self) -> Vec<ConnectionSender> {
        self.inner.all.iter().map(|e| e.value().clone()).collect()
    }
}
