//! Presence broadcasting.
//!
//! The online set is derived from the connection registry — recomputed on
//! every membership change, never stored independently. Every client's
//! sidebar shows online status for all contacts, so the full set goes to
//! every open socket rather than a diff to affected parties. Fire-and-forget:
//! a client that misses an update self-corrects on the next mutation or
//! reconnect.

use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Recompute the online set and publish it to every connection.
/// Called after each registry mutation (connect, effective disconnect).
pub fn broadcast_online_users(registry: &ConnectionRegistry) {
    let online = registry.online_users();
    tracing::debug!(online = online.len(), "Broadcasting online users");
    broadcast_to_all(registry, &ServerEvent::GetOnlineUsers(online));
}
