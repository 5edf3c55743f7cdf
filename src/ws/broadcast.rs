use super::ConnectionRegistry;
use crate::ws::protocol::ServerEvent;

/// Outcome of a point-to-point push. Best-effort either way: neither
/// `NotConnected` (recipient has no routed connection — deliver via
/// persistence only) nor `ChannelClosed` (the writer task is gone, the
/// transport is mid-teardown) is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    NotConnected,
    ChannelClosed,
}

/// Broadcast an event to every open socket, identified or not.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = event.to_message() else {
        return;
    };

    for sender in registry.all_senders() {
        let _ = sender.send(msg.clone());
    }
}

/// Send an event to a specific user's routed connection.
pub fn send_to_user(
    registry: &ConnectionRegistry,
    user_id: &str,
    event: &ServerEvent,
) -> DeliveryOutcome {
    let Some(msg) = event.to_message() else {
        return DeliveryOutcome::ChannelClosed;
    };

    match registry.lookup(user_id) {
        Some(sender) => {
            if sender.send(msg).is_ok() {
                DeliveryOutcome::Delivered
            } else {
                DeliveryOutcome::ChannelClosed
            }
        }
        None => DeliveryOutcome::NotConnected,
    }
}
