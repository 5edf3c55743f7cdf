//! Message delivery relay.
//!
//! Invoked after a message is durably created in storage. Real-time push is
//! a latency optimization only: persisted storage is the source of truth, so
//! a miss here is recovered by the recipient's next fetch.

use crate::chat::messages::MessageResponse;
use crate::ws::broadcast::{send_to_user, DeliveryOutcome};
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Push a freshly persisted message to the receiver's live connection, if
/// any. Never blocks or fails message creation: a transport failure must not
/// roll back or retry the create.
pub fn deliver_new_message(registry: &ConnectionRegistry, message: MessageResponse) {
    let receiver_id = message.receiver_id.clone();
    match send_to_user(registry, &receiver_id, &ServerEvent::NewMessage(message)) {
        DeliveryOutcome::Delivered => {
            tracing::debug!(receiver_id = %receiver_id, "Message pushed to live connection");
        }
        DeliveryOutcome::NotConnected => {
            tracing::debug!(receiver_id = %receiver_id, "Receiver offline, message persisted only");
        }
        DeliveryOutcome::ChannelClosed => {
            tracing::debug!(receiver_id = %receiver_id, "Receiver connection closing, message persisted only");
        }
    }
}
