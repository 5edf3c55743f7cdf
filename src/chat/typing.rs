//! Typing-signal relay.
//!
//! Stateless per-event forwarding of typing indicators from one user to a
//! specific peer. Advisory signals: if the target has no routed connection
//! the event is dropped silently (no queuing), and duplicate or out-of-order
//! delivery is absorbed by the receiver's state machine.

use crate::ws::broadcast::{send_to_user, DeliveryOutcome};
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Relay "peer is typing" from `from` to `to`'s live connection, if any.
pub fn relay_typing(registry: &ConnectionRegistry, from: &str, to: &str) {
    let outcome = send_to_user(
        registry,
        to,
        &ServerEvent::UserTyping {
            from: from.to_string(),
        },
    );
    if outcome != DeliveryOutcome::Delivered {
        tracing::debug!(from = %from, to = %to, ?outcome, "Typing signal dropped");
    }
}

/// Relay "peer stopped typing" from `from` to `to`'s live connection, if any.
pub fn relay_stop_typing(registry: &ConnectionRegistry, from: &str, to: &str) {
    let outcome = send_to_user(
        registry,
        to,
        &ServerEvent::UserStopTyping {
            from: from.to_string(),
        },
    );
    if outcome != DeliveryOutcome::Delivered {
        tracing::debug!(from = %from, to = %to, ?outcome, "Stop-typing signal dropped");
    }
}
