//! JSON wire protocol for the real-time channel.
//!
//! Events are text frames carrying a tagged JSON object:
//! `{"event": "...", "data": {...}}`. Client-originated events name the
//! recipient (`to`); server-originated relays name the originator (`from`).

use serde::{Deserialize, Serialize};

use crate::chat::typing;
use crate::state::AppState;

/// Events a client may send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// The sender started (or continues) composing a message to `to`.
    Typing { to: String },
    /// The sender went idle or sent the message.
    StopTyping { to: String },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full online set, replacing the client's snapshot wholesale.
    GetOnlineUsers(Vec<String>),
    /// A peer is composing a message to this client.
    UserTyping { from: String },
    /// A peer stopped composing.
    UserStopTyping { from: String },
    /// A message addressed to this client was just created.
    NewMessage(crate::chat::messages::MessageResponse),
}

impl ServerEvent {
    /// Encode as a WebSocket text frame.
    pub fn to_message(&self) -> Option<axum::extract::ws::Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(axum::extract::ws::Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                None
            }
        }
    }
}

/// Handle an incoming text frame from an identified connection.
/// Decodes the event and dispatches to the typing relay. Malformed frames
/// are logged and dropped — they never crash the relay loop.
pub fn handle_text_message(text: &str, state: &AppState, user_id: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                user_id = %user_id,
                error = %e,
                "Dropping malformed client event"
            );
            return;
        }
    };

    match event {
        ClientEvent::Typing { to } => {
            typing::relay_typing(&state.connections, user_id, &to);
        }
        ClientEvent::StopTyping { to } => {
            typing::relay_stop_typing(&state.connections, user_id, &to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_original_wire_names() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"typing","data":{"to":"u2"}}"#).unwrap();
        assert_eq!(event, ClientEvent::Typing { to: "u2".into() });

        let json = serde_json::to_string(&ClientEvent::StopTyping { to: "u2".into() }).unwrap();
        assert_eq!(json, r#"{"event":"stopTyping","data":{"to":"u2"}}"#);
    }

    #[test]
    fn server_events_round_trip() {
        let json =
            serde_json::to_string(&ServerEvent::GetOnlineUsers(vec!["u1".into()])).unwrap();
        assert_eq!(json, r#"{"event":"getOnlineUsers","data":["u1"]}"#);

        let json = serde_json::to_string(&ServerEvent::UserTyping { from: "u1".into() }).unwrap();
        assert_eq!(json, r#"{"event":"userTyping","data":{"from":"u1"}}"#);
    }

    #[test]
    fn malformed_events_fail_to_decode() {
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"typing","data":{}}"#).is_err());
        assert!(
            serde_json::from_str::<ClientEvent>(r#"{"event":"selfDestruct","data":{}}"#).is_err()
        );
    }
}
