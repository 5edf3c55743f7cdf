use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::presence;
use crate::state::AppState;
use crate::ws::protocol;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for a WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming messages, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system to send messages to this
/// client by cloning the sender. With a `user_id` the connection is routed in
/// the registry (last-connect-wins); without one it only observes broadcasts.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Every socket is attached; identified sockets also get a routing entry.
    let conn_id = state.connections.attach(tx.clone());
    if let Some(ref uid) = user_id {
        state.connections.register(uid, conn_id, tx.clone());
    }

    // Every registry mutation republishes the online set — and a fresh
    // spectator still needs its initial snapshot, so broadcast regardless.
    presence::broadcast_online_users(&state.connections);

    tracing::info!(
        user_id = user_id.as_deref().unwrap_or("<spectator>"),
        conn_id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            // Send ping
            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            // Wait for pong within timeout
            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    // Pong timeout or channel closed — close connection
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    match user_id {
                        // Typing signals only make sense from an identified sender.
                        Some(ref uid) => protocol::handle_text_message(text.as_str(), &state, uid),
                        None => {
                            tracing::debug!("Dropping event from spectator connection");
                        }
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = user_id.as_deref().unwrap_or("<spectator>"),
                        "Received binary message (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    // Pong received — notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = user_id.as_deref().unwrap_or("<spectator>"),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = user_id.as_deref().unwrap_or("<spectator>"),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(
                    user_id = user_id.as_deref().unwrap_or("<spectator>"),
                    "WebSocket stream ended"
                );
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    state.connections.detach(conn_id);

    // Unregister only if this connection is still the routed one; a stale
    // disconnect after a reconnect must not evict the newer entry, and an
    // unchanged registry needs no rebroadcast.
    if let Some(ref uid) = user_id {
        if state.connections.unregister(uid, conn_id) {
            presence::broadcast_online_users(&state.connections);
        }
    }

    tracing::info!(
        user_id = user_id.as_deref().unwrap_or("<spectator>"),
        conn_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
