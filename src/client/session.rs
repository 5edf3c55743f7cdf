//! Client real-time session: one live connection per authenticated session.
//!
//! The session owns the socket, an online-set snapshot (replaced wholesale on
//! every `getOnlineUsers`), the in-memory log of the currently open
//! conversation, and both typing state machines. Incoming events for a peer
//! other than the open one leave the typing state untouched.

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::chat::messages::MessageResponse;
use crate::client::typing::{TypingIndicator, TypingNotifier, TypingSignal};
use crate::ws::protocol::{ClientEvent, ServerEvent};

struct SessionState {
    open_peer: Option<String>,
    conversation: Vec<MessageResponse>,
}

/// Live client session over a WebSocket connection.
pub struct ClientSession {
    tx: mpsc::UnboundedSender<WsMessage>,
    online_users: watch::Receiver<Vec<String>>,
    state: Arc<Mutex<SessionState>>,
    notifier: TypingNotifier,
    indicator: TypingIndicator,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    signal_pump: JoinHandle<()>,
}

impl ClientSession {
    /// Open the session. `url` is the full ws:// endpoint including the
    /// `?token=` identifying this session's user.
    pub async fn connect(url: &str) -> Result<Self, tokio_tungstenite::tungstenite::Error> {
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        let (ws_sender, mut ws_receiver) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();

        let (online_tx, online_users) = watch::channel(Vec::new());
        let state = Arc::new(Mutex::new(SessionState {
            open_peer: None,
            conversation: Vec::new(),
        }));
        let indicator = TypingIndicator::new();
        let (notifier, mut signals) = TypingNotifier::new();

        // Writer task: forwards queued frames to the socket sink.
        let writer = tokio::spawn(async move {
            let mut ws_sender = ws_sender;
            let mut rx = rx;
            while let Some(msg) = rx.recv().await {
                if ws_sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Signal pump: typing-machine output becomes wire events addressed
        // to whichever peer is open when the signal fires.
        let pump_tx = tx.clone();
        let pump_state = state.clone();
        let signal_pump = tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let peer = pump_state
                    .lock()
                    .expect("session state lock")
                    .open_peer
                    .clone();
                let Some(to) = peer else {
                    continue;
                };
                let event = match signal {
                    TypingSignal::Typing => ClientEvent::Typing { to },
                    TypingSignal::StopTyping => ClientEvent::StopTyping { to },
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    let _ = pump_tx.send(WsMessage::Text(json.into()));
                }
            }
        });

        // Reader task: dispatch server events into session state.
        let reader_tx = tx.clone();
        let reader_state = state.clone();
        let reader_indicator = indicator.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        handle_server_event(
                            text.as_str(),
                            &online_tx,
                            &reader_state,
                            &reader_indicator,
                        );
                    }
                    Ok(WsMessage::Ping(data)) => {
                        let _ = reader_tx.send(WsMessage::Pong(data));
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Ok(Self {
            tx,
            online_users,
            state,
            notifier,
            indicator,
            reader,
            writer,
            signal_pump,
        })
    }

    /// Current online-set snapshot.
    pub fn online_users(&self) -> Vec<String> {
        self.online_users.borrow().clone()
    }

    /// Watch handle for observing online-set replacements.
    pub fn subscribe_online_users(&self) -> watch::Receiver<Vec<String>> {
        self.online_users.clone()
    }

    /// Open a conversation: replaces the in-memory log (typically with the
    /// history just fetched over REST) and clears any stale typing indicator.
    pub fn open_conversation(&self, peer_id: &str, history: Vec<MessageResponse>) {
        let mut state = self.state.lock().expect("session state lock");
        state.open_peer = Some(peer_id.to_string());
        state.conversation = history;
        self.indicator.reset();
    }

    /// The open conversation's in-memory log.
    pub fn conversation(&self) -> Vec<MessageResponse> {
        self.state
            .lock()
            .expect("session state lock")
            .conversation
            .clone()
    }

    /// Append a message this session just sent (the REST response), keeping
    /// the local log in step with what the peer was pushed.
    pub fn append_local(&self, message: MessageResponse) {
        self.state
            .lock()
            .expect("session state lock")
            .conversation
            .push(message);
    }

    /// Whether the open peer is currently typing.
    pub fn peer_typing(&self) -> bool {
        self.indicator.is_typing()
    }

    /// Record a keystroke in the composer (drives the typing debounce).
    pub fn keystroke(&self) {
        self.notifier.keystroke();
    }

    /// Record that the composed message was sent (pre-empts the debounce).
    pub fn message_sent(&self) {
        self.notifier.message_sent();
    }

    /// Close the session: best-effort close frame, then tear down the tasks.
    pub fn close(self) {
        let _ = self.tx.send(WsMessage::Close(None));
        self.reader.abort();
        self.signal_pump.abort();
        // Writer is left to flush the close frame; it exits when the channel drops.
        drop(self.writer);
    }
}

/// Apply one server event to session state. Unknown or malformed events are
/// logged and ignored — the session must tolerate anything the server sends.
fn handle_server_event(
    text: &str,
    online_tx: &watch::Sender<Vec<String>>,
    state: &Arc<Mutex<SessionState>>,
    indicator: &TypingIndicator,
) {
    let event = match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed server event");
            return;
        }
    };

    match event {
        ServerEvent::GetOnlineUsers(users) => {
            // Wholesale replacement, never merged.
            let _ = online_tx.send(users);
        }
        ServerEvent::NewMessage(message) => {
            let mut state = state.lock().expect("session state lock");
            if state.open_peer.as_deref() == Some(message.sender_id.as_str()) {
                state.conversation.push(message);
            }
            // Otherwise the sidebar's unseen count covers it on next fetch.
        }
        ServerEvent::UserTyping { from } => {
            let open = {
                let state = state.lock().expect("session state lock");
                state.open_peer.as_deref() == Some(from.as_str())
            };
            if open {
                indicator.on_typing();
            }
        }
        ServerEvent::UserStopTyping { from } => {
            let open = {
                let state = state.lock().expect("session state lock");
                state.open_peer.as_deref() == Some(from.as_str())
            };
            if open {
                indicator.on_stop_typing();
            }
        }
    }
}
