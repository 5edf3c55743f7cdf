//! Integration tests for the message delivery relay and the client
//! real-time session (online-set reconciliation, conversation log, typing).

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use swifttalk_server::client::ClientSession;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = swifttalk_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = swifttalk_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = swifttalk_server::state::AppState {
        db,
        jwt_secret,
        connections: swifttalk_server::ws::ConnectionRegistry::new(),
        data_dir: data_dir.clone(),
    };

    let app = swifttalk_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

/// Sign up a user and return (access_token, user_id).
async fn signup_user(base_url: &str, name: &str, email: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&json!({
            "fullName": name,
            "email": email,
            "password": "correct horse battery",
            "bio": "integration test user",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Signup failed for {}", name);
    let body: Value = resp.json().await.unwrap();
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

async fn send_text(base_url: &str, token: &str, to: &str, text: &str) -> Value {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, to))
        .bearer_auth(token)
        .json(&json!({ "text": text }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

async fn connect_raw(addr: &SocketAddr, token: &str) -> WsStream {
    let (ws_stream, _) = tokio_tungstenite::connect_async(&format!(
        "ws://{}/ws?token={}",
        addr, token
    ))
    .await
    .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Read frames until an event with the given name arrives, skipping
/// everything else. Panics on timeout.
async fn next_event(stream: &mut WsStream, event: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {} event", event))
            .expect("Stream ended")
            .expect("Stream error");

        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).expect("Invalid event JSON");
            if value["event"] == event {
                return value["data"].clone();
            }
        }
    }
}

/// Poll a condition until it holds or the timeout elapses.
async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("Timed out waiting for {}", what);
}

#[tokio::test]
async fn test_new_message_pushed_to_live_receiver_only() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, id_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    let mut ws_a = connect_raw(&addr, &token_a).await;
    next_event(&mut ws_a, "getOnlineUsers").await;
    let mut ws_b = connect_raw(&addr, &token_b).await;
    next_event(&mut ws_b, "getOnlineUsers").await;

    let sent = send_text(&base_url, &token_a, &id_b, "hello bob").await;

    // B receives the full persisted record exactly once
    let pushed = next_event(&mut ws_b, "newMessage").await;
    assert_eq!(pushed["id"], sent["id"]);
    assert_eq!(pushed["senderId"].as_str().unwrap(), id_a);
    assert_eq!(pushed["receiverId"].as_str().unwrap(), id_b);
    assert_eq!(pushed["text"].as_str().unwrap(), "hello bob");

    // The sender's own connection gets no push
    let result = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws_a.next().await {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value["event"] == "newMessage" {
                    return value;
                }
            }
        }
    })
    .await;
    assert!(result.is_err(), "Sender must not receive its own push");
}

#[tokio::test]
async fn test_offline_receiver_gets_message_on_next_fetch() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, id_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    let mut ws_a = connect_raw(&addr, &token_a).await;
    next_event(&mut ws_a, "getOnlineUsers").await;

    // B is offline: creation succeeds, no push is observed anywhere
    let resp = send_text(&base_url, &token_a, &id_b, "are you there?").await;
    assert_eq!(resp["text"].as_str().unwrap(), "are you there?");

    let result = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws_a.next().await {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value["event"] == "newMessage" {
                    return value;
                }
            }
        }
    })
    .await;
    assert!(result.is_err(), "No connection should observe a push");

    // B's later fetch returns the persisted message
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/api/messages/{}", base_url, id_a))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    let messages: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"].as_str().unwrap(), "are you there?");
}

#[tokio::test]
async fn test_session_replaces_online_set_wholesale() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, id_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    let session = ClientSession::connect(&format!("ws://{}/ws?token={}", addr, token_a))
        .await
        .expect("Session should connect");

    wait_for(
        || session.online_users() == vec![id_a.clone()],
        "own presence",
    )
    .await;

    // B comes and goes; the snapshot is replaced each time, never merged
    let ws_b = connect_raw(&addr, &token_b).await;
    wait_for(
        || {
            let mut online = session.online_users();
            online.sort();
            let mut expected = vec![id_a.clone(), id_b.clone()];
            expected.sort();
            online == expected
        },
        "both users online",
    )
    .await;

    drop(ws_b);
    wait_for(
        || session.online_users() == vec![id_a.clone()],
        "B to drop out of the set",
    )
    .await;

    session.close();
}

#[tokio::test]
async fn test_session_appends_only_open_conversation() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, id_b) = signup_user(&base_url, "Bob", "bob@example.com").await;
    let (_token_c, id_c) = signup_user(&base_url, "Carol", "carol@example.com").await;

    let session = ClientSession::connect(&format!("ws://{}/ws?token={}", addr, token_b))
        .await
        .expect("Session should connect");

    // B has Carol's conversation open; a message from Alice must not land in it
    session.open_conversation(&id_c, Vec::new());
    send_text(&base_url, &token_a, &id_b, "from alice").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.conversation().is_empty());

    // With Alice's conversation open, her messages append in order
    session.open_conversation(&id_a, Vec::new());
    send_text(&base_url, &token_a, &id_b, "one").await;
    send_text(&base_url, &token_a, &id_b, "two").await;

    wait_for(|| session.conversation().len() == 2, "two pushed messages").await;
    let texts: Vec<String> = session
        .conversation()
        .iter()
        .map(|m| m.text.clone().unwrap())
        .collect();
    assert_eq!(texts, vec!["one", "two"]);

    session.close();
}

#[tokio::test]
async fn test_session_typing_indicator_follows_peer_events() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, id_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    let mut ws_a = connect_raw(&addr, &token_a).await;
    next_event(&mut ws_a, "getOnlineUsers").await;

    let session = ClientSession::connect(&format!("ws://{}/ws?token={}", addr, token_b))
        .await
        .expect("Session should connect");
    session.open_conversation(&id_a, Vec::new());

    // A starts typing: B's indicator lights up
    ws_a.send(Message::Text(
        json!({"event": "typing", "data": {"to": id_b}}).to_string().into(),
    ))
    .await
    .unwrap();
    wait_for(|| session.peer_typing(), "typing indicator to light up").await;

    // A stops before the extinguish timer: the indicator clears immediately
    ws_a.send(Message::Text(
        json!({"event": "stopTyping", "data": {"to": id_b}}).to_string().into(),
    ))
    .await
    .unwrap();
    wait_for(|| !session.peer_typing(), "typing indicator to clear").await;

    session.close();
}

#[tokio::test]
async fn test_session_keystrokes_reach_the_peer_debounced() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup_user(&base_url, "Alice", "alice@example.com").await;
    let (token_b, id_b) = signup_user(&base_url, "Bob", "bob@example.com").await;

    let mut ws_a = connect_raw(&addr, &token_a).await;
    next_event(&mut ws_a, "getOnlineUsers").await;

    let session = ClientSession::connect(&format!("ws://{}/ws?token={}", addr, token_b))
        .await
        .expect("Session should connect");
    session.open_conversation(&id_a, Vec::new());

    // A burst of keystrokes produces a single typing event at the peer
    for _ in 0..5 {
        session.keystroke();
    }
    let data = next_event(&mut ws_a, "userTyping").await;
    assert_eq!(data["from"].as_str().unwrap(), id_b);

    // Sending the message pre-empts the debounce with a stop event
    session.message_sent();
    let data = next_event(&mut ws_a, "userStopTyping").await;
    assert_eq!(data["from"].as_str().unwrap(), id_b);

    session.close();
}
