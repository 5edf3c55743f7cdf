//! REST endpoints for conversations: sidebar listing with unseen counts,
//! message history, sending, and seen-state updates.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::accounts::UserResponse;
use crate::auth::middleware::Claims;
use crate::chat::delivery;
use crate::db::models;
use crate::media;
use crate::state::AppState;

/// Maximum message text length (chars).
const MAX_TEXT_LENGTH: usize = 4000;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    /// Base64 data-URL image payload
    pub image: Option<String>,
}

/// Wire form of a persisted message. Field names match the original client
/// protocol, so this doubles as the `newMessage` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub seen: bool,
    pub created_at: String,
}

impl From<models::Message> for MessageResponse {
    fn from(m: models::Message) -> Self {
        Self {
            id: m.id.to_string(),
            sender_id: m.sender_id,
            receiver_id: m.receiver_id,
            text: m.content_text,
            image: m.image_url,
            seen: m.seen,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarResponse {
    pub users: Vec<UserResponse>,
    /// sender id -> count of messages to the caller not yet seen
    pub unseen_messages: HashMap<String, i64>,
}

// --- Handlers ---

/// GET /api/messages/users
/// Every user except the caller, plus per-sender unseen counts for the
/// sidebar badges. JWT auth required.
pub async fn get_sidebar_users(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<SidebarResponse>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, email, full_name, bio, profile_pic, created_at
                 FROM users WHERE id != ?1
                 ORDER BY full_name",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let users: Vec<UserResponse> = stmt
            .query_map(rusqlite::params![user_id], |row| {
                Ok(UserResponse {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    full_name: row.get(2)?,
                    bio: row.get(3)?,
                    profile_pic: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        let mut unseen_stmt = conn
            .prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND seen = 0
                 GROUP BY sender_id",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let unseen_messages: HashMap<String, i64> = unseen_stmt
            .query_map(rusqlite::params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, StatusCode>(SidebarResponse {
            users,
            unseen_messages,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(result))
}

/// GET /api/messages/{id}
/// Both directions of the conversation with user {id}, oldest first.
/// Side effect: messages from {id} to the caller are marked seen.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, sender_id, receiver_id, content_text, image_url, seen, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY id",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let messages: Vec<MessageResponse> = stmt
            .query_map(rusqlite::params![user_id, peer_id], |row| {
                Ok(models::Message {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    receiver_id: row.get(2)?,
                    content_text: row.get(3)?,
                    image_url: row.get(4)?,
                    seen: row.get::<_, i64>(5)? != 0,
                    created_at: row.get(6)?,
                })
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .map(MessageResponse::from)
            .collect();

        // Opening the conversation consumes the unseen state
        conn.execute(
            "UPDATE messages SET seen = 1 WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
            rusqlite::params![peer_id, user_id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(messages)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(messages))
}

/// POST /api/messages/send/{id}
/// Create a message to user {id}. At least one of text/image is required.
/// Delivery to a live connection is best-effort after the durable insert.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(receiver_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), StatusCode> {
    let text = body
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let has_image = body.image.as_deref().is_some_and(|i| !i.is_empty());

    if text.is_none() && !has_image {
        return Err(StatusCode::BAD_REQUEST);
    }
    if text.as_deref().is_some_and(|t| t.len() > MAX_TEXT_LENGTH) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    // Store the image before touching the DB; its URL is what gets persisted.
    let image_url = match body.image.as_deref().filter(|i| !i.is_empty()) {
        Some(data_url) => Some(
            media::store::put_data_url(&state.data_dir, data_url)
                .map_err(|_| StatusCode::BAD_REQUEST)?,
        ),
        None => None,
    };

    let db = state.db.clone();
    let sender_id = claims.sub;
    let rid = receiver_id.clone();
    let image_for_insert = image_url.clone();

    let message = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        // Verify receiver exists
        let receiver_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                rusqlite::params![rid],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !receiver_exists {
            return Err(StatusCode::NOT_FOUND);
        }

        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (sender_id, receiver_id, content_text, image_url, seen, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            rusqlite::params![sender_id, rid, text, image_for_insert, now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let row = models::Message {
            id: conn.last_insert_rowid(),
            sender_id,
            receiver_id: rid,
            content_text: text,
            image_url: image_for_insert,
            seen: false,
            created_at: now,
        };

        Ok(MessageResponse::from(row))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    // Best-effort push to the receiver's live connection
    delivery::deliver_new_message(&state.connections, message.clone());

    Ok((StatusCode::CREATED, Json(message)))
}

/// PUT /api/messages/mark/{id}
/// Mark a single message as seen. JWT auth required; only the message's
/// receiver may mark it.
pub async fn mark_message_seen(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;
    let msg_id: i64 = message_id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let updated = conn
            .execute(
                "UPDATE messages SET seen = 1 WHERE id = ?1 AND receiver_id = ?2",
                rusqlite::params![msg_id, user_id],
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        if updated == 0 {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(StatusCode::OK)
}
