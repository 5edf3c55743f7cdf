//! Account endpoints: signup, login, token check, and profile updates.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::auth::{jwt, password};
use crate::db::models;
use crate::media;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub bio: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    /// Base64 data-URL image payload
    pub profile_pic: Option<String>,
}

/// Public view of a user record — never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub bio: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
}

impl From<models::User> for UserResponse {
    fn from(u: models::User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            bio: u.bio,
            profile_pic: u.profile_pic,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

/// POST /api/auth/signup
/// Create a new account. All fields required; email must be unique.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let bio = req.bio.trim().to_string();

    if full_name.is_empty() || email.is_empty() || req.password.is_empty() || bio.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "All fields are required".to_string()));
    }
    if !email.contains('@') {
        return Err((StatusCode::BAD_REQUEST, "Invalid email address".to_string()));
    }

    let password_hash =
        password::hash_password(&req.password).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let db = state.db.clone();
    let jwt_secret = state.jwt_secret.clone();

    let response = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        // Check email uniqueness
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| row.get(0),
            )
            .ok();
        if existing.is_some() {
            return Err((StatusCode::CONFLICT, "Account already exists".to_string()));
        }

        let user_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (id, email, password_hash, full_name, bio, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![user_id, email, password_hash, full_name, bio, now, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert user: {}", e)))?;

        let token = jwt::issue_access_token(&jwt_secret, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("JWT: {}", e)))?;

        Ok(AuthResponse {
            token,
            user: UserResponse {
                id: user_id,
                email,
                full_name,
                bio,
                profile_pic: None,
                created_at: now,
            },
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(user_id = %response.user.id, "User registered");

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
/// Verify credentials and issue a token. Unknown email and wrong password
/// are indistinguishable to the caller.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = req.email.trim().to_lowercase();
    let db = state.db.clone();
    let jwt_secret = state.jwt_secret.clone();

    let response = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let row: Option<models::User> = conn
            .query_row(
                "SELECT id, email, password_hash, full_name, bio, profile_pic, created_at, updated_at
                 FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| {
                    Ok(models::User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                        full_name: row.get(3)?,
                        bio: row.get(4)?,
                        profile_pic: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .ok();

        let Some(user) = row else {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            ));
        };

        if !password::verify_password(&req.password, &user.password_hash) {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            ));
        }

        let token = jwt::issue_access_token(&jwt_secret, &user.id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("JWT: {}", e)))?;

        Ok(AuthResponse {
            token,
            user: UserResponse::from(user),
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(user_id = %response.user.id, "User logged in");

    Ok(Json(response))
}

/// GET /api/auth/check
/// Return the authenticated user's current record.
pub async fn check_auth(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UserResponse>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        load_user(&conn, &user_id)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(user))
}

/// PUT /api/auth/update-profile
/// Update full name, bio, and/or profile picture. A profile picture arrives
/// as a data-URL and is persisted through the media store.
pub async fn update_profile(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, StatusCode> {
    let profile_pic_url = match req.profile_pic.as_deref().filter(|p| !p.is_empty()) {
        Some(data_url) => Some(
            media::store::put_data_url(&state.data_dir, data_url)
                .map_err(|_| StatusCode::BAD_REQUEST)?,
        ),
        None => None,
    };

    let db = state.db.clone();
    let user_id = claims.sub;
    let full_name = req.full_name.map(|n| n.trim().to_string());
    let bio = req.bio.map(|b| b.trim().to_string());

    let user = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE users SET
                full_name = COALESCE(?1, full_name),
                bio = COALESCE(?2, bio),
                profile_pic = COALESCE(?3, profile_pic),
                updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![full_name, bio, profile_pic_url, now, user_id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        load_user(&conn, &user_id)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(Json(user))
}

/// Fetch a user row as its public view.
fn load_user(conn: &rusqlite::Connection, user_id: &str) -> Result<UserResponse, StatusCode> {
    conn.query_row(
        "SELECT id, email, full_name, bio, profile_pic, created_at FROM users WHERE id = ?1",
        rusqlite::params![user_id],
        |row| {
            Ok(UserResponse {
                id: row.get(0)?,
                email: row.get(1)?,
                full_name: row.get(2)?,
                bio: row.get(3)?,
                profile_pic: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .map_err(|_| StatusCode::NOT_FOUND)
}
