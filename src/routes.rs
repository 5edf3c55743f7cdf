use axum::{middleware, Json, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;

use crate::auth::accounts;
use crate::auth::middleware::JwtSecret;
use crate::chat::messages;
use crate::media;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on credential endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5) // Allow burst of 5
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Credential routes with rate limiting
    let credential_routes = Router::new()
        .route("/api/auth/signup", axum::routing::post(accounts::signup))
        .route("/api/auth/login", axum::routing::post(accounts::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated account routes (JWT required — Claims extractor validates token)
    let account_routes = Router::new()
        .route("/api/auth/check", axum::routing::get(accounts::check_auth))
        .route(
            "/api/auth/update-profile",
            axum::routing::put(accounts::update_profile),
        );

    // Conversation routes (JWT required).
    // Note: /api/messages/users must not be shadowed by /api/messages/{id};
    // axum resolves static segments before path params.
    let message_routes = Router::new()
        .route(
            "/api/messages/users",
            axum::routing::get(messages::get_sidebar_users),
        )
        .route(
            "/api/messages/{id}",
            axum::routing::get(messages::get_messages),
        )
        .route(
            "/api/messages/send/{id}",
            axum::routing::post(messages::send_message),
        )
        .route(
            "/api/messages/mark/{id}",
            axum::routing::put(messages::mark_message_seen),
        );

    // Stored images (public — URLs are unguessable content hashes)
    let media_routes = Router::new().route("/media/{name}", axum::routing::get(media::get_media));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health checks
    let health = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/api/status", axum::routing::get(status));

    Router::new()
        .merge(credential_routes)
        .merge(account_routes)
        .merge(message_routes)
        .merge(media_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/status — liveness probe in the original client's format
async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "Server is running" }))
}
