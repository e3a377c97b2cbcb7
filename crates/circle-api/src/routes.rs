use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tracing::error;

use circle_gateway::connection::{self, FriendDirectory};

use crate::auth::{self, AppState, blocking};
use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::{comments, friends, likes, messages, notifications, posts, users};

/// Every HTTP route plus the WebSocket gateway. Cross-cutting layers (CORS,
/// tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/posts", get(posts::list_posts))
        .route("/api/posts/{id}/comments", get(comments::list_comments))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/session", get(auth::session))
        .route("/api/posts", post(posts::create_post))
        .route("/api/posts/{id}/comments", post(comments::create_comment))
        .route("/api/posts/{id}/like", post(likes::like_post).delete(likes::unlike_post))
        .route("/api/friends", get(friends::list_friends))
        .route("/api/friends/requests", get(friends::list_requests))
        .route("/api/friends/send", post(friends::send_request))
        .route("/api/friends/accept", post(friends::accept_request))
        .route("/api/friends/reject", post(friends::reject_request))
        .route("/api/friends/{user_id}", delete(friends::remove_friend))
        .route("/api/users/search", get(users::search_users))
        .route("/api/users/me", get(auth::session).patch(users::update_me))
        .route("/api/users/{user_id}", get(users::get_profile))
        .route("/api/messages/{user_id}", get(messages::get_conversation).post(messages::send_message))
        .route("/api/conversations", get(messages::list_conversations))
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", post(notifications::mark_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let jwt_secret = state.jwt_secret.clone();
    let directory: Arc<dyn FriendDirectory> = state;
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, jwt_secret, directory))
}

async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, |db| {
        db.ping().map_err(|e| {
            error!("Health check failed: {}", e);
            ApiError::Unavailable
        })
    })
    .await?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
