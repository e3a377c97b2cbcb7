use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use circle_types::api::{Claims, SendMessageRequest};
use circle_types::events::GatewayEvent;
use circle_types::models::NotificationKind;

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ResultExt};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::posts::{page_size, validate_content};
use crate::{convert, notifications};

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    /// `createdAt` of the oldest message from the previous page.
    pub before: Option<String>,
}

/// POST /api/messages/{userId}. Only friends can message each other.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(recipient): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(&req.content, MAX_MESSAGE_CHARS)?;
    if recipient == claims.sub {
        return Err(ApiError::bad_request("Cannot send a message to yourself"));
    }

    let sender_id = claims.sub.to_string();
    let message_id = Uuid::new_v4();

    let row = blocking(&state, move |db| {
        let recipient_id = recipient.to_string();
        if db.get_user_by_id(&recipient_id).or_internal("Failed to send message")?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }
        if !db.are_friends(&sender_id, &recipient_id).or_internal("Failed to send message")? {
            return Err(ApiError::forbidden("You can only message friends"));
        }
        db.insert_message(&message_id.to_string(), &sender_id, &recipient_id, &content)
            .or_internal("Failed to send message")
    })
    .await?;

    let message = convert::message(row);
    debug!("Message {} from {} to {}", message_id, claims.sub, recipient);

    notifications::push(&state, recipient, GatewayEvent::MessageCreate(message.clone())).await;
    notifications::record(&state, recipient, claims.sub, NotificationKind::Message, Some(message_id)).await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{userId}. Newest first; marks the other side's messages
/// as read.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(other): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let before = convert::cursor(query.before.as_deref())?;
    let limit = page_size(query.limit);
    let user_id = claims.sub.to_string();

    let rows = blocking(&state, move |db| {
        let other_id = other.to_string();
        db.mark_conversation_read(&user_id, &other_id)
            .or_internal("Failed to fetch messages")?;
        db.list_messages(&user_id, &other_id, before.as_deref(), limit)
            .or_internal("Failed to fetch messages")
    })
    .await?;

    let messages: Vec<_> = rows.into_iter().map(convert::message).collect();
    Ok(Json(messages))
}

/// GET /api/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| {
        db.list_conversations(&user_id)
            .or_internal("Failed to fetch conversations")
    })
    .await?;

    let conversations: Vec<_> = rows.into_iter().map(convert::conversation).collect();
    Ok(Json(conversations))
}
