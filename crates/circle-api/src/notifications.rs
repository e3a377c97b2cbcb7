use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use circle_types::api::Claims;
use circle_types::events::GatewayEvent;
use circle_types::models::NotificationKind;

use crate::auth::{AppState, blocking};
use crate::convert;
use crate::error::{ApiError, ResultExt};
use crate::extract::{ApiPath, ApiQuery};

const MAX_NOTIFICATIONS: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// Store a notification for `recipient` and push it to them if they are
/// connected. Failures are logged and never fail the triggering request.
pub(crate) async fn record(
    state: &AppState,
    recipient: Uuid,
    actor: Uuid,
    kind: NotificationKind,
    subject: Option<Uuid>,
) {
    if recipient == actor {
        return;
    }

    let db = state.clone();
    let inserted = tokio::task::spawn_blocking(move || {
        db.db.insert_notification(
            &Uuid::new_v4().to_string(),
            &recipient.to_string(),
            &actor.to_string(),
            kind.as_str(),
            subject.map(|s| s.to_string()).as_deref(),
        )
    })
    .await;

    let row = match inserted {
        Ok(Ok(row)) => row,
        Ok(Err(e)) => {
            error!("Failed to record {} notification for {}: {}", kind.as_str(), recipient, e);
            return;
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return;
        }
    };

    if let Some(notification) = convert::notification(row) {
        push(state, recipient, GatewayEvent::Notification(notification)).await;
    }
}

/// Deliver a live event; offline users simply miss it.
pub(crate) async fn push(state: &AppState, user_id: Uuid, event: GatewayEvent) {
    if !state.dispatcher.send_to_user(user_id, event).await {
        debug!("User {} is offline, skipping live push", user_id);
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| {
        db.list_notifications(&user_id, query.unread_only, MAX_NOTIFICATIONS)
            .or_internal("Failed to fetch notifications")
    })
    .await?;

    let notifications: Vec<_> = rows.into_iter().filter_map(convert::notification).collect();
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let updated = blocking(&state, move |db| {
        db.mark_notification_read(&notification_id.to_string(), &user_id)
            .or_internal("Failed to update notification")
    })
    .await?;

    if !updated {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let updated = blocking(&state, move |db| {
        db.mark_all_notifications_read(&user_id)
            .or_internal("Failed to update notifications")
    })
    .await?;

    Ok(Json(serde_json::json!({ "updated": updated })))
}
