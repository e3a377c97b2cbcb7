use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error};
use uuid::Uuid;

use circle_types::api::Claims;
use circle_types::models::NotificationKind;

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ResultExt};
use crate::extract::ApiPath;
use crate::{convert, notifications};

pub async fn like_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();

    let (row, post_author) = blocking(&state, move |db| {
        let id = post_id.to_string();
        let post = db
            .get_post(&id)
            .or_internal("Failed to like post")?
            .ok_or_else(|| ApiError::not_found("Post not found"))?;

        if db.get_like(&user_id, &id).or_internal("Failed to like post")?.is_some() {
            return Err(ApiError::conflict("Post already liked"));
        }

        let row = db
            .insert_like(&Uuid::new_v4().to_string(), &user_id, &id)
            .map_err(|e| {
                if circle_db::is_constraint_violation(&e) {
                    ApiError::conflict("Post already liked")
                } else {
                    error!("Failed to like post: {}", e);
                    ApiError::internal("Failed to like post")
                }
            })?;
        Ok((row, post.user_id))
    })
    .await?;

    debug!("User {} liked post {}", claims.sub, post_id);
    notifications::record(
        &state,
        convert::parse_uuid(&post_author),
        claims.sub,
        NotificationKind::Like,
        Some(post_id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(convert::like(row))))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();

    blocking(&state, move |db| {
        let id = post_id.to_string();
        if db.get_post(&id).or_internal("Failed to unlike post")?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        if !db.delete_like(&user_id, &id).or_internal("Failed to unlike post")? {
            return Err(ApiError::not_found("Post not liked"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}
