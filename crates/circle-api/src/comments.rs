use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use circle_types::api::{Claims, CreateCommentRequest};
use circle_types::models::NotificationKind;

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ResultExt};
use crate::extract::{ApiJson, ApiPath};
use crate::posts::validate_content;
use crate::{convert, fallback, notifications};

const MAX_COMMENT_CHARS: usize = 500;

pub async fn list_comments(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = blocking(&state, move |db| {
        let id = post_id.to_string();
        if db.get_post(&id).or_internal("Failed to fetch comments")?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        let rows = db.list_comments(&id).or_internal("Failed to fetch comments")?;
        Ok(rows.into_iter().map(convert::comment).collect::<Vec<_>>())
    })
    .await;

    let comments = fallback::recover(&state, result, || fallback::comments(post_id))?;
    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(&req.content, MAX_COMMENT_CHARS)?;
    let user_id = claims.sub.to_string();

    let (row, post_author) = blocking(&state, move |db| {
        let id = post_id.to_string();
        let post = db
            .get_post(&id)
            .or_internal("Failed to create comment")?
            .ok_or_else(|| ApiError::not_found("Post not found"))?;

        let row = db
            .insert_comment(&Uuid::new_v4().to_string(), &id, &user_id, &content)
            .or_internal("Failed to create comment")?;
        Ok((row, post.user_id))
    })
    .await?;

    let comment = convert::comment(row);
    notifications::record(
        &state,
        convert::parse_uuid(&post_author),
        claims.sub,
        NotificationKind::Comment,
        Some(post_id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(comment)))
}
