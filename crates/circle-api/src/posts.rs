use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use circle_types::api::{Claims, CreatePostRequest};

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ResultExt};
use crate::extract::{ApiJson, ApiQuery};
use crate::{convert, fallback};

pub(crate) const MAX_POST_CHARS: usize = 2000;
const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    pub user_id: Option<Uuid>,
    /// Cursor-based pagination: the `createdAt` of the oldest post from the
    /// previous page.
    pub before: Option<String>,
    pub limit: Option<u32>,
}

/// Clamp a requested page size, shared with conversation history.
pub(crate) fn page_size(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

/// Trimmed content if it is within `1..=max` characters.
pub(crate) fn validate_content(raw: &str, max: usize) -> Result<String, ApiError> {
    let content = raw.trim();
    let len = content.chars().count();
    if len == 0 || len > max {
        return Err(ApiError::invalid_data());
    }
    Ok(content.to_string())
}

pub async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PostQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let before = convert::cursor(query.before.as_deref())?;
    let limit = page_size(query.limit);
    let author = query.user_id.map(|id| id.to_string());

    let result = blocking(&state, move |db| {
        let rows = db
            .list_posts(author.as_deref(), before.as_deref(), limit)
            .or_internal("Failed to fetch posts")?;

        let post_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let likes = db.get_likes_for_posts(&post_ids).or_internal("Failed to fetch posts")?;

        Ok(rows.into_iter().map(|row| convert::post(row, &likes)).collect::<Vec<_>>())
    })
    .await;

    let posts = fallback::recover(&state, result, fallback::posts)?;
    Ok(Json(posts))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(&req.content, MAX_POST_CHARS)?;
    let image = req.image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());

    let post_id = Uuid::new_v4();
    let user_id = claims.sub.to_string();

    let row = blocking(&state, move |db| {
        let id = post_id.to_string();
        db.insert_post(&id, &user_id, &content, image.as_deref())
            .or_internal("Failed to create post")?;
        db.get_post(&id)
            .or_internal("Failed to create post")?
            .ok_or_else(|| ApiError::internal("Failed to create post"))
    })
    .await?;

    info!("User {} created post {}", claims.sub, post_id);
    Ok((StatusCode::CREATED, Json(convert::post(row, &[]))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_bounds() {
        assert_eq!(validate_content("  hello  ", MAX_POST_CHARS).unwrap(), "hello");
        assert!(validate_content("   ", MAX_POST_CHARS).is_err());
        assert!(validate_content(&"é".repeat(2000), MAX_POST_CHARS).is_ok());
        assert!(validate_content(&"a".repeat(2001), MAX_POST_CHARS).is_err());
    }

    #[test]
    fn test_page_size_clamped() {
        assert_eq!(page_size(None), 50);
        assert_eq!(page_size(Some(0)), 1);
        assert_eq!(page_size(Some(10_000)), 200);
    }
}
