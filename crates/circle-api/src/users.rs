use std::collections::{HashMap, HashSet};

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use uuid::Uuid;

use circle_db::Database;
use circle_db::models::{FriendRequestRow, UserRow};
use circle_types::api::{Claims, ProfileResponse, SearchResult, UpdateProfileRequest};
use circle_types::models::{FriendRequestStatus, RelationshipStatus};

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ResultExt};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{convert, fallback};

const MAX_SEARCH_RESULTS: u32 = 20;
const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// How `viewer_id` relates to another user, given whether they are friends
/// and the request between them (if any). Friendship wins over any request,
/// a pending request is reported from the viewer's side, and a settled
/// request reports its own status.
pub fn resolve_status(
    viewer_id: &str,
    is_friend: bool,
    request: Option<&FriendRequestRow>,
) -> RelationshipStatus {
    if is_friend {
        return RelationshipStatus::Friends;
    }
    let Some(request) = request else {
        return RelationshipStatus::None;
    };

    match request.status.parse::<FriendRequestStatus>() {
        Ok(FriendRequestStatus::Pending) if request.sender_id == viewer_id => RelationshipStatus::Sent,
        Ok(FriendRequestStatus::Pending) => RelationshipStatus::Received,
        Ok(FriendRequestStatus::Accepted) => RelationshipStatus::Accepted,
        Ok(FriendRequestStatus::Rejected) => RelationshipStatus::Rejected,
        Err(e) => {
            tracing::warn!("Friend request {}: {}", request.id, e);
            RelationshipStatus::None
        }
    }
}

/// Name shown for a user who may not have set one.
pub(crate) fn display_name(user: &UserRow) -> String {
    user.name
        .clone()
        .or_else(|| user.username.clone())
        .unwrap_or_else(|| user.email.clone())
}

/// Profile of `target` as seen by `viewer`. The email is only included for
/// the viewer's own profile.
pub(crate) fn load_profile(
    db: &Database,
    viewer: Uuid,
    target: Uuid,
    failure: &str,
) -> Result<Option<ProfileResponse>, ApiError> {
    let target_id = target.to_string();
    let Some(user) = db.get_user_by_id(&target_id).or_internal(failure)? else {
        return Ok(None);
    };

    let post_count = db.count_posts_by(&target_id).or_internal(failure)?;
    let friend_count = db.count_friends(&target_id).or_internal(failure)?;

    let status = if viewer == target {
        RelationshipStatus::Myself
    } else {
        let viewer_id = viewer.to_string();
        let is_friend = db.are_friends(&viewer_id, &target_id).or_internal(failure)?;
        let request = db.find_request_between(&viewer_id, &target_id).or_internal(failure)?;
        resolve_status(&viewer_id, is_friend, request.as_ref())
    };

    Ok(Some(ProfileResponse {
        id: target,
        name: user.name,
        username: user.username,
        email: (viewer == target).then_some(user.email),
        image: user.image,
        bio: user.bio,
        created_at: convert::parse_time(&user.created_at),
        post_count,
        friend_count,
        status,
    }))
}

/// GET /api/users/search?q=
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q.unwrap_or_default().trim().to_string();
    if q.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::bad_request("Search query must be at least 2 characters"));
    }

    let viewer_id = claims.sub.to_string();
    let term = q.clone();
    let result = blocking(&state, move |db| {
        let users = db
            .search_users(&viewer_id, &term, MAX_SEARCH_RESULTS)
            .or_internal("Failed to search users")?;

        let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let friends: HashSet<String> = db
            .friend_ids_among(&viewer_id, &ids)
            .or_internal("Failed to search users")?
            .into_iter()
            .collect();

        // Keyed by the other party; a pending request wins over a settled one
        let mut requests: HashMap<String, FriendRequestRow> = HashMap::new();
        for request in db.requests_among(&viewer_id, &ids).or_internal("Failed to search users")? {
            let other = if request.sender_id == viewer_id {
                request.receiver_id.clone()
            } else {
                request.sender_id.clone()
            };
            let replace = requests
                .get(&other)
                .is_none_or(|existing| existing.status != FriendRequestStatus::Pending.as_str());
            if replace {
                requests.insert(other, request);
            }
        }

        let results = users
            .into_iter()
            .map(|user| {
                let status = resolve_status(&viewer_id, friends.contains(&user.id), requests.get(&user.id));
                SearchResult {
                    id: convert::parse_uuid(&user.id),
                    name: user.name,
                    image: user.image,
                    username: user.username,
                    email: user.email,
                    status,
                }
            })
            .collect::<Vec<_>>();
        Ok(results)
    })
    .await;

    let results = fallback::recover(&state, result, || fallback::search(&q, claims.sub))?;
    Ok(Json(results))
}

/// GET /api/users/{id}
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |db| {
        load_profile(db, claims.sub, user_id, "Failed to fetch profile")?
            .ok_or_else(|| ApiError::not_found("User not found"))
    })
    .await?;

    Ok(Json(profile))
}

/// PATCH /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = bounded(req.name, 100)?;
    let image = bounded(req.image, 2048)?;
    let bio = bounded(req.bio, 500)?;
    if name.as_deref() == Some("") {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }

    let profile = blocking(&state, move |db| {
        let updated = db
            .update_profile(&claims.sub.to_string(), name.as_deref(), image.as_deref(), bio.as_deref())
            .or_internal("Failed to update profile")?;
        if !updated {
            return Err(ApiError::not_found("User not found"));
        }
        load_profile(db, claims.sub, claims.sub, "Failed to update profile")?
            .ok_or_else(|| ApiError::not_found("User not found"))
    })
    .await?;

    Ok(Json(profile))
}

fn bounded(field: Option<String>, max: usize) -> Result<Option<String>, ApiError> {
    match field.map(|f| f.trim().to_string()) {
        Some(f) if f.chars().count() > max => Err(ApiError::invalid_data()),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(sender: &str, receiver: &str, status: &str) -> FriendRequestRow {
        FriendRequestRow {
            id: Uuid::new_v4().to_string(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            status: status.into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_resolve_status_precedence() {
        let pending = request("me", "them", "pending");
        assert_eq!(resolve_status("me", true, Some(&pending)), RelationshipStatus::Friends);
        assert_eq!(resolve_status("me", false, Some(&pending)), RelationshipStatus::Sent);
        assert_eq!(resolve_status("them", false, Some(&pending)), RelationshipStatus::Received);
        assert_eq!(
            resolve_status("me", false, Some(&request("them", "me", "rejected"))),
            RelationshipStatus::Rejected
        );
        assert_eq!(
            resolve_status("me", false, Some(&request("me", "them", "accepted"))),
            RelationshipStatus::Accepted
        );
        assert_eq!(resolve_status("me", false, None), RelationshipStatus::None);
    }

    #[test]
    fn test_bounded_fields() {
        assert_eq!(bounded(Some("  hi ".into()), 5).unwrap().as_deref(), Some("hi"));
        assert!(bounded(Some("toolong".into()), 3).is_err());
        assert_eq!(bounded(None, 3).unwrap(), None);
    }
}
