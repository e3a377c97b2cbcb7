use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::{error, info};
use uuid::Uuid;

use circle_types::api::{
    ActionResponse, Claims, FriendRequestAccepted, FriendRequestAction, FriendRequestCreated, FriendRequestRejected,
    SendFriendRequest,
};
use circle_types::models::{FriendRequestStatus, NotificationKind};

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ResultExt};
use crate::extract::{ApiJson, ApiPath};
use crate::{convert, fallback, notifications};

/// POST /api/friends/send
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendFriendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver = req.user_id.ok_or_else(|| ApiError::bad_request("User ID is required"))?;
    if receiver == claims.sub {
        return Err(ApiError::bad_request("Cannot send friend request to yourself"));
    }

    let sender_id = claims.sub.to_string();
    let request_id = Uuid::new_v4();

    let row = blocking(&state, move |db| {
        let receiver_id = receiver.to_string();
        if db.get_user_by_id(&receiver_id).or_internal("Failed to send friend request")?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }

        // Any request in either direction blocks a new one, whatever its status
        if db
            .find_request_between(&sender_id, &receiver_id)
            .or_internal("Failed to send friend request")?
            .is_some()
        {
            return Err(ApiError::bad_request("A friend request already exists"));
        }
        if db.are_friends(&sender_id, &receiver_id).or_internal("Failed to send friend request")? {
            return Err(ApiError::bad_request("Already friends"));
        }

        db.create_friend_request(&request_id.to_string(), &sender_id, &receiver_id)
            .map_err(|e| {
                if circle_db::is_constraint_violation(&e) {
                    ApiError::bad_request("A friend request already exists")
                } else {
                    error!("Failed to send friend request: {}", e);
                    ApiError::internal("Failed to send friend request")
                }
            })
    })
    .await?;

    info!("Friend request {} from {} to {}", request_id, claims.sub, receiver);
    notifications::record(&state, receiver, claims.sub, NotificationKind::FriendRequest, Some(request_id)).await;

    Ok(Json(ActionResponse::ok(FriendRequestCreated {
        id: request_id,
        status: row.status,
        created: convert::parse_time(&row.created_at),
    })))
}

/// POST /api/friends/accept
pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<FriendRequestAction>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = req.request_id.ok_or_else(|| ApiError::bad_request("Request ID is required"))?;
    let receiver_id = claims.sub.to_string();
    let friendship_id = Uuid::new_v4();

    let sender = blocking(&state, move |db| {
        let id = request_id.to_string();
        let request = db
            .find_pending_request_for(&id, &receiver_id)
            .or_internal("Failed to accept friend request")?
            .ok_or_else(|| ApiError::not_found("Friend request not found"))?;

        let accepted = db
            .accept_friend_request(
                &id,
                &receiver_id,
                &request.sender_id,
                &friendship_id.to_string(),
                &Uuid::new_v4().to_string(),
            )
            .or_internal("Failed to accept friend request")?;
        if !accepted {
            return Err(ApiError::not_found("Friend request not found"));
        }
        Ok(convert::parse_uuid(&request.sender_id))
    })
    .await?;

    info!("{} accepted friend request {} from {}", claims.sub, request_id, sender);
    notifications::record(&state, sender, claims.sub, NotificationKind::FriendAccept, Some(request_id)).await;

    Ok(Json(ActionResponse::ok(FriendRequestAccepted { request_id, friendship_id })))
}

/// POST /api/friends/reject
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<FriendRequestAction>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = req.request_id.ok_or_else(|| ApiError::bad_request("Request ID is required"))?;
    let receiver_id = claims.sub.to_string();

    blocking(&state, move |db| {
        let rejected = db
            .reject_friend_request(&request_id.to_string(), &receiver_id)
            .or_internal("Failed to reject friend request")?;
        if !rejected {
            return Err(ApiError::not_found("Friend request not found"));
        }
        Ok(())
    })
    .await?;

    Ok(Json(ActionResponse::ok(FriendRequestRejected {
        request_id,
        status: FriendRequestStatus::Rejected.to_string(),
    })))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let result = blocking(&state, move |db| {
        let rows = db.list_friends(&user_id).or_internal("Failed to fetch friends")?;
        Ok(rows.into_iter().map(convert::friend).collect::<Vec<_>>())
    })
    .await;

    Ok(Json(fallback::recover(&state, result, fallback::friends)?))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let result = blocking(&state, move |db| {
        let rows = db
            .list_pending_requests(&user_id)
            .or_internal("Failed to fetch friend requests")?;
        Ok(rows.into_iter().map(convert::pending_request).collect::<Vec<_>>())
    })
    .await;

    Ok(Json(fallback::recover(&state, result, fallback::friend_requests)?))
}

/// DELETE /api/friends/{userId}
pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(friend_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    blocking(&state, move |db| {
        let removed = db
            .remove_friend(&user_id, &friend_id.to_string())
            .or_internal("Failed to remove friend")?;
        if !removed {
            return Err(ApiError::not_found("Friend not found"));
        }
        Ok(())
    })
    .await?;

    info!("{} removed friend {}", claims.sub, friend_id);
    Ok(Json(serde_json::json!({ "success": true })))
}
