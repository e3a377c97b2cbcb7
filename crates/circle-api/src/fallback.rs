//! Demo fixtures served by read endpoints when the database fails and
//! `demo_fallback` is enabled. Mutations never fall back.

use chrono::{Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use circle_types::api::{
    CommentResponse, DEFAULT_AVATAR, FriendResponse, PendingRequestResponse, PostCounts, PostResponse, SearchResult,
    UserSummary,
};
use circle_types::models::RelationshipStatus;

use crate::auth::AppState;
use crate::error::ApiError;

struct DemoUser {
    id: u128,
    name: &'static str,
    username: &'static str,
    email: &'static str,
    status: RelationshipStatus,
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser { id: 1, name: "Demo User", username: "demo", email: "demo@example.com", status: RelationshipStatus::None },
    DemoUser { id: 2, name: "Jane Smith", username: "janesmith", email: "jane@example.com", status: RelationshipStatus::Friends },
    DemoUser { id: 3, name: "Alex Johnson", username: "alexj", email: "alex@example.com", status: RelationshipStatus::Friends },
    DemoUser { id: 4, name: "Sarah Williams", username: "sarahw", email: "sarah@example.com", status: RelationshipStatus::Received },
    DemoUser { id: 5, name: "David Brown", username: "davidb", email: "david@example.com", status: RelationshipStatus::Received },
];

/// Swap an internal error for fixture data when the fallback is enabled.
/// Client errors (400/401/404...) always pass through.
pub(crate) fn recover<T>(
    state: &AppState,
    result: Result<T, ApiError>,
    fixture: impl FnOnce() -> T,
) -> Result<T, ApiError> {
    match result {
        Err(ApiError::Internal(msg)) if state.demo_fallback => {
            warn!("{}, serving demo data", msg);
            Ok(fixture())
        }
        other => other,
    }
}

fn user(index: usize) -> &'static DemoUser {
    &DEMO_USERS[index]
}

fn summary(u: &DemoUser) -> UserSummary {
    UserSummary {
        id: Uuid::from_u128(u.id),
        name: Some(u.name.to_string()),
        image: Some(DEFAULT_AVATAR.to_string()),
    }
}

pub(crate) fn posts() -> Vec<PostResponse> {
    let now = Utc::now();
    let demo = |id: u128, author: usize, content: &str, hours: i64, likes: i64, comments: i64| PostResponse {
        id: Uuid::from_u128(0x100 + id),
        content: content.to_string(),
        image: None,
        created_at: now - Duration::hours(hours),
        user: summary(user(author)),
        count: PostCounts { likes, comments },
        likes: Vec::new(),
    };

    vec![
        demo(1, 0, "Just set up a fresh project and the build is green on the first try!", 2, 12, 3),
        demo(2, 2, "Spent the afternoon reading about password hashing. Argon2 all the way.", 5, 8, 2),
        demo(3, 0, "Shipped my first deployment today. Smooth from start to finish.", 10, 15, 5),
    ]
}

pub(crate) fn comments(post_id: Uuid) -> Vec<CommentResponse> {
    let now = Utc::now();
    vec![
        CommentResponse {
            id: Uuid::from_u128(0x200 + 1),
            content: "This is a great post! Thanks for sharing.".into(),
            created_at: now - Duration::minutes(30),
            post_id,
            user: summary(user(1)),
        },
        CommentResponse {
            id: Uuid::from_u128(0x200 + 2),
            content: "I learned a lot from this, keep it up!".into(),
            created_at: now - Duration::minutes(120),
            post_id,
            user: summary(user(2)),
        },
    ]
}

pub(crate) fn friends() -> Vec<FriendResponse> {
    DEMO_USERS
        .iter()
        .filter(|u| u.status == RelationshipStatus::Friends)
        .map(|u| FriendResponse {
            id: Uuid::from_u128(0x300 + u.id),
            user_id: Uuid::from_u128(u.id),
            name: u.name.to_string(),
            image: DEFAULT_AVATAR.to_string(),
            username: Some(u.username.to_string()),
        })
        .collect()
}

pub(crate) fn friend_requests() -> Vec<PendingRequestResponse> {
    let now = Utc::now();
    DEMO_USERS
        .iter()
        .filter(|u| u.status == RelationshipStatus::Received)
        .map(|u| PendingRequestResponse {
            id: Uuid::from_u128(0x400 + u.id),
            user_id: Uuid::from_u128(u.id),
            name: u.name.to_string(),
            image: DEFAULT_AVATAR.to_string(),
            username: Some(u.username.to_string()),
            created_at: now - Duration::days(u.id as i64),
        })
        .collect()
}

/// Same matching rules as the live search.
pub(crate) fn search(query: &str, viewer: Uuid) -> Vec<SearchResult> {
    let q = query.to_lowercase();
    DEMO_USERS
        .iter()
        .filter(|u| Uuid::from_u128(u.id) != viewer)
        .filter(|u| {
            u.name.to_lowercase().contains(&q) || u.username.contains(&q) || u.email.starts_with(&q)
        })
        .map(|u| SearchResult {
            id: Uuid::from_u128(u.id),
            name: Some(u.name.to_string()),
            image: Some(DEFAULT_AVATAR.to_string()),
            username: Some(u.username.to_string()),
            email: u.email.to_string(),
            status: u.status,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_fixture_matches_like_live_search() {
        let viewer = Uuid::new_v4();
        let names: Vec<_> = search("SMITH", viewer).into_iter().filter_map(|r| r.name).collect();
        assert_eq!(names, vec!["Jane Smith".to_string()]);

        assert_eq!(search("david@", viewer).len(), 1);
        assert!(search("jane", Uuid::from_u128(2)).is_empty());
    }

    #[test]
    fn test_fixture_relationships_are_consistent() {
        let friend_ids: Vec<_> = friends().iter().map(|f| f.user_id).collect();
        let requester_ids: Vec<_> = friend_requests().iter().map(|r| r.user_id).collect();
        assert!(friend_ids.iter().all(|id| !requester_ids.contains(id)));
        assert_eq!(posts().len(), 3);
    }
}
