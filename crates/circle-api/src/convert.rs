//! Row-to-wire conversions. Stored ids and timestamps are trusted; a value
//! that fails to parse is logged and replaced rather than failing the whole
//! response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use circle_db::models::{
    CommentRow, ConversationRow, FriendRow, LikeRow, MessageRow, NotificationRow, PendingRequestRow, PostRow,
};
use circle_types::api::{
    CommentResponse, ConversationSummary, DEFAULT_AVATAR, FriendResponse, LikeRef, LikeResponse, MessageResponse,
    NotificationResponse, PendingRequestResponse, PostCounts, PostResponse, UserSummary,
};
use circle_types::models::NotificationKind;

use crate::error::ApiError;

pub(crate) fn parse_uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|_| {
        warn!("Corrupt UUID in database: {}", raw);
        Uuid::nil()
    })
}

pub(crate) fn parse_time(raw: &str) -> DateTime<Utc> {
    circle_db::parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt timestamp in database: {}", raw);
        DateTime::<Utc>::default()
    })
}

/// Normalise a client-supplied `before` cursor to the stored layout so it
/// compares correctly as text.
pub(crate) fn cursor(before: Option<&str>) -> Result<Option<String>, ApiError> {
    match before.map(str::trim).filter(|b| !b.is_empty()) {
        None => Ok(None),
        Some(raw) => circle_db::parse_timestamp(raw)
            .map(|ts| Some(circle_db::format_timestamp(ts)))
            .ok_or_else(ApiError::invalid_data),
    }
}

pub(crate) fn post(row: PostRow, likes: &[LikeRow]) -> PostResponse {
    let likes = likes
        .iter()
        .filter(|l| l.post_id == row.id)
        .map(|l| LikeRef { user_id: parse_uuid(&l.user_id) })
        .collect();

    PostResponse {
        id: parse_uuid(&row.id),
        content: row.content,
        image: row.image,
        created_at: parse_time(&row.created_at),
        user: UserSummary {
            id: parse_uuid(&row.user_id),
            name: row.author_name,
            image: row.author_image,
        },
        count: PostCounts { likes: row.like_count, comments: row.comment_count },
        likes,
    }
}

pub(crate) fn comment(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: parse_uuid(&row.id),
        content: row.content,
        created_at: parse_time(&row.created_at),
        post_id: parse_uuid(&row.post_id),
        user: UserSummary {
            id: parse_uuid(&row.user_id),
            name: row.author_name,
            image: row.author_image,
        },
    }
}

pub(crate) fn like(row: LikeRow) -> LikeResponse {
    LikeResponse {
        id: parse_uuid(&row.id),
        user_id: parse_uuid(&row.user_id),
        post_id: parse_uuid(&row.post_id),
        created_at: parse_time(&row.created_at),
    }
}

pub(crate) fn friend(row: FriendRow) -> FriendResponse {
    FriendResponse {
        id: parse_uuid(&row.id),
        user_id: parse_uuid(&row.friend_id),
        name: row.name.unwrap_or_else(|| "Unknown".into()),
        image: row.image.unwrap_or_else(|| DEFAULT_AVATAR.into()),
        username: row.username,
    }
}

pub(crate) fn pending_request(row: PendingRequestRow) -> PendingRequestResponse {
    PendingRequestResponse {
        id: parse_uuid(&row.id),
        user_id: parse_uuid(&row.sender_id),
        name: row.name.unwrap_or_else(|| "Unknown".into()),
        image: row.image.unwrap_or_else(|| DEFAULT_AVATAR.into()),
        username: row.username,
        created_at: parse_time(&row.created_at),
    }
}

pub(crate) fn message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id),
        sender_id: parse_uuid(&row.sender_id),
        recipient_id: parse_uuid(&row.recipient_id),
        content: row.content,
        created_at: parse_time(&row.created_at),
        read_at: row.read_at.as_deref().map(parse_time),
    }
}

pub(crate) fn conversation(row: ConversationRow) -> ConversationSummary {
    ConversationSummary {
        user_id: parse_uuid(&row.other_id),
        name: row.name.unwrap_or_else(|| "Unknown".into()),
        image: row.image.unwrap_or_else(|| DEFAULT_AVATAR.into()),
        last_message: row.last_message,
        timestamp: parse_time(&row.last_at),
        unread: row.unread,
    }
}

/// `None` for rows whose kind this build does not know.
pub(crate) fn notification(row: NotificationRow) -> Option<NotificationResponse> {
    let kind = match row.kind.parse::<NotificationKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!("Skipping notification {}: {}", row.id, e);
            return None;
        }
    };

    Some(NotificationResponse {
        id: parse_uuid(&row.id),
        kind,
        actor: UserSummary {
            id: parse_uuid(&row.actor_id),
            name: row.actor_name,
            image: row.actor_image,
        },
        subject_id: row.subject_id.as_deref().map(parse_uuid),
        read: row.read,
        created_at: parse_time(&row.created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_normalises_to_storage_layout() {
        assert_eq!(cursor(None).unwrap(), None);
        assert_eq!(cursor(Some("  ")).unwrap(), None);
        assert_eq!(
            cursor(Some("2024-03-01T12:00:00Z")).unwrap().as_deref(),
            Some("2024-03-01T12:00:00.000Z")
        );
        assert!(cursor(Some("yesterday")).is_err());
    }

    #[test]
    fn test_friend_defaults() {
        let row = FriendRow {
            id: Uuid::new_v4().to_string(),
            friend_id: Uuid::new_v4().to_string(),
            name: None,
            image: None,
            username: None,
        };
        let friend = friend(row);
        assert_eq!(friend.name, "Unknown");
        assert_eq!(friend.image, DEFAULT_AVATAR);
    }

    #[test]
    fn test_corrupt_values_do_not_fail() {
        assert_eq!(parse_uuid("not-a-uuid"), Uuid::nil());
        assert_eq!(parse_time("garbage"), DateTime::<Utc>::default());
    }
}
