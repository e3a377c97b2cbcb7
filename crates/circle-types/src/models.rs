use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a friend request. Rows start `Pending` and move exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown friend request status '{}'", other)),
        }
    }
}

/// How the viewing user relates to another user, as shown next to search
/// results and on profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    None,
    /// Viewer sent a pending request.
    Sent,
    /// Viewer received a pending request.
    Received,
    Friends,
    Accepted,
    Rejected,
    #[serde(rename = "self")]
    Myself,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccept,
    Like,
    Comment,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friend_request",
            Self::FriendAccept => "friend_accept",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Message => "message",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friend_request" => Ok(Self::FriendRequest),
            "friend_accept" => Ok(Self::FriendAccept),
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "message" => Ok(Self::Message),
            other => Err(format!("unknown notification kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_match_storage() {
        for status in [
            FriendRequestStatus::Pending,
            FriendRequestStatus::Accepted,
            FriendRequestStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<FriendRequestStatus>(), Ok(status));
        }
        assert!("friends".parse::<FriendRequestStatus>().is_err());
    }

    #[test]
    fn test_relationship_wire_names() {
        assert_eq!(serde_json::to_string(&RelationshipStatus::Myself).unwrap(), "\"self\"");
        assert_eq!(serde_json::to_string(&RelationshipStatus::Received).unwrap(), "\"received\"");
        assert_eq!(
            serde_json::to_string(&NotificationKind::FriendAccept).unwrap(),
            "\"friend_accept\""
        );
    }
}
