/// Database row types. These map directly to SQLite rows (or small joins).
/// Distinct from circle-types API models to keep the DB layer independent.

#[derive(Debug)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub username: Option<&'a str>,
    pub name: Option<&'a str>,
    pub password_hash: &'a str,
}

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct PostRow {
    pub id: String,
    pub user_id: String,
    pub author_name: Option<String>,
    pub author_image: Option<String>,
    pub content: String,
    pub image: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
}

#[derive(Debug)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub author_name: Option<String>,
    pub author_image: Option<String>,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct LikeRow {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A friendship from the owner's side, joined with the friend's profile.
#[derive(Debug)]
pub struct FriendRow {
    pub id: String,
    pub friend_id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub username: Option<String>,
}

/// A pending request addressed to the owner, joined with the sender.
#[derive(Debug)]
pub struct PendingRequestRow {
    pub id: String,
    pub sender_id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub username: Option<String>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

#[derive(Debug)]
pub struct ConversationRow {
    pub other_id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub last_message: String,
    pub last_at: String,
    pub unread: i64,
}

#[derive(Debug)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub actor_id: String,
    pub actor_name: Option<String>,
    pub actor_image: Option<String>,
    pub kind: String,
    pub subject_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}
