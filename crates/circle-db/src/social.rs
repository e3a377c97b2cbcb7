use crate::Database;
use crate::models::{
    ConversationRow, FriendRequestRow, FriendRow, MessageRow, NotificationRow, PendingRequestRow,
};
use crate::queries::{OptionalExt, placeholders};
use anyhow::Result;
use rusqlite::{Connection, Row};

const REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, content, created_at, read_at";

const NOTIFICATION_SELECT: &str = "
    SELECT n.id, n.user_id, n.actor_id, u.name, u.image, n.kind, n.subject_id, n.read, n.created_at
    FROM notifications n
    LEFT JOIN users u ON u.id = n.actor_id";

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

impl Database {
    // -- Friend requests --

    /// Any request between the two users, whichever direction and status.
    pub fn find_request_between(&self, a: &str, b: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 LIMIT 1"
            );
            conn.query_row(&sql, [a, b], map_request).optional()
        })
    }

    pub fn create_friend_request(&self, id: &str, sender_id: &str, receiver_id: &str) -> Result<FriendRequestRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO friend_requests (id, sender_id, receiver_id, status) VALUES (?1, ?2, ?3, 'pending')",
                [id, sender_id, receiver_id],
            )?;
            query_request(conn, id)?.ok_or_else(|| anyhow::anyhow!("Friend request {} vanished after insert", id))
        })
    }

    /// A pending request with this id addressed to `receiver_id`.
    pub fn find_pending_request_for(&self, id: &str, receiver_id: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests
                 WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'"
            );
            conn.query_row(&sql, [id, receiver_id], map_request).optional()
        })
    }

    /// Mark the request accepted and insert one friendship row per direction,
    /// all in one transaction. `friendship_id` is used for the receiver's row.
    /// Returns false if the request was no longer pending.
    pub fn accept_friend_request(
        &self,
        request_id: &str,
        receiver_id: &str,
        sender_id: &str,
        friendship_id: &str,
        reverse_id: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let updated = tx.execute(
                &format!(
                    "UPDATE friend_requests SET status = 'accepted', updated_at = {NOW}
                     WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'"
                ),
                [request_id, receiver_id],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            tx.execute(
                "INSERT OR IGNORE INTO friends (id, user_id, friend_id) VALUES (?1, ?2, ?3)",
                [friendship_id, receiver_id, sender_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friends (id, user_id, friend_id) VALUES (?1, ?2, ?3)",
                [reverse_id, sender_id, receiver_id],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    /// Returns false if the request was no longer pending.
    pub fn reject_friend_request(&self, request_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE friend_requests SET status = 'rejected', updated_at = {NOW}
                     WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'"
                ),
                [request_id, receiver_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Pending requests addressed to the user, newest first.
    pub fn list_pending_requests(&self, receiver_id: &str) -> Result<Vec<PendingRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fr.id, fr.sender_id, u.name, u.image, u.username, fr.created_at
                 FROM friend_requests fr
                 JOIN users u ON u.id = fr.sender_id
                 WHERE fr.receiver_id = ?1 AND fr.status = 'pending'
                 ORDER BY fr.created_at DESC, fr.rowid DESC",
            )?;
            let rows = stmt
                .query_map([receiver_id], |row| {
                    Ok(PendingRequestRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        name: row.get(2)?,
                        image: row.get(3)?,
                        username: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Requests in either direction between `viewer_id` and any of `others`.
    pub fn requests_among(&self, viewer_id: &str, others: &[String]) -> Result<Vec<FriendRequestRow>> {
        if others.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let list = placeholders(2, others.len());
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests
                 WHERE (sender_id = ?1 AND receiver_id IN ({list}))
                    OR (receiver_id = ?1 AND sender_id IN ({list}))"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(viewer_id).chain(others.iter().map(String::as_str));
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), map_request)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Friends --

    /// True if a friendship row exists in either direction.
    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friends
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                [a, b],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Which of `others` are friends with `viewer_id`, in either direction.
    pub fn friend_ids_among(&self, viewer_id: &str, others: &[String]) -> Result<Vec<String>> {
        if others.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let list = placeholders(2, others.len());
            let sql = format!(
                "SELECT friend_id FROM friends WHERE user_id = ?1 AND friend_id IN ({list})
                 UNION
                 SELECT user_id FROM friends WHERE friend_id = ?1 AND user_id IN ({list})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(viewer_id).chain(others.iter().map(String::as_str));
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_friends(&self, user_id: &str) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.friend_id, u.name, u.image, u.username
                 FROM friends f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY COALESCE(u.name, u.username, u.email)",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FriendRow {
                        id: row.get(0)?,
                        friend_id: row.get(1)?,
                        name: row.get(2)?,
                        image: row.get(3)?,
                        username: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_friends(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM friends WHERE user_id = ?1", [user_id], |r| r.get(0))?)
        })
    }

    /// Delete both friendship rows and the request that created them, so the
    /// pair can send a fresh request later. Returns false if not friends.
    pub fn remove_friend(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute(
                "DELETE FROM friends
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                [a, b],
            )?;
            if removed == 0 {
                return Ok(false);
            }
            tx.execute(
                "DELETE FROM friend_requests
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)",
                [a, b],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, id: &str, sender_id: &str, recipient_id: &str, content: &str) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content) VALUES (?1, ?2, ?3, ?4)",
                [id, sender_id, recipient_id, content],
            )?;
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], map_message)?)
        })
    }

    /// Both directions of a conversation, newest first.
    pub fn list_messages(&self, a: &str, b: &str, before: Option<&str>, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE ((sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1))
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![a, b, before, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything `sender_id` sent to `reader_id` as read.
    pub fn mark_conversation_read(&self, reader_id: &str, sender_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                &format!(
                    "UPDATE messages SET read_at = {NOW}
                     WHERE recipient_id = ?1 AND sender_id = ?2 AND read_at IS NULL"
                ),
                [reader_id, sender_id],
            )?)
        })
    }

    /// One row per counterpart with the latest message, most recent first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.other_id, u.name, u.image, m.content, m.created_at,
                        (SELECT COUNT(*) FROM messages x
                         WHERE x.sender_id = c.other_id AND x.recipient_id = ?1 AND x.read_at IS NULL)
                 FROM (
                     SELECT CASE WHEN sender_id = ?1 THEN recipient_id ELSE sender_id END AS other_id,
                            MAX(rowid) AS last_rowid
                     FROM messages
                     WHERE sender_id = ?1 OR recipient_id = ?1
                     GROUP BY other_id
                 ) c
                 JOIN messages m ON m.rowid = c.last_rowid
                 LEFT JOIN users u ON u.id = c.other_id
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        other_id: row.get(0)?,
                        name: row.get(1)?,
                        image: row.get(2)?,
                        last_message: row.get(3)?,
                        last_at: row.get(4)?,
                        unread: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        actor_id: &str,
        kind: &str,
        subject_id: Option<&str>,
    ) -> Result<NotificationRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, actor_id, kind, subject_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, user_id, actor_id, kind, subject_id],
            )?;
            let sql = format!("{NOTIFICATION_SELECT} WHERE n.id = ?1");
            Ok(conn.query_row(&sql, [id], map_notification)?)
        })
    }

    pub fn list_notifications(&self, user_id: &str, unread_only: bool, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{NOTIFICATION_SELECT}
                 WHERE n.user_id = ?1 AND (?2 = 0 OR n.read = 0)
                 ORDER BY n.created_at DESC, n.rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, unread_only, limit], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if no notification with this id belongs to the user.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(updated > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?)
        })
    }
}

fn query_request(conn: &Connection, id: &str) -> Result<Option<FriendRequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1");
    conn.query_row(&sql, [id], map_request).optional()
}

fn map_request(row: &Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        read_at: row.get(5)?,
    })
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        actor_name: row.get(3)?,
        actor_image: row.get(4)?,
        kind: row.get(5)?,
        subject_id: row.get(6)?,
        read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn db_with_users(n: usize) -> (Database, Vec<String>) {
        let db = Database::open_in_memory().unwrap();
        let ids = (0..n)
            .map(|i| {
                let id = format!("user-{}", i);
                let email = format!("user{}@example.com", i);
                let name = format!("User {}", i);
                db.create_user(&NewUser {
                    id: &id,
                    email: &email,
                    username: None,
                    name: Some(&name),
                    password_hash: "hash",
                })
                .unwrap();
                id
            })
            .collect();
        (db, ids)
    }

    #[test]
    fn test_accept_creates_both_directions() {
        let (db, u) = db_with_users(2);
        db.create_friend_request("r1", &u[0], &u[1]).unwrap();

        assert!(db.find_pending_request_for("r1", &u[0]).unwrap().is_none());
        assert!(db.find_pending_request_for("r1", &u[1]).unwrap().is_some());

        assert!(db.accept_friend_request("r1", &u[1], &u[0], "f1", "f2").unwrap());
        assert!(db.are_friends(&u[0], &u[1]).unwrap());
        assert_eq!(db.list_friends(&u[0]).unwrap()[0].friend_id, u[1]);
        assert_eq!(db.list_friends(&u[1]).unwrap()[0].friend_id, u[0]);

        // second accept is a no-op
        assert!(!db.accept_friend_request("r1", &u[1], &u[0], "f3", "f4").unwrap());
        assert_eq!(db.count_friends(&u[0]).unwrap(), 1);

        let req = db.find_request_between(&u[1], &u[0]).unwrap().unwrap();
        assert_eq!(req.status, "accepted");
    }

    #[test]
    fn test_duplicate_request_hits_constraint() {
        let (db, u) = db_with_users(2);
        db.create_friend_request("r1", &u[0], &u[1]).unwrap();
        assert!(db.find_request_between(&u[1], &u[0]).unwrap().is_some());
        let err = db.create_friend_request("r2", &u[0], &u[1]).unwrap_err();
        assert!(crate::is_constraint_violation(&err));
    }

    #[test]
    fn test_reverse_request_hits_constraint() {
        let (db, u) = db_with_users(2);
        db.create_friend_request("r1", &u[0], &u[1]).unwrap();
        let err = db.create_friend_request("r2", &u[1], &u[0]).unwrap_err();
        assert!(crate::is_constraint_violation(&err));
    }

    #[test]
    fn test_reject_only_pending() {
        let (db, u) = db_with_users(2);
        db.create_friend_request("r1", &u[0], &u[1]).unwrap();
        assert!(!db.reject_friend_request("r1", &u[0]).unwrap());
        assert!(db.reject_friend_request("r1", &u[1]).unwrap());
        assert!(!db.reject_friend_request("r1", &u[1]).unwrap());
        assert!(db.list_pending_requests(&u[1]).unwrap().is_empty());
    }

    #[test]
    fn test_relationship_batch_lookups() {
        let (db, u) = db_with_users(4);
        db.create_friend_request("r1", &u[0], &u[1]).unwrap();
        db.create_friend_request("r2", &u[2], &u[0]).unwrap();
        db.accept_friend_request("r2", &u[0], &u[2], "f1", "f2").unwrap();

        let others: Vec<String> = u[1..].to_vec();
        assert_eq!(db.friend_ids_among(&u[0], &others).unwrap(), vec![u[2].clone()]);
        assert_eq!(db.requests_among(&u[0], &others).unwrap().len(), 2);
        assert!(db.requests_among(&u[3], &others).unwrap().is_empty());
    }

    #[test]
    fn test_remove_friend_clears_request() {
        let (db, u) = db_with_users(2);
        db.create_friend_request("r1", &u[0], &u[1]).unwrap();
        db.accept_friend_request("r1", &u[1], &u[0], "f1", "f2").unwrap();

        assert!(db.remove_friend(&u[0], &u[1]).unwrap());
        assert!(!db.are_friends(&u[0], &u[1]).unwrap());
        assert!(db.find_request_between(&u[0], &u[1]).unwrap().is_none());
        assert!(!db.remove_friend(&u[0], &u[1]).unwrap());
    }

    #[test]
    fn test_conversations_and_read_state() {
        let (db, u) = db_with_users(3);
        db.insert_message("m1", &u[1], &u[0], "hi").unwrap();
        db.insert_message("m2", &u[0], &u[1], "hello").unwrap();
        db.insert_message("m3", &u[2], &u[0], "hey").unwrap();
        db.insert_message("m4", &u[1], &u[0], "how are you").unwrap();

        let convos = db.list_conversations(&u[0]).unwrap();
        assert_eq!(convos.len(), 2);
        assert_eq!(convos[0].other_id, u[1]);
        assert_eq!(convos[0].last_message, "how are you");
        assert_eq!(convos[0].unread, 2);

        assert_eq!(db.mark_conversation_read(&u[0], &u[1]).unwrap(), 2);
        let convos = db.list_conversations(&u[0]).unwrap();
        assert_eq!(convos[0].unread, 0);

        let thread = db.list_messages(&u[0], &u[1], None, 50).unwrap();
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[0].id, "m4");
    }

    #[test]
    fn test_notifications_read_flags() {
        let (db, u) = db_with_users(2);
        let n = db.insert_notification("n1", &u[0], &u[1], "like", Some("p1")).unwrap();
        assert!(!n.read);
        assert_eq!(n.actor_name.as_deref(), Some("User 1"));
        db.insert_notification("n2", &u[0], &u[1], "comment", None).unwrap();

        assert!(!db.mark_notification_read("n1", &u[1]).unwrap());
        assert!(db.mark_notification_read("n1", &u[0]).unwrap());
        assert_eq!(db.list_notifications(&u[0], true, 100).unwrap().len(), 1);
        assert_eq!(db.mark_all_notifications_read(&u[0]).unwrap(), 1);
        assert!(db.list_notifications(&u[0], true, 100).unwrap().is_empty());
        assert_eq!(db.list_notifications(&u[0], false, 100).unwrap().len(), 2);
    }
}
