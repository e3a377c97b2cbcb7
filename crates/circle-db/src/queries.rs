use crate::Database;
use crate::models::{CommentRow, LikeRow, NewUser, PostRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, email, username, name, image, bio, password, created_at";

// Author name/image via LEFT JOIN, counts via correlated subqueries.
const POST_SELECT: &str = "
    SELECT p.id, p.user_id, u.name, u.image, p.content, p.image,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
           p.created_at
    FROM posts p
    LEFT JOIN users u ON u.id = p.user_id";

const COMMENT_SELECT: &str = "
    SELECT c.id, c.post_id, c.user_id, u.name, u.image, c.content, c.created_at
    FROM comments c
    LEFT JOIN users u ON u.id = c.user_id";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, name, password) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user.id, user.email, user.username, user.name, user.password_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Fields left as `None` keep their current value. Returns false if the
    /// user does not exist.
    pub fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        image: Option<&str>,
        bio: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET name = COALESCE(?2, name), image = COALESCE(?3, image), bio = COALESCE(?4, bio)
                 WHERE id = ?1",
                rusqlite::params![id, name, image, bio],
            )?;
            Ok(changed > 0)
        })
    }

    /// Users other than `viewer_id` whose name or username contains `query`,
    /// or whose email starts with it. Case-insensitive.
    pub fn search_users(&self, viewer_id: &str, query: &str, limit: u32) -> Result<Vec<UserRow>> {
        let escaped = escape_like(&query.to_lowercase());
        let contains = format!("%{}%", escaped);
        let prefix = format!("{}%", escaped);

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id != ?1
                   AND (fold_case(COALESCE(name, '')) LIKE ?2 ESCAPE '\\'
                        OR fold_case(COALESCE(username, '')) LIKE ?2 ESCAPE '\\'
                        OR fold_case(email) LIKE ?3 ESCAPE '\\')
                 ORDER BY COALESCE(name, username, email)
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![viewer_id, contains, prefix, limit], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
    }

    pub fn count_posts_by(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM posts WHERE user_id = ?1", [user_id], |r| r.get(0))?)
        })
    }

    // -- Posts --

    pub fn insert_post(&self, id: &str, user_id: &str, content: &str, image: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, content, image) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, content, image],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.id = ?1");
            conn.query_row(&sql, [id], map_post).optional()
        })
    }

    /// Newest first. `before` is a stored-format timestamp cursor.
    pub fn list_posts(&self, author_id: Option<&str>, before: Option<&str>, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{POST_SELECT}
                 WHERE (?1 IS NULL OR p.user_id = ?1)
                   AND (?2 IS NULL OR p.created_at < ?2)
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![author_id, before, limit], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, id: &str, post_id: &str, user_id: &str, content: &str) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, post_id, user_id, content],
            )?;
            let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
            Ok(conn.query_row(&sql, [id], map_comment)?)
        })
    }

    pub fn list_comments(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.rowid DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Likes --

    pub fn get_like(&self, user_id: &str, post_id: &str) -> Result<Option<LikeRow>> {
        self.with_conn(|conn| query_like(conn, user_id, post_id))
    }

    /// Insert a like and return the stored row. A duplicate surfaces as a
    /// constraint violation (see [`crate::is_constraint_violation`]).
    pub fn insert_like(&self, id: &str, user_id: &str, post_id: &str) -> Result<LikeRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO likes (id, user_id, post_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, user_id, post_id],
            )?;
            query_like(conn, user_id, post_id)?
                .ok_or_else(|| anyhow::anyhow!("Like {} vanished after insert", id))
        })
    }

    /// Returns false if there was nothing to delete.
    pub fn delete_like(&self, user_id: &str, post_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                [user_id, post_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Batch-fetch likes for a set of post IDs.
    pub fn get_likes_for_posts(&self, post_ids: &[String]) -> Result<Vec<LikeRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, user_id, post_id, created_at FROM likes WHERE post_id IN ({}) ORDER BY created_at",
                placeholders(1, post_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(post_ids.iter()), map_like)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    conn.query_row(&sql, [value], map_user).optional()
}

fn query_like(conn: &Connection, user_id: &str, post_id: &str) -> Result<Option<LikeRow>> {
    conn.query_row(
        "SELECT id, user_id, post_id, created_at FROM likes WHERE user_id = ?1 AND post_id = ?2",
        [user_id, post_id],
        map_like,
    )
    .optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        name: row.get(3)?,
        image: row.get(4)?,
        bio: row.get(5)?,
        password: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_name: row.get(2)?,
        author_image: row.get(3)?,
        content: row.get(4)?,
        image: row.get(5)?,
        like_count: row.get(6)?,
        comment_count: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        author_name: row.get(3)?,
        author_image: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_like(row: &Row<'_>) -> rusqlite::Result<LikeRow> {
    Ok(LikeRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// `?start, ?start+1, ...` for an IN list of `count` values.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_constraint_violation;

    fn db_with_users(names: &[&str]) -> (Database, Vec<String>) {
        let db = Database::open_in_memory().unwrap();
        let ids: Vec<String> = names
            .iter()
            .map(|name| {
                let id = uuid::Uuid::new_v4().to_string();
                let email = format!("{}@example.com", name.to_lowercase());
                db.create_user(&NewUser {
                    id: &id,
                    email: &email,
                    username: Some(&name.to_lowercase()),
                    name: Some(name),
                    password_hash: "hash",
                })
                .unwrap();
                id
            })
            .collect();
        (db, ids)
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (db, _) = db_with_users(&["Jane"]);
        let err = db
            .create_user(&NewUser {
                id: "other",
                email: "JANE@example.com",
                username: None,
                name: None,
                password_hash: "hash",
            })
            .unwrap_err();
        assert!(is_constraint_violation(&err));
        assert!(db.get_user_by_email("jane@EXAMPLE.com").unwrap().is_some());
    }

    #[test]
    fn test_search_matches_name_username_and_email_prefix() {
        let (db, ids) = db_with_users(&["Jane", "Janet", "Alex"]);

        let hits = db.search_users(&ids[2], "jan", 20).unwrap();
        assert_eq!(hits.len(), 2);

        // viewer is excluded
        let hits = db.search_users(&ids[0], "jane", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ids[1]);

        // email matches only as a prefix
        assert_eq!(db.search_users(&ids[0], "alex@", 20).unwrap().len(), 1);
        assert!(db.search_users(&ids[0], "example.com", 20).unwrap().is_empty());
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let (db, ids) = db_with_users(&["Émile Zola", "Ölaf", "Jane"]);
        let hits = db.search_users(&ids[2], "émile", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ids[0]);
        assert_eq!(db.search_users(&ids[2], "ÖLAF", 20).unwrap().len(), 1);
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let (db, ids) = db_with_users(&["Jane", "Alex"]);
        assert!(db.search_users(&ids[0], "%%", 20).unwrap().is_empty());
        assert!(db.search_users(&ids[0], "__", 20).unwrap().is_empty());
    }

    #[test]
    fn test_posts_newest_first_with_counts() {
        let (db, ids) = db_with_users(&["Jane", "Alex"]);
        db.insert_post("p1", &ids[0], "first", None).unwrap();
        db.insert_post("p2", &ids[1], "second", Some("/img.png")).unwrap();
        db.insert_like("l1", &ids[1], "p1").unwrap();
        db.insert_comment("c1", "p1", &ids[1], "nice").unwrap();

        let posts = db.list_posts(None, None, 50).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "p2");
        assert_eq!(posts[1].like_count, 1);
        assert_eq!(posts[1].comment_count, 1);
        assert_eq!(posts[1].author_name.as_deref(), Some("Jane"));

        let mine = db.list_posts(Some(&ids[0]), None, 50).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(db.count_posts_by(&ids[0]).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_like_is_constraint_violation() {
        let (db, ids) = db_with_users(&["Jane"]);
        db.insert_post("p1", &ids[0], "hello", None).unwrap();
        db.insert_like("l1", &ids[0], "p1").unwrap();

        let err = db.insert_like("l2", &ids[0], "p1").unwrap_err();
        assert!(is_constraint_violation(&err));

        assert!(db.delete_like(&ids[0], "p1").unwrap());
        assert!(!db.delete_like(&ids[0], "p1").unwrap());
    }

    #[test]
    fn test_likes_batch_fetch() {
        let (db, ids) = db_with_users(&["Jane", "Alex"]);
        db.insert_post("p1", &ids[0], "a", None).unwrap();
        db.insert_post("p2", &ids[0], "b", None).unwrap();
        db.insert_like("l1", &ids[0], "p1").unwrap();
        db.insert_like("l2", &ids[1], "p1").unwrap();
        db.insert_like("l3", &ids[1], "p2").unwrap();

        let likes = db.get_likes_for_posts(&["p1".to_string()]).unwrap();
        assert_eq!(likes.len(), 2);
        assert!(db.get_likes_for_posts(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_update_profile_keeps_unset_fields() {
        let (db, ids) = db_with_users(&["Jane"]);
        assert!(db.update_profile(&ids[0], None, None, Some("hello")).unwrap());
        let user = db.get_user_by_id(&ids[0]).unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Jane"));
        assert_eq!(user.bio.as_deref(), Some("hello"));
        assert!(!db.update_profile("missing", Some("x"), None, None).unwrap());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
