use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::models::NewUser;

pub const SEED_EMAIL: &str = "test@example.com";

impl Database {
    /// Populate an empty database with a test user and two posts. Does
    /// nothing (and returns false) once any user exists.
    pub fn seed_if_empty(&self, password_hash: &str) -> Result<bool> {
        if self.count_users()? > 0 {
            return Ok(false);
        }

        let user_id = Uuid::new_v4().to_string();
        self.create_user(&NewUser {
            id: &user_id,
            email: SEED_EMAIL,
            username: Some("testuser"),
            name: Some("Test User"),
            password_hash,
        })?;
        self.update_profile(&user_id, None, Some("https://via.placeholder.com/150"), None)?;

        self.insert_post(
            &Uuid::new_v4().to_string(),
            &user_id,
            "Hello world! This is my first post.",
            Some("https://via.placeholder.com/500x300"),
        )?;
        self.insert_post(
            &Uuid::new_v4().to_string(),
            &user_id,
            "I love building with Rust and SQLite!",
            None,
        )?;

        info!("Seeded test user {}", SEED_EMAIL);
        Ok(true)
    }
}
