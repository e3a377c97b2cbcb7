use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use circle_db::Database;
use circle_db::models::NewUser;
use circle_gateway::connection::FriendDirectory;
use circle_gateway::dispatcher::Dispatcher;
use circle_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ResultExt};
use crate::extract::ApiJson;
use crate::users;

/// Session tokens live this long; there is no refresh.
pub const SESSION_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    /// Serve fixture data from read endpoints when the database fails.
    pub demo_fallback: bool,
}

impl FriendDirectory for AppStateInner {
    fn friends_of(&self, user_id: Uuid) -> Vec<Uuid> {
        match self.db.list_friends(&user_id.to_string()) {
            Ok(rows) => rows.iter().filter_map(|r| r.friend_id.parse().ok()).collect(),
            Err(e) => {
                error!("Failed to load friends of {}: {}", user_id, e);
                Vec::new()
            }
        }
    }
}

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("Internal server error")
        })?
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    if email.len() > 254 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    let password_chars = req.password.chars().count();
    if !(8..=128).contains(&password_chars) {
        return Err(ApiError::bad_request("Password must be between 8 and 128 characters"));
    }
    let username = req.username.as_deref().map(str::trim).filter(|u| !u.is_empty()).map(String::from);
    if let Some(username) = &username {
        if !valid_username(username) {
            return Err(ApiError::bad_request(
                "Username must be 3-32 characters of letters, digits or underscores",
            ));
        }
    }
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(String::from);
    if name.as_ref().is_some_and(|n| n.chars().count() > 100) {
        return Err(ApiError::bad_request("Name is too long (max 100 characters)"));
    }

    let user_id = Uuid::new_v4();
    let display = name.clone().or_else(|| username.clone()).unwrap_or_else(|| email.clone());

    blocking(&state, move |db| {
        if db.get_user_by_email(&email).or_internal("Failed to register")?.is_some() {
            return Err(ApiError::conflict("Email already registered"));
        }
        if let Some(username) = &username {
            if db.get_user_by_username(username).or_internal("Failed to register")?.is_some() {
                return Err(ApiError::conflict("Username already taken"));
            }
        }

        let password_hash = hash_password(&req.password).or_internal("Failed to register")?;

        db.create_user(&NewUser {
            id: &user_id.to_string(),
            email: &email,
            username: username.as_deref(),
            name: name.as_deref(),
            password_hash: &password_hash,
        })
        .map_err(|e| {
            if circle_db::is_constraint_violation(&e) {
                ApiError::conflict("Email or username already registered")
            } else {
                error!("Failed to register: {}", e);
                ApiError::internal("Failed to register")
            }
        })
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &display).or_internal("Failed to register")?;
    info!("Registered user {}", user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();

    let user = blocking(&state, move |db| {
        let user = db
            .get_user_by_email(&email)
            .or_internal("Failed to sign in")?
            .ok_or_else(invalid_credentials)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password).or_internal("Failed to sign in")?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| invalid_credentials())?;

        Ok(user)
    })
    .await?;

    let user_id: Uuid = user.id.parse().or_internal("Failed to sign in")?;
    let name = users::display_name(&user);
    let token = create_token(&state.jwt_secret, user_id, &name).or_internal("Failed to sign in")?;

    Ok(Json(LoginResponse { user_id, name, token }))
}

/// GET /api/auth/session: the signed-in user's own profile.
pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(&state, move |db| {
        users::load_profile(db, claims.sub, claims.sub, "Failed to load session")?
            .ok_or(ApiError::Unauthorized)
    })
    .await?;

    Ok(Json(profile))
}

/// Argon2id hash in PHC string format.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn invalid_credentials() -> ApiError {
    ApiError::InvalidCredentials
}

fn valid_username(username: &str) -> bool {
    (3..=32).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
