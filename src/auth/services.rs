use axum::http::StatusCode;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo_types::User;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Username already exists!")]
    UsernameTaken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error belongs next to the signup form rather than the login form.
    pub fn is_signup_error(&self) -> bool {
        matches!(self, AuthError::UsernameTaken | AuthError::MissingCredentials)
    }
}

pub async fn register(
    db: &SqlitePool,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    let hash = hash_password(password)?;
    match User::create(db, username, email.trim(), &hash).await {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "user registered");
            Ok(user)
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            warn!(%username, "username already registered");
            Err(AuthError::UsernameTaken)
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            Err(AuthError::Internal(e.into()))
        }
    }
}

pub async fn login(db: &SqlitePool, username: &str, password: &str) -> Result<User, AuthError> {
    let Some(user) = User::find_by_username(db, username).await? else {
        warn!(%username, "login for unknown username");
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(%username, user_id = user.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }
    info!(user_id = user.id, %username, "user logged in");
    Ok(user)
}
