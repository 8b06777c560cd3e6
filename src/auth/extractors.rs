use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::debug;

use super::session::{token_from_headers, SessionKeys};

/// The user behind a valid session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
}

fn session_user(parts: &Parts, keys: &SessionKeys) -> Option<SessionUser> {
    let token = token_from_headers(&parts.headers)?;
    match keys.verify(token) {
        Ok(claims) => Some(SessionUser {
            id: claims.sub,
            username: claims.name,
        }),
        Err(e) => {
            debug!(error = %e, "ignoring invalid session cookie");
            None
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        session_user(parts, &keys).ok_or((StatusCode::UNAUTHORIZED, "Not logged in".to_string()))
    }
}

/// Session user when present; anonymous requests are not rejected.
pub struct MaybeUser(pub Option<SessionUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        Ok(MaybeUser(session_user(parts, &keys)))
    }
}
