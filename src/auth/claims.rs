use serde::{Deserialize, Serialize};

/// Audience stamped on every session token.
pub const SESSION_AUDIENCE: &str = "convertly-session";

/// JWT payload carried in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,     // user id
    pub name: String, // username
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}
