use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::conversions::dto::HistoryEntry;

/// Landing-page form posted to `/auth`.
#[derive(Debug, Deserialize)]
pub struct AuthForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    /// `signup`, anything else logs in.
    #[serde(rename = "type")]
    pub kind: String,
}

impl AuthForm {
    pub fn is_signup(&self) -> bool {
        self.kind == "signup"
    }
}

/// Session user's profile and recent conversions.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub conversions: Vec<HistoryEntry>,
}
