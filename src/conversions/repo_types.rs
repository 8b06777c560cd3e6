use sqlx::FromRow;
use time::PrimitiveDateTime;

/// One completed conversion by a signed-in user.
#[derive(Debug, Clone, FromRow)]
pub struct Conversion {
    pub id: i64,
    pub tool: String,
    pub original_filename: String,
    pub converted_filename: String,
    pub created_at: PrimitiveDateTime,
}
