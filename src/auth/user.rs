use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,                    // store-assigned, never reused
    pub username: String,           // unique across all users
    #[serde(skip_serializing)]
    pub password_hash: String,      // bcrypt hash, not exposed in JSON
    pub created_at: OffsetDateTime, // creation timestamp
}
