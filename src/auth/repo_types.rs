use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                   // unique user ID
    pub email: String,              // normalized (trimmed, lowercase)
    #[serde(skip_serializing)]
    pub password_hash: String,      // Argon2 hash, not exposed in JSON
    pub role: String,               // account type tag
    pub name: String,
    pub surname: String,
    pub created_at: OffsetDateTime, // creation timestamp
}

/// Fields needed to create a user. `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub name: String,
    pub surname: String,
}

/// The single live refresh token held for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub refresh_token: String,
}
