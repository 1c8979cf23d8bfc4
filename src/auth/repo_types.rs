use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record as stored in the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,          // Argon2 PHC string
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub verify_code: String,
    pub verify_code_expiry: OffsetDateTime,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,  // current refresh token, if logged in
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields required to insert a user. Everything else is store-assigned.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verify_code: String,
    pub verify_code_expiry: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column (`username` or `email`) already holds this value.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
