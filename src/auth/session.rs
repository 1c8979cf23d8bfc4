//! Typed view of a user record.
//!
//! The `users` row keeps flat columns (`is_verified`, `verify_code`,
//! `refresh_token`, ...). On load they are folded into two independent tagged
//! states, `Verification` and `Session`, so callers match on the state
//! instead of inspecting nullable fields.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{repo_types::UserRow, verification::VerificationCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Unverified(VerificationCode),
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    LoggedOut,
    LoggedIn { refresh_token: String },
}

impl Session {
    /// A logged-out session matches nothing.
    pub fn accepts(&self, presented: &str) -> bool {
        match self {
            Session::LoggedOut => false,
            Session::LoggedIn { refresh_token } => refresh_token == presented,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verification: Verification,
    pub session: Session,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_verified(&self) -> bool {
        matches!(self.verification, Verification::Verified)
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let verification = if row.is_verified {
            Verification::Verified
        } else {
            Verification::Unverified(VerificationCode {
                code: row.verify_code,
                expires_at: row.verify_code_expiry,
            })
        };
        let session = match row.refresh_token {
            Some(refresh_token) if !refresh_token.is_empty() => Session::LoggedIn { refresh_token },
            _ => Session::LoggedOut,
        };
        Self {
            id: row.id,
            username: row.username,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            verification,
            session,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Public part of the user returned to the client. No credential,
/// verification or session fields.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            is_verified: user.is_verified(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
