use serde::{Deserialize, Serialize};

use crate::auth::services::EmailVerification;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for email verification.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub code: String,
}

/// Request body for login. Either `username` or `email` identifies the user.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// Request body for token refresh, used when no cookie is sent.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationFailure {
    Expired,
    Incorrect,
}

/// Response returned by email verification. A negative outcome is still 200.
#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub verified: bool,
    pub reason: Option<VerificationFailure>,
    pub message: &'static str,
}

impl From<EmailVerification> for VerifyEmailResponse {
    fn from(outcome: EmailVerification) -> Self {
        match outcome {
            EmailVerification::Verified => Self {
                verified: true,
                reason: None,
                message: "email verified",
            },
            EmailVerification::Expired => Self {
                verified: false,
                reason: Some(VerificationFailure::Expired),
                message: "verification code has expired",
            },
            EmailVerification::Incorrect => Self {
                verified: false,
                reason: Some(VerificationFailure::Incorrect),
                message: "verification code is incorrect",
            },
        }
    }
}
