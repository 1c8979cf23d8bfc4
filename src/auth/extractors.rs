use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{cookies, jwt::JwtKeys},
    error::AuthError,
};

/// Caller identity resolved from a valid access token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);

        // Expect "Bearer <token>", falling back to the access cookie
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer ")));
        let token = bearer
            .or_else(|| cookies::read(&parts.headers, cookies::ACCESS_COOKIE))
            .ok_or_else(|| {
                warn!("request without access token");
                AuthError::MissingToken
            })?;

        let claims = keys.verify_access(token.trim())?;
        Ok(AuthUser {
            id: claims.sub,
            username: claims.username,
            name: claims.name,
            email: claims.email,
        })
    }
}

/// `Json` body whose rejections use the `AuthError` envelope.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            warn!(error = %rejection.body_text(), "rejected request body");
            AuthError::from(rejection)
        })?;
        Ok(ValidJson(value))
    }
}
