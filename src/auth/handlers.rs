use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderName, StatusCode},
    response::AppendHeaders,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookies,
        dto::{
            ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
            VerifyEmailRequest, VerifyEmailResponse,
        },
        extractors::{AuthUser, ValidJson},
        jwt::JwtKeys,
        services::{Availability, LoginOutcome, Registration, SessionService, TokenPair},
    },
    config::AppConfig,
    error::AuthError,
    state::AppState,
};

type CookieHeaders = AppendHeaders<[(HeaderName, String); 2]>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/check-username/:username", get(check_username))
        .route("/users/register", post(register))
        .route("/users/verify-email", post(verify_email))
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/logout", post(logout))
        .route("/users/change-password", post(change_password))
}

fn token_cookies(keys: &JwtKeys, secure: bool, tokens: &TokenPair) -> CookieHeaders {
    AppendHeaders([
        (
            SET_COOKIE,
            cookies::set(cookies::ACCESS_COOKIE, &tokens.access_token, keys.access_ttl, secure),
        ),
        (
            SET_COOKIE,
            cookies::set(cookies::REFRESH_COOKIE, &tokens.refresh_token, keys.refresh_ttl, secure),
        ),
    ])
}

#[instrument(skip(sessions))]
pub async fn check_username(
    State(sessions): State<SessionService>,
    Path(username): Path<String>,
) -> Result<Json<Availability>, AuthError> {
    Ok(Json(sessions.check_username_available(&username).await?))
}

#[instrument(skip(sessions, payload))]
pub async fn register(
    State(sessions): State<SessionService>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Registration>), AuthError> {
    let registration = sessions
        .register(&payload.username, &payload.name, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

#[instrument(skip(sessions, payload))]
pub async fn verify_email(
    State(sessions): State<SessionService>,
    ValidJson(payload): ValidJson<VerifyEmailRequest>,
) -> Result<Json<VerifyEmailResponse>, AuthError> {
    let outcome = sessions.verify_email(&payload.username, &payload.code).await?;
    Ok(Json(outcome.into()))
}

#[instrument(skip(sessions, config, payload))]
pub async fn login(
    State(sessions): State<SessionService>,
    State(config): State<Arc<AppConfig>>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> Result<(CookieHeaders, Json<LoginOutcome>), AuthError> {
    let outcome = sessions
        .login(payload.username.as_deref(), payload.email.as_deref(), &payload.password)
        .await?;
    let headers = token_cookies(sessions.keys(), config.cookie_secure, &outcome.tokens);
    Ok((headers, Json(outcome)))
}

/// Reads the refresh token from its cookie, or from the body when no
/// cookie is present.
#[instrument(skip_all)]
pub async fn refresh(
    State(sessions): State<SessionService>,
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieHeaders, Json<TokenPair>), AuthError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let presented = cookies::read(&headers, cookies::REFRESH_COOKIE)
        .map(str::to_owned)
        .or(body.refresh_token);

    let tokens = sessions.refresh(presented.as_deref()).await?;
    let headers = token_cookies(sessions.keys(), config.cookie_secure, &tokens);
    Ok((headers, Json(tokens)))
}

#[instrument(skip(sessions, config, user), fields(user_id = %user.id))]
pub async fn logout(
    State(sessions): State<SessionService>,
    State(config): State<Arc<AppConfig>>,
    user: AuthUser,
) -> Result<(StatusCode, CookieHeaders), AuthError> {
    sessions.logout(user.id).await?;
    let cleared = AppendHeaders([
        (SET_COOKIE, cookies::clear(cookies::ACCESS_COOKIE, config.cookie_secure)),
        (SET_COOKIE, cookies::clear(cookies::REFRESH_COOKIE, config.cookie_secure)),
    ]);
    Ok((StatusCode::NO_CONTENT, cleared))
}

#[instrument(skip(sessions, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(sessions): State<SessionService>,
    user: AuthUser,
    ValidJson(payload): ValidJson<ChangePasswordRequest>,
) -> Result<StatusCode, AuthError> {
    sessions
        .change_password(user.id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(sessions, user), fields(user_id = %user.id))]
pub async fn get_me(
    State(sessions): State<SessionService>,
    user: AuthUser,
) -> Json<AuthUser> {
    Json(sessions.current_user(user))
}
