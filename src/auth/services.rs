use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::UserStore,
        repo_types::NewUser,
        session::{User, UserView, Verification},
        verification::{CodeCheck, VerificationCode, CODE_TTL},
    },
    error::AuthError,
    notify::Notifier,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Treats blank strings as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: UserView,
    pub verification_email_sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailVerification {
    Verified,
    Expired,
    Incorrect,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Registration, verification, login and token lifecycle for user records.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    notifier: Arc<dyn Notifier>,
}

impl FromRef<AppState> for SessionService {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

async fn hash_blocking(plain: &str) -> Result<String, AuthError> {
    let plain = plain.to_owned();
    let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task failed")??;
    Ok(hash)
}

async fn verify_blocking(plain: &str, hash: &str) -> Result<bool, AuthError> {
    let (plain, hash) = (plain.to_owned(), hash.to_owned());
    let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task failed")?;
    Ok(ok)
}

fn verification_email(user: &User, code: &VerificationCode) -> (String, String) {
    let subject = "Verify your email address".to_string();
    let body = format!(
        "Hi {name},\n\n\
         Your verification code is {code}.\n\
         It expires in {minutes} minutes.\n\n\
         If you did not create an account, you can ignore this message.\n",
        name = user.name,
        code = code.code,
        minutes = CODE_TTL.whole_minutes(),
    );
    (subject, body)
}

impl SessionService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            keys,
            notifier,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip(self))]
    pub async fn check_username_available(&self, username: &str) -> Result<Availability, AuthError> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Ok(Availability { available: false });
        }
        let taken = self.store.find_by_username(&username).await?.is_some();
        Ok(Availability { available: !taken })
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Registration, AuthError> {
        let username = normalize_username(username);
        let name = name.trim().to_string();
        let email = normalize_email(email);

        if username.is_empty() || name.is_empty() || email.is_empty() || password.trim().is_empty() {
            warn!("registration with missing fields");
            return Err(AuthError::Validation(
                "username, name, email and password are required".into(),
            ));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::Validation("invalid email".into()));
        }

        if self.store.find_by_username(&username).await?.is_some()
            || self.store.find_by_email(&email).await?.is_some()
        {
            warn!(username = %username, email = %email, "username or email already registered");
            return Err(AuthError::Conflict(
                "a user with this username or email already exists".into(),
            ));
        }

        let verification = VerificationCode::generate();
        let password_hash = hash_blocking(password).await?;

        let id = self
            .store
            .create(NewUser {
                username,
                name,
                email,
                password_hash,
                verify_code: verification.code.clone(),
                verify_code_expiry: verification.expires_at,
            })
            .await?;

        let user = self.store.find_by_id(id).await?.ok_or_else(|| {
            error!(user_id = %id, "created user could not be read back");
            AuthError::Internal(anyhow::anyhow!("created user {id} could not be read back"))
        })?;
        info!(user_id = %user.id, username = %user.username, "user registered");

        // Delivery failure is reported, never rolled back into the registration.
        let (subject, body) = verification_email(&user, &verification);
        let verification_email_sent = match self.notifier.send(&user.email, &subject, &body).await {
            Ok(receipt) => {
                info!(user_id = %user.id, message_id = %receipt.message_id, "verification email sent");
                true
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "verification email not delivered");
                false
            }
        };

        Ok(Registration {
            user: UserView::from(&user),
            verification_email_sent,
        })
    }

    pub async fn verify_email(&self, username: &str, code: &str) -> Result<EmailVerification, AuthError> {
        self.verify_email_at(username, code, OffsetDateTime::now_utc())
            .await
    }

    #[instrument(skip(self, code, now))]
    pub(crate) async fn verify_email_at(
        &self,
        username: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<EmailVerification, AuthError> {
        if username.trim().is_empty() || code.trim().is_empty() {
            return Err(AuthError::Validation("username and code are required".into()));
        }
        let user = self
            .store
            .find_by_username(&normalize_username(username))
            .await?
            .ok_or(AuthError::NotFound)?;

        let pending = match &user.verification {
            Verification::Verified => return Ok(EmailVerification::Verified),
            Verification::Unverified(pending) => pending,
        };

        match pending.check(code.trim(), now) {
            CodeCheck::Accepted => {
                self.store.mark_verified(user.id).await?;
                info!(user_id = %user.id, "email verified");
                Ok(EmailVerification::Verified)
            }
            CodeCheck::Expired => {
                warn!(user_id = %user.id, "verification code expired");
                Ok(EmailVerification::Expired)
            }
            CodeCheck::Incorrect => {
                warn!(user_id = %user.id, "incorrect verification code");
                Ok(EmailVerification::Incorrect)
            }
        }
    }

    fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let access_token = self.keys.sign_access(user).map_err(|e| {
            error!(error = %e, "jwt sign access failed");
            AuthError::Internal(e)
        })?;
        let refresh_token = self.keys.sign_refresh(user).map_err(|e| {
            error!(error = %e, "jwt sign refresh failed");
            AuthError::Internal(e)
        })?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let (username, email) = (present(username), present(email));
        if username.is_none() && email.is_none() {
            warn!("login without username or email");
            return Err(AuthError::Validation("username or email is required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }

        let lookup = match (username, email) {
            (Some(username), _) => self.store.find_by_username(&normalize_username(username)).await?,
            (None, Some(email)) => self.store.find_by_email(&normalize_email(email)).await?,
            (None, None) => None,
        };
        let user = lookup.ok_or_else(|| {
            warn!("login for unknown user");
            AuthError::NotFound
        })?;

        if !verify_blocking(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_pair(&user)?;
        self.store
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        info!(user_id = %user.id, username = %user.username, "user logged in");
        Ok(LoginOutcome {
            user: UserView::from(&user),
            tokens,
        })
    }

    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.set_refresh_token(user_id, None).await?;
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    #[instrument(skip(self, presented))]
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, AuthError> {
        let token = present(presented).ok_or(AuthError::MissingToken)?;
        let claims = self.keys.verify_refresh(token)?;

        let user = self.store.find_by_id(claims.sub).await?.ok_or_else(|| {
            warn!(user_id = %claims.sub, "refresh token for unknown user");
            AuthError::InvalidToken
        })?;

        if !user.session.accepts(token) {
            warn!(user_id = %user.id, "refresh token is not the current one");
            return Err(AuthError::StaleToken);
        }

        let tokens = self.issue_pair(&user)?;
        self.store
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        info!(user_id = %user.id, "refresh token rotated");
        Ok(tokens)
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if old_password.is_empty() || new_password.trim().is_empty() {
            return Err(AuthError::Validation(
                "old_password and new_password are required".into(),
            ));
        }
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !verify_blocking(old_password, &user.password_hash).await? {
            warn!(user_id = %user.id, "change password with wrong old password");
            return Err(AuthError::InvalidCredentials);
        }

        let hash = hash_blocking(new_password).await?;
        self.store.set_password_hash(user.id, &hash).await?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// The caller's identity comes entirely from the verified access token.
    pub fn current_user(&self, caller: AuthUser) -> AuthUser {
        debug!(user_id = %caller.id, "current user resolved from access token");
        caller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{repo::MemoryUserStore, repo_types::StoreError, session::Session},
        config::JwtConfig,
        notify::testing::RecordingNotifier,
    };
    use time::Duration;

    struct Harness {
        service: SessionService,
        store: Arc<MemoryUserStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            access_ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn harness_with(notifier: RecordingNotifier) -> Harness {
        let store = Arc::new(MemoryUserStore::new());
        let notifier = Arc::new(notifier);
        let service = SessionService::new(store.clone(), keys(), notifier.clone());
        Harness {
            service,
            store,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingNotifier::default())
    }

    async fn register_alice(h: &Harness) -> Registration {
        h.service
            .register("alice", "Alice A", "alice@x.com", "Secret1!")
            .await
            .expect("register alice")
    }

    async fn pending_code(h: &Harness, username: &str) -> VerificationCode {
        let user = h.store.find_by_username(username).await.unwrap().unwrap();
        match user.verification {
            Verification::Unverified(code) => code,
            Verification::Verified => panic!("user already verified"),
        }
    }

    async fn stored(h: &Harness, id: Uuid) -> User {
        h.store.find_by_id(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn register_hashes_password_and_hides_secrets() {
        let h = harness();
        let reg = register_alice(&h).await;
        assert!(!reg.user.is_verified);
        assert!(reg.verification_email_sent);

        let user = stored(&h, reg.user.id).await;
        assert_ne!(user.password_hash, "Secret1!");
        assert!(verify_password("Secret1!", &user.password_hash));

        let json = serde_json::to_value(&reg).unwrap();
        let user_json = json["user"].as_object().unwrap();
        assert!(!user_json.contains_key("password"));
        assert!(!user_json.contains_key("password_hash"));
        assert!(!user_json.contains_key("verify_code"));
        assert!(!user_json.contains_key("refresh_token"));
    }

    #[tokio::test]
    async fn register_normalizes_username_and_email() {
        let h = harness();
        let reg = h
            .service
            .register("  Alice ", " Alice A ", " Alice@X.com ", "Secret1!")
            .await
            .unwrap();
        assert_eq!(reg.user.username, "alice");
        assert_eq!(reg.user.name, "Alice A");
        assert_eq!(reg.user.email, "alice@x.com");
    }

    #[tokio::test]
    async fn register_rejects_blank_fields() {
        let h = harness();
        for (u, n, e, p) in [
            ("", "Alice", "a@x.com", "pw"),
            ("alice", "  ", "a@x.com", "pw"),
            ("alice", "Alice", "", "pw"),
            ("alice", "Alice", "a@x.com", "   "),
        ] {
            let err = h.service.register(u, n, e, p).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "{u:?} {n:?} {e:?} {p:?}");
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicates_case_insensitively() {
        let h = harness();
        register_alice(&h).await;

        let err = h
            .service
            .register("ALICE", "Other", "other@x.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        let err = h
            .service
            .register("bob", "Bob", "alice@x.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn username_availability() {
        let h = harness();
        assert!(h.service.check_username_available("alice").await.unwrap().available);
        register_alice(&h).await;
        assert!(!h.service.check_username_available("alice").await.unwrap().available);
        assert!(!h.service.check_username_available(" Alice ").await.unwrap().available);
        assert!(!h.service.check_username_available("   ").await.unwrap().available);
    }

    #[tokio::test]
    async fn registration_sends_code_by_email() {
        let h = harness();
        register_alice(&h).await;
        let code = pending_code(&h, "alice").await;
        let mail = h.notifier.last().expect("mail sent");
        assert_eq!(mail.to, "alice@x.com");
        assert!(mail.body.contains(&code.code));
    }

    #[tokio::test]
    async fn delivery_failure_does_not_undo_registration() {
        let h = harness_with(RecordingNotifier::failing());
        let reg = register_alice(&h).await;
        assert!(!reg.verification_email_sent);
        assert!(h.store.find_by_id(reg.user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn verify_email_walkthrough() {
        let h = harness();
        let reg = register_alice(&h).await;
        let code = pending_code(&h, "alice").await;
        let wrong = if code.code == "000000" { "111111" } else { "000000" };

        let outcome = h.service.verify_email("alice", wrong).await.unwrap();
        assert_eq!(outcome, EmailVerification::Incorrect);
        assert!(!stored(&h, reg.user.id).await.is_verified());

        let outcome = h.service.verify_email("alice", &code.code).await.unwrap();
        assert_eq!(outcome, EmailVerification::Verified);
        assert!(stored(&h, reg.user.id).await.is_verified());

        // resubmission never un-verifies
        let outcome = h.service.verify_email("alice", wrong).await.unwrap();
        assert_eq!(outcome, EmailVerification::Verified);
        assert!(stored(&h, reg.user.id).await.is_verified());
    }

    #[tokio::test]
    async fn expired_code_never_verifies() {
        let h = harness();
        let reg = register_alice(&h).await;
        let code = pending_code(&h, "alice").await;

        let late = code.expires_at + Duration::seconds(1);
        let outcome = h.service.verify_email_at("alice", &code.code, late).await.unwrap();
        assert_eq!(outcome, EmailVerification::Expired);
        assert!(!stored(&h, reg.user.id).await.is_verified());

        let outcome = h
            .service
            .verify_email_at("alice", &code.code, code.expires_at)
            .await
            .unwrap();
        assert_eq!(outcome, EmailVerification::Expired);
    }

    #[tokio::test]
    async fn verify_email_for_unknown_user_is_not_found() {
        let h = harness();
        let err = h.service.verify_email("ghost", "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn login_by_username_or_email_stores_refresh_token() {
        let h = harness();
        let reg = register_alice(&h).await;

        let by_name = h.service.login(Some("alice"), None, "Secret1!").await.unwrap();
        assert_eq!(by_name.user.id, reg.user.id);
        assert!(stored(&h, reg.user.id).await.session.accepts(&by_name.tokens.refresh_token));

        let by_email = h
            .service
            .login(None, Some("ALICE@x.com"), "Secret1!")
            .await
            .unwrap();
        let user = stored(&h, reg.user.id).await;
        assert!(user.session.accepts(&by_email.tokens.refresh_token));
        assert!(!user.session.accepts(&by_name.tokens.refresh_token));

        let claims = h.service.keys().verify_access(&by_email.tokens.access_token).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn login_failures_follow_precedence() {
        let h = harness();
        let reg = register_alice(&h).await;
        let first = h.service.login(Some("alice"), None, "Secret1!").await.unwrap();

        let err = h.service.login(None, Some("  "), "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = h.service.login(Some("bob"), None, "Secret1!").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));

        let err = h.service.login(Some("alice"), None, "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(stored(&h, reg.user.id).await.session.accepts(&first.tokens.refresh_token));
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let h = harness();
        register_alice(&h).await;
        let login = h.service.login(Some("alice"), None, "Secret1!").await.unwrap();
        let old = login.tokens.refresh_token;

        let rotated = h.service.refresh(Some(&old)).await.unwrap();
        assert_ne!(rotated.refresh_token, old);

        let err = h.service.refresh(Some(&old)).await.unwrap_err();
        assert!(matches!(err, AuthError::StaleToken));

        let again = h.service.refresh(Some(&rotated.refresh_token)).await.unwrap();
        assert_ne!(again.refresh_token, rotated.refresh_token);
    }

    #[tokio::test]
    async fn refresh_rejects_missing_and_forged_tokens() {
        let h = harness();
        assert!(matches!(h.service.refresh(None).await, Err(AuthError::MissingToken)));
        assert!(matches!(h.service.refresh(Some(" ")).await, Err(AuthError::MissingToken)));
        assert!(matches!(
            h.service.refresh(Some("forged.token.value")).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_fails() {
        let h = harness();
        let reg = register_alice(&h).await;
        let login = h.service.login(Some("alice"), None, "Secret1!").await.unwrap();
        assert!(h.store.delete(reg.user.id).await.unwrap());

        let err = h.service.refresh(Some(&login.tokens.refresh_token)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn logout_invalidates_refresh_token() {
        let h = harness();
        let reg = register_alice(&h).await;
        let login = h.service.login(Some("alice"), None, "Secret1!").await.unwrap();

        h.service.logout(reg.user.id).await.unwrap();
        h.service.logout(reg.user.id).await.unwrap();
        assert_eq!(stored(&h, reg.user.id).await.session, Session::LoggedOut);

        let err = h.service.refresh(Some(&login.tokens.refresh_token)).await.unwrap_err();
        assert!(matches!(err, AuthError::StaleToken));
    }

    #[tokio::test]
    async fn change_password_requires_old_password() {
        let h = harness();
        let reg = register_alice(&h).await;
        let before = stored(&h, reg.user.id).await.password_hash;

        let err = h
            .service
            .change_password(reg.user.id, "wrong", "NewSecret2!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let user = stored(&h, reg.user.id).await;
        assert_eq!(user.password_hash, before);
        assert!(verify_password("Secret1!", &user.password_hash));

        h.service
            .change_password(reg.user.id, "Secret1!", "NewSecret2!")
            .await
            .unwrap();
        let user = stored(&h, reg.user.id).await;
        assert!(verify_password("NewSecret2!", &user.password_hash));
        assert!(!verify_password("Secret1!", &user.password_hash));
    }

    #[tokio::test]
    async fn session_writes_do_not_rehash_password() {
        let h = harness();
        let reg = register_alice(&h).await;
        let before = stored(&h, reg.user.id).await.password_hash;

        let login = h.service.login(Some("alice"), None, "Secret1!").await.unwrap();
        h.service.refresh(Some(&login.tokens.refresh_token)).await.unwrap();
        h.service.logout(reg.user.id).await.unwrap();

        assert_eq!(stored(&h, reg.user.id).await.password_hash, before);
    }

    /// A store whose lookups never find anything; `create` either reports a
    /// late unique violation or "succeeds" without persisting.
    struct LossyStore {
        duplicate_on_create: bool,
    }

    #[async_trait::async_trait]
    impl UserStore for LossyStore {
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_by_username(&self, _username: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn create(&self, _user: NewUser) -> Result<Uuid, StoreError> {
            if self.duplicate_on_create {
                Err(StoreError::Duplicate("email"))
            } else {
                Ok(Uuid::new_v4())
            }
        }
        async fn mark_verified(&self, _id: Uuid) -> Result<(), StoreError> {
            Ok(())
        }
        async fn set_refresh_token(&self, _id: Uuid, _token: Option<&str>) -> Result<(), StoreError> {
            Ok(())
        }
        async fn set_password_hash(&self, _id: Uuid, _hash: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete(&self, _id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn lossy_service(duplicate_on_create: bool) -> (SessionService, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = SessionService::new(
            Arc::new(LossyStore { duplicate_on_create }),
            keys(),
            notifier.clone(),
        );
        (service, notifier)
    }

    #[tokio::test]
    async fn unique_violation_at_insert_is_conflict() {
        let (service, notifier) = lossy_service(true);
        let err = service
            .register("alice", "Alice A", "alice@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(ref m) if m.contains("email")));
        assert!(notifier.last().is_none());
    }

    #[tokio::test]
    async fn unreadable_created_user_is_internal() {
        let (service, notifier) = lossy_service(false);
        let err = service
            .register("alice", "Alice A", "alice@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(notifier.last().is_none());
    }

    #[tokio::test]
    async fn blank_verification_fields_are_rejected() {
        let h = harness();
        register_alice(&h).await;
        let err = h.service.verify_email("alice", "  ").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        let err = h.service.verify_email("", "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn change_password_rejects_blank_fields() {
        let h = harness();
        let reg = register_alice(&h).await;
        let before = stored(&h, reg.user.id).await.password_hash;

        let err = h
            .service
            .change_password(reg.user.id, "", "NewSecret2!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        let err = h
            .service
            .change_password(reg.user.id, "Secret1!", " ")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(stored(&h, reg.user.id).await.password_hash, before);
    }
}
