use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    repo_types::{NewUser, StoreError, UserRow},
    session::User,
};

/// Persistence for user records. Uniqueness of `username` and `email` is
/// enforced here and reported as [`StoreError::Duplicate`].
///
/// Every update touches only the columns it names, so saving a refresh
/// token never rewrites the password hash.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError>;
    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError>;
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

const USER_COLUMNS: &str = "id, username, name, email, password_hash, is_verified, \
     verify_code, verify_code_expiry, refresh_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_by(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(User::from))
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(c) if c.contains("username") => "username",
                _ => "email",
            };
            return StoreError::Duplicate(field);
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_by("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_by("email", email).await
    }

    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (username, name, email, password_hash, verify_code, verify_code_expiry)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.verify_code)
        .bind(user.verify_code_expiry)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE users SET is_verified = TRUE, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE users SET refresh_token = $1, updated_at = now() WHERE id = $2"#)
            .bind(token)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2"#)
            .bind(password_hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Process-local store. Used when running without Postgres and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: RwLock<HashMap<Uuid, UserRow>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: Uuid, apply: F)
    where
        F: FnOnce(&mut UserRow) + Send,
    {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&id) {
            apply(row);
            row.updated_at = OffsetDateTime::now_utc();
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned().map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.username == username)
            .cloned()
            .map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.email == email)
            .cloned()
            .map(User::from))
    }

    async fn create(&self, user: NewUser) -> Result<Uuid, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|r| r.username == user.username) {
            return Err(StoreError::Duplicate("username"));
        }
        if rows.values().any(|r| r.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        rows.insert(
            id,
            UserRow {
                id,
                username: user.username,
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                is_verified: false,
                verify_code: user.verify_code,
                verify_code_expiry: user.verify_code_expiry,
                refresh_token: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        self.update(id, |row| row.is_verified = true).await;
        Ok(())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        let token = token.map(str::to_owned);
        self.update(id, move |row| row.refresh_token = token).await;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let hash = password_hash.to_owned();
        self.update(id, move |row| row.password_hash = hash).await;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}
