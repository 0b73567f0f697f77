use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, RefreshTokenRecord, User};
use crate::error::{AppError, AppResult};

/// Lookup and creation of user identities.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    /// Fails with `AlreadyRegistered` when the email is taken.
    async fn create(&self, new_user: NewUser) -> AppResult<User>;
}

/// At most one refresh token per user; `save` replaces the previous one.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()>;
    async fn find(&self, refresh_token: &str) -> AppResult<Option<RefreshTokenRecord>>;
    async fn remove(&self, refresh_token: &str) -> AppResult<()>;
}

/// Tokens are stored as SHA-256 digests, never in plain text.
pub(crate) fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, role, name, surname, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, role, name, surname, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, role, name, surname)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, password_hash, role, name, surname, created_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.role)
        .bind(&new_user.name)
        .bind(&new_user.surname)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::AlreadyRegistered)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    db: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn save(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(token_digest(refresh_token))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find(&self, refresh_token: &str) -> AppResult<Option<RefreshTokenRecord>> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT user_id FROM refresh_tokens WHERE token_hash = $1"#,
        )
        .bind(token_digest(refresh_token))
        .fetch_optional(&self.db)
        .await?;

        Ok(user_id.map(|user_id| RefreshTokenRecord {
            user_id,
            refresh_token: refresh_token.to_string(),
        }))
    }

    async fn remove(&self, refresh_token: &str) -> AppResult<()> {
        sqlx::query(r#"DELETE FROM refresh_tokens WHERE token_hash = $1"#)
            .bind(token_digest(refresh_token))
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
