use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::auth::{
    dto::{AuthResponse, PublicUser},
    jwt::JwtKeys,
    password::PasswordHasher,
    repo::{RefreshTokenStore, UserStore},
    repo_types::{NewUser, User},
};
use crate::error::{AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Profile fields supplied at registration.
#[derive(Debug, Clone)]
pub struct Profile {
    pub role: String,
    pub name: String,
    pub surname: String,
    pub email: String,
}

/// Register, login, logout and refresh over the user and refresh-token stores.
///
/// Session state lives entirely in the token pair a client holds plus the
/// single refresh-token record per user.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        hasher: PasswordHasher,
        keys: JwtKeys,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            keys,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Issue a pair and make its refresh token the user's only live one.
    async fn open_session(&self, user: &User) -> AppResult<AuthResponse> {
        let public = PublicUser::from(user);
        let pair = self.keys.issue(&public)?;
        self.tokens.save(user.id, &pair.refresh_token).await?;
        Ok(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: public,
        })
    }

    #[instrument(skip(self, profile, password), fields(email = %profile.email))]
    pub async fn register(&self, profile: Profile, password: &str) -> AppResult<AuthResponse> {
        let email = normalize_email(&profile.email);

        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::Validation("Invalid email".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AppError::Validation("Password too short".into()));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::AlreadyRegistered);
        }

        let password_hash = self.hasher.hash(password)?;

        // The store's unique index still decides a concurrent race.
        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                role: profile.role,
                name: profile.name,
                surname: profile.surname,
            })
            .await?;

        let session = self.open_session(&user).await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(session)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthResponse> {
        let email = normalize_email(email);

        let user = match self.users.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                // Same argon2 cost as a wrong password.
                self.hasher.verify_dummy(password);
                warn!(email = %email, "login unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let session = self.open_session(&user).await?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(session)
    }

    /// Always succeeds for a missing or unknown token.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> AppResult<()> {
        self.tokens.remove(refresh_token).await?;
        info!("user logged out");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AppResult<AuthResponse> {
        let refresh_token = match refresh_token {
            Some(t) if !t.is_empty() => t,
            _ => {
                warn!("no refresh token presented");
                return Err(AppError::Unauthorized);
            }
        };

        let claims = self.keys.verify_refresh(refresh_token).map_err(|_| {
            warn!("refresh token failed verification");
            AppError::Unauthorized
        })?;

        let stored = self.tokens.find(refresh_token).await?;
        match stored {
            Some(record)
                if record.user_id == claims.sub && record.refresh_token == refresh_token => {}
            _ => {
                warn!(user_id = %claims.sub, "refresh token not current");
                return Err(AppError::Unauthorized);
            }
        }

        let user = self.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            warn!(user_id = %claims.sub, "refresh for missing user");
            AppError::Unauthorized
        })?;

        let session = self.open_session(&user).await?;
        info!(user_id = %user.id, "session refreshed");
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) fn test_manager() -> (
    SessionManager,
    Arc<crate::auth::memory::MemoryRefreshTokenStore>,
) {
    use crate::auth::memory::{MemoryRefreshTokenStore, MemoryUserStore};

    let tokens = Arc::new(MemoryRefreshTokenStore::default());
    let manager = SessionManager::new(
        Arc::new(MemoryUserStore::default()),
        tokens.clone(),
        crate::auth::password::test_hasher(),
        crate::auth::jwt::test_keys(),
    );
    (manager, tokens)
}
