//! In-memory stores backing service and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo::{RefreshTokenStore, UserStore};
use crate::auth::repo_types::{NewUser, RefreshTokenRecord, User};
use crate::error::{AppError, AppResult};

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::AlreadyRegistered);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            name: new_user.name,
            surname: new_user.surname,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

/// Keyed by user id, like the `refresh_tokens` table.
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    tokens: RwLock<HashMap<Uuid, String>>,
    saves: AtomicUsize,
    removes: AtomicUsize,
}

impl MemoryRefreshTokenStore {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn save(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .write()
            .await
            .insert(user_id, refresh_token.to_string());
        Ok(())
    }

    async fn find(&self, refresh_token: &str) -> AppResult<Option<RefreshTokenRecord>> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .iter()
            .find(|(_, t)| t.as_str() == refresh_token)
            .map(|(user_id, t)| RefreshTokenRecord {
                user_id: *user_id,
                refresh_token: t.clone(),
            }))
    }

    async fn remove(&self, refresh_token: &str) -> AppResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.tokens.write().await.retain(|_, t| t != refresh_token);
        Ok(())
    }
}
