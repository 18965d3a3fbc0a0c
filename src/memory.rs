//! In-memory storage backend
//!
//! Backs the repositories with `DashMap`s. Suitable for tests, examples,
//! and single-process deployments that accept losing state on restart.
//! Atomicity of `mark_used` comes from `DashMap`'s entry-level locking:
//! `get_mut` holds the shard write lock for the whole read-modify-write.

use crate::{
    Error, MagicToken, Session, User, UserId,
    error::StorageError,
    id::generate_credential,
    repositories::{
        MarkUsed, RepositoryProvider, SessionRepository, TokenRepository, UserRepository,
    },
    session::SessionToken,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct MemoryUserRepository {
    by_id: DashMap<UserId, User>,
    by_email: DashMap<String, UserId>,
}

impl MemoryUserRepository {
    /// Seed or replace a directory entry. The directory itself is owned by
    /// the surrounding application; this is its stand-in.
    pub fn insert(&self, user: User) {
        self.by_email.insert(user.email.clone(), user.id.clone());
        self.by_id.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        Ok(self.by_id.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let Some(id) = self.by_email.get(email).map(|entry| entry.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }
}

#[derive(Default)]
pub struct MemoryTokenRepository {
    tokens: DashMap<String, MagicToken>,
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn create(&self, user_id: &UserId, expires_in: Duration) -> Result<MagicToken, Error> {
        let now = Utc::now();
        let token = MagicToken::new(
            user_id.clone(),
            generate_credential(),
            None,
            now + expires_in,
            now,
            now,
        );

        // 256-bit credentials make collisions negligible, but the store
        // guarantees uniqueness regardless.
        if self.tokens.contains_key(&token.token) {
            return Err(Error::Storage(StorageError::Constraint(
                "duplicate token string".to_string(),
            )));
        }
        self.tokens.insert(token.token.clone(), token.clone());

        Ok(token)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<MagicToken>, Error> {
        Ok(self.tokens.get(token).map(|entry| entry.clone()))
    }

    async fn mark_used(&self, token: &str) -> Result<MarkUsed, Error> {
        // get_mut holds the shard lock, so check-and-set is atomic.
        match self.tokens.get_mut(token) {
            None => Ok(MarkUsed::NotFound),
            Some(mut record) => {
                if record.used_at.is_some() {
                    Ok(MarkUsed::AlreadyUsed)
                } else {
                    let now = Utc::now();
                    record.used_at = Some(now);
                    record.updated_at = now;
                    Ok(MarkUsed::Consumed)
                }
            }
        }
    }

    async fn latest_unused_for(&self, user_id: &UserId) -> Result<Option<MagicToken>, Error> {
        let latest = self
            .tokens
            .iter()
            .filter(|entry| entry.user_id == *user_id && entry.is_valid())
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.clone());
        Ok(latest)
    }

    async fn cleanup_expired(&self) -> Result<u64, Error> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.expired());
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: DashMap<String, Session>,
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.sessions
            .insert(session.token.as_str().to_string(), session.clone());
        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        Ok(self.sessions.get(token.as_str()).map(|entry| entry.clone()))
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        self.sessions.remove(token.as_str());
        Ok(())
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<(), Error> {
        self.sessions.retain(|_, session| session.user_id != *user_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<(), Error> {
        self.sessions.retain(|_, session| !session.is_expired());
        Ok(())
    }
}

/// Bundle of the in-memory repositories.
#[derive(Default)]
pub struct MemoryRepositories {
    users: Arc<MemoryUserRepository>,
    tokens: Arc<MemoryTokenRepository>,
    sessions: Arc<MemorySessionRepository>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a user in the stand-in directory.
    pub fn add_user(&self, user: User) {
        self.users.insert(user);
    }

    /// Number of token records currently held, used or not.
    pub fn token_count(&self) -> usize {
        self.tokens.tokens.len()
    }
}

#[async_trait]
impl RepositoryProvider for MemoryRepositories {
    type UserRepo = MemoryUserRepository;
    type TokenRepo = MemoryTokenRepository;
    type SessionRepo = MemorySessionRepository;

    fn users(&self) -> Arc<MemoryUserRepository> {
        self.users.clone()
    }

    fn tokens(&self) -> Arc<MemoryTokenRepository> {
        self.tokens.clone()
    }

    fn sessions(&self) -> Arc<MemorySessionRepository> {
        self.sessions.clone()
    }

    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}
