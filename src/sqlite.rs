//! SQLite storage backend (feature `sqlite`)
//!
//! Timestamps are stored as unix seconds. Token consumption is a
//! conditional update (`... WHERE token = ? AND used_at IS NULL`) checked
//! through the affected-row count, so concurrent redemptions resolve in
//! the database rather than in process memory.

use crate::{
    Error, MagicToken, Session, User, UserId,
    error::StorageError,
    id::generate_credential,
    repositories::{
        MarkUsed, RepositoryProvider, SessionRepository, TokenRepository, UserRepository,
    },
    session::SessionToken,
    user::Role,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

fn db_err(e: sqlx::Error) -> Error {
    Error::Storage(StorageError::Database(e.to_string()))
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteUser {
    id: String,
    email: String,
    name: Option<String>,
    role: String,
    is_active: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<SqliteUser> for User {
    fn from(row: SqliteUser) -> Self {
        let role = match row.role.as_str() {
            "operations" => Role::Operations,
            "client" => Role::Client,
            _ => Role::Unspecified,
        };
        User {
            id: UserId::new(&row.id),
            email: row.email,
            name: row.name,
            role,
            is_active: row.is_active != 0,
            created_at: timestamp(row.created_at),
            updated_at: timestamp(row.updated_at),
        }
    }
}

fn role_column(role: Role) -> &'static str {
    match role {
        Role::Operations => "operations",
        Role::Client => "client",
        Role::Unspecified => "unspecified",
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteMagicToken {
    user_id: String,
    token: String,
    used_at: Option<i64>,
    expires_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<SqliteMagicToken> for MagicToken {
    fn from(row: SqliteMagicToken) -> Self {
        MagicToken::new(
            UserId::new(&row.user_id),
            row.token,
            row.used_at.map(timestamp),
            timestamp(row.expires_at),
            timestamp(row.created_at),
            timestamp(row.updated_at),
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteSession {
    token: String,
    user_id: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: i64,
    expires_at: i64,
}

impl From<SqliteSession> for Session {
    fn from(row: SqliteSession) -> Self {
        Session {
            token: SessionToken::new(&row.token),
            user_id: UserId::new(&row.user_id),
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            created_at: timestamp(row.created_at),
            expires_at: timestamp(row.expires_at),
        }
    }
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a directory row. The directory belongs to the
    /// surrounding application; this exists for bootstrapping and tests.
    pub async fn insert(&self, user: &User) -> Result<(), Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO users (id, email, name, role, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.name)
        .bind(role_column(user.role))
        .bind(user.is_active as i64)
        .bind(user.created_at.timestamp())
        .bind(user.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let row: Option<SqliteUser> = sqlx::query_as(
            "SELECT id, email, name, role, is_active, created_at, updated_at \
             FROM users WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row: Option<SqliteUser> = sqlx::query_as(
            "SELECT id, email, name, role, is_active, created_at, updated_at \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }
}

pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
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

        // The primary key on `token` upholds global uniqueness; a
        // collision surfaces as a constraint error instead of a silent
        // overwrite.
        sqlx::query(
            "INSERT INTO magic_tokens (token, user_id, used_at, expires_at, created_at, updated_at) \
             VALUES (?, ?, NULL, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(token.user_id.as_str())
        .bind(token.expires_at.timestamp())
        .bind(token.created_at.timestamp())
        .bind(token.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(token)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<MagicToken>, Error> {
        let row: Option<SqliteMagicToken> = sqlx::query_as(
            "SELECT user_id, token, used_at, expires_at, created_at, updated_at \
             FROM magic_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn mark_used(&self, token: &str) -> Result<MarkUsed, Error> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE magic_tokens SET used_at = ?, updated_at = ? \
             WHERE token = ? AND used_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok(MarkUsed::Consumed);
        }

        // The conditional update did not match: either the row is gone or
        // someone consumed it first.
        match self.find_by_token(token).await? {
            Some(_) => Ok(MarkUsed::AlreadyUsed),
            None => Ok(MarkUsed::NotFound),
        }
    }

    async fn latest_unused_for(&self, user_id: &UserId) -> Result<Option<MagicToken>, Error> {
        let row: Option<SqliteMagicToken> = sqlx::query_as(
            "SELECT user_id, token, used_at, expires_at, created_at, updated_at \
             FROM magic_tokens \
             WHERE user_id = ? AND used_at IS NULL AND expires_at > ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id.as_str())
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn cleanup_expired(&self) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM magic_tokens WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, user_agent, ip_address, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session.token.as_str())
        .bind(session.user_id.as_str())
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.created_at.timestamp())
        .bind(session.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        let row: Option<SqliteSession> = sqlx::query_as(
            "SELECT token, user_id, user_agent, ip_address, created_at, expires_at \
             FROM sessions WHERE token = ?",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }
}

/// Bundle of the SQLite repositories over one connection pool.
pub struct SqliteRepositories {
    pool: SqlitePool,
    users: Arc<SqliteUserRepository>,
    tokens: Arc<SqliteTokenRepository>,
    sessions: Arc<SqliteSessionRepository>,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            tokens: Arc::new(SqliteTokenRepository::new(pool.clone())),
            sessions: Arc::new(SqliteSessionRepository::new(pool.clone())),
            pool,
        }
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositories {
    type UserRepo = SqliteUserRepository;
    type TokenRepo = SqliteTokenRepository;
    type SessionRepo = SqliteSessionRepository;

    fn users(&self) -> Arc<SqliteUserRepository> {
        self.users.clone()
    }

    fn tokens(&self) -> Arc<SqliteTokenRepository> {
        self.tokens.clone()
    }

    fn sessions(&self) -> Arc<SqliteSessionRepository> {
        self.sessions.clone()
    }

    async fn migrate(&self) -> Result<(), Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (\
                id TEXT PRIMARY KEY,\
                email TEXT NOT NULL UNIQUE,\
                name TEXT,\
                role TEXT NOT NULL DEFAULT 'unspecified',\
                is_active INTEGER NOT NULL DEFAULT 1,\
                created_at INTEGER NOT NULL,\
                updated_at INTEGER NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS magic_tokens (\
                token TEXT PRIMARY KEY,\
                user_id TEXT NOT NULL,\
                used_at INTEGER,\
                expires_at INTEGER NOT NULL,\
                created_at INTEGER NOT NULL,\
                updated_at INTEGER NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_magic_tokens_user_id ON magic_tokens (user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (\
                token TEXT PRIMARY KEY,\
                user_id TEXT NOT NULL,\
                user_agent TEXT,\
                ip_address TEXT,\
                created_at INTEGER NOT NULL,\
                expires_at INTEGER NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions (user_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Connection(e.to_string())))?;

        Ok(())
    }
}
