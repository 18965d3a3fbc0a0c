use crate::{Error, MagicToken, UserId};
use async_trait::async_trait;
use chrono::Duration;

/// Outcome of the atomic consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkUsed {
    /// This caller consumed the token.
    Consumed,
    /// The token was already consumed, either earlier or by a concurrent
    /// redemption that won the race.
    AlreadyUsed,
    /// No token with that string exists.
    NotFound,
}

/// Durable store of issued magic login tokens.
///
/// Records are created at issuance and mutated only by [`mark_used`];
/// the core never deletes them. [`cleanup_expired`] exists for external
/// housekeeping jobs.
///
/// [`mark_used`]: TokenRepository::mark_used
/// [`cleanup_expired`]: TokenRepository::cleanup_expired
#[async_trait]
pub trait TokenRepository: Send + Sync + 'static {
    /// Generate a fresh unique token string for `user_id` and persist the
    /// record with the given validity window. Persistence failures
    /// propagate as [`Error::Storage`] without internal retry.
    async fn create(&self, user_id: &UserId, expires_in: Duration) -> Result<MagicToken, Error>;

    /// Exact-match lookup by token string. Implementations resolve by
    /// exact key, never by prefix.
    async fn find_by_token(&self, token: &str) -> Result<Option<MagicToken>, Error>;

    /// Atomically flip the token from unused to used.
    ///
    /// The transition must be a single read-modify-write so that two
    /// concurrent redemptions of the same string can never both observe
    /// [`MarkUsed::Consumed`].
    async fn mark_used(&self, token: &str) -> Result<MarkUsed, Error>;

    /// The most recently issued live (unused, unexpired) token for a user,
    /// if any. Several live tokens may coexist per user.
    async fn latest_unused_for(&self, user_id: &UserId) -> Result<Option<MagicToken>, Error>;

    /// Remove expired records. Returns how many were removed.
    async fn cleanup_expired(&self) -> Result<u64, Error>;
}
