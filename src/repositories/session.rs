use crate::{Error, Session, SessionToken, UserId};
use async_trait::async_trait;

/// Durable store of established sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Persist a new session.
    async fn create(&self, session: Session) -> Result<Session, Error>;

    /// Find a session by its opaque token.
    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error>;

    /// Delete a session by token.
    async fn delete(&self, token: &SessionToken) -> Result<(), Error>;

    /// Delete every session belonging to a user.
    async fn delete_for_user(&self, user_id: &UserId) -> Result<(), Error>;

    /// Remove expired sessions.
    async fn cleanup_expired(&self) -> Result<(), Error>;
}
