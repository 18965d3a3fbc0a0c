use crate::{
    Error, Session, UserId,
    repositories::SessionRepository,
    session::{RequestContext, SessionToken},
};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Session management over a [`SessionRepository`].
///
/// The service owns the session lifetime policy: every session it starts
/// expires `ttl` after creation, and an expired session reads as absent.
pub struct SessionService<R: SessionRepository> {
    repository: Arc<R>,
    ttl: Duration,
}

impl<R: SessionRepository> SessionService<R> {
    pub fn new(repository: Arc<R>, ttl: Duration) -> Self {
        Self { repository, ttl }
    }

    /// Establish a new authenticated session for a user, capturing the
    /// request context on the record.
    pub async fn start_session(
        &self,
        user_id: &UserId,
        ctx: &RequestContext,
    ) -> Result<Session, Error> {
        let session = Session::builder()
            .user_id(user_id.clone())
            .user_agent(ctx.user_agent.clone())
            .ip_address(ctx.ip_address.clone())
            .expires_at(Utc::now() + self.ttl)
            .build()?;

        self.repository.create(session).await
    }

    /// Get a session by token. An expired session reads as absent.
    pub async fn get_session(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        Ok(self
            .repository
            .find_by_token(token)
            .await?
            .filter(|session| !session.is_expired()))
    }

    /// End a single session.
    pub async fn end_session(&self, token: &SessionToken) -> Result<(), Error> {
        self.repository.delete(token).await
    }

    /// End every session belonging to a user.
    pub async fn end_all_for_user(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.delete_for_user(user_id).await
    }

    /// Remove expired sessions from the store.
    pub async fn cleanup_expired(&self) -> Result<(), Error> {
        self.repository.cleanup_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionRepository;

    fn service(ttl: Duration) -> SessionService<MemorySessionRepository> {
        SessionService::new(Arc::new(MemorySessionRepository::default()), ttl)
    }

    #[tokio::test]
    async fn test_start_session_applies_service_ttl() {
        let service = service(Duration::days(30));
        let ctx = RequestContext::new(Some("127.0.0.1".to_string()), None);

        let session = service
            .start_session(&UserId::new_random(), &ctx)
            .await
            .unwrap();

        assert!(!session.is_expired());
        assert!(session.expires_at > Utc::now() + Duration::days(29));
        assert_eq!(session.ip_address.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_absent() {
        let service = service(Duration::seconds(-1));
        let session = service
            .start_session(&UserId::new_random(), &RequestContext::default())
            .await
            .unwrap();

        // Still in the store, but the read-side expiry check hides it.
        assert!(service.get_session(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_session_removes_it() {
        let service = service(Duration::days(1));
        let session = service
            .start_session(&UserId::new_random(), &RequestContext::default())
            .await
            .unwrap();

        assert!(service.get_session(&session.token).await.unwrap().is_some());
        service.end_session(&session.token).await.unwrap();
        assert!(service.get_session(&session.token).await.unwrap().is_none());
    }
}
