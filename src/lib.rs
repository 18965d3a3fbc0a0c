//! # Sesame
//!
//! Passwordless magic-link authentication core. The crate issues
//! single-use, time-limited login tokens delivered out-of-band, redeems
//! them for authenticated sessions, and routes redeemed users to a
//! role-specific destination.
//!
//! The surrounding web application stays outside: it calls
//! [`Sesame::issue_magic_link`] with an email address and
//! [`Sesame::redeem_magic_link`] with the token string from the visited
//! link, and decides itself how to render the outcomes. Users, email
//! delivery, and HTTP are collaborators behind traits
//! ([`repositories::UserRepository`], [`Notifier`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sesame::{Sesame, RequestContext, Redemption, memory::MemoryRepositories,
//!     notifier::TracingNotifier};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sesame::Error> {
//!     let repositories = Arc::new(MemoryRepositories::new());
//!     let auth = Sesame::new(repositories, Arc::new(TracingNotifier));
//!     auth.migrate().await?;
//!
//!     let ctx = RequestContext::default();
//!     let outcome = auth.issue_magic_link("alice@example.com", &ctx).await?;
//!     println!("{}", outcome.user_message());
//!
//!     // Later, when the link is visited:
//!     if let Redemption::Granted { session, destination, .. } =
//!         auth.redeem_magic_link("token-from-url", &ctx).await?
//!     {
//!         println!("session {} -> {}", session.token, destination.route());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod id;
pub mod memory;
pub mod notifier;
pub mod repositories;
pub mod services;
pub mod session;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod token;
pub mod user;
pub mod validation;

pub use error::Error;
pub use notifier::Notifier;
pub use services::{Destination, Issuance, MagicLinkConfig, Redemption};
pub use session::{RequestContext, Session, SessionToken};
pub use token::MagicToken;
pub use user::{Role, User, UserId};

use error::SessionError;
use repositories::RepositoryProvider;
use services::{MagicLinkService, SessionService};
use std::sync::Arc;

/// The authentication coordinator.
///
/// Wires the magic-link lifecycle and session management to a storage
/// backend and a notifier. Construct once at startup and share.
pub struct Sesame<R: RepositoryProvider> {
    repositories: Arc<R>,
    notifier: Arc<dyn Notifier>,
    config: MagicLinkConfig,
    magic_link: MagicLinkService<R::UserRepo, R::TokenRepo, R::SessionRepo>,
    sessions: Arc<SessionService<R::SessionRepo>>,
}

impl<R: RepositoryProvider> Sesame<R> {
    /// Create a coordinator with the default configuration (15-minute
    /// tokens, 30-day sessions).
    pub fn new(repositories: Arc<R>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_config(repositories, notifier, MagicLinkConfig::default())
    }

    /// Create a coordinator with an explicit configuration. The
    /// configuration is immutable afterwards.
    pub fn with_config(
        repositories: Arc<R>,
        notifier: Arc<dyn Notifier>,
        config: MagicLinkConfig,
    ) -> Self {
        let sessions = Arc::new(SessionService::new(
            repositories.sessions(),
            config.session_ttl,
        ));
        let magic_link = MagicLinkService::new(
            repositories.users(),
            repositories.tokens(),
            sessions.clone(),
            notifier.clone(),
            config.clone(),
        );

        Self {
            repositories,
            notifier,
            config,
            magic_link,
            sessions,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &MagicLinkConfig {
        &self.config
    }

    /// The notifier messages are dispatched through.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Prepare backing storage.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Verify the storage backend is reachable.
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    /// Issue a magic login token for `email` and dispatch the redemption
    /// link. See [`services::MagicLinkService::issue`].
    pub async fn issue_magic_link(
        &self,
        email: &str,
        ctx: &RequestContext,
    ) -> Result<Issuance, Error> {
        self.magic_link.issue(email, ctx).await
    }

    /// Redeem a token string for an authenticated session and a
    /// role-derived destination. See [`services::MagicLinkService::redeem`].
    pub async fn redeem_magic_link(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<Redemption, Error> {
        self.magic_link.redeem(token, ctx).await
    }

    /// The newest live token outstanding for `email`, if any.
    pub async fn outstanding_token(&self, email: &str) -> Result<Option<MagicToken>, Error> {
        self.magic_link.outstanding_token(email).await
    }

    /// Look up a session; expired or unknown tokens are an error.
    pub async fn get_session(&self, token: &SessionToken) -> Result<Session, Error> {
        self.sessions
            .get_session(token)
            .await?
            .ok_or(Error::Session(SessionError::NotFound))
    }

    /// End a single session.
    pub async fn end_session(&self, token: &SessionToken) -> Result<(), Error> {
        self.sessions.end_session(token).await
    }

    /// End every session belonging to a user.
    pub async fn end_all_sessions(&self, user_id: &UserId) -> Result<(), Error> {
        self.sessions.end_all_for_user(user_id).await
    }

    /// Remove expired token records. Housekeeping, intended for the
    /// caller's scheduler.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, Error> {
        self.magic_link.cleanup_expired_tokens().await
    }

    /// Remove expired sessions.
    pub async fn cleanup_expired_sessions(&self) -> Result<(), Error> {
        self.sessions.cleanup_expired().await
    }
}
