//! Magic login token lifecycle
//!
//! Issuance resolves an email to a user, persists a single-use token, and
//! dispatches the redemption link out-of-band. Redemption validates the
//! presented token string, consumes it atomically, and exchanges it for an
//! authenticated session plus a role-derived destination.
//!
//! The issuance surface accepts only an email address. There is no
//! password parameter anywhere on this path; direct-credential checks for
//! API clients are a separate concern that must not share a route with
//! this flow.

use crate::{
    Error, MagicToken, Session, User,
    error::AuthError,
    notifier::Notifier,
    repositories::{MarkUsed, SessionRepository, TokenRepository, UserRepository},
    services::SessionService,
    session::RequestContext,
    user::Role,
    validation::validate_email,
};
use chrono::Duration;
use std::sync::Arc;

/// Confirmation shown on the happy path.
const LINK_SENT_MESSAGE: &str = "A magic login link has been sent to your email address.";

/// Generic failure line. Deliberately identical for every issuance
/// failure so responses cannot be used to enumerate accounts.
const ISSUE_FAILED_MESSAGE: &str = "Unable to send a magic login link. Please try again later.";

/// Configuration for token issuance and the sessions redemption creates.
///
/// Built once at startup and immutable afterwards; services hold clones.
#[derive(Debug, Clone)]
pub struct MagicLinkConfig {
    /// Base URL the redemption link is built against.
    pub base_url: String,
    /// How long an issued token stays redeemable.
    pub token_ttl: Duration,
    /// Lifetime of sessions established at redemption.
    pub session_ttl: Duration,
}

impl Default for MagicLinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token_ttl: Duration::minutes(15),
            session_ttl: Duration::days(30),
        }
    }
}

impl MagicLinkConfig {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// The URL a recipient visits to redeem a token.
    pub fn redemption_url(&self, token: &str) -> String {
        format!("{}/magic-login/{token}/", self.base_url.trim_end_matches('/'))
    }
}

/// Where a user lands after redeeming a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Operations,
    Client,
    /// Neutral landing for users with no routing role.
    Default,
}

impl Destination {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Operations => Destination::Operations,
            Role::Client => Destination::Client,
            Role::Unspecified => Destination::Default,
        }
    }

    /// The route the caller should redirect to.
    pub fn route(&self) -> &'static str {
        match self {
            Destination::Operations => "/dashboard-ops/",
            Destination::Client => "/dashboard-client/",
            Destination::Default => "/",
        }
    }
}

/// Outcome of an issuance request.
///
/// Variants are programmatically distinct so the caller can react (resend,
/// alert), but [`user_message`] collapses every failure to one generic
/// line; only the log records which failure actually happened.
///
/// [`user_message`]: Issuance::user_message
#[derive(Debug)]
pub enum Issuance {
    /// Token persisted and notification dispatched.
    LinkSent { token: MagicToken },
    /// No account matches the email (or the email was malformed, or the
    /// account is inactive).
    UnknownEmail,
    /// Token persisted but delivery failed. The token remains valid and
    /// redeemable; a resend can reuse it.
    NotificationFailed { token: MagicToken, reason: String },
}

impl Issuance {
    pub fn succeeded(&self) -> bool {
        matches!(self, Issuance::LinkSent { .. })
    }

    /// Text safe to render to the requester.
    pub fn user_message(&self) -> &'static str {
        match self {
            Issuance::LinkSent { .. } => LINK_SENT_MESSAGE,
            Issuance::UnknownEmail | Issuance::NotificationFailed { .. } => ISSUE_FAILED_MESSAGE,
        }
    }
}

/// Outcome of presenting a token string for redemption.
#[derive(Debug)]
pub enum Redemption {
    /// The token was consumed; the bearer is now authenticated.
    Granted {
        user: User,
        session: Session,
        destination: Destination,
    },
    /// No token with that string was ever issued.
    NotFound,
    /// The token was consumed earlier, or a concurrent redemption won.
    AlreadyUsed,
    /// The token outlived its validity window without being used.
    Expired,
}

/// Orchestrates issuance and redemption of magic login tokens.
pub struct MagicLinkService<U, T, S>
where
    U: UserRepository,
    T: TokenRepository,
    S: SessionRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    sessions: Arc<SessionService<S>>,
    notifier: Arc<dyn Notifier>,
    config: MagicLinkConfig,
}

impl<U, T, S> MagicLinkService<U, T, S>
where
    U: UserRepository,
    T: TokenRepository,
    S: SessionRepository,
{
    pub fn new(
        users: Arc<U>,
        tokens: Arc<T>,
        sessions: Arc<SessionService<S>>,
        notifier: Arc<dyn Notifier>,
        config: MagicLinkConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            sessions,
            notifier,
            config,
        }
    }

    /// Issue a magic login token for the account behind `email` and mail
    /// out the redemption link.
    ///
    /// The token is persisted before the notifier is invoked, so a
    /// delivery failure can only leave an issued-but-unsent token. Storage
    /// failures abort issuance and propagate; nothing is ever mailed for a
    /// token that was not durably saved.
    pub async fn issue(&self, email: &str, ctx: &RequestContext) -> Result<Issuance, Error> {
        if let Err(reason) = validate_email(email) {
            tracing::debug!(%reason, "magic link request rejected: malformed email");
            return Ok(Issuance::UnknownEmail);
        }

        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::debug!(
                    ip = ctx.ip_address.as_deref(),
                    "magic link request for unknown email"
                );
                return Ok(Issuance::UnknownEmail);
            }
        };

        if !user.is_active {
            tracing::debug!(user_id = %user.id, "magic link request for inactive account");
            return Ok(Issuance::UnknownEmail);
        }

        let token = self.tokens.create(&user.id, self.config.token_ttl).await?;

        let link = self.config.redemption_url(&token.token);
        let minutes = self.config.token_ttl.num_minutes();
        let body = format!(
            "Click the link below to log in:\n\n{link}\n\nThe link is valid for {minutes} minutes and can be used once. \
             If you did not request it, you can ignore this message."
        );

        match self
            .notifier
            .send(&user.email, "Your magic login link", &body)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    user_id = %user.id,
                    expires_at = %token.expires_at,
                    ip = ctx.ip_address.as_deref(),
                    "magic login link issued"
                );
                Ok(Issuance::LinkSent { token })
            }
            Err(err) => {
                // Token stays valid: the message may still arrive through a
                // delayed retry, and invalidating it would strand that user.
                tracing::warn!(
                    user_id = %user.id,
                    error = %err,
                    "magic login token issued but notification failed"
                );
                Ok(Issuance::NotificationFailed {
                    token,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Redeem a token string for an authenticated session.
    ///
    /// Consumption is delegated to the store's atomic mark-used operation,
    /// so two concurrent redemptions of the same string resolve to exactly
    /// one `Granted` and one `AlreadyUsed`.
    pub async fn redeem(&self, token: &str, ctx: &RequestContext) -> Result<Redemption, Error> {
        let record = match self.tokens.find_by_token(token).await? {
            Some(record) => record,
            None => return Ok(Redemption::NotFound),
        };

        if record.used() {
            return Ok(Redemption::AlreadyUsed);
        }

        if record.expired() {
            return Ok(Redemption::Expired);
        }

        match self.tokens.mark_used(token).await? {
            MarkUsed::Consumed => {}
            MarkUsed::AlreadyUsed => return Ok(Redemption::AlreadyUsed),
            MarkUsed::NotFound => return Ok(Redemption::NotFound),
        }

        let user = self
            .users
            .find_by_id(&record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::UserInactive.into());
        }

        let destination = Destination::for_role(user.role);
        let session = self.sessions.start_session(&user.id, ctx).await?;

        tracing::info!(
            user_id = %user.id,
            destination = destination.route(),
            ip = ctx.ip_address.as_deref(),
            "magic login token redeemed"
        );

        Ok(Redemption::Granted {
            user,
            session,
            destination,
        })
    }

    /// The newest live token outstanding for the account behind `email`,
    /// if any. Issuance does not invalidate earlier tokens, so several may
    /// be live at once.
    pub async fn outstanding_token(&self, email: &str) -> Result<Option<MagicToken>, Error> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => return Ok(None),
        };

        self.tokens.latest_unused_for(&user.id).await
    }

    /// Remove expired token records. Housekeeping hook for the caller's
    /// scheduler; the lifecycle itself never deletes.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, Error> {
        self.tokens.cleanup_expired().await
    }
}
