//! Magic login token records
//!
//! One record per issued credential. A token is live until it either
//! expires or is consumed; consumption is recorded as a timestamp so the
//! store keeps an audit trail rather than a bare flag, and the transition
//! is one-way.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicToken {
    /// Owner of the credential. The token store references the user, it
    /// does not own it.
    pub user_id: UserId,

    /// The opaque credential string, unique across all tokens ever issued.
    pub token: String,

    /// Set exactly once, on successful redemption. `None` means unused.
    pub used_at: Option<DateTime<Utc>>,

    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MagicToken {
    pub fn new(
        user_id: UserId,
        token: String,
        used_at: Option<DateTime<Utc>>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            token,
            used_at,
            expires_at,
            created_at,
            updated_at,
        }
    }

    pub fn used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// A token is valid iff it is unused and unexpired.
    pub fn is_valid(&self) -> bool {
        !self.used() && !self.expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_expiring_in(expires_in: Duration) -> MagicToken {
        let now = Utc::now();
        MagicToken::new(
            UserId::new_random(),
            "credential".to_string(),
            None,
            now + expires_in,
            now,
            now,
        )
    }

    #[test]
    fn test_fresh_token_is_valid() {
        let token = token_expiring_in(Duration::minutes(15));
        assert!(!token.used());
        assert!(!token.expired());
        assert!(token.is_valid());
    }

    #[test]
    fn test_used_token_is_invalid() {
        let mut token = token_expiring_in(Duration::minutes(15));
        token.used_at = Some(Utc::now());
        assert!(token.used());
        assert!(!token.is_valid());
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let token = token_expiring_in(Duration::minutes(-1));
        assert!(token.expired());
        assert!(!token.is_valid());
    }
}
