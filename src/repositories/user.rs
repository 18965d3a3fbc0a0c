use crate::{Error, User, UserId};
use async_trait::async_trait;

/// Read-only access to the user directory.
///
/// The directory is owned by the surrounding application; this core only
/// resolves emails at issuance and loads owners at redemption. Role and
/// active flags are read, never written.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Find a user by ID.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error>;

    /// Find a user by email, the issuance lookup key.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;
}
