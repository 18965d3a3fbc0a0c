//! Repository traits for the data access layer
//!
//! Services talk to storage exclusively through these traits. A backend
//! implements the three repositories plus [`RepositoryProvider`], which
//! bundles them with lifecycle methods.

pub mod session;
pub mod token;
pub mod user;

pub use session::SessionRepository;
pub use token::{MarkUsed, TokenRepository};
pub use user::UserRepository;

use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// Bundle of repositories a storage backend provides.
///
/// Accessors return `Arc` clones so services can hold their repositories
/// independently of the provider's lifetime.
#[async_trait]
pub trait RepositoryProvider: Send + Sync + 'static {
    type UserRepo: UserRepository;
    type TokenRepo: TokenRepository;
    type SessionRepo: SessionRepository;

    fn users(&self) -> Arc<Self::UserRepo>;
    fn tokens(&self) -> Arc<Self::TokenRepo>;
    fn sessions(&self) -> Arc<Self::SessionRepo>;

    /// Prepare backing storage (create tables, indexes).
    async fn migrate(&self) -> Result<(), Error>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), Error>;
}
