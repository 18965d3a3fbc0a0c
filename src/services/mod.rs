//! Service layer for business logic
//!
//! Services encapsulate the token lifecycle and session management on top
//! of the repository traits.

pub mod magic_link;
pub mod session;

pub use magic_link::{Destination, Issuance, MagicLinkConfig, MagicLinkService, Redemption};
pub use session::SessionService;
