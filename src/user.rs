//! Users referenced by the authentication core
//!
//! The core reads users, it never creates or mutates them: account
//! registration and profile management live with the caller. What matters
//! here is the lookup key (email), the active flag, and the role that
//! drives post-login routing.

use crate::{
    error::ValidationError,
    id::{generate_prefixed_id, validate_prefixed_id},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unique, stable identifier for a specific user.
///
/// Treat the value as opaque; the `usr_` prefix exists for log readability,
/// not for parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: &str) -> Self {
        UserId(id.to_string())
    }

    pub fn new_random() -> Self {
        UserId(generate_prefixed_id("usr"))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "usr")
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The destination-determining category of a user.
///
/// A closed enumeration replaces the independent `is_ops`/`is_client`
/// boolean pair of the legacy schema, so the both-true and both-false rows
/// that schema allowed cannot be represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operations,
    Client,
    #[default]
    Unspecified,
}

impl Role {
    /// Map a legacy flag pair onto the closed enumeration.
    ///
    /// When both flags are set, operations wins: the legacy login view
    /// checked the operations flag first, and this keeps imported rows
    /// routing the way they always did.
    pub fn from_flags(is_ops: bool, is_client: bool) -> Self {
        if is_ops {
            Role::Operations
        } else if is_client {
            Role::Client
        } else {
            Role::Unspecified
        }
    }
}

/// A user as seen by the authentication core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The unique identifier for the user.
    pub id: UserId,

    /// The email the user logs in with. Unique across the directory.
    pub email: String,

    /// Display name, when the directory has one.
    pub name: Option<String>,

    /// Routing role. See [`Role`].
    pub role: Role,

    /// Inactive users cannot redeem login tokens.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }
}

#[derive(Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    email: Option<String>,
    name: Option<String>,
    role: Option<Role>,
    is_active: Option<bool>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn build(self) -> Result<User, ValidationError> {
        let now = Utc::now();
        Ok(User {
            id: self.id.unwrap_or_default(),
            email: self.email.ok_or(ValidationError::MissingField(
                "Email is required".to_string(),
            ))?,
            name: self.name,
            role: self.role.unwrap_or_default(),
            is_active: self.is_active.unwrap_or(true),
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        })
    }
}
