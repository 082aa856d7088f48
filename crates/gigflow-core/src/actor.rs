//! # Acting User
//!
//! The identity on whose behalf an engine operation runs. Resolved once at
//! the API boundary from the external identity provider and threaded into
//! every call as a plain value.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;

/// Marketplace roles, ordered by privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular user. Posts tasks and bids on others' tasks.
    Member,
    /// Platform administrator. Rules on disputes.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActingUser {
    /// User identifier.
    pub id: UserId,
    /// Role granted by the identity provider.
    pub role: Role,
}

impl ActingUser {
    /// A regular member.
    pub fn member(id: UserId) -> Self {
        Self {
            id,
            role: Role::Member,
        }
    }

    /// An administrator.
    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }

    /// Whether the caller holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
