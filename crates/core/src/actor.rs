//! The acting principal of a command.
//!
//! Every mutation receives the actor explicitly; domain code never reads an
//! ambient "current user".

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::UserId;

/// Marketplace role carried by an authenticated principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supplier,
    Manufacturer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supplier => "supplier",
            Role::Manufacturer => "manufacturer",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "supplier" => Ok(Role::Supplier),
            "manufacturer" => Ok(Role::Manufacturer),
            other => Err(DomainError::invalid_argument(format!("unknown role '{other}'"))),
        }
    }
}

/// Request-scoped identity passed into every command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn admin(id: UserId) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn supplier(id: UserId) -> Self {
        Self::new(id, Role::Supplier)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin capability.
    pub fn ensure_admin(&self) -> DomainResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::forbidden("admin capability required"))
        }
    }

    /// Require the supplier role.
    pub fn ensure_supplier(&self) -> DomainResult<()> {
        if self.role == Role::Supplier {
            Ok(())
        } else {
            Err(DomainError::forbidden("supplier role required"))
        }
    }

    /// Require the supplier role *and* ownership of the target document.
    pub fn ensure_owner(&self, owner: UserId) -> DomainResult<()> {
        self.ensure_supplier()?;
        if self.id != owner {
            return Err(DomainError::forbidden("actor does not own this product"));
        }
        Ok(())
    }
}
