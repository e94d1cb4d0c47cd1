use thiserror::Error;

use rawsy_core::{Actor, Role};

use crate::Permission;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// The API layer enforces these requirements before dispatching. Ownership
/// is a domain rule and is checked again by the aggregate.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Static role→permission policy.
pub fn permissions_for_role(role: Role) -> Vec<Permission> {
    match role {
        Role::Admin => vec![Permission::WILDCARD],
        Role::Supplier => vec![
            Permission::PRODUCTS_CREATE,
            Permission::PRODUCTS_UPDATE,
            Permission::PRODUCTS_DELETE,
            Permission::PRODUCTS_DISCOUNT,
            Permission::PRODUCTS_IMAGES,
            Permission::PRODUCTS_READ_OWN,
        ],
        Role::Manufacturer => Vec::new(),
    }
}

/// Authorize an actor for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    let granted = permissions_for_role(actor.role);
    if granted.iter().any(|p| p.is_wildcard() || p == required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
