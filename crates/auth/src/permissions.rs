use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "products.create").
/// The wildcard permission `"*"` is granted to admins by the policy layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const PRODUCTS_CREATE: Permission = Permission(Cow::Borrowed("products.create"));
    pub const PRODUCTS_UPDATE: Permission = Permission(Cow::Borrowed("products.update"));
    pub const PRODUCTS_DELETE: Permission = Permission(Cow::Borrowed("products.delete"));
    pub const PRODUCTS_DISCOUNT: Permission = Permission(Cow::Borrowed("products.discount"));
    pub const PRODUCTS_IMAGES: Permission = Permission(Cow::Borrowed("products.images"));
    pub const PRODUCTS_READ_OWN: Permission = Permission(Cow::Borrowed("products.read_own"));
    pub const PRODUCTS_MODERATE: Permission = Permission(Cow::Borrowed("products.moderate"));
    pub const PRODUCTS_READ_ALL: Permission = Permission(Cow::Borrowed("products.read_all"));
    pub const SUPPORT_MANAGE: Permission = Permission(Cow::Borrowed("support.manage"));

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
