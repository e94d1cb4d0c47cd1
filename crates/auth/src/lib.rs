//! `rawsy-auth`: authentication/authorization boundary.
//!
//! Token decoding and the role→permission policy live here; this crate is
//! intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;

pub use authorize::{AuthzError, CommandAuthorization, authorize, permissions_for_role};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
