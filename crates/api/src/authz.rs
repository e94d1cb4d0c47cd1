//! API-side authorization guard for commands.
//!
//! Role permissions are enforced at the command boundary (before dispatch);
//! ownership stays a domain rule checked by the aggregate.

use rawsy_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::ActorContext;

/// Check every permission the command requires.
pub fn authorize_command<C: CommandAuthorization>(actor: &ActorContext, command: &C) -> Result<(), AuthzError> {
    for perm in command.required_permissions() {
        authorize(&actor.actor(), perm)?;
    }
    Ok(())
}

/// Check a single permission (queries without a command).
pub fn require(actor: &ActorContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(&actor.actor(), permission)
}
