//! Role membership resolution.
//!
//! A user belongs to a role directly or through any of their groups.

use edms_core::{AccessError, EdmsResult, Role, RoleId, User, UserId};
use edms_storage::AccessStorage;
use std::collections::BTreeSet;

/// Every role `user` belongs to.
pub fn roles_for_user(storage: &dyn AccessStorage, user: &User) -> EdmsResult<Vec<Role>> {
    Ok(storage
        .role_list()?
        .into_iter()
        .filter(|role| role.contains(user))
        .collect())
}

pub fn role_ids_for_user(storage: &dyn AccessStorage, user: &User) -> EdmsResult<BTreeSet<RoleId>> {
    Ok(roles_for_user(storage, user)?
        .into_iter()
        .map(|role| role.role_id)
        .collect())
}

/// Load a user, failing with `UnknownPrincipal` when absent.
pub fn resolve_user(storage: &dyn AccessStorage, user_id: UserId) -> EdmsResult<User> {
    storage.user_get(user_id)?.ok_or_else(|| {
        AccessError::UnknownPrincipal {
            id: user_id.to_string(),
        }
        .into()
    })
}

/// Load a role, failing with `UnknownPrincipal` when absent.
pub fn resolve_role(storage: &dyn AccessStorage, role_id: RoleId) -> EdmsResult<Role> {
    storage.role_get(role_id)?.ok_or_else(|| {
        AccessError::UnknownPrincipal {
            id: role_id.to_string(),
        }
        .into()
    })
}
