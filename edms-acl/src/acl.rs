//! Object-level access control.
//!
//! Resolution order for a requester and a target:
//!
//! 1. superusers and staff pass;
//! 2. a role of the requester granting one of the permissions globally passes;
//! 3. an object-level entry for the target whose role contains the requester
//!    and grants one of the permissions passes;
//! 4. only when the target has no object-level entries at all, the default
//!    entries of its kind are consulted the same way;
//! 5. otherwise the target's parents are tried from step 3, each target at
//!    most once;
//! 6. anything else is denied.

use crate::membership::{resolve_role, role_ids_for_user, roles_for_user};
use crate::permissions::PermissionRegistry;
use crate::targets::TargetRegistry;
use edms_core::{
    AccessControlEntry, AccessError, DefaultAccessEntry, EdmsError, EdmsResult, PermissionKey,
    PermissionSet, Role, RoleId, TargetKind, TargetRef, User,
};
use edms_storage::AccessStorage;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// A role with an object-level grant on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessHolder {
    pub role: Role,
    pub permissions: PermissionSet,
}

/// What the resolver knows about one requester.
struct Requester<'u> {
    user: &'u User,
    role_ids: BTreeSet<RoleId>,
    global: PermissionSet,
}

impl Requester<'_> {
    fn holds_globally(&self, permissions: &[PermissionKey]) -> bool {
        permissions.iter().any(|pk| self.global.contains(pk))
    }
}

#[derive(Clone)]
pub struct AccessControlList {
    storage: Arc<dyn AccessStorage>,
    permissions: Arc<PermissionRegistry>,
    targets: Arc<TargetRegistry>,
}

impl AccessControlList {
    pub fn new(
        storage: Arc<dyn AccessStorage>,
        permissions: Arc<PermissionRegistry>,
        targets: Arc<TargetRegistry>,
    ) -> Self {
        AccessControlList {
            storage,
            permissions,
            targets,
        }
    }

    pub fn storage(&self) -> &dyn AccessStorage {
        self.storage.as_ref()
    }

    pub fn permissions(&self) -> &PermissionRegistry {
        &self.permissions
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    fn validate_for(&self, kind: TargetKind, permissions: &[PermissionKey]) -> EdmsResult<()> {
        for pk in permissions {
            self.permissions.get(pk)?;
            self.targets.validate(kind, pk)?;
        }
        Ok(())
    }

    // ========================================================================
    // GRANTS
    // ========================================================================

    /// Add `permissions` to the entry for `(target, role)`, creating it if
    /// needed.
    pub fn grant(
        &self,
        target: TargetRef,
        role_id: RoleId,
        permissions: &[PermissionKey],
    ) -> EdmsResult<AccessControlEntry> {
        self.validate_for(target.kind, permissions)?;
        resolve_role(self.storage.as_ref(), role_id)?;

        let entry = match self.storage.acl_get(target, role_id)? {
            Some(mut entry) => {
                entry.permissions.extend(permissions.iter().cloned());
                self.storage.acl_update(&entry)?;
                entry
            }
            None => {
                let mut entry = AccessControlEntry::new(target, role_id);
                entry.permissions.extend(permissions.iter().cloned());
                self.storage.acl_insert(&entry)?;
                entry
            }
        };
        debug!(object = %target, role = %role_id, permissions = entry.permissions.len(), "acl granted");
        Ok(entry)
    }

    /// Remove `permissions` from the entry for `(target, role)`. An entry
    /// left empty is deleted. Returns false when nothing was held.
    pub fn revoke(
        &self,
        target: TargetRef,
        role_id: RoleId,
        permissions: &[PermissionKey],
    ) -> EdmsResult<bool> {
        let Some(mut entry) = self.storage.acl_get(target, role_id)? else {
            return Ok(false);
        };
        let before = entry.permissions.len();
        entry.permissions.retain(|pk| !permissions.contains(pk));
        let changed = entry.permissions.len() != before;

        if entry.permissions.is_empty() {
            self.storage.acl_delete(entry.acl_id)?;
        } else if changed {
            self.storage.acl_update(&entry)?;
        }
        debug!(object = %target, role = %role_id, changed, "acl revoked");
        Ok(changed)
    }

    pub fn grant_default(
        &self,
        kind: TargetKind,
        role_id: RoleId,
        permissions: &[PermissionKey],
    ) -> EdmsResult<DefaultAccessEntry> {
        self.validate_for(kind, permissions)?;
        resolve_role(self.storage.as_ref(), role_id)?;

        let entry = match self.storage.default_get(kind, role_id)? {
            Some(mut entry) => {
                entry.permissions.extend(permissions.iter().cloned());
                self.storage.default_update(&entry)?;
                entry
            }
            None => {
                let mut entry = DefaultAccessEntry::new(kind, role_id);
                entry.permissions.extend(permissions.iter().cloned());
                self.storage.default_insert(&entry)?;
                entry
            }
        };
        debug!(kind = %kind, role = %role_id, "default access granted");
        Ok(entry)
    }

    pub fn revoke_default(
        &self,
        kind: TargetKind,
        role_id: RoleId,
        permissions: &[PermissionKey],
    ) -> EdmsResult<bool> {
        let Some(mut entry) = self.storage.default_get(kind, role_id)? else {
            return Ok(false);
        };
        let before = entry.permissions.len();
        entry.permissions.retain(|pk| !permissions.contains(pk));
        let changed = entry.permissions.len() != before;

        if entry.permissions.is_empty() {
            self.storage.default_delete(entry.entry_id)?;
        } else if changed {
            self.storage.default_update(&entry)?;
        }
        Ok(changed)
    }

    // ========================================================================
    // CHECKS
    // ========================================================================

    fn requester<'u>(&self, user: &'u User) -> EdmsResult<Requester<'u>> {
        let roles = roles_for_user(self.storage.as_ref(), user)?;
        Ok(Requester {
            user,
            role_ids: roles.iter().map(|r| r.role_id).collect(),
            global: roles.into_iter().flat_map(|r| r.permissions).collect(),
        })
    }

    fn resolve(
        &self,
        requester: &Requester<'_>,
        permissions: &[PermissionKey],
        target: TargetRef,
    ) -> EdmsResult<bool> {
        if requester.user.bypasses_access_checks() || requester.holds_globally(permissions) {
            return Ok(true);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([target]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            let entries = self.storage.acl_list_for_target(current)?;
            let granted = if entries.is_empty() {
                self.storage
                    .default_list_for_kind(current.kind)?
                    .iter()
                    .any(|d| requester.role_ids.contains(&d.role_id) && d.grants_any(permissions))
            } else {
                entries
                    .iter()
                    .any(|e| requester.role_ids.contains(&e.role_id) && e.grants_any(permissions))
            };
            if granted {
                if current != target {
                    debug!(object = %target, via = %current, "access inherited");
                }
                return Ok(true);
            }

            queue.extend(
                self.targets
                    .parents(&current)?
                    .into_iter()
                    .filter(|parent| !visited.contains(parent)),
            );
        }
        Ok(false)
    }

    /// Pass if `user` holds any of `permissions` on `target`.
    pub fn check_accesses(
        &self,
        permissions: &[PermissionKey],
        user: &User,
        target: TargetRef,
    ) -> EdmsResult<()> {
        let requester = self.requester(user)?;
        if self.resolve(&requester, permissions, target)? {
            Ok(())
        } else {
            debug!(user = %user.username, object = %target, "access denied");
            Err(AccessError::insufficient_access().into())
        }
    }

    pub fn check_access(
        &self,
        permission: &PermissionKey,
        user: &User,
        target: TargetRef,
    ) -> EdmsResult<()> {
        self.check_accesses(std::slice::from_ref(permission), user, target)
    }

    /// `check_access` as a boolean; other errors still propagate.
    pub fn has_access(
        &self,
        permission: &PermissionKey,
        user: &User,
        target: TargetRef,
    ) -> EdmsResult<bool> {
        match self.check_access(permission, user, target) {
            Ok(()) => Ok(true),
            Err(EdmsError::Access(AccessError::PermissionDenied { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The subset of `targets` `user` may access with `permission`, in input
    /// order.
    pub fn filter_by_access(
        &self,
        permission: &PermissionKey,
        user: &User,
        targets: &[TargetRef],
    ) -> EdmsResult<Vec<TargetRef>> {
        let requester = self.requester(user)?;
        let permissions = std::slice::from_ref(permission);
        let mut allowed = Vec::with_capacity(targets.len());
        for target in targets {
            if self.resolve(&requester, permissions, *target)? {
                allowed.push(*target);
            }
        }
        Ok(allowed)
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Roles with an entry on `target`, ordered by role label.
    pub fn get_holders_for(&self, target: TargetRef) -> EdmsResult<Vec<AccessHolder>> {
        let mut holders = Vec::new();
        for entry in self.storage.acl_list_for_target(target)? {
            let role = resolve_role(self.storage.as_ref(), entry.role_id)?;
            holders.push(AccessHolder {
                role,
                permissions: entry.permissions,
            });
        }
        holders.sort_by(|a, b| a.role.label.cmp(&b.role.label));
        Ok(holders)
    }

    /// Permissions `role` holds on `target` through its object-level entry.
    pub fn get_role_permissions_for(&self, target: TargetRef, role_id: RoleId) -> EdmsResult<PermissionSet> {
        Ok(self
            .storage
            .acl_get(target, role_id)?
            .map(|entry| entry.permissions)
            .unwrap_or_default())
    }

    /// Roles `user` belongs to.
    pub fn role_ids_for(&self, user: &User) -> EdmsResult<BTreeSet<RoleId>> {
        role_ids_for_user(self.storage.as_ref(), user)
    }

    /// Drop every entry on a deleted object.
    pub fn delete_target(&self, target: TargetRef) -> EdmsResult<usize> {
        let removed = self.storage.acl_delete_for_target(target)?;
        debug!(object = %target, removed, "acl entries removed");
        Ok(removed)
    }
}

impl std::fmt::Debug for AccessControlList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlList")
            .field("permissions", &self.permissions.len())
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}
