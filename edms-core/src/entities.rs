//! Access-control records: principals, roles and grants

use crate::{
    AclId, DefaultAccessId, EntityId, GroupId, PermissionKey, PermissionSet, RoleId, TargetKind,
    Timestamp, UserId, EntityIdType,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Reference to a protected object by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub object_id: EntityId,
}

impl TargetRef {
    pub fn new(kind: TargetKind, object_id: EntityId) -> Self {
        TargetRef { kind, object_id }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.object_id)
    }
}

/// A user account as seen by the access resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub username: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub groups: BTreeSet<GroupId>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        User {
            user_id: UserId::now_v7(),
            username: username.into(),
            is_superuser: false,
            is_staff: false,
            groups: BTreeSet::new(),
        }
    }

    pub fn with_superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = is_superuser;
        self
    }

    pub fn with_staff(mut self, is_staff: bool) -> Self {
        self.is_staff = is_staff;
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.groups.insert(group_id);
        self
    }

    /// Superusers and staff bypass every access check.
    pub fn bypasses_access_checks(&self) -> bool {
        self.is_superuser || self.is_staff
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Group {
            group_id: GroupId::now_v7(),
            name: name.into(),
        }
    }
}

/// Named bundle of members and global permission grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub role_id: RoleId,
    pub label: String,
    /// Permissions granted globally, independent of any object.
    pub permissions: PermissionSet,
    pub groups: BTreeSet<GroupId>,
    pub users: BTreeSet<UserId>,
}

impl Role {
    pub fn new(label: impl Into<String>) -> Self {
        Role {
            role_id: RoleId::now_v7(),
            label: label.into(),
            permissions: PermissionSet::new(),
            groups: BTreeSet::new(),
            users: BTreeSet::new(),
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.users.insert(user_id);
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.groups.insert(group_id);
        self
    }

    pub fn with_permission(mut self, pk: PermissionKey) -> Self {
        self.permissions.insert(pk);
        self
    }

    /// Direct or group membership of `user`.
    pub fn contains(&self, user: &User) -> bool {
        self.users.contains(&user.user_id) || !self.groups.is_disjoint(&user.groups)
    }
}

/// Object-level grant: `(target, role) -> permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub acl_id: AclId,
    pub target: TargetRef,
    pub role_id: RoleId,
    pub permissions: PermissionSet,
    pub created_at: Timestamp,
}

impl AccessControlEntry {
    pub fn new(target: TargetRef, role_id: RoleId) -> Self {
        AccessControlEntry {
            acl_id: AclId::now_v7(),
            target,
            role_id,
            permissions: PermissionSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn grants_any(&self, permissions: &[PermissionKey]) -> bool {
        permissions.iter().any(|pk| self.permissions.contains(pk))
    }
}

/// Class-level default grant: `(kind, role) -> permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAccessEntry {
    pub entry_id: DefaultAccessId,
    pub kind: TargetKind,
    pub role_id: RoleId,
    pub permissions: PermissionSet,
}

impl DefaultAccessEntry {
    pub fn new(kind: TargetKind, role_id: RoleId) -> Self {
        DefaultAccessEntry {
            entry_id: DefaultAccessId::now_v7(),
            kind,
            role_id,
            permissions: PermissionSet::new(),
        }
    }

    pub fn grants_any(&self, permissions: &[PermissionKey]) -> bool {
        permissions.iter().any(|pk| self.permissions.contains(pk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_role_contains_direct_user() {
        let user = User::new("alice");
        let role = Role::new("Editors").with_user(user.user_id);
        assert!(role.contains(&user));
        assert!(!role.contains(&User::new("bob")));
    }

    #[test]
    fn test_role_contains_group_member() {
        let group = Group::new("accounting");
        let user = User::new("carol").with_group(group.group_id);
        let role = Role::new("Auditors").with_group(group.group_id);
        assert!(role.contains(&user));
    }

    #[test]
    fn test_bypass_flags() {
        assert!(User::new("root").with_superuser(true).bypasses_access_checks());
        assert!(User::new("ops").with_staff(true).bypasses_access_checks());
        assert!(!User::new("dave").bypasses_access_checks());
    }

    #[test]
    fn test_entry_grants_any() {
        let target = TargetRef::new(TargetKind::Document, Uuid::now_v7());
        let mut entry = AccessControlEntry::new(target, RoleId::now_v7());
        entry
            .permissions
            .insert(PermissionKey::from("documents.document_view"));

        assert!(entry.grants_any(&[
            PermissionKey::from("documents.document_edit"),
            PermissionKey::from("documents.document_view"),
        ]));
        assert!(!entry.grants_any(&[PermissionKey::from("documents.document_edit")]));
        assert!(!entry.grants_any(&[]));
    }

    #[test]
    fn test_target_ref_display() {
        let id = Uuid::nil();
        let target = TargetRef::new(TargetKind::DocumentType, id);
        assert_eq!(
            target.to_string(),
            "document_type:00000000-0000-0000-0000-000000000000"
        );
    }
}
