//! Storage for principals, roles and access entries.

use crate::{read_guard, write_guard};
use edms_core::{
    AccessControlEntry, AclId, DefaultAccessEntry, DefaultAccessId, EdmsResult, Group, GroupId,
    RecordKind, Role, RoleId, StorageError, TargetKind, TargetRef, User, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Persistence for the records the access resolver reads.
pub trait AccessStorage: Send + Sync {
    // === Principals ===

    fn user_insert(&self, user: &User) -> EdmsResult<()>;
    fn user_get(&self, id: UserId) -> EdmsResult<Option<User>>;
    fn user_update(&self, user: &User) -> EdmsResult<()>;

    fn group_insert(&self, group: &Group) -> EdmsResult<()>;
    fn group_get(&self, id: GroupId) -> EdmsResult<Option<Group>>;

    // === Roles ===

    fn role_insert(&self, role: &Role) -> EdmsResult<()>;
    fn role_get(&self, id: RoleId) -> EdmsResult<Option<Role>>;
    fn role_update(&self, role: &Role) -> EdmsResult<()>;
    fn role_delete(&self, id: RoleId) -> EdmsResult<()>;
    fn role_list(&self) -> EdmsResult<Vec<Role>>;

    // === Object-level entries ===

    /// Insert a new entry; `(target, role)` must be unique.
    fn acl_insert(&self, entry: &AccessControlEntry) -> EdmsResult<()>;
    fn acl_get(&self, target: TargetRef, role_id: RoleId)
        -> EdmsResult<Option<AccessControlEntry>>;
    fn acl_update(&self, entry: &AccessControlEntry) -> EdmsResult<()>;
    fn acl_delete(&self, id: AclId) -> EdmsResult<()>;
    fn acl_list_for_target(&self, target: TargetRef) -> EdmsResult<Vec<AccessControlEntry>>;
    /// Remove every entry for `target`, returning how many were removed.
    fn acl_delete_for_target(&self, target: TargetRef) -> EdmsResult<usize>;

    // === Class-level defaults ===

    /// Insert a new default entry; `(kind, role)` must be unique.
    fn default_insert(&self, entry: &DefaultAccessEntry) -> EdmsResult<()>;
    fn default_get(&self, kind: TargetKind, role_id: RoleId)
        -> EdmsResult<Option<DefaultAccessEntry>>;
    fn default_update(&self, entry: &DefaultAccessEntry) -> EdmsResult<()>;
    fn default_delete(&self, id: DefaultAccessId) -> EdmsResult<()>;
    fn default_list_for_kind(&self, kind: TargetKind) -> EdmsResult<Vec<DefaultAccessEntry>>;
}

// ============================================================================
// IN-MEMORY STORAGE
// ============================================================================

/// In-memory access storage for single-process deployments and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryAccessStorage {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    groups: Arc<RwLock<HashMap<GroupId, Group>>>,
    roles: Arc<RwLock<HashMap<RoleId, Role>>>,
    acls: Arc<RwLock<HashMap<AclId, AccessControlEntry>>>,
    defaults: Arc<RwLock<HashMap<DefaultAccessId, DefaultAccessEntry>>>,
}

impl MemoryAccessStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acl_count(&self) -> EdmsResult<usize> {
        Ok(read_guard(&self.acls)?.len())
    }

    pub fn role_count(&self) -> EdmsResult<usize> {
        Ok(read_guard(&self.roles)?.len())
    }
}

fn not_found(kind: RecordKind, id: impl ToString) -> StorageError {
    StorageError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn already_exists(kind: RecordKind, key: impl ToString) -> StorageError {
    StorageError::AlreadyExists {
        kind,
        key: key.to_string(),
    }
}

impl AccessStorage for MemoryAccessStorage {
    fn user_insert(&self, user: &User) -> EdmsResult<()> {
        let mut users = write_guard(&self.users)?;
        if users.contains_key(&user.user_id) {
            return Err(already_exists(RecordKind::User, user.user_id).into());
        }
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    fn user_get(&self, id: UserId) -> EdmsResult<Option<User>> {
        Ok(read_guard(&self.users)?.get(&id).cloned())
    }

    fn user_update(&self, user: &User) -> EdmsResult<()> {
        let mut users = write_guard(&self.users)?;
        let existing = users
            .get_mut(&user.user_id)
            .ok_or_else(|| not_found(RecordKind::User, user.user_id))?;
        *existing = user.clone();
        Ok(())
    }

    fn group_insert(&self, group: &Group) -> EdmsResult<()> {
        let mut groups = write_guard(&self.groups)?;
        if groups.contains_key(&group.group_id) {
            return Err(already_exists(RecordKind::Group, group.group_id).into());
        }
        groups.insert(group.group_id, group.clone());
        Ok(())
    }

    fn group_get(&self, id: GroupId) -> EdmsResult<Option<Group>> {
        Ok(read_guard(&self.groups)?.get(&id).cloned())
    }

    fn role_insert(&self, role: &Role) -> EdmsResult<()> {
        let mut roles = write_guard(&self.roles)?;
        if roles.values().any(|r| r.label == role.label) {
            return Err(already_exists(RecordKind::Role, &role.label).into());
        }
        roles.insert(role.role_id, role.clone());
        Ok(())
    }

    fn role_get(&self, id: RoleId) -> EdmsResult<Option<Role>> {
        Ok(read_guard(&self.roles)?.get(&id).cloned())
    }

    fn role_update(&self, role: &Role) -> EdmsResult<()> {
        let mut roles = write_guard(&self.roles)?;
        let existing = roles
            .get_mut(&role.role_id)
            .ok_or_else(|| not_found(RecordKind::Role, role.role_id))?;
        *existing = role.clone();
        Ok(())
    }

    fn role_delete(&self, id: RoleId) -> EdmsResult<()> {
        if write_guard(&self.roles)?.remove(&id).is_none() {
            return Err(not_found(RecordKind::Role, id).into());
        }
        // Entries granted to the role go with it.
        write_guard(&self.acls)?.retain(|_, entry| entry.role_id != id);
        write_guard(&self.defaults)?.retain(|_, entry| entry.role_id != id);
        Ok(())
    }

    fn role_list(&self) -> EdmsResult<Vec<Role>> {
        let mut roles: Vec<Role> = read_guard(&self.roles)?.values().cloned().collect();
        roles.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(roles)
    }

    fn acl_insert(&self, entry: &AccessControlEntry) -> EdmsResult<()> {
        let mut acls = write_guard(&self.acls)?;
        if acls
            .values()
            .any(|e| e.target == entry.target && e.role_id == entry.role_id)
        {
            return Err(already_exists(
                RecordKind::AccessControlEntry,
                format!("{}/{}", entry.target, entry.role_id),
            )
            .into());
        }
        acls.insert(entry.acl_id, entry.clone());
        Ok(())
    }

    fn acl_get(
        &self,
        target: TargetRef,
        role_id: RoleId,
    ) -> EdmsResult<Option<AccessControlEntry>> {
        Ok(read_guard(&self.acls)?
            .values()
            .find(|e| e.target == target && e.role_id == role_id)
            .cloned())
    }

    fn acl_update(&self, entry: &AccessControlEntry) -> EdmsResult<()> {
        let mut acls = write_guard(&self.acls)?;
        let existing = acls
            .get_mut(&entry.acl_id)
            .ok_or_else(|| not_found(RecordKind::AccessControlEntry, entry.acl_id))?;
        *existing = entry.clone();
        Ok(())
    }

    fn acl_delete(&self, id: AclId) -> EdmsResult<()> {
        if write_guard(&self.acls)?.remove(&id).is_none() {
            return Err(not_found(RecordKind::AccessControlEntry, id).into());
        }
        Ok(())
    }

    fn acl_list_for_target(&self, target: TargetRef) -> EdmsResult<Vec<AccessControlEntry>> {
        let mut entries: Vec<AccessControlEntry> = read_guard(&self.acls)?
            .values()
            .filter(|e| e.target == target)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn acl_delete_for_target(&self, target: TargetRef) -> EdmsResult<usize> {
        let mut acls = write_guard(&self.acls)?;
        let before = acls.len();
        acls.retain(|_, e| e.target != target);
        Ok(before - acls.len())
    }

    fn default_insert(&self, entry: &DefaultAccessEntry) -> EdmsResult<()> {
        let mut defaults = write_guard(&self.defaults)?;
        if defaults
            .values()
            .any(|e| e.kind == entry.kind && e.role_id == entry.role_id)
        {
            return Err(already_exists(
                RecordKind::DefaultAccessEntry,
                format!("{}/{}", entry.kind, entry.role_id),
            )
            .into());
        }
        defaults.insert(entry.entry_id, entry.clone());
        Ok(())
    }

    fn default_get(
        &self,
        kind: TargetKind,
        role_id: RoleId,
    ) -> EdmsResult<Option<DefaultAccessEntry>> {
        Ok(read_guard(&self.defaults)?
            .values()
            .find(|e| e.kind == kind && e.role_id == role_id)
            .cloned())
    }

    fn default_update(&self, entry: &DefaultAccessEntry) -> EdmsResult<()> {
        let mut defaults = write_guard(&self.defaults)?;
        let existing = defaults
            .get_mut(&entry.entry_id)
            .ok_or_else(|| not_found(RecordKind::DefaultAccessEntry, entry.entry_id))?;
        *existing = entry.clone();
        Ok(())
    }

    fn default_delete(&self, id: DefaultAccessId) -> EdmsResult<()> {
        if write_guard(&self.defaults)?.remove(&id).is_none() {
            return Err(not_found(RecordKind::DefaultAccessEntry, id).into());
        }
        Ok(())
    }

    fn default_list_for_kind(&self, kind: TargetKind) -> EdmsResult<Vec<DefaultAccessEntry>> {
        Ok(read_guard(&self.defaults)?
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use edms_core::{EdmsError, EntityIdType, PermissionKey};
    use uuid::Uuid;

    fn document() -> TargetRef {
        TargetRef::new(TargetKind::Document, Uuid::now_v7())
    }

    #[test]
    fn test_user_insert_get() {
        let storage = MemoryAccessStorage::new();
        let user = User::new("alice");
        storage.user_insert(&user).unwrap();

        let retrieved = storage.user_get(user.user_id).unwrap().unwrap();
        assert_eq!(retrieved.username, "alice");
        assert!(storage.user_insert(&user).is_err());
    }

    #[test]
    fn test_role_label_unique() {
        let storage = MemoryAccessStorage::new();
        storage.role_insert(&Role::new("Editors")).unwrap();
        let err = storage.role_insert(&Role::new("Editors")).unwrap_err();
        assert!(matches!(
            err,
            EdmsError::Storage(StorageError::AlreadyExists {
                kind: RecordKind::Role,
                ..
            })
        ));
    }

    #[test]
    fn test_role_update_missing() {
        let storage = MemoryAccessStorage::new();
        let err = storage.role_update(&Role::new("Ghosts")).unwrap_err();
        assert!(matches!(
            err,
            EdmsError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_acl_unique_per_target_and_role() {
        let storage = MemoryAccessStorage::new();
        let role = Role::new("Editors");
        let target = document();

        storage
            .acl_insert(&AccessControlEntry::new(target, role.role_id))
            .unwrap();
        assert!(storage
            .acl_insert(&AccessControlEntry::new(target, role.role_id))
            .is_err());

        // Same role on another target is fine.
        storage
            .acl_insert(&AccessControlEntry::new(document(), role.role_id))
            .unwrap();
        assert_eq!(storage.acl_count().unwrap(), 2);
    }

    #[test]
    fn test_acl_update_and_list() {
        let storage = MemoryAccessStorage::new();
        let role = Role::new("Viewers");
        let target = document();

        let mut entry = AccessControlEntry::new(target, role.role_id);
        storage.acl_insert(&entry).unwrap();
        entry
            .permissions
            .insert(PermissionKey::from("documents.document_view"));
        storage.acl_update(&entry).unwrap();

        let entries = storage.acl_list_for_target(target).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0]
            .permissions
            .contains(&PermissionKey::from("documents.document_view")));
    }

    #[test]
    fn test_acl_delete_for_target() {
        let storage = MemoryAccessStorage::new();
        let target = document();
        let other = document();
        storage
            .acl_insert(&AccessControlEntry::new(target, RoleId::now_v7()))
            .unwrap();
        storage
            .acl_insert(&AccessControlEntry::new(target, RoleId::now_v7()))
            .unwrap();
        storage
            .acl_insert(&AccessControlEntry::new(other, RoleId::now_v7()))
            .unwrap();

        assert_eq!(storage.acl_delete_for_target(target).unwrap(), 2);
        assert!(storage.acl_list_for_target(target).unwrap().is_empty());
        assert_eq!(storage.acl_list_for_target(other).unwrap().len(), 1);
    }

    #[test]
    fn test_role_delete_cascades_entries() {
        let storage = MemoryAccessStorage::new();
        let role = Role::new("Temporary");
        storage.role_insert(&role).unwrap();
        storage
            .acl_insert(&AccessControlEntry::new(document(), role.role_id))
            .unwrap();
        storage
            .default_insert(&DefaultAccessEntry::new(TargetKind::Tag, role.role_id))
            .unwrap();

        storage.role_delete(role.role_id).unwrap();
        assert_eq!(storage.acl_count().unwrap(), 0);
        assert!(storage
            .default_list_for_kind(TargetKind::Tag)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_default_unique_per_kind_and_role() {
        let storage = MemoryAccessStorage::new();
        let role_id = RoleId::now_v7();
        storage
            .default_insert(&DefaultAccessEntry::new(TargetKind::Document, role_id))
            .unwrap();
        assert!(storage
            .default_insert(&DefaultAccessEntry::new(TargetKind::Document, role_id))
            .is_err());
        storage
            .default_insert(&DefaultAccessEntry::new(TargetKind::Folder, role_id))
            .unwrap();

        assert_eq!(
            storage
                .default_list_for_kind(TargetKind::Document)
                .unwrap()
                .len(),
            1
        );
        assert!(storage
            .default_get(TargetKind::Folder, role_id)
            .unwrap()
            .is_some());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use edms_core::EntityIdType;
    use proptest::prelude::*;
    use uuid::Uuid;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Inserting N entries on distinct roles yields N entries for the target.
        #[test]
        fn prop_acl_list_matches_inserts(n in 0usize..20) {
            let storage = MemoryAccessStorage::new();
            let target = TargetRef::new(TargetKind::Folder, Uuid::now_v7());
            for _ in 0..n {
                storage
                    .acl_insert(&AccessControlEntry::new(target, RoleId::now_v7()))
                    .unwrap();
            }
            prop_assert_eq!(storage.acl_list_for_target(target).unwrap().len(), n);
        }
    }
}
