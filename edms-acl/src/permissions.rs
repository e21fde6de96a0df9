//! Permission registry.
//!
//! Apps declare their namespaces and permissions at boot. The registry is
//! then shared read-only; permissions are never removed.

use crate::membership::roles_for_user;
use edms_core::{
    AccessError, EdmsResult, Permission, PermissionKey, PermissionNamespace, User,
};
use edms_storage::AccessStorage;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct PermissionRegistry {
    namespaces: BTreeMap<String, PermissionNamespace>,
    permissions: BTreeMap<PermissionKey, Permission>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a namespace. Declaring it again returns the first declaration.
    pub fn namespace(&mut self, name: &str, label: &str) -> PermissionNamespace {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| PermissionNamespace::new(name, label))
            .clone()
    }

    /// Register `namespace.name`. The namespace must exist and the key must
    /// be new.
    pub fn register(
        &mut self,
        namespace: &str,
        name: &str,
        label: &str,
    ) -> Result<Permission, AccessError> {
        if !self.namespaces.contains_key(namespace) {
            return Err(AccessError::NamespaceNotRegistered {
                namespace: namespace.to_string(),
            });
        }
        let permission = Permission::new(namespace, name, label);
        let pk = permission.pk();
        if self.permissions.contains_key(&pk) {
            return Err(AccessError::DuplicatePermission { pk: pk.to_string() });
        }
        debug!(permission = %pk, "permission registered");
        self.permissions.insert(pk, permission.clone());
        Ok(permission)
    }

    pub fn get(&self, pk: &PermissionKey) -> Result<&Permission, AccessError> {
        self.permissions
            .get(pk)
            .ok_or_else(|| AccessError::PermissionNotRegistered { pk: pk.to_string() })
    }

    pub fn is_registered(&self, pk: &PermissionKey) -> bool {
        self.permissions.contains_key(pk)
    }

    /// Every permission, ordered by namespace then name.
    pub fn all(&self) -> Vec<&Permission> {
        let mut all: Vec<&Permission> = self.permissions.values().collect();
        all.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        all
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &PermissionNamespace> {
        self.namespaces.values()
    }

    /// Permissions of one namespace, ordered by name.
    pub fn in_namespace(&self, namespace: &str) -> Vec<&Permission> {
        self.all()
            .into_iter()
            .filter(|p| p.namespace == namespace)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Pass if `user` bypasses checks or one of their roles grants any of
    /// `permissions` globally.
    pub fn check_permissions(
        &self,
        storage: &dyn AccessStorage,
        user: &User,
        permissions: &[PermissionKey],
    ) -> EdmsResult<()> {
        for pk in permissions {
            self.get(pk)?;
        }
        if user.bypasses_access_checks() {
            return Ok(());
        }
        let granted = roles_for_user(storage, user)?
            .iter()
            .any(|role| permissions.iter().any(|pk| role.permissions.contains(pk)));
        if granted {
            Ok(())
        } else {
            Err(AccessError::insufficient_access().into())
        }
    }
}
