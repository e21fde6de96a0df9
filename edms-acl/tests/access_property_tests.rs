//! Property-Based Tests for the Access Resolver
//!
//! For any protected object, access follows the grants held by the
//! requester's roles: granting opens it, revoking closes it again, and
//! grants on one object never leak to another.

use edms_acl::{AccessControlList, PermissionRegistry, TargetRegistry};
use edms_core::{PermissionKey, Role, User};
use edms_storage::{AccessStorage, MemoryAccessStorage};
use edms_test_utils::generators::{arb_permission_key, arb_target_ref};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn acl_with(
    permissions: &BTreeSet<PermissionKey>,
) -> (AccessControlList, Arc<MemoryAccessStorage>) {
    let mut registry = PermissionRegistry::new();
    for pk in permissions {
        let (namespace, name) = pk.as_str().split_once('.').unwrap();
        registry.namespace(namespace, namespace);
        registry.register(namespace, name, name).unwrap();
    }
    let storage = Arc::new(MemoryAccessStorage::new());
    let acl = AccessControlList::new(
        storage.clone(),
        Arc::new(registry),
        Arc::new(TargetRegistry::new()),
    );
    (acl, storage)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Grant then revoke, checked for every registered permission.
    #[test]
    fn prop_grant_and_revoke(
        target in arb_target_ref(),
        other in arb_target_ref(),
        permissions in prop::collection::btree_set(arb_permission_key(), 1..5),
    ) {
        prop_assume!(target != other);
        let (acl, storage) = acl_with(&permissions);
        let user = User::new("member");
        storage.user_insert(&user).unwrap();
        let role = Role::new("members").with_user(user.user_id);
        storage.role_insert(&role).unwrap();
        let granted: Vec<_> = permissions.iter().cloned().collect();

        for pk in &granted {
            prop_assert!(!acl.has_access(pk, &user, target).unwrap());
        }

        acl.grant(target, role.role_id, &granted).unwrap();
        for pk in &granted {
            prop_assert!(acl.has_access(pk, &user, target).unwrap());
            prop_assert!(!acl.has_access(pk, &user, other).unwrap());
        }
        prop_assert_eq!(
            acl.filter_by_access(&granted[0], &user, &[other, target]).unwrap(),
            vec![target]
        );

        prop_assert!(acl.revoke(target, role.role_id, &granted).unwrap());
        for pk in &granted {
            prop_assert!(!acl.has_access(pk, &user, target).unwrap());
        }
        prop_assert!(storage.acl_list_for_target(target).unwrap().is_empty());
    }

    /// A user outside the granted role never gets through.
    #[test]
    fn prop_outsider_denied(
        target in arb_target_ref(),
        permissions in prop::collection::btree_set(arb_permission_key(), 1..5),
    ) {
        let (acl, storage) = acl_with(&permissions);
        let member = User::new("member");
        let outsider = User::new("outsider");
        storage.user_insert(&member).unwrap();
        storage.user_insert(&outsider).unwrap();
        let role = Role::new("members").with_user(member.user_id);
        storage.role_insert(&role).unwrap();
        let granted: Vec<_> = permissions.iter().cloned().collect();
        acl.grant(target, role.role_id, &granted).unwrap();

        prop_assert!(acl.check_accesses(&granted, &member, target).is_ok());
        let denied = acl.check_accesses(&granted, &outsider, target);
        prop_assert!(matches!(denied, Err(ref e) if e.is_permission_denied()));
    }
}
