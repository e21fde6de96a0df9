//! Property-Based Tests for Target and Permission Identifiers
//!
//! Targets and permission keys are what grants are stored and looked up
//! by, so their text forms must be stable and unambiguous.

use edms_core::{PermissionKey, TargetKind, TargetRef};
use edms_test_utils::generators::{arb_permission_key, arb_target_kind, arb_target_ref};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The stored name of a kind parses back to the same kind.
    #[test]
    fn prop_target_kind_db_name_is_stable(kind in arb_target_kind()) {
        let parsed: TargetKind = kind.to_string().parse().unwrap();
        prop_assert_eq!(parsed, kind);
    }

    /// `kind:id` is unique per target.
    #[test]
    fn prop_target_display_identifies_target(a in arb_target_ref(), b in arb_target_ref()) {
        prop_assume!(a != b);
        prop_assert_ne!(a.to_string(), b.to_string());
        prop_assert!(a.to_string().ends_with(&a.object_id.to_string()));
    }

    /// Targets keep kind and id through JSON.
    #[test]
    fn prop_target_serializes_by_value(target in arb_target_ref()) {
        let json = serde_json::to_string(&target).unwrap();
        let back: TargetRef = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, target);
    }

    /// The namespace is everything before the first dot.
    #[test]
    fn prop_permission_namespace(pk in arb_permission_key()) {
        let (namespace, name) = pk.as_str().split_once('.').unwrap();
        prop_assert_eq!(pk.namespace(), namespace);
        prop_assert_eq!(&PermissionKey::new(namespace, name), &pk);
        prop_assert_eq!(PermissionKey::from(pk.to_string()), pk.clone());
    }
}
