//! EDMS Test Utilities
//!
//! Shared test infrastructure for the EDMS workspace:
//! - Proptest generators for identifiers, targets and transformations
//! - Fixtures wiring users, groups and roles into an in-memory store
//! - Assertions for EDMS error variants

// Re-export fakes from their source crates
pub use edms_converter::{Invocation, ProcessOutput, ScriptedRunner};
pub use edms_storage::{MemoryAccessStorage, MemoryCacheStore, MemoryLockBackend};

pub use edms_core::{
    AccessError, ConfigError, ConverterError, EdmsConfig, EdmsError, EdmsResult, EntityIdType,
    Group, PermissionKey, Role, TargetKind, TargetRef, User,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for EDMS value types.

    use super::*;
    use edms_converter::{QualityPreset, Transformation};
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_target_kind() -> impl Strategy<Value = TargetKind> {
        proptest::sample::select(TargetKind::ALL.to_vec())
    }

    pub fn arb_target_ref() -> impl Strategy<Value = TargetRef> {
        (arb_target_kind(), arb_uuid()).prop_map(|(kind, id)| TargetRef::new(kind, id))
    }

    /// Permission keys in one of a few namespaces.
    pub fn arb_permission_key() -> impl Strategy<Value = PermissionKey> {
        (
            proptest::sample::select(vec!["documents", "tags", "acls"]),
            "[a-z][a-z_]{0,15}",
        )
            .prop_map(|(namespace, name)| PermissionKey::new(namespace, &name))
    }

    pub fn arb_quality_preset() -> impl Strategy<Value = QualityPreset> {
        prop_oneof![
            Just(QualityPreset::Default),
            Just(QualityPreset::Low),
            Just(QualityPreset::High),
            Just(QualityPreset::Print),
        ]
    }

    pub fn arb_transformation() -> impl Strategy<Value = Transformation> {
        prop_oneof![
            (1u32..4000, proptest::option::of(1u32..4000))
                .prop_map(|(width, height)| Transformation::Resize { width, height }),
            (-720i64..720).prop_map(Transformation::rotate),
            (1u32..400).prop_map(|percent| Transformation::Zoom { percent }),
            (1u32..1200).prop_map(|dpi| Transformation::Density { dpi }),
            (0u32..200, 0u32..200, 0u32..200, 0u32..200).prop_map(
                |(left, top, right, bottom)| Transformation::Crop {
                    left,
                    top,
                    right,
                    bottom
                }
            ),
        ]
    }

    pub fn arb_transformations() -> impl Strategy<Value = Vec<Transformation>> {
        proptest::collection::vec(arb_transformation(), 0..6)
    }

    /// Keyword arguments as they feed a cache key.
    pub fn arb_keywords() -> impl Strategy<Value = Vec<(String, String)>> {
        proptest::collection::btree_map("[a-z_]{1,10}", "[ -~]{0,20}", 0..6)
            .prop_map(|map| map.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use edms_acl::{AccessControlList, PermissionRegistry, RelationTable, TargetRegistry};
    use edms_storage::AccessStorage;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    /// Stock configuration rooted at `root`, with empty stand-ins for every
    /// external tool so path checks pass.
    pub fn config_with_tools(root: &Path) -> EdmsConfig {
        let mut config = EdmsConfig::defaults_for(root);
        let bin = root.join("bin");
        fs::create_dir_all(&bin).expect("create bin directory");
        for tool in ["convert", "identify", "gm", "libreoffice", "unoconv"] {
            fs::write(bin.join(tool), b"").expect("write tool stand-in");
        }
        config.converter.im_convert_path = bin.join("convert");
        config.converter.im_identify_path = bin.join("identify");
        config.converter.gm_path = bin.join("gm");
        config.converter.libreoffice_path = bin.join("libreoffice");
        config.converter.unoconv_path = bin.join("unoconv");
        config
    }

    /// A small permission set: `documents.document_view`,
    /// `documents.document_edit` and `tags.tag_attach`, with documents
    /// inheriting from their type through the returned relation table.
    pub fn document_registries() -> (PermissionRegistry, TargetRegistry, Arc<RelationTable>) {
        let mut permissions = PermissionRegistry::new();
        permissions.namespace("documents", "Documents");
        permissions.namespace("tags", "Tags");
        for (namespace, name) in [
            ("documents", "document_view"),
            ("documents", "document_edit"),
            ("tags", "tag_attach"),
        ] {
            permissions
                .register(namespace, name, name)
                .expect("register fixture permission");
        }

        let relations = Arc::new(RelationTable::new());
        let mut targets = TargetRegistry::new();
        targets.register_inheritance(TargetKind::Document, relations.clone());
        (permissions, targets, relations)
    }

    pub fn document_view() -> PermissionKey {
        PermissionKey::new("documents", "document_view")
    }

    pub fn document_edit() -> PermissionKey {
        PermissionKey::new("documents", "document_edit")
    }

    /// Principals in an in-memory store plus a resolver over them.
    pub struct AccessFixture {
        pub storage: Arc<MemoryAccessStorage>,
        pub acl: AccessControlList,
        pub relations: Arc<RelationTable>,
    }

    impl AccessFixture {
        /// Fixture over [`document_registries`].
        pub fn new() -> Self {
            let (permissions, targets, relations) = document_registries();
            Self::with_registries(permissions, targets, relations)
        }

        pub fn with_registries(
            permissions: PermissionRegistry,
            targets: TargetRegistry,
            relations: Arc<RelationTable>,
        ) -> Self {
            let storage = Arc::new(MemoryAccessStorage::new());
            let acl = AccessControlList::new(
                storage.clone(),
                Arc::new(permissions),
                Arc::new(targets),
            );
            AccessFixture {
                storage,
                acl,
                relations,
            }
        }

        pub fn user(&self, username: &str) -> User {
            let user = User::new(username);
            self.storage.user_insert(&user).expect("insert user");
            user
        }

        pub fn superuser(&self, username: &str) -> User {
            let user = User::new(username).with_superuser(true);
            self.storage.user_insert(&user).expect("insert user");
            user
        }

        pub fn group(&self, name: &str) -> Group {
            let group = Group::new(name);
            self.storage.group_insert(&group).expect("insert group");
            group
        }

        /// A user who belongs to `group`.
        pub fn member_of(&self, username: &str, group: &Group) -> User {
            let user = User::new(username).with_group(group.group_id);
            self.storage.user_insert(&user).expect("insert user");
            user
        }

        pub fn role(&self, label: &str, users: &[&User], groups: &[&Group]) -> Role {
            let mut role = Role::new(label);
            for user in users {
                role = role.with_user(user.user_id);
            }
            for group in groups {
                role = role.with_group(group.group_id);
            }
            self.storage.role_insert(&role).expect("insert role");
            role
        }

        pub fn document(&self) -> TargetRef {
            TargetRef::new(TargetKind::Document, uuid::Uuid::now_v7())
        }

        /// A document linked to a fresh document type.
        pub fn typed_document(&self) -> (TargetRef, TargetRef) {
            let document = self.document();
            let document_type = TargetRef::new(TargetKind::DocumentType, uuid::Uuid::now_v7());
            self.relations
                .link(document, document_type)
                .expect("link document type");
            (document, document_type)
        }
    }

    impl Default for AccessFixture {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for EDMS error variants.

    use super::*;

    #[track_caller]
    pub fn assert_permission_denied<T: std::fmt::Debug>(result: &EdmsResult<T>) {
        match result {
            Err(EdmsError::Access(AccessError::PermissionDenied { .. })) => {}
            other => panic!("Expected PermissionDenied, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &EdmsResult<T>) {
        match result {
            Err(EdmsError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_path_not_found<T: std::fmt::Debug>(result: &EdmsResult<T>, setting: &str) {
        match result {
            Err(EdmsError::Config(ConfigError::PathNotFound { setting: s, .. })) => {
                assert_eq!(s, setting, "Wrong setting in PathNotFound error");
            }
            other => panic!("Expected PathNotFound for {}, got: {:?}", setting, other),
        }
    }

    #[track_caller]
    pub fn assert_converter_error<T: std::fmt::Debug>(result: &EdmsResult<T>) {
        match result {
            Err(EdmsError::Converter(_)) => {}
            other => panic!("Expected Converter error, got: {:?}", other),
        }
    }
}
