//! Target kinds: which permissions apply to them and where they inherit
//! access from.

use crate::permissions::PermissionRegistry;
use edms_core::{
    AccessError, EdmsResult, PermissionKey, PermissionSet, StorageError, TargetKind, TargetRef,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Finds the objects a target inherits access from.
pub trait TargetHandler: Send + Sync {
    fn parents(&self, target: &TargetRef) -> EdmsResult<Vec<TargetRef>>;
}

/// Parent links kept in memory, e.g. document to document type.
#[derive(Debug, Default, Clone)]
pub struct RelationTable {
    links: Arc<RwLock<HashMap<TargetRef, Vec<TargetRef>>>>,
}

impl RelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, child: TargetRef, parent: TargetRef) -> EdmsResult<()> {
        let mut links = self.links.write().map_err(|_| StorageError::LockPoisoned)?;
        let parents = links.entry(child).or_default();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
        Ok(())
    }

    pub fn unlink(&self, child: TargetRef, parent: TargetRef) -> EdmsResult<()> {
        let mut links = self.links.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(parents) = links.get_mut(&child) {
            parents.retain(|p| *p != parent);
        }
        Ok(())
    }

    /// Forget every link from `child`.
    pub fn clear(&self, child: TargetRef) -> EdmsResult<()> {
        self.links
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(&child);
        Ok(())
    }
}

impl TargetHandler for RelationTable {
    fn parents(&self, target: &TargetRef) -> EdmsResult<Vec<TargetRef>> {
        Ok(self
            .links
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(target)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default, Clone)]
struct KindEntry {
    permissions: PermissionSet,
    handler: Option<Arc<dyn TargetHandler>>,
}

/// Per-kind permission sets and inheritance handlers, filled at boot.
#[derive(Default, Clone)]
pub struct TargetRegistry {
    kinds: BTreeMap<TargetKind, KindEntry>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `permissions` as valid for `kind`. Each must already be
    /// registered.
    pub fn register_permissions(
        &mut self,
        registry: &PermissionRegistry,
        kind: TargetKind,
        permissions: &[PermissionKey],
    ) -> Result<(), AccessError> {
        for pk in permissions {
            registry.get(pk)?;
        }
        self.kinds
            .entry(kind)
            .or_default()
            .permissions
            .extend(permissions.iter().cloned());
        Ok(())
    }

    /// Install the inheritance handler for `kind`, replacing any earlier one.
    pub fn register_inheritance(&mut self, kind: TargetKind, handler: Arc<dyn TargetHandler>) {
        self.kinds.entry(kind).or_default().handler = Some(handler);
    }

    /// Declared permissions of `kind`; `None` when it declares none.
    pub fn valid_permissions(&self, kind: TargetKind) -> Option<&PermissionSet> {
        self.kinds
            .get(&kind)
            .map(|entry| &entry.permissions)
            .filter(|permissions| !permissions.is_empty())
    }

    /// Kinds without a declared set accept any registered permission.
    pub fn is_valid(&self, kind: TargetKind, pk: &PermissionKey) -> bool {
        self.valid_permissions(kind)
            .map_or(true, |permissions| permissions.contains(pk))
    }

    pub fn validate(&self, kind: TargetKind, pk: &PermissionKey) -> Result<(), AccessError> {
        if self.is_valid(kind, pk) {
            Ok(())
        } else {
            Err(AccessError::PermissionNotValidForTarget {
                pk: pk.to_string(),
                kind,
            })
        }
    }

    pub fn has_inheritance(&self, kind: TargetKind) -> bool {
        self.kinds
            .get(&kind)
            .is_some_and(|entry| entry.handler.is_some())
    }

    /// Parents of `target`, empty when its kind has no handler.
    pub fn parents(&self, target: &TargetRef) -> EdmsResult<Vec<TargetRef>> {
        match self.kinds.get(&target.kind).and_then(|e| e.handler.as_ref()) {
            Some(handler) => handler.parents(target),
            None => Ok(Vec::new()),
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = TargetKind> + '_ {
        self.kinds.keys().copied()
    }
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, entry) in &self.kinds {
            map.entry(kind, &(entry.permissions.len(), entry.handler.is_some()));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn target(kind: TargetKind) -> TargetRef {
        TargetRef::new(kind, Uuid::now_v7())
    }

    fn permissions() -> PermissionRegistry {
        let mut registry = PermissionRegistry::new();
        registry.namespace("documents", "Documents");
        registry.namespace("tags", "Tags");
        registry.register("documents", "document_view", "View").unwrap();
        registry.register("tags", "tag_attach", "Attach").unwrap();
        registry
    }

    #[test]
    fn test_valid_permissions_per_kind() {
        let registry = permissions();
        let view = PermissionKey::new("documents", "document_view");
        let attach = PermissionKey::new("tags", "tag_attach");
        let mut targets = TargetRegistry::new();
        targets
            .register_permissions(&registry, TargetKind::Document, &[view.clone()])
            .unwrap();

        assert!(targets.is_valid(TargetKind::Document, &view));
        assert!(!targets.is_valid(TargetKind::Document, &attach));
        assert_eq!(
            targets.validate(TargetKind::Document, &attach),
            Err(AccessError::PermissionNotValidForTarget {
                pk: "tags.tag_attach".to_string(),
                kind: TargetKind::Document
            })
        );
        // Undeclared kinds accept anything.
        assert!(targets.is_valid(TargetKind::Tag, &view));
        assert!(targets.valid_permissions(TargetKind::Tag).is_none());
    }

    #[test]
    fn test_register_unknown_permission() {
        let registry = permissions();
        let mut targets = TargetRegistry::new();
        assert!(matches!(
            targets.register_permissions(&registry, TargetKind::Tag, &[PermissionKey::from("tags.nope")]),
            Err(AccessError::PermissionNotRegistered { .. })
        ));
    }

    #[test]
    fn test_relation_table_parents() {
        let relations = Arc::new(RelationTable::new());
        let document = target(TargetKind::Document);
        let document_type = target(TargetKind::DocumentType);
        relations.link(document, document_type).unwrap();
        relations.link(document, document_type).unwrap();

        let mut targets = TargetRegistry::new();
        targets.register_inheritance(TargetKind::Document, relations.clone());
        assert!(targets.has_inheritance(TargetKind::Document));
        assert_eq!(targets.parents(&document).unwrap(), vec![document_type]);
        assert!(targets.parents(&document_type).unwrap().is_empty());

        relations.unlink(document, document_type).unwrap();
        assert!(targets.parents(&document).unwrap().is_empty());
        relations.link(document, document_type).unwrap();
        relations.clear(document).unwrap();
        assert!(targets.parents(&document).unwrap().is_empty());
    }
}
