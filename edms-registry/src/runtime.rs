//! Boot sequence. Apps fill fresh registries from a validated
//! configuration before any long-lived service is built.

use crate::app::{AppContext, AppRegistry, CleanupRegistry};
use crate::settings::SettingsRegistry;
use edms_acl::{AccessControlList, PermissionRegistry, RelationTable, TargetRegistry};
use edms_converter::{CachedConverter, CommandRunner, Converter};
use edms_core::{EdmsConfig, EdmsResult, LockBackendKind, TargetKind, TargetRef};
use edms_storage::{
    AccessStorage, FileCache, FileCaches, FileLockBackend, JsonCacheStore, LockManager,
    MemoryAccessStorage,
};
use std::sync::Arc;
use tracing::info;

/// Long-lived services shared by request handlers and cleanup callbacks.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn AccessStorage>,
    pub acl: AccessControlList,
    pub relations: Arc<RelationTable>,
    pub locks: LockManager,
    pub caches: FileCaches,
    pub converter: Arc<Converter>,
    pub pages: CachedConverter,
}

impl Services {
    /// Forget a deleted document everywhere it is referenced. Returns the
    /// number of cache files removed.
    pub fn delete_document(&self, document: TargetRef) -> EdmsResult<usize> {
        self.acl.delete_target(document)?;
        self.relations.clear(document)?;
        let removed = self.pages.forget_document(&document.object_id.to_string())?;
        info!(document = %document, removed, "document forgotten");
        Ok(removed)
    }

    /// Record that `document` belongs to `document_type`.
    pub fn link_document_type(&self, document: TargetRef, document_type: TargetRef) -> EdmsResult<()> {
        debug_assert_eq!(document.kind, TargetKind::Document);
        debug_assert_eq!(document_type.kind, TargetKind::DocumentType);
        self.relations.link(document, document_type)
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("acl", &self.acl)
            .field("locks", &self.locks)
            .field("caches", &self.caches)
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

/// A booted process: registries plus services.
#[derive(Debug)]
pub struct Runtime {
    config: EdmsConfig,
    apps: AppRegistry,
    settings: SettingsRegistry,
    cleanups: CleanupRegistry,
    services: Services,
}

impl Runtime {
    /// Boot with the built-in apps.
    pub fn boot(config: EdmsConfig, runner: Arc<dyn CommandRunner>) -> EdmsResult<Self> {
        Self::boot_with(config, AppRegistry::builtin()?, runner)
    }

    pub fn boot_with(
        config: EdmsConfig,
        apps: AppRegistry,
        runner: Arc<dyn CommandRunner>,
    ) -> EdmsResult<Self> {
        config.validate()?;

        let mut settings = SettingsRegistry::from_config(&config)?;
        let mut permissions = PermissionRegistry::new();
        let mut targets = TargetRegistry::new();
        let mut cleanups = CleanupRegistry::new();
        let relations = Arc::new(RelationTable::new());
        {
            let mut ctx = AppContext {
                config: &config,
                settings: &mut settings,
                permissions: &mut permissions,
                targets: &mut targets,
                cleanups: &mut cleanups,
                relations: relations.clone(),
            };
            apps.boot(&mut ctx)?;
        }
        settings.validate()?;

        let locks = lock_manager(&config)?;
        let mut caches = FileCaches::new();
        for definition in &config.caches {
            let store = JsonCacheStore::in_directory(&definition.directory)?;
            let cache = FileCache::from_definition(definition, Arc::new(store), locks.clone())?;
            caches.insert(definition.name.clone(), Arc::new(cache));
        }

        let converter = Arc::new(Converter::from_config(&config, runner));
        let pages = CachedConverter::new(converter.clone(), caches.get(&config.converter.cache_name)?);
        let storage: Arc<dyn AccessStorage> = Arc::new(MemoryAccessStorage::new());
        let acl = AccessControlList::new(storage.clone(), Arc::new(permissions), Arc::new(targets));

        info!(
            apps = apps.len(),
            settings = settings.len(),
            cleanups = cleanups.len(),
            caches = caches.len(),
            backend = %converter.backend_kind(),
            "runtime booted"
        );

        Ok(Runtime {
            config,
            apps,
            settings,
            cleanups,
            services: Services {
                storage,
                acl,
                relations,
                locks,
                caches,
                converter,
                pages,
            },
        })
    }

    pub fn config(&self) -> &EdmsConfig {
        &self.config
    }

    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    pub fn settings(&self) -> &SettingsRegistry {
        &self.settings
    }

    pub fn cleanups(&self) -> &CleanupRegistry {
        &self.cleanups
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn acl(&self) -> &AccessControlList {
        &self.services.acl
    }

    pub fn permissions(&self) -> &PermissionRegistry {
        self.services.acl.permissions()
    }

    /// Run every registered cleanup callback.
    pub fn cleanup(&self) -> EdmsResult<usize> {
        self.cleanups.run(&self.services)
    }
}

fn lock_manager(config: &EdmsConfig) -> EdmsResult<LockManager> {
    let timeout = config.locking.default_timeout();
    Ok(match config.locking.backend {
        LockBackendKind::Memory => LockManager::in_memory(timeout),
        LockBackendKind::File => LockManager::new(
            Arc::new(FileLockBackend::new(&config.locking.directory)?),
            timeout,
        ),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use edms_converter::ScriptedRunner;
    use edms_core::{ConfigError, EdmsError};
    use edms_test_utils::fixtures::config_with_tools;

    #[test]
    fn test_boot_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let runtime =
            Runtime::boot(config_with_tools(dir.path()), Arc::new(ScriptedRunner::new())).unwrap();
        assert_eq!(runtime.apps().len(), 6);
        assert!(runtime.settings().get("CONVERTER_IM_CONVERT_PATH").unwrap().exists);
        assert!(!runtime.settings().get("CONVERTER_GM_PATH").unwrap().exists);
        assert_eq!(runtime.cleanups().len(), 2);
        assert_eq!(runtime.services().caches.len(), 1);
        assert!(runtime
            .permissions()
            .is_registered(&crate::apps::documents::permission("document_view")));
    }

    #[test]
    fn test_boot_rejects_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_tools(dir.path());
        config.converter.im_convert_path = dir.path().join("bin").join("nope");
        let err = Runtime::boot(config, Arc::new(ScriptedRunner::new())).unwrap_err();
        assert!(matches!(
            err,
            EdmsError::Config(ConfigError::PathNotFound { ref setting, .. }) if setting == "CONVERTER_IM_CONVERT_PATH"
        ));
    }

    #[test]
    fn test_boot_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_tools(dir.path());
        config.converter.jpeg_quality = 0;
        assert!(matches!(
            Runtime::boot(config, Arc::new(ScriptedRunner::new())),
            Err(EdmsError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_file_lock_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_tools(dir.path());
        config.locking.backend = LockBackendKind::File;
        let runtime = Runtime::boot(config, Arc::new(ScriptedRunner::new())).unwrap();
        let guard = runtime.services().locks.acquire("runtime-test").unwrap();
        assert!(dir.path().join("locks").exists());
        assert!(runtime.services().locks.is_locked("runtime-test").unwrap());
        assert!(guard.release().unwrap());
    }
}
