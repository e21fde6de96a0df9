//! App trait, boot context and the ordered app registry.

use crate::runtime::Services;
use crate::settings::SettingsRegistry;
use edms_acl::{PermissionRegistry, RelationTable, TargetRegistry};
use edms_core::{ConfigError, EdmsConfig, EdmsResult};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// BOOT CONTEXT
// ============================================================================

/// Registries an app may add to while it boots.
pub struct AppContext<'a> {
    pub config: &'a EdmsConfig,
    pub settings: &'a mut SettingsRegistry,
    pub permissions: &'a mut PermissionRegistry,
    pub targets: &'a mut TargetRegistry,
    pub cleanups: &'a mut CleanupRegistry,
    /// Parent links shared with the runtime.
    pub relations: Arc<RelationTable>,
}

/// A unit of functionality that contributes to the registries at boot.
pub trait App: Send + Sync {
    fn name(&self) -> &'static str;

    fn label(&self) -> &'static str {
        self.name()
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()>;
}

// ============================================================================
// CLEANUP CALLBACKS
// ============================================================================

type CleanupFn = Box<dyn Fn(&Services) -> EdmsResult<()> + Send + Sync>;

struct Cleanup {
    app: String,
    label: String,
    callback: CleanupFn,
}

/// Callbacks that wipe app state, run in registration order.
#[derive(Default)]
pub struct CleanupRegistry {
    entries: Vec<Cleanup>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, app: &str, label: &str, callback: F)
    where
        F: Fn(&Services) -> EdmsResult<()> + Send + Sync + 'static,
    {
        self.entries.push(Cleanup {
            app: app.to_string(),
            label: label.to_string(),
            callback: Box::new(callback),
        });
    }

    /// Run every callback; the first failure stops the run.
    pub fn run(&self, services: &Services) -> EdmsResult<usize> {
        for (index, cleanup) in self.entries.iter().enumerate() {
            if let Err(e) = (cleanup.callback)(services) {
                warn!(app = %cleanup.app, cleanup = %cleanup.label, error = %e, "cleanup failed");
                return Err(e);
            }
            info!(app = %cleanup.app, cleanup = %cleanup.label, position = index, "cleanup done");
        }
        Ok(self.entries.len())
    }

    /// `(app, label)` pairs in run order.
    pub fn labels(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|c| (c.app.as_str(), c.label.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

// ============================================================================
// APP REGISTRY
// ============================================================================

/// Apps in declaration order.
#[derive(Default)]
pub struct AppRegistry {
    apps: Vec<Box<dyn App>>,
    names: HashSet<&'static str>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock app set: permissions, acls, lock_manager, file_caching,
    /// converter, documents.
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for app in crate::apps::builtin_apps() {
            registry.register(app)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, app: Box<dyn App>) -> Result<(), ConfigError> {
        if !self.names.insert(app.name()) {
            return Err(ConfigError::DuplicateApp {
                name: app.name().to_string(),
            });
        }
        self.apps.push(app);
        Ok(())
    }

    pub fn with_app(mut self, app: Box<dyn App>) -> Result<Self, ConfigError> {
        self.register(app)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.apps.iter().map(|app| app.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Call `ready` on every app in declaration order.
    pub fn boot(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        for app in &self.apps {
            app.ready(ctx)?;
            info!(app = app.name(), label = app.label(), "app ready");
        }
        Ok(())
    }
}

impl fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.names())
            .finish()
    }
}
