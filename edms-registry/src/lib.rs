//! EDMS Registry - Settings, Apps and Runtime Bootstrap
//!
//! Apps declare settings, permissions, target kinds and cleanup callbacks
//! into registries built once at boot. The runtime then assembles the lock
//! manager, file caches, converter and access resolver from the validated
//! configuration.

pub mod app;
pub mod apps;
pub mod runtime;
pub mod settings;
pub mod telemetry;

pub use app::{App, AppContext, AppRegistry, CleanupRegistry};
pub use apps::builtin_apps;
pub use runtime::{Runtime, Services};
pub use settings::{Setting, SettingNamespace, SettingsRegistry};
pub use telemetry::init_tracing;
