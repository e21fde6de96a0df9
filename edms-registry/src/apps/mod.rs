//! Built-in apps.

pub mod acls;
pub mod converter;
pub mod documents;
pub mod file_caching;
pub mod lock_manager;
pub mod permissions;

use crate::app::App;

pub use acls::AclsApp;
pub use converter::ConverterApp;
pub use documents::DocumentsApp;
pub use file_caching::FileCachingApp;
pub use lock_manager::LockManagerApp;
pub use permissions::PermissionsApp;

/// Stock apps in boot order. Later apps may rely on permissions registered
/// by earlier ones.
pub fn builtin_apps() -> Vec<Box<dyn App>> {
    vec![
        Box::new(PermissionsApp),
        Box::new(AclsApp),
        Box::new(LockManagerApp),
        Box::new(FileCachingApp),
        Box::new(ConverterApp),
        Box::new(DocumentsApp),
    ]
}
