use crate::app::{App, AppContext};
use crate::settings::Setting;
use edms_core::{EdmsResult, PermissionKey};

pub const NAMESPACE: &str = "file_caching";

pub const CACHE_PURGE: &str = "file_caching_cache_purge";
pub const CACHE_VIEW: &str = "file_caching_cache_view";

pub fn permission(name: &str) -> PermissionKey {
    PermissionKey::new(NAMESPACE, name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileCachingApp;

impl App for FileCachingApp {
    fn name(&self) -> &'static str {
        "file_caching"
    }

    fn label(&self) -> &'static str {
        "File caching"
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        ctx.permissions.namespace(NAMESPACE, "File caching");
        ctx.permissions.register(NAMESPACE, CACHE_PURGE, "Purge a file cache")?;
        ctx.permissions.register(NAMESPACE, CACHE_VIEW, "View a file cache")?;

        ctx.settings.namespace(NAMESPACE, "File caching");
        ctx.settings.register(
            Setting::new(NAMESPACE, "FILE_CACHING_CACHES", "cache")
                .with_help_text("Named caches with their byte budget and directory."),
        )?;
        for (index, definition) in ctx.config.caches.iter().enumerate() {
            ctx.settings.register(
                Setting::new(
                    NAMESPACE,
                    &format!("FILE_CACHING_{}_MAXIMUM_SIZE", definition.name.to_uppercase()),
                    &format!("cache.{index}.maximum_size"),
                )
                .with_help_text(&format!("Byte budget of the {} cache.", definition.label)),
            )?;
        }

        ctx.cleanups.register(NAMESPACE, "purge caches", |services| {
            services.caches.purge_all().map(|_| ())
        });
        Ok(())
    }
}
