use crate::app::{App, AppContext};
use crate::settings::Setting;
use edms_core::EdmsResult;

pub const NAMESPACE: &str = "lock_manager";

#[derive(Debug, Clone, Copy, Default)]
pub struct LockManagerApp;

impl App for LockManagerApp {
    fn name(&self) -> &'static str {
        "lock_manager"
    }

    fn label(&self) -> &'static str {
        "Lock manager"
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        ctx.settings.namespace(NAMESPACE, "Lock manager");
        ctx.settings.register(
            Setting::new(NAMESPACE, "LOCK_MANAGER_BACKEND", "locking.backend")
                .with_help_text("Where lock leases are kept: memory or file.")
                .with_default("memory"),
        )?;
        ctx.settings.register(
            Setting::new(NAMESPACE, "LOCK_MANAGER_DIRECTORY", "locking.directory")
                .with_help_text("Directory holding one file per lease for the file backend."),
        )?;
        ctx.settings.register(
            Setting::new(
                NAMESPACE,
                "LOCK_MANAGER_DEFAULT_LOCK_TIMEOUT",
                "locking.default_timeout_secs",
            )
            .with_help_text("Seconds after which an unreleased lease may be taken over.")
            .with_default(30),
        )?;

        ctx.cleanups.register(NAMESPACE, "expired leases", |services| {
            services.locks.cleanup_expired().map(|_| ())
        });
        Ok(())
    }
}
