use crate::app::{App, AppContext};
use edms_core::{EdmsResult, PermissionKey};

pub const NAMESPACE: &str = "permissions";

pub const ROLE_CREATE: &str = "permission_role_create";
pub const ROLE_DELETE: &str = "permission_role_delete";
pub const ROLE_EDIT: &str = "permission_role_edit";
pub const ROLE_VIEW: &str = "permission_role_view";

pub fn permission(name: &str) -> PermissionKey {
    PermissionKey::new(NAMESPACE, name)
}

/// Role management permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionsApp;

impl App for PermissionsApp {
    fn name(&self) -> &'static str {
        "permissions"
    }

    fn label(&self) -> &'static str {
        "Permissions"
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        ctx.permissions.namespace(NAMESPACE, "Permissions");
        ctx.permissions.register(NAMESPACE, ROLE_CREATE, "Create roles")?;
        ctx.permissions.register(NAMESPACE, ROLE_DELETE, "Delete roles")?;
        ctx.permissions.register(NAMESPACE, ROLE_EDIT, "Edit roles")?;
        ctx.permissions.register(NAMESPACE, ROLE_VIEW, "View roles")?;
        Ok(())
    }
}
