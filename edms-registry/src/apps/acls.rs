use crate::app::{App, AppContext};
use edms_core::{EdmsResult, PermissionKey};

pub const NAMESPACE: &str = "acls";

pub const ACL_EDIT: &str = "acl_edit";
pub const ACL_VIEW: &str = "acl_view";

pub fn permission(name: &str) -> PermissionKey {
    PermissionKey::new(NAMESPACE, name)
}

/// Permissions guarding the access lists themselves. Object kinds opt in
/// by listing them among their valid permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AclsApp;

impl App for AclsApp {
    fn name(&self) -> &'static str {
        "acls"
    }

    fn label(&self) -> &'static str {
        "ACLs"
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        ctx.permissions.namespace(NAMESPACE, "Access control lists");
        ctx.permissions.register(NAMESPACE, ACL_EDIT, "Edit ACLs")?;
        ctx.permissions.register(NAMESPACE, ACL_VIEW, "View ACLs")?;
        Ok(())
    }
}
