//! Document kinds, their permissions and the parent chain used for
//! inherited access: page to version to document to document type.

use crate::app::{App, AppContext};
use crate::apps::acls;
use edms_core::{EdmsResult, PermissionKey, TargetKind};

pub const NAMESPACE: &str = "documents";

pub const DOCUMENT_CREATE: &str = "document_create";
pub const DOCUMENT_DELETE: &str = "document_delete";
pub const DOCUMENT_DOWNLOAD: &str = "document_download";
pub const DOCUMENT_EDIT: &str = "document_edit";
pub const DOCUMENT_PROPERTIES_EDIT: &str = "document_properties_edit";
pub const DOCUMENT_VIEW: &str = "document_view";

pub const DOCUMENT_TYPE_CREATE: &str = "document_type_create";
pub const DOCUMENT_TYPE_DELETE: &str = "document_type_delete";
pub const DOCUMENT_TYPE_EDIT: &str = "document_type_edit";
pub const DOCUMENT_TYPE_VIEW: &str = "document_type_view";

pub fn permission(name: &str) -> PermissionKey {
    PermissionKey::new(NAMESPACE, name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentsApp;

impl App for DocumentsApp {
    fn name(&self) -> &'static str {
        "documents"
    }

    fn label(&self) -> &'static str {
        "Documents"
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        ctx.permissions.namespace(NAMESPACE, "Documents");
        for (name, label) in [
            (DOCUMENT_CREATE, "Create documents"),
            (DOCUMENT_DELETE, "Delete documents"),
            (DOCUMENT_DOWNLOAD, "Download documents"),
            (DOCUMENT_EDIT, "Edit documents"),
            (DOCUMENT_PROPERTIES_EDIT, "Edit document properties"),
            (DOCUMENT_VIEW, "View documents"),
            (DOCUMENT_TYPE_CREATE, "Create document types"),
            (DOCUMENT_TYPE_DELETE, "Delete document types"),
            (DOCUMENT_TYPE_EDIT, "Edit document types"),
            (DOCUMENT_TYPE_VIEW, "View document types"),
        ] {
            ctx.permissions.register(NAMESPACE, name, label)?;
        }

        let access = [
            acls::permission(acls::ACL_EDIT),
            acls::permission(acls::ACL_VIEW),
        ];
        let document: Vec<PermissionKey> = [
            DOCUMENT_DELETE,
            DOCUMENT_DOWNLOAD,
            DOCUMENT_EDIT,
            DOCUMENT_PROPERTIES_EDIT,
            DOCUMENT_VIEW,
        ]
        .into_iter()
        .map(permission)
        .chain(access.iter().cloned())
        .collect();
        // Types carry document permissions so they flow down to members.
        let document_type: Vec<PermissionKey> = [
            DOCUMENT_CREATE,
            DOCUMENT_TYPE_DELETE,
            DOCUMENT_TYPE_EDIT,
            DOCUMENT_TYPE_VIEW,
        ]
        .into_iter()
        .map(permission)
        .chain(document.iter().cloned())
        .collect();
        let page = [permission(DOCUMENT_EDIT), permission(DOCUMENT_VIEW)];

        ctx.targets
            .register_permissions(ctx.permissions, TargetKind::Document, &document)?;
        ctx.targets
            .register_permissions(ctx.permissions, TargetKind::DocumentType, &document_type)?;
        ctx.targets
            .register_permissions(ctx.permissions, TargetKind::DocumentVersion, &page)?;
        ctx.targets
            .register_permissions(ctx.permissions, TargetKind::DocumentPage, &page)?;

        for kind in [
            TargetKind::Document,
            TargetKind::DocumentVersion,
            TargetKind::DocumentPage,
        ] {
            ctx.targets.register_inheritance(kind, ctx.relations.clone());
        }
        Ok(())
    }
}
