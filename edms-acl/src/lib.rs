//! EDMS ACL - Permissions and Access Control
//!
//! Globally registered permissions, per-kind target metadata, role
//! membership and the resolver that decides whether a user may act on an
//! object.

pub mod acl;
pub mod membership;
pub mod permissions;
pub mod targets;

pub use acl::{AccessControlList, AccessHolder};
pub use membership::{resolve_role, resolve_user, role_ids_for_user, roles_for_user};
pub use permissions::PermissionRegistry;
pub use targets::{RelationTable, TargetHandler, TargetRegistry};
