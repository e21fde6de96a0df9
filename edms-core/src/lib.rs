//! EDMS Core - Data Types
//!
//! Identifiers, errors, configuration, lease typestate and the value types
//! shared by the storage, converter and access-control crates. No I/O
//! besides reading the configuration file.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod lock;
pub mod permission;

pub use config::{CacheDefinition, ConverterConfig, EdmsConfig, LockingConfig, MAX_LOCK_TIMEOUT_SECS};
pub use entities::{AccessControlEntry, DefaultAccessEntry, Group, Role, TargetRef, User};
pub use enums::{BackendKind, EnumParseError, LockBackendKind, OfficeTool, RecordKind, TargetKind};
pub use error::{
    AccessError, CacheError, ConfigError, ConverterError, EdmsError, EdmsResult, LockError,
    StorageError,
};
pub use identity::{
    compute_content_hash, hex_digest, new_entity_id, AclId, CacheId, ContentHash,
    DefaultAccessId, EntityId, EntityIdType, GroupId, IdParseError, LockId, PartitionFileId,
    PartitionId, RoleId, Timestamp, UserId,
};
pub use lock::{Acquired, Lock, LockData, LockState, LockStateError, StoredLock};
pub use permission::{Permission, PermissionKey, PermissionNamespace, PermissionSet};
