//! Identity types for EDMS records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash for deduplication and integrity verification.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Lowercase hex rendering of the SHA-256 digest of `content`.
pub fn hex_digest(content: &[u8]) -> String {
    hex::encode(compute_content_hash(content))
}

/// Common behaviour of the strongly-typed identifiers.
pub trait EntityIdType: Copy + Eq + std::hash::Hash + fmt::Debug + fmt::Display {
    /// Short name used in error messages and logs.
    const ENTITY_NAME: &'static str;

    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Generate a fresh timestamp-sortable identifier.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// Unwrap into the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// The nil identifier, mostly useful in tests.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }
}

/// Error when parsing an identifier from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    pub entity: &'static str,
    pub value: String,
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {} id: {}", self.entity, self.value)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| IdParseError {
                    entity: $entity,
                    value: s.to_string(),
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_entity_id!(
    /// Identifier of a user account.
    UserId,
    "user"
);
define_entity_id!(
    /// Identifier of a user group.
    GroupId,
    "group"
);
define_entity_id!(
    /// Identifier of a role.
    RoleId,
    "role"
);
define_entity_id!(
    /// Identifier of an object-level access control entry.
    AclId,
    "acl"
);
define_entity_id!(
    /// Identifier of a class-level default access entry.
    DefaultAccessId,
    "default_access"
);
define_entity_id!(CacheId, "cache");
define_entity_id!(PartitionId, "cache_partition");
define_entity_id!(PartitionFileId, "cache_partition_file");
define_entity_id!(LockId, "lock");
