//! Enum types for EDMS records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an enum from its string representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub enum_name: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.enum_name, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ============================================================================
// TARGET KINDS
// ============================================================================

/// Kind of object an access control entry can target.
///
/// Replaces the content-type/object-id pair of a generic foreign key with a
/// closed set of kinds. Handlers for each kind are registered with the ACL
/// target registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Document,
    DocumentType,
    DocumentVersion,
    DocumentPage,
    Folder,
    Tag,
    Cabinet,
    Index,
    Workflow,
    SmartLink,
    MetadataType,
}

impl TargetKind {
    pub const ALL: [TargetKind; 11] = [
        TargetKind::Document,
        TargetKind::DocumentType,
        TargetKind::DocumentVersion,
        TargetKind::DocumentPage,
        TargetKind::Folder,
        TargetKind::Tag,
        TargetKind::Cabinet,
        TargetKind::Index,
        TargetKind::Workflow,
        TargetKind::SmartLink,
        TargetKind::MetadataType,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TargetKind::Document => "document",
            TargetKind::DocumentType => "document_type",
            TargetKind::DocumentVersion => "document_version",
            TargetKind::DocumentPage => "document_page",
            TargetKind::Folder => "folder",
            TargetKind::Tag => "tag",
            TargetKind::Cabinet => "cabinet",
            TargetKind::Index => "index",
            TargetKind::Workflow => "workflow",
            TargetKind::SmartLink => "smart_link",
            TargetKind::MetadataType => "metadata_type",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        TargetKind::ALL
            .into_iter()
            .find(|kind| kind.as_db_str() == normalized)
            .ok_or_else(|| EnumParseError {
                enum_name: "target kind",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TargetKind {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Record discriminator used by storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    User,
    Group,
    Role,
    AccessControlEntry,
    DefaultAccessEntry,
    Cache,
    CachePartition,
    CachePartitionFile,
    Lock,
    File,
}

// ============================================================================
// CONFIGURATION ENUMS
// ============================================================================

/// Image conversion backend selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    ImageMagick,
    GraphicsMagick,
}

impl BackendKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BackendKind::ImageMagick => "imagemagick",
            BackendKind::GraphicsMagick => "graphicsmagick",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "imagemagick" | "im" => Ok(BackendKind::ImageMagick),
            "graphicsmagick" | "gm" => Ok(BackendKind::GraphicsMagick),
            _ => Err(EnumParseError {
                enum_name: "converter backend",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for BackendKind {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Tool used to turn office documents into PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfficeTool {
    LibreOffice,
    Unoconv,
}

/// Where lock leases are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    /// Process-local map, for single-process deployments and tests
    Memory,
    /// One file per lease in a shared directory
    File,
}
