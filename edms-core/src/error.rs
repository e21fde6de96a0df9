//! Error types for EDMS operations

use crate::{RecordKind, TargetKind, Timestamp};
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {kind:?} with id {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Record already exists: {kind:?} with key {key}")]
    AlreadyExists { kind: RecordKind, key: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Errors raised by the conversion pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConverterError {
    #[error("Unknown file format: {detail}")]
    UnknownFormat { detail: String },

    #[error("Conversion failed: {detail}")]
    Convert { detail: String },

    #[error("Identify failed: {detail}")]
    Identify { detail: String },

    #[error("Office conversion failed: {detail}")]
    OfficeConversion { detail: String },

    #[error("Office backend error: {detail}")]
    OfficeBackend { detail: String },

    #[error("Not an office file format: {mime_type}")]
    InvalidOfficeFormat { mime_type: String },

    #[error("Unknown transformation: {name}")]
    UnknownTransformation { name: String },

    #[error("Missing argument {argument} for transformation {transformation}")]
    MissingTransformationArgument {
        transformation: String,
        argument: String,
    },

    #[error("Invalid argument {argument} for transformation {transformation}: {reason}")]
    InvalidTransformationArgument {
        transformation: String,
        argument: String,
        reason: String,
    },

    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },
}

/// Access control errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Permission not registered: {pk}")]
    PermissionNotRegistered { pk: String },

    #[error("Permission namespace not registered: {namespace}")]
    NamespaceNotRegistered { namespace: String },

    #[error("Permission already registered: {pk}")]
    DuplicatePermission { pk: String },

    #[error("Permission {pk} is not valid for {kind}")]
    PermissionNotValidForTarget { pk: String, kind: TargetKind },

    #[error("Unknown principal: {id}")]
    UnknownPrincipal { id: String },
}

impl AccessError {
    /// The generic denial returned by every failed access check.
    pub fn insufficient_access() -> Self {
        AccessError::PermissionDenied {
            reason: "Insufficient access.".to_string(),
        }
    }
}

/// Lock manager errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock {name} is held until {expires_at}")]
    AlreadyHeld { name: String, expires_at: Timestamp },

    #[error("Lock backend error: {reason}")]
    Backend { reason: String },
}

/// File cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache not found: {name}")]
    CacheNotFound { name: String },

    #[error("Cache partition not found: {name}")]
    PartitionNotFound { name: String },

    #[error("Cache file already exists: {partition}/{filename}")]
    DuplicateFile { partition: String, filename: String },

    #[error("Cache I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Setting {setting} points to a missing path: {path}")]
    PathNotFound { setting: String, path: String },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Setting already registered: {name}")]
    DuplicateSetting { name: String },

    #[error("Unknown setting: {name}")]
    UnknownSetting { name: String },

    #[error("App already registered: {name}")]
    DuplicateApp { name: String },
}

/// Master error type for all EDMS errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EdmsError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Converter error: {0}")]
    Converter(#[from] ConverterError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl EdmsError {
    /// True when the error means another worker already holds the lock.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, EdmsError::Lock(LockError::AlreadyHeld { .. }))
    }

    /// True for access denials.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, EdmsError::Access(AccessError::PermissionDenied { .. }))
    }
}

/// Result type alias for EDMS operations.
pub type EdmsResult<T> = Result<T, EdmsError>;

// =============================================================================
// TESTS
// =============================================================================
