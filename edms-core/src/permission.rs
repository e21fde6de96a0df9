//! Permission value types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Primary key of a permission: `"namespace.name"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionKey(String);

impl PermissionKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        PermissionKey(format!("{}.{}", namespace, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part of the key, everything before the first dot.
    pub fn namespace(&self) -> &str {
        self.0.split_once('.').map(|(ns, _)| ns).unwrap_or(&self.0)
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionKey {
    fn from(pk: &str) -> Self {
        PermissionKey(pk.to_string())
    }
}

impl From<String> for PermissionKey {
    fn from(pk: String) -> Self {
        PermissionKey(pk)
    }
}

/// Set of permission keys held by a grant.
pub type PermissionSet = BTreeSet<PermissionKey>;

/// A group of related permissions owned by one app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionNamespace {
    pub name: String,
    pub label: String,
}

impl PermissionNamespace {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        PermissionNamespace {
            name: name.into(),
            label: label.into(),
        }
    }
}

/// A registered permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub namespace: String,
    pub name: String,
    pub label: String,
}

impl Permission {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, label: impl Into<String>) -> Self {
        Permission {
            namespace: namespace.into(),
            name: name.into(),
            label: label.into(),
        }
    }

    pub fn pk(&self) -> PermissionKey {
        PermissionKey::new(&self.namespace, &self.name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}
