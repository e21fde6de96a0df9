//! Configuration loading for EDMS.
//!
//! Every section is required in the TOML file. Environment variables
//! prefixed with `EDMS_` override individual fields after loading.

use crate::{BackendKind, ConfigError, LockBackendKind, OfficeTool};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdmsConfig {
    pub temporary_directory: PathBuf,
    pub converter: ConverterConfig,
    pub locking: LockingConfig,
    #[serde(rename = "cache")]
    pub caches: Vec<CacheDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConverterConfig {
    pub backend: BackendKind,
    pub im_convert_path: PathBuf,
    pub im_identify_path: PathBuf,
    pub gm_path: PathBuf,
    pub libreoffice_path: PathBuf,
    pub office_tool: OfficeTool,
    pub unoconv_path: PathBuf,
    pub default_file_format: String,
    pub jpeg_quality: u8,
    /// Name of the `[[cache]]` that stores rendered pages.
    pub cache_name: String,
}

impl ConverterConfig {
    /// `(field, path)` for the tools the selected backend and office tool
    /// invoke. Paths of unselected tools are never run.
    pub fn active_tool_paths(&self) -> Vec<(&'static str, &Path)> {
        let mut paths = match self.backend {
            BackendKind::ImageMagick => vec![
                ("im_convert_path", self.im_convert_path.as_path()),
                ("im_identify_path", self.im_identify_path.as_path()),
            ],
            BackendKind::GraphicsMagick => vec![("gm_path", self.gm_path.as_path())],
        };
        paths.push(match self.office_tool {
            OfficeTool::LibreOffice => ("libreoffice_path", self.libreoffice_path.as_path()),
            OfficeTool::Unoconv => ("unoconv_path", self.unoconv_path.as_path()),
        });
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockingConfig {
    pub backend: LockBackendKind,
    pub directory: PathBuf,
    pub default_timeout_secs: u64,
}

impl LockingConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// One named file cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheDefinition {
    pub name: String,
    pub label: String,
    /// Byte budget; files are pruned oldest-first beyond it.
    pub maximum_size: u64,
    pub directory: PathBuf,
}

/// Longest lease the lock manager hands out by default.
pub const MAX_LOCK_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub const ENV_TEMPORARY_DIRECTORY: &str = "EDMS_TEMPORARY_DIRECTORY";
pub const ENV_CONVERTER_BACKEND: &str = "EDMS_CONVERTER_BACKEND";
pub const ENV_IM_CONVERT_PATH: &str = "EDMS_IM_CONVERT_PATH";
pub const ENV_IM_IDENTIFY_PATH: &str = "EDMS_IM_IDENTIFY_PATH";
pub const ENV_GM_PATH: &str = "EDMS_GM_PATH";
pub const ENV_LIBREOFFICE_PATH: &str = "EDMS_LIBREOFFICE_PATH";
pub const ENV_LOCK_TIMEOUT_SECS: &str = "EDMS_LOCK_TIMEOUT_SECS";

impl EdmsConfig {
    /// Standard layout rooted at `root`, with the stock tool locations.
    pub fn defaults_for(root: &Path) -> Self {
        EdmsConfig {
            temporary_directory: root.to_path_buf(),
            converter: ConverterConfig {
                backend: BackendKind::ImageMagick,
                im_convert_path: PathBuf::from("/usr/bin/convert"),
                im_identify_path: PathBuf::from("/usr/bin/identify"),
                gm_path: PathBuf::from("/usr/bin/gm"),
                libreoffice_path: PathBuf::from("/usr/bin/libreoffice"),
                office_tool: OfficeTool::LibreOffice,
                unoconv_path: PathBuf::from("/usr/bin/unoconv"),
                default_file_format: "jpeg".to_string(),
                jpeg_quality: 85,
                cache_name: "document_page_images".to_string(),
            },
            locking: LockingConfig {
                backend: LockBackendKind::Memory,
                directory: root.join("locks"),
                default_timeout_secs: 30,
            },
            caches: vec![CacheDefinition {
                name: "document_page_images".to_string(),
                label: "Document page images".to_string(),
                maximum_size: 500 * 1024 * 1024,
                directory: root.join("cache").join("pages"),
            }],
        }
    }

    /// Read, apply `EDMS_*` overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_path(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, so tests need not touch the
    /// process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TEMPORARY_DIRECTORY) {
            self.temporary_directory = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_CONVERTER_BACKEND) {
            self.converter.backend =
                BackendKind::from_db_str(&value).map_err(|e| ConfigError::InvalidValue {
                    field: ENV_CONVERTER_BACKEND.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(value) = lookup(ENV_IM_CONVERT_PATH) {
            self.converter.im_convert_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_IM_IDENTIFY_PATH) {
            self.converter.im_identify_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_GM_PATH) {
            self.converter.gm_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_LIBREOFFICE_PATH) {
            self.converter.libreoffice_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_LOCK_TIMEOUT_SECS) {
            self.locking.default_timeout_secs =
                value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: ENV_LOCK_TIMEOUT_SECS.to_string(),
                    value: value.clone(),
                    reason: "must be a whole number of seconds".to_string(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_path("temporary_directory", &self.temporary_directory)?;
        for (field, path) in self.converter.active_tool_paths() {
            require_path(&format!("converter.{}", field), path)?;
        }
        require_path("locking.directory", &self.locking.directory)?;

        if self.converter.default_file_format.trim().is_empty() {
            return Err(invalid("converter.default_file_format", "", "must not be empty"));
        }
        if !(1..=100).contains(&self.converter.jpeg_quality) {
            return Err(invalid(
                "converter.jpeg_quality",
                &self.converter.jpeg_quality.to_string(),
                "must be between 1 and 100",
            ));
        }
        if self.locking.default_timeout_secs == 0 {
            return Err(invalid("locking.default_timeout_secs", "0", "must be > 0"));
        }
        if self.locking.default_timeout_secs > MAX_LOCK_TIMEOUT_SECS {
            return Err(invalid(
                "locking.default_timeout_secs",
                &self.locking.default_timeout_secs.to_string(),
                &format!("must be at most {}", MAX_LOCK_TIMEOUT_SECS),
            ));
        }

        let mut seen = HashSet::new();
        let mut directories = HashSet::new();
        for cache in &self.caches {
            if cache.name.trim().is_empty() {
                return Err(invalid("cache.name", "", "must not be empty"));
            }
            if !seen.insert(cache.name.as_str()) {
                return Err(invalid("cache.name", &cache.name, "duplicate cache name"));
            }
            if cache.maximum_size == 0 {
                return Err(invalid(
                    &format!("cache.{}.maximum_size", cache.name),
                    "0",
                    "must be > 0",
                ));
            }
            require_path(&format!("cache.{}.directory", cache.name), &cache.directory)?;
            if !directories.insert(cache.directory.as_path()) {
                return Err(invalid(
                    &format!("cache.{}.directory", cache.name),
                    &cache.directory.display().to_string(),
                    "directory is shared with another cache",
                ));
            }
        }

        if self.cache(&self.converter.cache_name).is_none() {
            return Err(invalid(
                "converter.cache_name",
                &self.converter.cache_name,
                "no [[cache]] with this name is declared",
            ));
        }
        Ok(())
    }

    pub fn cache(&self, name: &str) -> Option<&CacheDefinition> {
        self.caches.iter().find(|cache| cache.name == name)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }
    Ok(())
}
