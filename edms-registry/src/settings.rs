//! Settings registry.
//!
//! Apps declare the settings they read as global names (`CONVERTER_GM_PATH`)
//! bound to a dotted path into the loaded configuration
//! (`converter.gm_path`). Values are read through the registry; settings
//! declared `exists` must name a path present on disk.

use edms_core::{ConfigError, EdmsConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingNamespace {
    pub name: String,
    pub label: String,
}

/// One declared setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub namespace: String,
    pub global_name: String,
    /// Dotted path into the configuration, e.g. `locking.directory`.
    pub path: String,
    pub help_text: String,
    /// The value is a filesystem path that must exist.
    pub exists: bool,
    /// Used when the configuration has no value at `path`.
    pub default: Option<Value>,
}

impl Setting {
    pub fn new(namespace: &str, global_name: &str, path: &str) -> Self {
        Setting {
            namespace: namespace.to_string(),
            global_name: global_name.to_string(),
            path: path.to_string(),
            help_text: String::new(),
            exists: false,
            default: None,
        }
    }

    pub fn with_help_text(mut self, help_text: &str) -> Self {
        self.help_text = help_text.to_string();
        self
    }

    pub fn must_exist(mut self) -> Self {
        self.exists = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn pointer(&self) -> String {
        format!("/{}", self.path.replace('.', "/"))
    }
}

#[derive(Debug, Clone)]
pub struct SettingsRegistry {
    namespaces: BTreeMap<String, SettingNamespace>,
    settings: BTreeMap<String, Setting>,
    values: Value,
}

impl SettingsRegistry {
    /// Registry reading values from `config`.
    pub fn from_config(config: &EdmsConfig) -> Result<Self, ConfigError> {
        let values = serde_json::to_value(config).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        Ok(SettingsRegistry {
            namespaces: BTreeMap::new(),
            settings: BTreeMap::new(),
            values,
        })
    }

    pub fn namespace(&mut self, name: &str, label: &str) -> SettingNamespace {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| SettingNamespace {
                name: name.to_string(),
                label: label.to_string(),
            })
            .clone()
    }

    /// Declare a setting. Its namespace must be declared and its global
    /// name unused.
    pub fn register(&mut self, setting: Setting) -> Result<(), ConfigError> {
        if !self.namespaces.contains_key(&setting.namespace) {
            return Err(ConfigError::InvalidValue {
                field: setting.global_name.clone(),
                value: setting.namespace.clone(),
                reason: "settings namespace is not declared".to_string(),
            });
        }
        if self.settings.contains_key(&setting.global_name) {
            return Err(ConfigError::DuplicateSetting {
                name: setting.global_name,
            });
        }
        debug!(setting = %setting.global_name, path = %setting.path, "setting registered");
        self.settings.insert(setting.global_name.clone(), setting);
        Ok(())
    }

    pub fn get(&self, global_name: &str) -> Result<&Setting, ConfigError> {
        self.settings
            .get(global_name)
            .ok_or_else(|| ConfigError::UnknownSetting {
                name: global_name.to_string(),
            })
    }

    /// Current value, falling back to the declared default.
    pub fn value(&self, global_name: &str) -> Result<Value, ConfigError> {
        let setting = self.get(global_name)?;
        match self.values.pointer(&setting.pointer()) {
            Some(value) => Ok(value.clone()),
            None => setting
                .default
                .clone()
                .ok_or_else(|| ConfigError::MissingRequired {
                    field: setting.path.clone(),
                }),
        }
    }

    /// Value rendered as text; strings come back without quotes.
    pub fn value_str(&self, global_name: &str) -> Result<String, ConfigError> {
        Ok(match self.value(global_name)? {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Every declared setting, ordered by global name.
    pub fn all(&self) -> impl Iterator<Item = &Setting> {
        self.settings.values()
    }

    pub fn in_namespace<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a Setting> + 'a {
        self.settings.values().filter(move |s| s.namespace == namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &SettingNamespace> {
        self.namespaces.values()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Check every `exists` setting against the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for setting in self.settings.values().filter(|s| s.exists) {
            let path = self.value_str(&setting.global_name)?;
            if !Path::new(&path).exists() {
                return Err(ConfigError::PathNotFound {
                    setting: setting.global_name.clone(),
                    path,
                });
            }
        }
        Ok(())
    }
}
