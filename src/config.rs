use crate::{error::IniError, scanner::RegisterPredicate};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// Global static variable to hold the config provider.
pub static CONFIG_PROVIDER: OnceCell<Mutex<Arc<dyn ConfigProvider>>> = OnceCell::new();

pub const DEFAULT_RELATED_FILES: &[&str] = &[
    "rulesmd.ini",
    "artmd.ini",
    "soundmd.ini",
    "aimd.ini",
    "rules.ini",
    "art.ini",
    "sound.ini",
    "ai.ini",
];

/// Keys that legitimately repeat inside one section.
pub const DEFAULT_SKIP_DUPLICATE_KEYS: &[&str] = &[
    "UIName",
    "Name",
    "Prerequisite",
    "Primary",
    "Strength",
    "Category",
    "Turnet",
    "Cost",
    "Armor",
    "Sight",
    "Speed",
];

/// Workspace indexing configuration. Field names follow the editor settings they mirror, so
/// the TOML form is camelCase:
///
/// ```toml
/// relatedFiles = ["rulesmd.ini", "art*.ini"]
/// filePattern = "**/*.ini"
/// maxFileSize = 5.0
/// batchSize = 10
///
/// [cache]
/// enabled = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    /// File-name whitelist. `*` is a wildcard, matching is case-insensitive.
    pub related_files: Vec<String>,
    /// Glob selecting candidate files, relative to the workspace root.
    pub file_pattern: String,
    pub exclude_patterns: Vec<String>,
    /// Per-file ceiling in megabytes.
    pub max_file_size: f64,
    pub batch_size: usize,
    /// When false, references and diagnostics only consult the current document.
    pub enable_multi_file_search: bool,
    pub register_sections: Vec<String>,
    pub register_suffix: String,
    pub diagnostics: DiagnosticsConfig,
    pub cache: CacheConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let predicate_names = crate::scanner::DEFAULT_REGISTER_SECTIONS;
        IndexConfig {
            related_files: DEFAULT_RELATED_FILES.iter().map(|s| s.to_string()).collect(),
            file_pattern: "**/*.ini".to_string(),
            exclude_patterns: vec!["**/node_modules/**".to_string()],
            max_file_size: 5.0,
            batch_size: 10,
            enable_multi_file_search: true,
            register_sections: predicate_names.iter().map(|s| s.to_string()).collect(),
            register_suffix: crate::scanner::DEFAULT_REGISTER_SUFFIX.to_string(),
            diagnostics: DiagnosticsConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl IndexConfig {
    pub fn from_toml_str(content: &str) -> Result<IndexConfig, IniError> {
        let config: IndexConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, IniError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), IniError> {
        if !self.max_file_size.is_finite() || self.max_file_size < 0.0 {
            return Err(IniError::Config(format!(
                "maxFileSize must be a non-negative number of megabytes, got {}",
                self.max_file_size
            )));
        }
        if self.file_pattern.trim().is_empty() {
            return Err(IniError::Config("filePattern must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        (self.max_file_size * 1024.0 * 1024.0) as u64
    }

    /// Batch size used by workspace indexing, never zero.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn register_predicate(&self) -> RegisterPredicate {
        RegisterPredicate::new(&self.register_suffix, self.register_sections.iter().cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    pub check_syntax: bool,
    pub check_duplicate_keys: bool,
    pub check_undefined_references: bool,
    pub check_unused_sections: bool,
    pub skip_duplicate_keys: Vec<String>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            check_syntax: true,
            check_duplicate_keys: true,
            check_undefined_references: true,
            check_unused_sections: true,
            skip_duplicate_keys: DEFAULT_SKIP_DUPLICATE_KEYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DiagnosticsConfig {
    /// Case-insensitive membership in the duplicate-key skip list.
    pub fn skips_duplicate(&self, key: &str) -> bool {
        self.skip_duplicate_keys
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { enabled: true }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<IndexConfig, IniError>;
    fn set_config(&self, config: &IndexConfig) -> Result<(), IniError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<IndexConfig, IniError> {
        tracing::debug!("Attempting to read index config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(IndexConfig::default());
        }
        let content = read_to_string(&self.path)?;
        IndexConfig::from_toml_str(&content)
    }

    fn set_config(&self, config: &IndexConfig) -> Result<(), IniError> {
        tracing::debug!("Attempting to write index config to: {:?}", &self.path);
        config.validate()?;
        write(&self.path, config.to_toml_string()?)?;
        Ok(())
    }
}

/// Config from the globally installed provider, or defaults when none is installed.
pub fn current_config() -> Result<IndexConfig, IniError> {
    match CONFIG_PROVIDER.get() {
        Some(provider) => {
            let provider = provider
                .lock()
                .map_err(|e| IniError::Config(format!("config provider lock poisoned: {e}")))?
                .clone();
            provider.get_config()
        }
        None => Ok(IndexConfig::default()),
    }
}

pub fn get_content<P: AsRef<Path>>(path: P) -> Result<String, IniError> {
    tracing::debug!("Reading {:?}", path.as_ref());
    Ok(read_to_string(path)?)
}

pub fn set_content<P: AsRef<Path>>(path: P, text: &str) -> Result<(), IniError> {
    Ok(write(path, text)?)
}
