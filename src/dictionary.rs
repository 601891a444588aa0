//! The type dictionary: which registration lists and referencing keys identify each section
//! type, plus human-readable descriptions of keys, sections and values.
//!
//! Loaded from a JSON document shaped like:
//!
//! ```json
//! {
//!   "typeMapping": {
//!     "weapon": { "registers": ["WeaponTypes"], "keys": ["Primary", "Secondary"],
//!                 "referToKeys": { "Projectile": "projectile" } }
//!   },
//!   "common": { "Name": "Display name" },
//!   "typeTranslations": { "weapon": { "Damage": "Damage per shot" } },
//!   "sections": { "General": "Global settings" },
//!   "values": {},
//!   "registerType": [ { "label": "Weapons", "value": "[WeaponTypes]", "mode": "append" } ]
//! }
//! ```

use crate::error::IniError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeMapping {
    /// Registration sections whose members have this type.
    pub registers: Vec<String>,
    /// Keys whose values reference a section of this type.
    pub keys: Vec<String>,
    /// Keys declared inside sections of this type that point at another type.
    pub refer_to_keys: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegisterMode {
    /// `+=Name ; label`
    #[default]
    Append,
    /// `Name=default ; label`
    KeyValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterTypeConfig {
    pub label: String,
    /// Bracketed register name, e.g. `[WeaponTypes]`.
    pub value: String,
    pub mode: Option<RegisterMode>,
    pub default_value: Option<String>,
}

impl RegisterTypeConfig {
    pub fn register_name(&self) -> &str {
        self.value.trim_start_matches('[').trim_end_matches(']')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dictionary {
    /// Type name to mapping, in declaration order. Inference checks types in this order.
    pub type_mapping: IndexMap<String, TypeMapping>,
    pub common: HashMap<String, String>,
    pub type_translations: HashMap<String, HashMap<String, String>>,
    pub sections: HashMap<String, String>,
    pub values: HashMap<String, String>,
    pub register_type: Vec<RegisterTypeConfig>,
}

impl Dictionary {
    pub fn from_json_str(content: &str) -> Result<Dictionary, IniError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Dictionary, IniError> {
        let path = path.as_ref();
        let dictionary = Dictionary::from_json_str(&read_to_string(path)?)?;
        tracing::info!(
            "[Dictionary] loaded {} types and {} descriptions from {}",
            dictionary.type_mapping.len(),
            dictionary.description_count(),
            path.display()
        );
        Ok(dictionary)
    }

    /// Load the first candidate that exists and parses. Falls back to an empty dictionary, in
    /// which case inference always answers "unknown".
    pub fn load_or_empty(candidates: &[PathBuf]) -> Dictionary {
        for path in candidates.iter().filter(|p| p.exists()) {
            match Dictionary::load(path) {
                Ok(dictionary) => return dictionary,
                Err(e) => tracing::error!("[Dictionary] failed to load {}: {e}", path.display()),
            }
        }
        tracing::warn!("[Dictionary] no dictionary found, type inference is disabled");
        Dictionary::default()
    }

    pub fn is_empty(&self) -> bool {
        self.type_mapping.is_empty()
    }

    pub fn type_mapping(&self, type_name: &str) -> Option<&TypeMapping> {
        self.type_mapping.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.type_mapping.keys().map(String::as_str)
    }

    /// First type, in declaration order, listing `key` as a referencing key.
    pub fn type_declaring_key(&self, key: &str) -> Option<&str> {
        self.type_mapping
            .iter()
            .find(|(_, mapping)| mapping.keys.iter().any(|k| k == key))
            .map(|(name, _)| name.as_str())
    }

    /// Target type of `key` when used inside a section of `type_name`.
    pub fn refer_to(&self, type_name: &str, key: &str) -> Option<&str> {
        self.type_mapping
            .get(type_name)
            .and_then(|mapping| mapping.refer_to_keys.get(key))
            .map(String::as_str)
    }

    /// Every register named by any type, in declaration order.
    pub fn all_registers(&self) -> impl Iterator<Item = &str> {
        self.type_mapping
            .values()
            .flat_map(|mapping| mapping.registers.iter().map(String::as_str))
    }

    pub fn is_registration_key(&self, name: &str) -> bool {
        self.all_registers().any(|register| register == name)
    }

    /// Type-specific description of `key`, falling back to the common table.
    pub fn get_translation(&self, key: &str, type_name: Option<&str>) -> Option<&str> {
        type_name
            .and_then(|t| self.type_translation(t, key))
            .or_else(|| self.common.get(key).map(String::as_str))
    }

    pub fn type_translation(&self, type_name: &str, key: &str) -> Option<&str> {
        self.type_translations
            .get(type_name)
            .and_then(|table| table.get(key))
            .map(String::as_str)
    }

    pub fn section_description(&self, section: &str) -> Option<&str> {
        self.sections.get(section).map(String::as_str)
    }

    pub fn value_description(&self, value: &str) -> Option<&str> {
        self.values.get(value).map(String::as_str)
    }

    pub fn register_config(&self, register: &str) -> Option<&RegisterTypeConfig> {
        self.register_type
            .iter()
            .find(|config| config.register_name() == register)
    }

    pub fn description_count(&self) -> usize {
        self.common.len()
            + self
                .type_translations
                .values()
                .map(HashMap::len)
                .sum::<usize>()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "typeMapping": {
            "infantry": { "registers": ["InfantryTypes"], "keys": [] },
            "weapon": {
                "registers": ["WeaponTypes"],
                "keys": ["Primary", "Secondary", "ElitePrimary"],
                "referToKeys": { "Projectile": "projectile", "Warhead": "warhead" }
            },
            "projectile": { "registers": ["Projectiles"], "keys": ["Projectile"] },
            "warhead": { "registers": ["Warheads"], "keys": ["Warhead"] }
        },
        "common": { "Name": "Name", "Strength": "Hit points" },
        "typeTranslations": {
            "weapon": { "Damage": "Damage per shot", "Projectile": "Projectile used" },
            "projectile": { "Projectile": "Projectile body" },
            "warhead": { "Warhead": "Warhead body" }
        },
        "sections": { "General": "Global settings" },
        "values": { "yes": "enabled" },
        "registerType": [
            { "label": "Weapons", "value": "[WeaponTypes]", "mode": "append" },
            { "label": "Colors", "value": "[Colors]", "mode": "keyValue", "defaultValue": "0,0,0" }
        ]
    }"#;

    #[test]
    fn parses_in_declaration_order() {
        let dict = Dictionary::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            dict.type_names().collect::<Vec<_>>(),
            vec!["infantry", "weapon", "projectile", "warhead"]
        );
        assert_eq!(dict.refer_to("weapon", "Projectile"), Some("projectile"));
        assert_eq!(dict.type_declaring_key("Secondary"), Some("weapon"));
        assert!(dict.is_registration_key("Warheads"));
    }

    #[test]
    fn translations_fall_back_to_common() {
        let dict = Dictionary::from_json_str(SAMPLE).unwrap();
        assert_eq!(dict.get_translation("Damage", Some("weapon")), Some("Damage per shot"));
        assert_eq!(dict.get_translation("Strength", Some("weapon")), Some("Hit points"));
        assert_eq!(dict.get_translation("Damage", None), None);
        assert_eq!(dict.section_description("General"), Some("Global settings"));
        assert_eq!(dict.value_description("yes"), Some("enabled"));
        assert_eq!(dict.value_description("no"), None);
    }

    #[test]
    fn register_configs_parse_modes() {
        let dict = Dictionary::from_json_str(SAMPLE).unwrap();
        let colors = dict.register_config("Colors").unwrap();
        assert_eq!(colors.mode, Some(RegisterMode::KeyValue));
        assert_eq!(colors.default_value.as_deref(), Some("0,0,0"));
        assert_eq!(dict.register_config("WeaponTypes").unwrap().label, "Weapons");
    }

    #[test]
    fn missing_candidates_give_empty_dictionary() {
        let dict = Dictionary::load_or_empty(&[PathBuf::from("/nonexistent/dictionary.json")]);
        assert!(dict.is_empty());
    }
}
