//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use ra2_ini_core::{dictionary::Dictionary, event::IndexEvent, workspace::IndexManager};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Type dictionary shared by the integration tests. `weapon` is declared before `projectile`
/// and `warhead`, and `infantry` declares no reference keys.
#[allow(dead_code)]
pub const DICTIONARY: &str = r#"{
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
        "weapon": { "Damage": "Damage per shot" },
        "projectile": { "Arm": "Arming delay" }
    },
    "sections": { "General": "Global settings" },
    "registerType": [
        { "label": "Weapons", "value": "[WeaponTypes]", "mode": "append" }
    ]
}"#;

#[allow(dead_code)]
pub fn dictionary() -> Arc<Dictionary> {
    Arc::new(Dictionary::from_json_str(DICTIONARY).unwrap())
}

/// Create a mod directory holding `files` (relative path, contents).
///
/// Returns the path to the directory (e.g. `<temp_dir>/mod/`).
#[allow(dead_code)]
pub fn create_test_workspace(temp_dir: &TempDir, files: &[(&str, &str)]) -> PathBuf {
    let root = temp_dir.path().join("mod");
    std::fs::create_dir_all(&root).unwrap();
    for (relative, contents) in files {
        write_file(&root, relative, contents);
    }
    root
}

#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Record every event `manager` emits, in delivery order.
#[allow(dead_code)]
pub fn record_events(manager: &IndexManager) -> Arc<Mutex<Vec<IndexEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.on_index_change(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}
