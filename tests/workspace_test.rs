//! Workspace index integration tests
//!
//! These tests drive `IndexManager` against real files in a temp directory: discovery and
//! filtering, batched indexing, open-document overlays, versioning, and change events.

mod common;

use common::{create_test_workspace, record_events, write_file};
use ra2_ini_core::{config::IndexConfig, event::IndexEventKind, workspace::IndexManager};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use test_log::test;

#[test(tokio::test)]
async fn index_workspace_applies_whitelist_exclusions_and_size_limit() {
    let temp_dir = TempDir::new().unwrap();
    let oversized = format!("[Sounds]\n{}", "A=B\n".repeat(400));
    let root = create_test_workspace(
        &temp_dir,
        &[
            ("rulesmd.ini", "[WeaponTypes]\n+=Colt45\n"),
            ("artmd.ini", "[Colt45]\nImage=COLT\n"),
            ("maps/aimd.ini", "[TeamTypes]\n0=Team1\n"),
            ("custom.ini", "[NotIndexed]\n"),
            ("node_modules/rules.ini", "[Excluded]\n"),
            ("soundmd.ini", oversized.as_str()),
        ],
    );
    let config = IndexConfig {
        max_file_size: 0.001,
        ..IndexConfig::default()
    };
    let manager = IndexManager::new(&root, config).unwrap();

    let summary = manager.index_workspace().await.unwrap();
    assert_eq!(summary.discovered, 5);
    assert_eq!(summary.selected, 4);
    assert_eq!(summary.indexed, 3);
    assert_eq!(summary.failed, 1);

    assert!(manager.is_indexed(&root.join("maps/aimd.ini")));
    assert!(!manager.is_indexed(&root.join("custom.ini")));
    assert!(!manager.is_indexed(&root.join("soundmd.ini")));
    assert!(manager.find_section_definitions("Excluded").is_empty());
    assert_eq!(manager.find_section_definitions("Colt45").len(), 1);
    assert_eq!(manager.get_registered_values("WeaponTypes"), vec!["Colt45"]);
    assert_eq!(
        manager.all_register_names().into_iter().collect::<Vec<_>>(),
        vec!["TeamTypes", "WeaponTypes"]
    );
    assert!(!manager.is_indexing());
}

#[test(tokio::test)]
async fn open_documents_are_indexed_from_their_overlay_text() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(
        &temp_dir,
        &[("rulesmd.ini", "[OnDisk]\n"), ("custom.ini", "[DiskCustom]\n")],
    );
    let manager = IndexManager::new(&root, IndexConfig::default()).unwrap();
    let custom = root.join("custom.ini");
    manager.open_document(&custom, "[Unsaved]\nPrimary=Colt45\n");

    let summary = manager.index_workspace().await.unwrap();
    assert_eq!(summary.selected, 2);
    assert_eq!(manager.find_section_definitions("Unsaved").len(), 1);
    assert!(manager.find_section_definitions("DiskCustom").is_empty());

    manager.update_document(&custom, "[Edited]\n");
    assert!(manager.find_section_definitions("Unsaved").is_empty());
    assert_eq!(manager.find_section_definitions("Edited").len(), 1);
    assert_eq!(manager.open_documents(), vec![custom.clone()]);

    assert!(manager.close_document(&custom));
    manager.index_file(&custom).await.unwrap();
    assert!(manager.find_section_definitions("Unsaved").is_empty());
    assert_eq!(manager.find_section_definitions("DiskCustom").len(), 1);
}

#[test(tokio::test)]
async fn batching_indexes_every_selected_file() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<(String, String)> = (0..25)
        .map(|i| (format!("part{i:02}/rulesmd.ini"), format!("[Section{i}]\nValue={i}\n")))
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(path, text)| (path.as_str(), text.as_str()))
        .collect();
    let root = create_test_workspace(&temp_dir, &borrowed);
    let config = IndexConfig {
        batch_size: 4,
        ..IndexConfig::default()
    };
    let manager = IndexManager::new(&root, config).unwrap();
    let events = record_events(&manager);

    let summary = manager.index_workspace().await.unwrap();
    assert_eq!(summary.indexed, 25);
    assert_eq!(manager.get_all_sections().len(), 25);
    assert_eq!(manager.global_version(), 25);
    assert_eq!(events.lock().unwrap().len(), 25);
}

#[test(tokio::test)]
async fn concurrent_workspace_pass_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(&temp_dir, &[("rulesmd.ini", "[A]\n")]);
    let manager = Arc::new(IndexManager::new(&root, IndexConfig::default()).unwrap());

    let nested = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(&manager);
    let sink = nested.clone();
    manager.on_index_change(move |_| {
        let Some(manager) = weak.upgrade() else { return };
        let in_flight = manager.is_indexing();
        let reentrant = futures::executor::block_on(manager.index_workspace());
        sink.lock().unwrap().push((in_flight, reentrant.is_none()));
    });

    assert!(manager.index_workspace().await.is_some());
    assert_eq!(*nested.lock().unwrap(), vec![(true, true)]);
    assert!(!manager.is_indexing());
}

#[test(tokio::test)]
async fn unreadable_file_keeps_its_previous_entry() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(&temp_dir, &[("rulesmd.ini", "[Kept]\n")]);
    let manager = IndexManager::new(&root, IndexConfig::default()).unwrap();
    let path = root.join("rulesmd.ini");
    manager.index_file(&path).await.unwrap();
    let version = manager.global_version();

    std::fs::remove_file(&path).unwrap();
    assert!(manager.index_file(&path).await.is_none());
    assert_eq!(manager.find_section_definitions("Kept").len(), 1);
    assert_eq!(manager.global_version(), version);
}

#[test(tokio::test)]
async fn reindexing_reports_only_the_sections_that_changed() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(
        &temp_dir,
        &[("rulesmd.ini", "[A]\nPrimary=Colt45\n\n[B]\nPrimary=M60\n")],
    );
    let manager = IndexManager::new(&root, IndexConfig::default()).unwrap();
    let path = root.join("rulesmd.ini");
    let first = manager.index_file(&path).await.unwrap();
    assert_eq!(first.changed_sections, vec!["A", "B", "Colt45", "M60"]);

    let unchanged = manager.index_file(&path).await.unwrap();
    assert_eq!(unchanged.kind, IndexEventKind::FileUpdated);
    assert!(unchanged.changed_sections.is_empty());
    assert_eq!(unchanged.global_version, first.global_version);

    write_file(
        &root,
        "rulesmd.ini",
        "; comment shifts lines\n[A]\nPrimary=Colt45\n\n[B]\nPrimary=M60\nSecondary=Laser\n",
    );
    let changed = manager.index_file(&path).await.unwrap();
    assert_eq!(changed.changed_sections, vec!["Laser"]);
    assert_eq!(changed.global_version, first.global_version + 1);
    assert_eq!(manager.section_version("Laser"), changed.global_version);
    assert_eq!(manager.section_version("Colt45"), first.global_version);
    assert_eq!(manager.file_version(&path), changed.global_version);
}

#[test(tokio::test)]
async fn deleting_the_only_definition_emits_file_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(
        &temp_dir,
        &[("rulesmd.ini", "[Other]\n"), ("artmd.ini", "[OnlySection]\nImage=X\n")],
    );
    let manager = IndexManager::new(&root, IndexConfig::default()).unwrap();
    manager.index_workspace().await.unwrap();
    let events = record_events(&manager);
    let art = root.join("artmd.ini");

    let deleted = manager.remove_file(&art).unwrap();
    assert!(manager.find_section_definitions("OnlySection").is_empty());
    assert_eq!(deleted.kind, IndexEventKind::FileDeleted);
    assert!(deleted.changed_sections.contains(&"OnlySection".to_string()));
    assert_eq!(manager.file_version(&art), 0);
    assert!(manager.remove_file(&art).is_none());

    let recorded = events.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0], deleted);
}

#[test(tokio::test)]
async fn clear_drops_everything_and_lists_every_name() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(
        &temp_dir,
        &[("rulesmd.ini", "[A]\nPrimary=Gun\n"), ("artmd.ini", "[B]\n")],
    );
    let manager = IndexManager::new(&root, IndexConfig::default()).unwrap();
    manager.index_workspace().await.unwrap();
    let before = manager.global_version();

    let cleared = manager.clear();
    assert_eq!(cleared.kind, IndexEventKind::IndexCleared);
    assert_eq!(cleared.file_path, None);
    assert_eq!(cleared.changed_sections, vec!["A", "B", "Gun"]);
    assert_eq!(cleared.global_version, before + 1);
    assert!(manager.get_all_sections().is_empty());
    assert_eq!(manager.section_version("A"), 0);
}

#[test(tokio::test)]
async fn listeners_run_in_registration_order_and_channels_receive_events() {
    let manager = IndexManager::new("/virtual", IndexConfig::default()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let sink = order.clone();
        manager.on_index_change(move |_| sink.lock().unwrap().push(name));
    }
    let mut channel = manager.subscribe();

    let event = manager.index_content(std::path::Path::new("/virtual/rulesmd.ini"), "[A]\n");
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(channel.recv().await, Some(event));

    drop(channel);
    manager.index_content(std::path::Path::new("/virtual/rulesmd.ini"), "[B]\n");
    assert_eq!(manager.events().len(), 3);
}

#[test(tokio::test)]
async fn rescan_evicts_files_that_left_the_workspace() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(
        &temp_dir,
        &[
            ("rulesmd.ini", "[Unit]\nPrimary=Gone\n"),
            ("artmd.ini", "[Gone]\nImage=GONE\n"),
            ("custom.ini", "[OnDisk]\n"),
        ],
    );
    let manager = IndexManager::new(&root, IndexConfig::default()).unwrap();
    let custom = root.join("custom.ini");
    manager.open_document(&custom, "[Overlay]\n");
    let first = manager.index_workspace().await.unwrap();
    assert_eq!(first.evicted, 0);
    assert_eq!(manager.find_section_definitions("Gone").len(), 1);
    assert_eq!(manager.find_section_definitions("Overlay").len(), 1);

    let art = root.join("artmd.ini");
    std::fs::remove_file(&art).unwrap();
    assert!(manager.close_document(&custom));
    let events = record_events(&manager);

    let second = manager.index_workspace().await.unwrap();
    assert_eq!(second.evicted, 2);
    assert_eq!(second.indexed, 1);
    assert!(manager.find_section_definitions("Gone").is_empty());
    assert!(manager.find_section_definitions("Overlay").is_empty());
    assert!(!manager.is_indexed(&custom));
    assert_eq!(manager.indexed_files(), vec![root.join("rulesmd.ini")]);

    let recorded = events.lock().unwrap();
    let deleted: Vec<_> = recorded
        .iter()
        .filter(|e| e.kind == IndexEventKind::FileDeleted)
        .collect();
    assert_eq!(deleted.len(), 2);
    let art_event = deleted
        .iter()
        .find(|e| e.file_path.as_deref() == Some(art.as_path()))
        .unwrap();
    assert!(art_event.changed_sections.contains(&"Gone".to_string()));
}
