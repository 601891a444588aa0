//! Diagnostics and registration helper integration tests
//!
//! Single-document checks plus the cross-file variants that consult a populated index.

mod common;

use common::{create_test_workspace, dictionary};
use ra2_ini_core::{
    config::IndexConfig,
    diagnostics::{lines_with_errors, DiagnosticCode, DiagnosticsChecker, Severity},
    inference::TypeInference,
    register::{apply_edit, RegisterHelper},
    workspace::IndexManager,
};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use test_log::test;

fn virtual_index(multi_file: bool) -> IndexManager {
    let config = IndexConfig {
        enable_multi_file_search: multi_file,
        ..IndexConfig::default()
    };
    IndexManager::new("/virtual", config).unwrap()
}

#[test]
fn duplicate_keys_reference_every_occurrence() {
    let index = virtual_index(true);
    let dictionary = dictionary();
    let diagnostics = DiagnosticsChecker::new(&index, &dictionary).check("[X]\nHP=10\nHP=20");
    let duplicates: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::DuplicateKey)
        .collect();
    assert_eq!(duplicates.len(), 2);
    assert_eq!(duplicates[0].line, 1);
    assert_eq!(duplicates[1].line, 2);
    for diagnostic in &duplicates {
        assert_eq!(diagnostic.related_lines, vec![1, 2]);
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert!(diagnostic.message.contains("lines 2, 3"));
    }
}

#[test]
fn numeric_and_spaced_tokens_are_never_references() {
    let index = virtual_index(true);
    let text = "[WeaponTypes]\n0=42\n1=some value\n\n[Unit]\nCost=42\nName=some value\n";
    index.index_content(Path::new("/virtual/rulesmd.ini"), text);

    let file = index.file_index(Path::new("/virtual/rulesmd.ini")).unwrap();
    assert!(file.defines("Unit"));
    assert!(!file.references.contains_key("42"));
    assert!(!file.references.contains_key("some value"));
    assert!(index.find_section_references("42").is_empty());

    let dictionary = dictionary();
    let diagnostics = DiagnosticsChecker::new(&index, &dictionary).check(text);
    assert!(diagnostics
        .iter()
        .all(|d| d.code != DiagnosticCode::UndefinedReference));
}

#[test(tokio::test)]
async fn undefined_references_consult_other_files_when_enabled() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(&temp_dir, &[("artmd.ini", "[Colt45]\nImage=COLT\n")]);
    let text = "[WeaponTypes]\n0=Colt45\n1=Ghost\n";
    let dictionary = dictionary();

    for (multi_file, expected) in [(true, vec!["Ghost"]), (false, vec!["Colt45", "Ghost"])] {
        let config = IndexConfig {
            enable_multi_file_search: multi_file,
            ..IndexConfig::default()
        };
        let index = IndexManager::new(&root, config).unwrap();
        index.index_workspace().await.unwrap();

        let undefined: Vec<String> = DiagnosticsChecker::new(&index, &dictionary)
            .check(text)
            .into_iter()
            .filter(|d| d.code == DiagnosticCode::UndefinedReference)
            .map(|d| text.lines().nth(d.line).unwrap()[d.start..d.end].to_string())
            .collect();
        assert_eq!(undefined, expected, "multi-file search {multi_file}");
    }
}

#[test(tokio::test)]
async fn sections_referenced_elsewhere_are_not_unused() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_workspace(&temp_dir, &[("rulesmd.ini", "[Unit]\nPrimary=Gun\n")]);
    let index = IndexManager::new(&root, IndexConfig::default()).unwrap();
    index.index_workspace().await.unwrap();

    let dictionary = dictionary();
    let text = "[Gun]\nDamage=1\n\n[Lonely]\nDamage=2\n\n[General]\nX=1\n";
    let unused: Vec<usize> = DiagnosticsChecker::new(&index, &dictionary)
        .check(text)
        .into_iter()
        .filter(|d| d.code == DiagnosticCode::UnusedSection)
        .map(|d| d.line)
        .collect();
    assert_eq!(unused, vec![3]);
}

#[test]
fn malformed_lines_do_not_stop_indexing_or_checking() {
    let index = virtual_index(true);
    let text = "[Good]\n=orphan\n+=\nbroken line\n[Unclosed\n[After]\nPrimary=Gun\n";
    index.index_content(Path::new("/virtual/rulesmd.ini"), text);
    assert_eq!(index.find_section_definitions("After").len(), 1);
    assert_eq!(index.find_section_references("Gun").len(), 1);

    let dictionary = dictionary();
    let diagnostics = DiagnosticsChecker::new(&index, &dictionary).check(text);
    assert_eq!(lines_with_errors(&diagnostics).into_iter().collect::<Vec<_>>(), vec![1, 3, 4]);
    assert!(diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::EmptyAppend && d.line == 2));
}

#[test]
fn registration_helper_registers_across_files() {
    let index = Arc::new(virtual_index(true));
    index.index_content(
        Path::new("/virtual/rulesmd.ini"),
        "[WeaponTypes]\n+=Colt45\n\n[Colt45]\nDamage=10\n",
    );
    index.index_content(Path::new("/virtual/artmd.ini"), "[Unit]\nPrimary=Laser\n");
    let inference = TypeInference::new(dictionary(), index.clone());
    let helper = RegisterHelper::new(&inference);

    let text = "; the laser\n[Laser]\nDamage=50\n\n[Colt45]\nDamage=10\n";
    let missing: Vec<String> = helper
        .unregistered_sections_global(text)
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(missing, vec!["Laser", "Unit"]);
    assert_eq!(helper.suggested_registers(text, "Laser"), vec!["WeaponTypes"]);
    assert!(helper.suggested_registers(text, "Colt45").is_empty());

    let edit = helper.registration_edit(text, "Laser", "WeaponTypes");
    assert_eq!(edit.line, 6);
    assert_eq!(edit.text, "\n[WeaponTypes]\n+=Laser ; the laser\n");

    let rules = "[WeaponTypes]\n+=Colt45\n\n[Colt45]\nDamage=10\n";
    let edit = helper.registration_edit(rules, "Laser", "WeaponTypes");
    assert_eq!(
        apply_edit(rules, &edit),
        "[WeaponTypes]\n+=Colt45\n+=Laser ; Laser\n\n[Colt45]\nDamage=10\n"
    );
}
