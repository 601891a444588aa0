use crate::{
    inference::TypeInference,
    scanner::{LineKind, LineScanner},
    workspace::IndexManager,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket for sections the dictionary cannot classify.
pub const UNTYPED: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub section: String,
    /// Lower-cased key.
    pub key: String,
    /// One-based line numbers.
    pub lines: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatistics {
    pub total_sections: usize,
    /// Distinct keys per section, summed.
    pub total_keys: usize,
    pub duplicate_keys: Vec<DuplicateKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatistics {
    pub total_files: usize,
    pub total_sections: usize,
    pub total_references: usize,
    pub sections_by_type: BTreeMap<String, usize>,
    pub global_version: u64,
}

/// Header and key counts for one document. Append lines are not counted as keys.
pub fn collect_file_statistics(scanner: &LineScanner, text: &str) -> FileStatistics {
    let mut stats = FileStatistics::default();
    let mut keys: BTreeMap<String, BTreeMap<String, Vec<usize>>> = BTreeMap::new();
    let mut current: Option<&str> = None;

    for (line_no, line) in text.lines().enumerate() {
        match scanner.scan(line, current.unwrap_or_default()).kind {
            LineKind::SectionHeader { name, .. } => {
                stats.total_sections += 1;
                keys.entry(name.to_string()).or_default();
                current = Some(name);
            }
            LineKind::KeyValue { key, .. } => {
                if let Some(section) = current {
                    keys.entry(section.to_string())
                        .or_default()
                        .entry(key.to_lowercase())
                        .or_default()
                        .push(line_no + 1);
                }
            }
            _ => {}
        }
    }

    for (section, section_keys) in keys {
        stats.total_keys += section_keys.len();
        stats.duplicate_keys.extend(
            section_keys
                .into_iter()
                .filter(|(_, lines)| lines.len() > 1)
                .map(|(key, lines)| DuplicateKey {
                    section: section.clone(),
                    key,
                    lines,
                }),
        );
    }
    stats
}

/// Counts over the whole index, with sections bucketed by their inferred type.
pub fn collect_workspace_statistics(
    index: &IndexManager,
    inference: &TypeInference,
) -> WorkspaceStatistics {
    let files = index.indexed_files();
    let sections = index.get_all_sections();
    let total_references = files
        .iter()
        .filter_map(|path| index.file_index(path))
        .map(|file| file.reference_count())
        .sum();

    let mut sections_by_type = BTreeMap::new();
    for section in &sections {
        let bucket = inference
            .infer_section_type(section)
            .unwrap_or_else(|| UNTYPED.to_string());
        *sections_by_type.entry(bucket).or_insert(0) += 1;
    }

    WorkspaceStatistics {
        total_files: files.len(),
        total_sections: sections.len(),
        total_references,
        sections_by_type,
        global_version: index.global_version(),
    }
}
