//! Per-file index and the structural diff between two versions of it.

use crate::scanner::{LineKind, LineScanner};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    time::SystemTime,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionInfo {
    pub name: String,
    /// Zero-based line of the header.
    pub line: usize,
    pub file: PathBuf,
}

/// A value token that may name a section, together with the assignment it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub line: usize,
    /// Assigning key, or `+=` for a bare append.
    pub key: String,
    /// Full raw value of the line, comment stripped.
    pub value: String,
    /// Section the assignment sits in.
    pub section: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndex {
    /// Section name to every header defining it, in line order.
    pub sections: BTreeMap<String, Vec<SectionInfo>>,
    /// Reference token to every place it occurs, in line order.
    pub references: BTreeMap<String, Vec<Reference>>,
    /// Registration section name to its member values, in line order.
    pub registers: BTreeMap<String, Vec<String>>,
    pub last_modified: Option<SystemTime>,
    pub size: u64,
}

impl FileIndex {
    /// Build with the default registration predicate.
    pub fn build(content: &str, path: &Path) -> FileIndex {
        FileIndex::build_with(LineScanner::shared(), content, path)
    }

    /// One pass over `content`. Lines before the first header and malformed lines contribute
    /// nothing.
    pub fn build_with(scanner: &LineScanner, content: &str, path: &Path) -> FileIndex {
        let mut index = FileIndex {
            size: content.len() as u64,
            ..FileIndex::default()
        };
        let mut current_section: Option<&str> = None;

        for (line_no, line) in content.lines().enumerate() {
            let scanned = scanner.scan(line, current_section.unwrap_or_default());
            if let LineKind::SectionHeader { name, .. } = scanned.kind {
                current_section = Some(name);
                index
                    .sections
                    .entry(name.to_string())
                    .or_default()
                    .push(SectionInfo {
                        name: name.to_string(),
                        line: line_no,
                        file: path.to_path_buf(),
                    });
                continue;
            }
            let Some(section) = current_section else {
                continue;
            };

            if !scanned.register_values.is_empty() {
                index
                    .registers
                    .entry(section.to_string())
                    .or_default()
                    .extend(scanned.register_values.iter().map(|v| v.to_string()));
            }

            if let (Some(key), Some(value)) = (scanned.reference_key(), scanned.raw_value()) {
                for token in scanned.reference_candidates() {
                    index
                        .references
                        .entry(token.to_string())
                        .or_default()
                        .push(Reference {
                            line: line_no,
                            key: key.to_string(),
                            value: value.to_string(),
                            section: section.to_string(),
                        });
                }
            }
        }
        index
    }

    pub fn with_metadata(mut self, last_modified: Option<SystemTime>, size: u64) -> FileIndex {
        self.last_modified = last_modified;
        self.size = size;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.references.is_empty() && self.registers.is_empty()
    }

    pub fn defines(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn definition_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn reference_count(&self) -> usize {
        self.references.values().map(Vec::len).sum()
    }

    /// Structural difference from `self` (old) to `new`. Line moves alone are not changes.
    pub fn diff(&self, new: &FileIndex) -> FileIndexDiff {
        let mut diff = FileIndexDiff::default();

        for name in union_keys(&self.sections, &new.sections) {
            let old_count = self.sections.get(name).map_or(0, Vec::len);
            let new_count = new.sections.get(name).map_or(0, Vec::len);
            match (old_count, new_count) {
                (0, n) if n > 0 => {
                    diff.added_sections.insert(name.clone());
                }
                (o, 0) if o > 0 => {
                    diff.removed_sections.insert(name.clone());
                }
                (o, n) if o != n => {
                    diff.redefined_sections.insert(name.clone());
                }
                _ => {}
            }
        }

        for name in union_keys(&self.references, &new.references) {
            let before = reference_signature(self.references.get(name));
            let after = reference_signature(new.references.get(name));
            if before != after {
                diff.changed_references.insert(name.clone());
            }
        }

        for name in union_keys(&self.registers, &new.registers) {
            let empty = Vec::new();
            let before = self.registers.get(name).unwrap_or(&empty);
            let after = new.registers.get(name).unwrap_or(&empty);
            if before == after {
                continue;
            }
            diff.changed_registers.insert(name.clone());
            let old_members: BTreeSet<&String> = before.iter().collect();
            let new_members: BTreeSet<&String> = after.iter().collect();
            diff.changed_memberships.extend(
                old_members
                    .symmetric_difference(&new_members)
                    .map(|value| value.to_string()),
            );
        }
        diff
    }
}

fn union_keys<'a, V>(
    a: &'a BTreeMap<String, V>,
    b: &'a BTreeMap<String, V>,
) -> BTreeSet<&'a String> {
    a.keys().chain(b.keys()).collect()
}

fn reference_signature(refs: Option<&Vec<Reference>>) -> Vec<(&str, &str, &str)> {
    let mut signature: Vec<(&str, &str, &str)> = refs
        .map(|refs| {
            refs.iter()
                .map(|r| (r.section.as_str(), r.key.as_str(), r.value.as_str()))
                .collect()
        })
        .unwrap_or_default();
    signature.sort_unstable();
    signature
}

/// Section names touched by a file change, grouped by why they changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndexDiff {
    pub added_sections: BTreeSet<String>,
    pub removed_sections: BTreeSet<String>,
    /// Still defined, but a different number of times.
    pub redefined_sections: BTreeSet<String>,
    pub changed_references: BTreeSet<String>,
    pub changed_registers: BTreeSet<String>,
    /// Values that joined or left some registration list.
    pub changed_memberships: BTreeSet<String>,
}

impl FileIndexDiff {
    pub fn is_empty(&self) -> bool {
        self.added_sections.is_empty()
            && self.removed_sections.is_empty()
            && self.redefined_sections.is_empty()
            && self.changed_references.is_empty()
            && self.changed_registers.is_empty()
            && self.changed_memberships.is_empty()
    }

    /// Sorted union of every touched name.
    pub fn changed_sections(&self) -> Vec<String> {
        let all: BTreeSet<&String> = self
            .added_sections
            .iter()
            .chain(&self.removed_sections)
            .chain(&self.redefined_sections)
            .chain(&self.changed_references)
            .chain(&self.changed_registers)
            .chain(&self.changed_memberships)
            .collect();
        all.into_iter().cloned().collect()
    }
}
