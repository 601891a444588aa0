//! Registration helpers: which sections are not yet listed in any registration section, which
//! registration section a section belongs in, and the edit that registers it.

use crate::{
    dictionary::{RegisterMode, RegisterTypeConfig},
    inference::TypeInference,
    scanner::{classify_line, LineKind, MalformedLine},
};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A section header together with the comment describing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionWithComment {
    pub name: String,
    pub line: usize,
    /// Trailing comment on the header line, or a comment line directly above it.
    pub comment: Option<String>,
}

/// Text to insert at the start of `line`. `line` may equal the document's line count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub line: usize,
    pub text: String,
}

pub struct RegisterHelper<'a> {
    inference: &'a TypeInference,
}

impl<'a> RegisterHelper<'a> {
    pub fn new(inference: &'a TypeInference) -> RegisterHelper<'a> {
        RegisterHelper { inference }
    }

    fn multi_file(&self) -> bool {
        self.inference.index().config().enable_multi_file_search
    }

    /// Registration sections named by the dictionary, deduplicated in declaration order.
    pub fn register_sections(&self) -> Vec<String> {
        let registers: IndexSet<&str> = self.inference.dictionary().all_registers().collect();
        registers.into_iter().map(str::to_string).collect()
    }

    pub fn register_sections_for_type(&self, type_name: &str) -> Vec<String> {
        self.inference
            .dictionary()
            .type_mapping(type_name)
            .map(|mapping| mapping.registers.clone())
            .unwrap_or_default()
    }

    pub fn is_register_section(&self, name: &str) -> bool {
        self.inference.dictionary().is_registration_key(name)
    }

    pub fn register_config(&self, register: &str) -> Option<&RegisterTypeConfig> {
        self.inference.dictionary().register_config(register)
    }

    pub fn register_label(&self, register: &str) -> Option<&str> {
        self.register_config(register).map(|c| c.label.as_str())
    }

    pub fn register_mode(&self, register: &str) -> RegisterMode {
        self.register_config(register)
            .and_then(|c| c.mode)
            .unwrap_or_default()
    }

    /// Non-registration sections defined in `text`, with their describing comments.
    pub fn defined_sections(&self, text: &str) -> Vec<SectionWithComment> {
        let lines: Vec<&str> = text.lines().collect();
        lines
            .iter()
            .enumerate()
            .filter_map(|(line_no, line)| match classify_line(line) {
                LineKind::SectionHeader { name, .. } if !self.is_register_section(name) => {
                    Some(SectionWithComment {
                        name: name.to_string(),
                        line: line_no,
                        comment: header_comment(&lines, line_no),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// Names registered in `text`, honoring each registration section's mode.
    pub fn registered_sections(&self, text: &str) -> BTreeSet<String> {
        let mut registered = BTreeSet::new();
        let mut current = "";
        for line in text.lines() {
            let kind = classify_line(line);
            if let LineKind::SectionHeader { name, .. } = kind {
                current = name;
                continue;
            }
            if !self.is_register_section(current) {
                continue;
            }
            let entry = match (self.register_mode(current), kind) {
                (RegisterMode::KeyValue, LineKind::KeyValue { key, .. }) => Some(key),
                (RegisterMode::Append, LineKind::KeyAppend { key: None, value }) => Some(value),
                (RegisterMode::Append, LineKind::KeyValue { key, value })
                    if key.chars().all(|c| c.is_ascii_digit()) =>
                {
                    Some(value)
                }
                _ => None,
            };
            if let Some(name) = entry.and_then(|e| e.split_whitespace().next()) {
                registered.insert(name.to_string());
            }
        }
        registered
    }

    /// Names registered anywhere in the index, in `register` only when given.
    pub fn registered_sections_global(&self, register: Option<&str>) -> BTreeSet<String> {
        let registers = match register {
            Some(register) => vec![register.to_string()],
            None => self.register_sections(),
        };
        let index = self.inference.index();
        registers
            .iter()
            .flat_map(|register| index.get_registered_values(register))
            .collect()
    }

    fn registered(&self, text: &str) -> BTreeSet<String> {
        if self.multi_file() {
            self.registered_sections_global(None)
        } else {
            self.registered_sections(text)
        }
    }

    /// Sections defined in `text` that no registration section lists.
    pub fn unregistered_sections(&self, text: &str) -> Vec<SectionWithComment> {
        let registered = self.registered(text);
        self.defined_sections(text)
            .into_iter()
            .filter(|s| !registered.contains(&s.name))
            .collect()
    }

    /// Like [`RegisterHelper::unregistered_sections`], extended with sections defined in other
    /// whitelisted indexed files. Current-file entries come first.
    pub fn unregistered_sections_global(&self, text: &str) -> Vec<SectionWithComment> {
        if !self.multi_file() {
            return self.unregistered_sections(text);
        }
        let index = self.inference.index();
        let mut merged: Vec<SectionWithComment> = self.defined_sections(text);
        let mut seen: BTreeSet<String> = merged.iter().map(|s| s.name.clone()).collect();
        for name in index.get_all_sections() {
            if seen.contains(&name) || self.is_register_section(&name) {
                continue;
            }
            let Some(first) = index.find_section_definitions(&name).into_iter().next() else {
                continue;
            };
            if !index.filter().is_whitelisted(&first.file) {
                continue;
            }
            seen.insert(name.clone());
            merged.push(SectionWithComment {
                name,
                line: first.line,
                comment: None,
            });
        }
        let registered = self.registered_sections_global(None);
        merged
            .into_iter()
            .filter(|s| !registered.contains(&s.name))
            .collect()
    }

    /// Registration sections `section` could be added to. Empty when it is already registered
    /// or is itself a registration section.
    pub fn suggested_registers(&self, text: &str, section: &str) -> Vec<String> {
        if self.is_register_section(section) || self.registered(text).contains(section) {
            return Vec::new();
        }
        let by_type = self
            .inference
            .infer_section_type(section)
            .map(|t| self.register_sections_for_type(&t))
            .unwrap_or_default();
        if by_type.is_empty() {
            self.register_sections()
        } else {
            by_type
        }
    }

    /// Edit registering `section` in `register`: appended after the last entry of an existing
    /// `[register]` block, or as a new block at the end of the document.
    pub fn registration_edit(&self, text: &str, section: &str, register: &str) -> TextEdit {
        let label = self
            .defined_sections(text)
            .into_iter()
            .find(|s| s.name == section)
            .and_then(|s| s.comment)
            .unwrap_or_else(|| section.to_string());
        let entry = match self.register_mode(register) {
            RegisterMode::KeyValue => {
                let default_value = self
                    .register_config(register)
                    .and_then(|c| c.default_value.as_deref())
                    .unwrap_or_default();
                format!("{section}={default_value} ; {label}\n")
            }
            RegisterMode::Append => format!("+={section} ; {label}\n"),
        };

        let lines: Vec<&str> = text.lines().collect();
        let header = lines.iter().position(|line| {
            matches!(classify_line(line), LineKind::SectionHeader { name, .. } if name == register)
        });
        match header {
            Some(header) => {
                let mut insert_at = header + 1;
                for (offset, line) in lines.iter().enumerate().skip(header + 1) {
                    match classify_line(line) {
                        LineKind::SectionHeader { .. }
                        | LineKind::Malformed(MalformedLine::UnclosedSection) => break,
                        LineKind::Blank | LineKind::Comment => {}
                        _ => insert_at = offset + 1,
                    }
                }
                TextEdit {
                    line: insert_at,
                    text: entry,
                }
            }
            None => {
                let prefix = if lines.is_empty() { "" } else { "\n" };
                TextEdit {
                    line: lines.len(),
                    text: format!("{prefix}[{register}]\n{entry}"),
                }
            }
        }
    }
}

/// Insert `edit` into `text`.
pub fn apply_edit(text: &str, edit: &TextEdit) -> String {
    let mut lines: Vec<String> = text.lines().map(|l| format!("{l}\n")).collect();
    let at = edit.line.min(lines.len());
    lines.insert(at, edit.text.clone());
    lines.concat()
}

fn header_comment(lines: &[&str], line_no: usize) -> Option<String> {
    let line = lines.get(line_no)?;
    if let Some(close) = line.find(']') {
        let rest = line[close + 1..].trim_start();
        if let Some(comment) = rest.strip_prefix(';').or_else(|| rest.strip_prefix('#')) {
            let comment = comment.trim();
            if !comment.is_empty() {
                return Some(comment.to_string());
            }
        }
    }
    let previous = lines.get(line_no.checked_sub(1)?)?.trim();
    previous
        .strip_prefix(';')
        .or_else(|| previous.strip_prefix('#'))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}
