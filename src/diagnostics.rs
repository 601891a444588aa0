//! Per-document diagnostics.
//!
//! One forward scan with the same [`LineScanner`] rules the index uses, followed by index
//! queries for the cross-file checks. Nothing here blocks indexing; every finding is reported
//! as a [`Diagnostic`] and the caller decides how to render it. Columns are counted in chars.

use crate::{
    config::IndexConfig,
    dictionary::Dictionary,
    scanner::{is_reference_candidate, LineKind, LineScanner, MalformedLine},
    workspace::IndexManager,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::{Display, Formatter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Information => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    InvalidSectionHeader,
    MissingKey,
    EmptyAppend,
    MissingEquals,
    MissingValue,
    DuplicateKey,
    DuplicateSection,
    UndefinedReference,
    UnusedSection,
}

impl Display for DiagnosticCode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let code = match self {
            DiagnosticCode::InvalidSectionHeader => "invalid-section-header",
            DiagnosticCode::MissingKey => "missing-key",
            DiagnosticCode::EmptyAppend => "empty-append",
            DiagnosticCode::MissingEquals => "missing-equals",
            DiagnosticCode::MissingValue => "missing-value",
            DiagnosticCode::DuplicateKey => "duplicate-key",
            DiagnosticCode::DuplicateSection => "duplicate-section",
            DiagnosticCode::UndefinedReference => "undefined-reference",
            DiagnosticCode::UnusedSection => "unused-section",
        };
        write!(f, "{code}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Zero-based line.
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    /// Every line involved, for diagnostics about repeated definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_lines: Vec<usize>,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        code: DiagnosticCode,
        line: usize,
        span: (usize, usize),
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic {
            line,
            start: span.0,
            end: span.1,
            severity,
            code,
            message: message.into(),
            related_lines: Vec::new(),
        }
    }

    pub fn error(
        code: DiagnosticCode,
        line: usize,
        span: (usize, usize),
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Error, code, line, span, message)
    }

    pub fn warning(
        code: DiagnosticCode,
        line: usize,
        span: (usize, usize),
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, code, line, span, message)
    }

    pub fn hint(
        code: DiagnosticCode,
        line: usize,
        span: (usize, usize),
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Hint, code, line, span, message)
    }

    fn with_related(mut self, lines: &[usize]) -> Self {
        self.related_lines = lines.to_vec();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.line + 1,
            self.start + 1,
            self.severity,
            self.code,
            self.message
        )
    }
}

/// Char span of the first occurrence of `needle` in `line`, or the whole trimmed line.
fn span_of(line: &str, needle: &str) -> (usize, usize) {
    match line.find(needle).filter(|_| !needle.is_empty()) {
        Some(byte) => {
            let start = line[..byte].chars().count();
            (start, start + needle.chars().count())
        }
        None => {
            let indent = line.len() - line.trim_start().len();
            let start = line[..indent].chars().count();
            (start, start + line.trim().chars().count())
        }
    }
}

#[derive(Debug, Default)]
struct Occurrences {
    /// Section name to header lines.
    headers: BTreeMap<String, Vec<usize>>,
    /// (section, lower-cased key) to (line, written key).
    keys: BTreeMap<(String, String), Vec<(usize, String)>>,
    /// Tokens listed in registration sections: (line, token).
    registrations: Vec<(usize, String)>,
    /// Every token this document uses as a reference or registration value.
    used: HashSet<String>,
}

pub struct DiagnosticsChecker<'a> {
    config: &'a IndexConfig,
    dictionary: &'a Dictionary,
    scanner: &'a LineScanner,
    index: Option<&'a IndexManager>,
}

impl<'a> DiagnosticsChecker<'a> {
    /// Checker consulting `index` for cross-file checks when multi-file search is enabled.
    pub fn new(index: &'a IndexManager, dictionary: &'a Dictionary) -> DiagnosticsChecker<'a> {
        DiagnosticsChecker {
            config: index.config(),
            dictionary,
            scanner: index.scanner(),
            index: index.config().enable_multi_file_search.then_some(index),
        }
    }

    /// Checker limited to the document itself.
    pub fn local(
        config: &'a IndexConfig,
        dictionary: &'a Dictionary,
        scanner: &'a LineScanner,
    ) -> DiagnosticsChecker<'a> {
        DiagnosticsChecker {
            config,
            dictionary,
            scanner,
            index: None,
        }
    }

    fn is_registration(&self, section: &str) -> bool {
        self.scanner.is_register_section(section) || self.dictionary.is_registration_key(section)
    }

    /// All diagnostics for `text`, ordered by line then column.
    pub fn check(&self, text: &str) -> Vec<Diagnostic> {
        let lines: Vec<&str> = text.lines().collect();
        let mut diagnostics = Vec::new();
        let occurrences = self.scan(&lines, &mut diagnostics);

        let settings = &self.config.diagnostics;
        if settings.check_duplicate_keys {
            self.duplicate_keys(&lines, &occurrences, &mut diagnostics);
        }
        self.duplicate_sections(&lines, &occurrences, &mut diagnostics);
        if settings.check_undefined_references {
            self.undefined_references(&lines, &occurrences, &mut diagnostics);
        }
        if settings.check_unused_sections {
            self.unused_sections(&lines, &occurrences, &mut diagnostics);
        }

        diagnostics.sort_by(|a, b| (a.line, a.start, a.code).cmp(&(b.line, b.start, b.code)));
        diagnostics
    }

    fn scan(&self, lines: &[&str], diagnostics: &mut Vec<Diagnostic>) -> Occurrences {
        let check_syntax = self.config.diagnostics.check_syntax;
        let mut found = Occurrences::default();
        let mut current: Option<&str> = None;

        for (i, line) in lines.iter().enumerate() {
            let scanned = self.scanner.scan(line, current.unwrap_or_default());
            match scanned.kind {
                LineKind::SectionHeader { name, well_formed } => {
                    current = Some(name);
                    found.headers.entry(name.to_string()).or_default().push(i);
                    if check_syntax && !well_formed {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::InvalidSectionHeader,
                            i,
                            span_of(line, ""),
                            format!("unexpected text after section header [{name}]"),
                        ));
                    }
                    continue;
                }
                LineKind::Malformed(kind) if check_syntax => {
                    let (code, message) = match kind {
                        MalformedLine::UnclosedSection => (
                            DiagnosticCode::InvalidSectionHeader,
                            "section header is missing its closing ']'",
                        ),
                        MalformedLine::EmptySectionName => {
                            (DiagnosticCode::InvalidSectionHeader, "section name is empty")
                        }
                        MalformedLine::MissingKey => {
                            (DiagnosticCode::MissingKey, "assignment is missing its key")
                        }
                    };
                    diagnostics.push(Diagnostic::error(code, i, span_of(line, ""), message));
                }
                _ => {}
            }

            let Some(section) = current else {
                continue;
            };
            found
                .used
                .extend(scanned.reference_candidates().into_iter().map(str::to_string));
            found
                .used
                .extend(scanned.register_values.iter().map(|v| v.to_string()));

            match scanned.kind {
                LineKind::KeyValue { key, .. } => {
                    if !self.config.diagnostics.skips_duplicate(key) {
                        found
                            .keys
                            .entry((section.to_string(), key.to_lowercase()))
                            .or_default()
                            .push((i, key.to_string()));
                    }
                }
                LineKind::KeyAppend { value, .. } if check_syntax && value.is_empty() => {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticCode::EmptyAppend,
                        i,
                        span_of(line, "+="),
                        "'+=' is not followed by a value to register",
                    ));
                }
                LineKind::BareValue { value } if check_syntax && !self.is_registration(section) => {
                    diagnostics.push(match value.split_once(char::is_whitespace) {
                        Some((key, _)) => Diagnostic::error(
                            DiagnosticCode::MissingEquals,
                            i,
                            span_of(line, key),
                            format!("key \"{key}\" is missing '='"),
                        ),
                        None => Diagnostic::warning(
                            DiagnosticCode::MissingValue,
                            i,
                            span_of(line, value),
                            format!("\"{value}\" has no '=' or value, expected {value}=<value>"),
                        ),
                    });
                }
                _ => {}
            }

            if self.is_registration(section) {
                found.registrations.extend(
                    scanned
                        .register_values
                        .iter()
                        .filter(|token| is_reference_candidate(token))
                        .filter(|token| !token.contains(['/', '\\']))
                        .map(|token| (i, token.to_string())),
                );
            }
        }
        found
    }

    fn duplicate_keys(
        &self,
        lines: &[&str],
        found: &Occurrences,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for ((section, _), uses) in &found.keys {
            if uses.len() < 2 {
                continue;
            }
            let related: Vec<usize> = uses.iter().map(|(line, _)| *line).collect();
            let listed = related
                .iter()
                .map(|l| (l + 1).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            for (line, key) in uses {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::DuplicateKey,
                        *line,
                        span_of(lines[*line], key),
                        format!(
                            "\"{key}\" is defined more than once in [{section}] (lines {listed}, case-insensitive)"
                        ),
                    )
                    .with_related(&related),
                );
            }
        }
    }

    fn duplicate_sections(
        &self,
        lines: &[&str],
        found: &Occurrences,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for (name, header_lines) in &found.headers {
            if header_lines.len() < 2 {
                continue;
            }
            for line in header_lines {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::DuplicateSection,
                        *line,
                        span_of(lines[*line], name),
                        format!(
                            "section [{name}] is defined {} times in this file",
                            header_lines.len()
                        ),
                    )
                    .with_related(header_lines),
                );
            }
        }
    }

    fn undefined_references(
        &self,
        lines: &[&str],
        found: &Occurrences,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for (line, token) in &found.registrations {
            if found.headers.contains_key(token) {
                continue;
            }
            if self
                .index
                .is_some_and(|index| !index.find_section_definitions(token).is_empty())
            {
                continue;
            }
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UndefinedReference,
                *line,
                span_of(lines[*line], token),
                format!("[{token}] is registered but never defined"),
            ));
        }
    }

    fn unused_sections(
        &self,
        lines: &[&str],
        found: &Occurrences,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for (name, header_lines) in &found.headers {
            if self.is_registration(name)
                || found.used.contains(name)
                || self.dictionary.sections.contains_key(name)
            {
                continue;
            }
            if let Some(index) = self.index {
                if !index.find_section_references(name).is_empty()
                    || !index.registers_containing(name).is_empty()
                {
                    continue;
                }
            }
            let first = header_lines[0];
            diagnostics.push(Diagnostic::hint(
                DiagnosticCode::UnusedSection,
                first,
                span_of(lines[first], name),
                format!("section [{name}] is never referenced or registered"),
            ));
        }
    }
}

/// Lines carrying at least one error.
pub fn lines_with_errors(diagnostics: &[Diagnostic]) -> BTreeSet<usize> {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.line)
        .collect()
}
