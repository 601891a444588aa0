//! Line-oriented scanner for the INI dialect.
//!
//! The scanner classifies one line at a time. It never fails: anything it cannot make sense
//! of comes back as [`LineKind::Malformed`] so callers decide whether that matters (the
//! [`FileIndex`](crate::file_index::FileIndex) builder skips it, diagnostics report it).
//!
//! Dialect summary:
//!
//! ```text
//! [WeaponTypes]        ; section header, trailing comment allowed
//! +=Colt45             ; bare append, registers Colt45
//! 0=M60                ; numbered registration entry
//! Primary=Colt45       ; key=value, value tokens are reference candidates
//! Anims+=Boom1,Boom2   ; keyed append
//! Colt45               ; bare value, only meaningful inside a registration section
//! Name="A;B"           ; semicolons inside quotes do not start a comment
//! ```

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Section names that hold registration lists even though they do not end in `Types`.
pub const DEFAULT_REGISTER_SECTIONS: &[&str] = &[
    "Warheads",
    "Projectiles",
    "Animations",
    "Particles",
    "ParticleSystems",
    "SuperWeaponTypes",
    "VoxelAnims",
    "TerrainTypes",
    "SmudgeTypes",
    "OverlayTypes",
    "Tiberiums",
    "Countries",
    "Sides",
    "Colors",
];

pub const DEFAULT_REGISTER_SUFFIX: &str = "Types";

/// Key recorded on references that come from a bare `+=value` line.
pub const APPEND_KEY: &str = "+=";

static DEFAULT_SCANNER: Lazy<LineScanner> = Lazy::new(LineScanner::default);

/// Decides whether a section holds a registration list: a suffix rule plus a fixed name set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPredicate {
    suffix: String,
    names: HashSet<String>,
}

impl Default for RegisterPredicate {
    fn default() -> Self {
        RegisterPredicate::new(
            DEFAULT_REGISTER_SUFFIX,
            DEFAULT_REGISTER_SECTIONS.iter().copied(),
        )
    }
}

impl RegisterPredicate {
    pub fn new<I, S>(suffix: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegisterPredicate {
            suffix: suffix.to_string(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_register_section(&self, section: &str) -> bool {
        if section.is_empty() {
            return false;
        }
        (!self.suffix.is_empty() && section.ends_with(&self.suffix)) || self.names.contains(section)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedLine {
    /// `[Name` without a closing bracket
    UnclosedSection,
    /// `[]`
    EmptySectionName,
    /// `=value`
    MissingKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment,
    /// `well_formed` is false when non-comment text follows the closing bracket.
    SectionHeader { name: &'a str, well_formed: bool },
    KeyValue { key: &'a str, value: &'a str },
    /// `key` is `None` for a bare `+=value` line.
    KeyAppend { key: Option<&'a str>, value: &'a str },
    BareValue { value: &'a str },
    Malformed(MalformedLine),
}

/// One classified line together with what it contributes to the enclosing section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine<'a> {
    pub kind: LineKind<'a>,
    /// Values this line adds to the current section's registration list. Empty unless the
    /// current section is a registration section.
    pub register_values: Vec<&'a str>,
}

impl<'a> ScannedLine<'a> {
    /// The key under which references from this line are recorded.
    pub fn reference_key(&self) -> Option<&'a str> {
        match self.kind {
            LineKind::KeyValue { key, .. } => Some(key),
            LineKind::KeyAppend { key, .. } => Some(key.unwrap_or(APPEND_KEY)),
            _ => None,
        }
    }

    /// The raw value (comment stripped, trimmed) of an assignment line.
    pub fn raw_value(&self) -> Option<&'a str> {
        match self.kind {
            LineKind::KeyValue { value, .. } | LineKind::KeyAppend { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Value tokens of an assignment line that could name a section.
    pub fn reference_candidates(&self) -> Vec<&'a str> {
        self.raw_value()
            .map(|value| {
                split_value_tokens(value)
                    .filter(|token| is_reference_candidate(token))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineScanner {
    predicate: RegisterPredicate,
}

impl LineScanner {
    pub fn new(predicate: RegisterPredicate) -> Self {
        LineScanner { predicate }
    }

    /// Shared scanner using the default registration predicate.
    pub fn shared() -> &'static LineScanner {
        &DEFAULT_SCANNER
    }

    pub fn predicate(&self) -> &RegisterPredicate {
        &self.predicate
    }

    pub fn is_register_section(&self, section: &str) -> bool {
        self.predicate.is_register_section(section)
    }

    pub fn scan<'a>(&self, line: &'a str, current_section: &str) -> ScannedLine<'a> {
        let kind = classify_line(line);
        let register_values = if self.is_register_section(current_section) {
            match kind {
                LineKind::BareValue { value }
                | LineKind::KeyValue { value, .. }
                | LineKind::KeyAppend { value, .. } => split_value_tokens(value).collect(),
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };
        ScannedLine {
            kind,
            register_values,
        }
    }
}

/// Classify a single line without any section context.
pub fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with(';') || trimmed.starts_with('#') || trimmed.starts_with("//") {
        return LineKind::Comment;
    }

    if let Some(inner) = trimmed.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return LineKind::Malformed(MalformedLine::UnclosedSection);
        };
        let name = inner[..close].trim();
        if name.is_empty() {
            return LineKind::Malformed(MalformedLine::EmptySectionName);
        }
        // `//` after the closing bracket is a trailing note, like `;` and `#`.
        let rest = strip_inline_comment(&inner[close + 1..]).trim();
        return LineKind::SectionHeader {
            name,
            well_formed: rest.is_empty() || rest.starts_with("//"),
        };
    }

    let content = strip_inline_comment(trimmed).trim_end();
    if content.is_empty() {
        return LineKind::Comment;
    }

    match find_separator(content) {
        None => LineKind::BareValue { value: content },
        Some(0) => LineKind::Malformed(MalformedLine::MissingKey),
        Some(eq) => {
            let value = content[eq + 1..].trim();
            if content.as_bytes()[eq - 1] == b'+' {
                let key = content[..eq - 1].trim();
                LineKind::KeyAppend {
                    key: (!key.is_empty()).then_some(key),
                    value,
                }
            } else {
                LineKind::KeyValue {
                    key: content[..eq].trim(),
                    value,
                }
            }
        }
    }
}

/// Cut `text` at the first `;` or `#` that is not inside double quotes.
pub fn strip_inline_comment(text: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' | '#' if !in_quotes => return &text[..idx],
            _ => {}
        }
    }
    text
}

/// Byte offset of the first `=` not preceded by a backslash.
fn find_separator(content: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    bytes
        .iter()
        .enumerate()
        .find(|(idx, b)| **b == b'=' && (*idx == 0 || bytes[idx - 1] != b'\\'))
        .map(|(idx, _)| idx)
}

/// Split a raw value on commas into trimmed, non-empty tokens.
pub fn split_value_tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|token| !token.is_empty())
}

/// Tokens with whitespace or made only of digits are never section names.
pub fn is_reference_candidate(token: &str) -> bool {
    !token.is_empty()
        && !token.chars().any(char::is_whitespace)
        && !token.chars().all(|c| c.is_ascii_digit())
}
