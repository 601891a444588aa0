//! Repairs for broken section headers: full-width brackets, a missing `]`, and stray `]` lines.
//! Columns are counted in chars.

use serde::{Deserialize, Serialize};

/// Lines looked at around an unclosed header.
const LOOKAROUND: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixKind {
    FullWidthBrackets,
    MissingCloseBracket,
    StrayCloseBracket,
    SplitHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatFix {
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub new_text: String,
    pub kind: FixKind,
}

impl FormatFix {
    pub fn description(&self) -> String {
        match self.kind {
            FixKind::FullWidthBrackets => "replace full-width brackets".to_string(),
            FixKind::MissingCloseBracket => "add missing closing bracket".to_string(),
            FixKind::StrayCloseBracket => "remove stray closing bracket".to_string(),
            FixKind::SplitHeader => format!("repair section header {}", self.new_text),
        }
    }
}

fn char_col(line: &str, byte: usize) -> usize {
    line[..byte].chars().count()
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with(';') || trimmed.starts_with('#')
}

pub fn analyze_format(text: &str) -> Vec<FormatFix> {
    let lines: Vec<&str> = text.lines().collect();
    let mut fixes = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with('【') {
            if let (Some(open), Some(close)) = (line.find('【'), line.find('】')) {
                if close > open {
                    let name = &line[open + '【'.len_utf8()..close];
                    fixes.push(FormatFix {
                        line: i,
                        start: char_col(line, open),
                        end: char_col(line, close) + 1,
                        new_text: format!("[{name}]"),
                        kind: FixKind::FullWidthBrackets,
                    });
                }
            }
            continue;
        }

        if trimmed.starts_with('[') && !trimmed.contains(']') {
            if unclosed_header_has_body(&lines, i) {
                let end = line.chars().count();
                fixes.push(FormatFix {
                    line: i,
                    start: end,
                    end,
                    new_text: "]".to_string(),
                    kind: FixKind::MissingCloseBracket,
                });
            }
            continue;
        }

        if trimmed.ends_with(']') && !trimmed.starts_with('[') {
            if trimmed == "]" {
                fixes.push(FormatFix {
                    line: i,
                    start: 0,
                    end: line.chars().count(),
                    new_text: String::new(),
                    kind: FixKind::StrayCloseBracket,
                });
            } else if let Some(name) = trimmed.strip_suffix(']') {
                let single_token = !name.is_empty() && !name.chars().any(char::is_whitespace);
                if single_token && !name.contains(']') && follows_unclosed_header(&lines, i) {
                    fixes.push(FormatFix {
                        line: i,
                        start: 0,
                        end: line.chars().count(),
                        new_text: format!("[{name}]"),
                        kind: FixKind::SplitHeader,
                    });
                }
            }
        }
    }
    fixes
}

/// Fixes whose lines fall inside `first..=last`.
pub fn analyze_format_range(text: &str, first: usize, last: usize) -> Vec<FormatFix> {
    analyze_format(text)
        .into_iter()
        .filter(|fix| fix.line >= first && fix.line <= last)
        .collect()
}

/// An unclosed `[Name` counts as a header when an assignment follows before the next header,
/// skipping blanks and comments.
fn unclosed_header_has_body(lines: &[&str], i: usize) -> bool {
    for next in lines.iter().skip(i + 1).take(LOOKAROUND - 1) {
        let trimmed = next.trim();
        if trimmed.starts_with('[') || trimmed.starts_with('【') {
            return false;
        }
        if trimmed.is_empty() || is_comment(trimmed) {
            continue;
        }
        return trimmed.contains('=');
    }
    false
}

fn follows_unclosed_header(lines: &[&str], i: usize) -> bool {
    let from = i.saturating_sub(LOOKAROUND);
    for prev in lines[from..i].iter().rev() {
        let trimmed = prev.trim();
        if trimmed.starts_with('[') {
            return !trimmed.contains(']');
        }
    }
    false
}

/// Apply non-overlapping fixes and return the new text. Line endings are normalized to `\n`.
pub fn apply_fixes(text: &str, fixes: &[FormatFix]) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut ordered: Vec<&FormatFix> = fixes.iter().collect();
    ordered.sort_by(|a, b| (b.line, b.start).cmp(&(a.line, a.start)));
    for fix in ordered {
        let Some(line) = lines.get_mut(fix.line) else {
            continue;
        };
        let chars: Vec<char> = line.chars().collect();
        let start = fix.start.min(chars.len());
        let end = fix.end.clamp(start, chars.len());
        let mut updated: String = chars[..start].iter().collect();
        updated.push_str(&fix.new_text);
        updated.extend(&chars[end..]);
        *line = updated;
    }
    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    out
}
