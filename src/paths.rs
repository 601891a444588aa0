//! Workspace file selection: the candidate glob, exclusion globs, the file-name whitelist and
//! the per-file size ceiling.

use crate::{config::IndexConfig, error::IniError};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

/// Render a path with `/` separators regardless of platform.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::RootDir | Component::CurDir => None,
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy()),
            _ => Some(c.as_os_str().to_string_lossy()),
        })
        .collect::<Vec<Cow<'_, str>>>()
        .join("/")
}

/// Compile path globs (`**`, `*`, `?`, `[...]`, `{a,b}`) into one set over `/`-separated
/// relative paths. `*` does not cross a separator; matching is case-insensitive.
pub fn compile_globs<I, S>(globs: I) -> Result<GlobSet, IniError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(
            GlobBuilder::new(glob.as_ref())
                .case_insensitive(true)
                .literal_separator(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone)]
pub struct FileFilter {
    pattern: GlobSet,
    excludes: GlobSet,
    whitelist: GlobSet,
    max_file_size: u64,
}

impl FileFilter {
    pub fn from_config(config: &IndexConfig) -> Result<FileFilter, IniError> {
        Ok(FileFilter {
            pattern: compile_globs([&config.file_pattern])?,
            excludes: compile_globs(&config.exclude_patterns)?,
            whitelist: compile_globs(&config.related_files)?,
            max_file_size: config.max_file_size_bytes(),
        })
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// True when `relative` matches the candidate glob and no exclusion glob.
    pub fn matches_pattern(&self, relative: &Path) -> bool {
        let rel = os_path_to_string(relative);
        self.pattern.is_match(&rel) && !self.excludes.is_match(&rel)
    }

    /// Whitelist entries match the file name alone. An empty whitelist admits every file.
    pub fn is_whitelisted(&self, path: &Path) -> bool {
        if self.whitelist.is_empty() {
            return true;
        }
        path.file_name()
            .is_some_and(|name| self.whitelist.is_match(name.to_string_lossy().as_ref()))
    }

    /// Full filter for a path under `root`: candidate glob, exclusions and whitelist.
    pub fn accepts(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.matches_pattern(relative) && self.is_whitelisted(path)
    }

    /// Candidate files under `root` that pass [`FileFilter::matches_pattern`], sorted. Hidden
    /// directories are not entered. The whitelist is not applied here.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        fn is_hidden(entry: &DirEntry) -> bool {
            entry
                .file_name()
                .to_str()
                .map(|s| s.starts_with('.'))
                .unwrap_or(false)
        }
        let mut files = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e) || e.path() == root)
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!("[FileFilter] skipping unreadable entry: {err}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
            .filter(|p| self.matches_pattern(p.strip_prefix(root).unwrap_or(p)))
            .collect::<Vec<PathBuf>>();
        files.sort_by(|a, b| a.components().cmp(b.components()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn glob_matches_nested_paths() {
        let set = compile_globs(["**/*.ini"]).unwrap();
        assert!(set.is_match("rulesmd.ini"));
        assert!(set.is_match("mod/sub/artmd.INI"));
        assert!(!set.is_match("rulesmd.ini.bak"));

        let ex = compile_globs(["**/node_modules/**"]).unwrap();
        assert!(ex.is_match("node_modules/x/rules.ini"));
        assert!(ex.is_match("a/node_modules/rules.ini"));
        assert!(!ex.is_match("a/modules/rules.ini"));
    }

    #[test]
    fn brace_and_class_patterns_select_every_alternative() {
        let set = compile_globs(["**/*.{ini,map}"]).unwrap();
        assert!(set.is_match("rulesmd.ini"));
        assert!(set.is_match("maps/tour.MAP"));
        assert!(!set.is_match("maps/tour.mpr"));

        let class = compile_globs(["rules[0-9].ini"]).unwrap();
        assert!(class.is_match("rules1.ini"));
        assert!(!class.is_match("rulesx.ini"));
        assert!(!class.is_match("mod/rules1.ini"));
    }

    #[test]
    fn whitelist_wildcards_are_case_insensitive() {
        let set = compile_globs(["art*.ini", "rules(md).ini"]).unwrap();
        assert!(set.is_match("ARTMD.ini"));
        assert!(set.is_match("art.ini"));
        assert!(!set.is_match("xart.ini"));
        assert!(set.is_match("rules(md).ini"));
    }

    #[test]
    fn discover_honors_brace_patterns() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("maps")).unwrap();
        fs::write(root.join("rulesmd.ini"), "").unwrap();
        fs::write(root.join("maps/tour.map"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let config = IndexConfig {
            file_pattern: "**/*.{ini,map}".to_string(),
            related_files: Vec::new(),
            ..IndexConfig::default()
        };
        let filter = FileFilter::from_config(&config).unwrap();
        assert_eq!(
            filter.discover(root),
            vec![root.join("maps/tour.map"), root.join("rulesmd.ini")]
        );
    }

    #[test]
    fn discover_skips_hidden_and_excluded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("node_modules")).unwrap();
        fs::create_dir_all(root.join("mod")).unwrap();
        fs::write(root.join(".git/rules.ini"), "").unwrap();
        fs::write(root.join("node_modules/rules.ini"), "").unwrap();
        fs::write(root.join("mod/rulesmd.ini"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::write(root.join("custom.ini"), "").unwrap();

        let filter = FileFilter::from_config(&IndexConfig::default()).unwrap();
        let found = filter.discover(root);
        assert_eq!(found, vec![root.join("custom.ini"), root.join("mod/rulesmd.ini")]);
        assert!(!filter.accepts(root, &root.join("custom.ini")));
        assert!(filter.accepts(root, &root.join("mod/rulesmd.ini")));

        let open = IndexConfig {
            related_files: Vec::new(),
            ..IndexConfig::default()
        };
        let filter = FileFilter::from_config(&open).unwrap();
        assert!(filter.accepts(root, &root.join("custom.ini")));
        assert!(!filter.accepts(root, &root.join("notes.txt")));
    }
}
