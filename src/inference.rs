//! Structural type inference over the workspace index.
//!
//! A section's type is decided by two signals, checked against the dictionary's type mapping
//! in declaration order:
//!
//! 1. registration: the section is listed in one of the type's registration sections;
//! 2. reverse reference: some key that references the section is one of the type's keys.
//!
//! Rule 1 is tried for every type before rule 2 is tried for any type, so a registered section
//! is never classified by how it happens to be referenced.
//!
//! Results are memoized together with the exact set of section names and files consulted while
//! computing them. The engine listens to the [`IndexManager`] and evicts an entry as soon as an
//! event lists one of its sections as changed. Caching never changes answers: with caching off
//! every call recomputes from the index.

use crate::{
    dictionary::Dictionary,
    event::{IndexEvent, IndexEventKind, ListenerId},
    workspace::IndexManager,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    hash::Hash,
    path::{Path, PathBuf},
    sync::Arc,
};

/// What a cached answer was computed from. Section names are stored lower-cased so invalidation
/// is at least as broad as the case-insensitive reference fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub sections: BTreeSet<String>,
    pub files: BTreeSet<PathBuf>,
}

impl Dependencies {
    pub fn add_section(&mut self, name: &str) {
        self.sections.insert(name.to_lowercase());
    }

    pub fn add_file(&mut self, path: &Path) {
        self.files.insert(path.to_path_buf());
    }

    pub fn merge(&mut self, other: &Dependencies) {
        self.sections.extend(other.sections.iter().cloned());
        self.files.extend(other.files.iter().cloned());
    }

    fn touched_by(&self, changed: &HashSet<String>, deleted_file: Option<&Path>) -> bool {
        self.sections.iter().any(|s| changed.contains(s))
            || deleted_file.is_some_and(|file| self.files.contains(file))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Index version when the computation started.
    pub global_version: u64,
    pub deps: Dependencies,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionTypeKey {
    pub section: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyTypeKey {
    pub section: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationKey {
    pub key: String,
    pub section: String,
    pub value: Option<String>,
}

#[derive(Debug)]
struct CacheTable<K> {
    entries: HashMap<K, CacheEntry<Option<String>>>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl<K> Default for CacheTable<K> {
    fn default() -> Self {
        CacheTable {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            invalidations: 0,
        }
    }
}

impl<K: Eq + Hash> CacheTable<K> {
    fn lookup(&mut self, key: &K) -> Option<CacheEntry<Option<String>>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn invalidate(&mut self, changed: &HashSet<String>, deleted_file: Option<&Path>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.deps.touched_by(changed, deleted_file));
        let evicted = before - self.entries.len();
        self.invalidations += evicted as u64;
        evicted
    }

    fn clear(&mut self) -> usize {
        let evicted = self.entries.len();
        self.entries.clear();
        self.invalidations += evicted as u64;
        evicted
    }

    fn stats(&self) -> TableStats {
        TableStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub section_types: TableStats,
    pub key_types: TableStats,
    pub translations: TableStats,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.section_types.hits + self.key_types.hits + self.translations.hits
    }

    pub fn misses(&self) -> u64 {
        self.section_types.misses + self.key_types.misses + self.translations.misses
    }

    pub fn invalidations(&self) -> u64 {
        self.section_types.invalidations
            + self.key_types.invalidations
            + self.translations.invalidations
    }

    pub fn entries(&self) -> usize {
        self.section_types.entries + self.key_types.entries + self.translations.entries
    }
}

#[derive(Debug, Default)]
struct InferenceCaches {
    section_types: CacheTable<SectionTypeKey>,
    key_types: CacheTable<KeyTypeKey>,
    translations: CacheTable<TranslationKey>,
}

impl InferenceCaches {
    fn invalidate(&mut self, event: &IndexEvent) {
        let evicted = match event.kind {
            IndexEventKind::IndexCleared => {
                self.section_types.clear() + self.key_types.clear() + self.translations.clear()
            }
            IndexEventKind::FileUpdated | IndexEventKind::FileDeleted => {
                if event.changed_sections.is_empty() && event.kind == IndexEventKind::FileUpdated
                {
                    return;
                }
                let changed: HashSet<String> = event
                    .changed_sections
                    .iter()
                    .map(|s| s.to_lowercase())
                    .collect();
                let deleted = match event.kind {
                    IndexEventKind::FileDeleted => event.file_path.as_deref(),
                    _ => None,
                };
                self.section_types.invalidate(&changed, deleted)
                    + self.key_types.invalidate(&changed, deleted)
                    + self.translations.invalidate(&changed, deleted)
            }
        };
        if evicted > 0 {
            tracing::debug!("[TypeInference] {event} evicted {evicted} cache entries");
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            section_types: self.section_types.stats(),
            key_types: self.key_types.stats(),
            translations: self.translations.stats(),
        }
    }
}

/// Selects one of the three tables. Plain function pointers keep the borrow of the caches
/// local to each call.
type TableSelector<K> = fn(&mut InferenceCaches) -> &mut CacheTable<K>;

pub struct TypeInference {
    dictionary: Arc<Dictionary>,
    index: Arc<IndexManager>,
    caches: Arc<Mutex<InferenceCaches>>,
    caching: bool,
    listener: ListenerId,
}

impl std::fmt::Debug for TypeInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInference")
            .field("types", &self.dictionary.type_mapping.len())
            .field("caching", &self.caching)
            .field("stats", &self.cache_stats())
            .finish()
    }
}

impl Drop for TypeInference {
    fn drop(&mut self) {
        self.index.remove_listener(self.listener);
    }
}

impl TypeInference {
    /// Caching follows the manager's `cache.enabled` setting.
    pub fn new(dictionary: Arc<Dictionary>, index: Arc<IndexManager>) -> TypeInference {
        let caching = index.config().cache.enabled;
        TypeInference::with_caching(dictionary, index, caching)
    }

    pub fn with_caching(
        dictionary: Arc<Dictionary>,
        index: Arc<IndexManager>,
        caching: bool,
    ) -> TypeInference {
        let caches = Arc::new(Mutex::new(InferenceCaches::default()));
        let weak = Arc::downgrade(&caches);
        let listener = index.on_index_change(move |event| {
            if let Some(caches) = weak.upgrade() {
                caches.lock().invalidate(event);
            }
        });
        TypeInference {
            dictionary,
            index,
            caches,
            caching,
            listener,
        }
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    pub fn is_caching(&self) -> bool {
        self.caching
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.caches.lock().stats()
    }

    pub fn clear_caches(&self) {
        let mut caches = self.caches.lock();
        caches.section_types.clear();
        caches.key_types.clear();
        caches.translations.clear();
    }

    pub fn infer_section_type(&self, section: &str) -> Option<String> {
        self.section_type_tracked(section, None, &mut Dependencies::default())
    }

    /// Same result as [`TypeInference::infer_section_type`]; `file` only scopes the cache entry.
    pub fn infer_section_type_in(&self, section: &str, file: &Path) -> Option<String> {
        self.section_type_tracked(section, Some(file), &mut Dependencies::default())
    }

    /// Sections and files the answer for `section` depends on.
    pub fn section_type_dependencies(&self, section: &str) -> Dependencies {
        let mut deps = Dependencies::default();
        self.compute_section_type(section, &mut deps);
        deps
    }

    /// Type of the section a `key = ...` line points at.
    ///
    /// Inside a typed section a `referToKeys` entry wins, then the first type declaring `key`.
    pub fn infer_type_by_reference_key(
        &self,
        key: &str,
        current_section: Option<&str>,
    ) -> Option<String> {
        match current_section {
            Some(section) => self.get_key_actual_type(section, key),
            None => self.dictionary.type_declaring_key(key).map(str::to_string),
        }
    }

    /// Type the values of `key` have when written inside `section`.
    pub fn get_key_actual_type(&self, section: &str, key: &str) -> Option<String> {
        let cache_key = KeyTypeKey {
            section: section.to_string(),
            key: key.to_string(),
        };
        self.memoized(
            |c| &mut c.key_types,
            cache_key,
            &mut Dependencies::default(),
            |deps| {
                let section_type = self.section_type_tracked(section, None, deps);
                section_type
                    .as_deref()
                    .and_then(|t| self.dictionary.refer_to(t, key))
                    .or_else(|| self.dictionary.type_declaring_key(key))
                    .map(str::to_string)
            },
        )
    }

    /// Description of `key` as written in `section`, with `key_value` being its value when
    /// known.
    pub fn get_translation_with_type(
        &self,
        key: &str,
        section: &str,
        key_value: Option<&str>,
    ) -> Option<String> {
        let key_value = key_value.map(str::trim).filter(|v| !v.is_empty());
        let cache_key = TranslationKey {
            key: key.to_string(),
            section: section.to_string(),
            value: key_value.map(str::to_string),
        };
        self.memoized(
            |c| &mut c.translations,
            cache_key,
            &mut Dependencies::default(),
            |deps| {
                let section_type = self.section_type_tracked(section, None, deps);
                if let Some(text) = section_type
                    .as_deref()
                    .and_then(|t| self.dictionary.type_translation(t, key))
                {
                    return Some(text.to_string());
                }
                if let (Some(t), Some(value)) = (section_type.as_deref(), key_value) {
                    if let Some(declared) = self.dictionary.refer_to(t, key) {
                        let target = self
                            .section_type_tracked(value, None, deps)
                            .unwrap_or_else(|| declared.to_string());
                        if let Some(text) = self.dictionary.type_translation(&target, key) {
                            return Some(text.to_string());
                        }
                    }
                }
                self.dictionary.common.get(key).cloned()
            },
        )
    }

    fn section_type_tracked(
        &self,
        section: &str,
        file: Option<&Path>,
        deps: &mut Dependencies,
    ) -> Option<String> {
        let cache_key = SectionTypeKey {
            section: section.to_string(),
            file: file.map(Path::to_path_buf),
        };
        self.memoized(|c| &mut c.section_types, cache_key, deps, |local| {
            self.compute_section_type(section, local)
        })
    }

    fn compute_section_type(&self, section: &str, deps: &mut Dependencies) -> Option<String> {
        for (type_name, mapping) in &self.dictionary.type_mapping {
            for register in &mapping.registers {
                deps.add_section(register);
                for (file, values) in self.index.registered_values_by_file(register) {
                    deps.add_file(&file);
                    if values.iter().any(|value| value == section) {
                        return Some(type_name.clone());
                    }
                }
            }
        }

        deps.add_section(section);
        let references = self.index.find_section_references(section);
        for reference in &references {
            deps.add_file(&reference.file);
        }
        self.dictionary
            .type_mapping
            .iter()
            .find(|(_, mapping)| {
                references
                    .iter()
                    .any(|reference| mapping.keys.contains(&reference.key))
            })
            .map(|(type_name, _)| type_name.clone())
    }

    /// Look `key` up in the selected table, computing and storing it on a miss. The entry's
    /// dependencies are merged into `deps` either way so enclosing computations inherit them.
    fn memoized<K, F>(
        &self,
        select: TableSelector<K>,
        key: K,
        deps: &mut Dependencies,
        compute: F,
    ) -> Option<String>
    where
        K: Eq + Hash,
        F: FnOnce(&mut Dependencies) -> Option<String>,
    {
        if !self.caching {
            return compute(deps);
        }
        if let Some(entry) = select(&mut self.caches.lock()).lookup(&key) {
            deps.merge(&entry.deps);
            return entry.value;
        }

        let started_at = self.index.global_version();
        let mut local = Dependencies::default();
        let value = compute(&mut local);
        deps.merge(&local);

        let mut caches = self.caches.lock();
        // An index change during the computation may already have been delivered, so the
        // result could be stale and must not be stored.
        if self.index.global_version() == started_at {
            select(&mut caches).entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    global_version: started_at,
                    deps: local,
                },
            );
        }
        value
    }
}
