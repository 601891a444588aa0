//! The workspace-wide index.
//!
//! [`IndexManager`] owns one [`FileIndex`] per indexed file and three version counters: a global
//! version, a per-file version and a per-section version. Every successful mutation computes the
//! structural [`FileIndexDiff`](crate::file_index::FileIndexDiff) against the previous entry,
//! bumps versions only when that diff is non-empty, and emits one [`IndexEvent`] after the state
//! lock is released. Listeners therefore observe the new state and may query the manager.
//!
//! Definition lookups are exact. Reference lookups are exact first and fall back to a
//! case-insensitive scan only when the exact lookup finds nothing.

use crate::{
    config::IndexConfig,
    error::IniError,
    event::{EventBus, IndexEvent, IndexEventKind, ListenerId},
    file_index::{FileIndex, Reference, SectionInfo},
    paths::FileFilter,
    scanner::LineScanner,
};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::UnboundedReceiver;

/// A reference together with the file it occurs in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionReference {
    pub file: PathBuf,
    pub line: usize,
    pub key: String,
    pub value: String,
    pub section: String,
}

impl SectionReference {
    fn new(file: &Path, reference: &Reference) -> SectionReference {
        SectionReference {
            file: file.to_path_buf(),
            line: reference.line,
            key: reference.key.clone(),
            value: reference.value.clone(),
            section: reference.section.clone(),
        }
    }
}

/// Outcome of one [`IndexManager::index_workspace`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    /// Files matching the candidate glob.
    pub discovered: usize,
    /// Files left after the whitelist, plus open documents.
    pub selected: usize,
    pub indexed: usize,
    pub failed: usize,
    /// Previously indexed files that are gone or no longer selected.
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    files: BTreeMap<PathBuf, FileIndex>,
    global_version: u64,
    file_versions: HashMap<PathBuf, u64>,
    section_versions: HashMap<String, u64>,
}

struct IndexingGuard<'a>(&'a AtomicBool);

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct IndexManager {
    root: PathBuf,
    config: IndexConfig,
    filter: FileFilter,
    scanner: LineScanner,
    state: RwLock<IndexState>,
    /// Unsaved editor text, preferred over disk contents.
    open_documents: RwLock<BTreeMap<PathBuf, String>>,
    indexing: AtomicBool,
    events: Arc<EventBus>,
}

impl IndexManager {
    pub fn new<P: Into<PathBuf>>(root: P, config: IndexConfig) -> Result<IndexManager, IniError> {
        config.validate()?;
        Ok(IndexManager {
            root: root.into(),
            filter: FileFilter::from_config(&config)?,
            scanner: LineScanner::new(config.register_predicate()),
            config,
            state: RwLock::new(IndexState::default()),
            open_documents: RwLock::new(BTreeMap::new()),
            indexing: AtomicBool::new(false),
            events: Arc::new(EventBus::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    pub fn scanner(&self) -> &LineScanner {
        &self.scanner
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn on_index_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&IndexEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn subscribe(&self) -> UnboundedReceiver<IndexEvent> {
        self.events.subscribe_channel()
    }

    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::Acquire)
    }

    /// Re-index one file from disk, or from its open-document text when it has one.
    ///
    /// Unreadable or oversized files leave the previous entry untouched and emit nothing.
    pub async fn index_file(&self, path: &Path) -> Option<IndexEvent> {
        let overlay = self.overlay_text(path);
        match load_file_index(path, overlay, self.filter.max_file_size(), &self.scanner).await {
            Ok(index) => Some(self.commit(path, index)),
            Err(e) => {
                tracing::warn!("[IndexManager] could not index {}: {e}", path.display());
                None
            }
        }
    }

    /// Index `text` as the contents of `path` without touching the filesystem.
    pub fn index_content(&self, path: &Path, text: &str) -> IndexEvent {
        let index = FileIndex::build_with(&self.scanner, text, path);
        self.commit(path, index)
    }

    /// Register unsaved editor text for `path` and index it.
    pub fn open_document(&self, path: &Path, text: &str) -> IndexEvent {
        self.open_documents
            .write()
            .insert(path.to_path_buf(), text.to_string());
        self.index_content(path, text)
    }

    pub fn update_document(&self, path: &Path, text: &str) -> IndexEvent {
        self.open_document(path, text)
    }

    /// Forget the editor text for `path`. The index entry stays until the file is re-indexed
    /// from disk or removed; a later [`IndexManager::index_workspace`] evicts it when the file
    /// no longer passes the filter.
    pub fn close_document(&self, path: &Path) -> bool {
        self.open_documents.write().remove(path).is_some()
    }

    pub fn open_documents(&self) -> Vec<PathBuf> {
        self.open_documents.read().keys().cloned().collect()
    }

    fn overlay_text(&self, path: &Path) -> Option<String> {
        self.open_documents.read().get(path).cloned()
    }

    /// Index every whitelisted candidate under the root plus every open document, in batches.
    /// Indexed files outside that selection are evicted first.
    /// Returns `None` without doing anything if another run is already in progress.
    #[tracing::instrument(skip_all)]
    pub async fn index_workspace(&self) -> Option<WorkspaceSummary> {
        if self
            .indexing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("[IndexManager] workspace indexing already in progress, skipping");
            return None;
        }
        let _guard = IndexingGuard(&self.indexing);

        let discovered = self.filter.discover(&self.root);
        let mut selected: BTreeSet<PathBuf> = discovered
            .iter()
            .filter(|p| self.filter.is_whitelisted(p))
            .cloned()
            .collect();
        selected.extend(self.open_documents());

        let stale: Vec<PathBuf> = self
            .indexed_files()
            .into_iter()
            .filter(|path| !selected.contains(path))
            .collect();
        for path in &stale {
            tracing::debug!("[IndexManager] {} left the workspace, evicting", path.display());
            self.remove_file(path);
        }
        let selected: Vec<PathBuf> = selected.into_iter().collect();

        let mut summary = WorkspaceSummary {
            discovered: discovered.len(),
            selected: selected.len(),
            evicted: stale.len(),
            ..WorkspaceSummary::default()
        };
        tracing::info!(
            "[IndexManager] indexing {} of {} candidate files under {}",
            summary.selected,
            summary.discovered,
            self.root.display()
        );

        let max_size = self.filter.max_file_size();
        for batch in selected.chunks(self.config.effective_batch_size()) {
            let loads = batch.iter().map(|path| {
                let overlay = self.overlay_text(path);
                load_file_index(path, overlay, max_size, &self.scanner)
            });
            let results = join_all(loads).await;
            for (path, result) in batch.iter().zip(results) {
                match result {
                    Ok(index) => {
                        self.commit(path, index);
                        summary.indexed += 1;
                    }
                    Err(e) => {
                        tracing::warn!("[IndexManager] skipping {}: {e}", path.display());
                        summary.failed += 1;
                    }
                }
            }
        }
        tracing::info!(
            "[IndexManager] workspace indexed: {} files, {} skipped, {} evicted, global version {}",
            summary.indexed,
            summary.failed,
            summary.evicted,
            self.global_version()
        );
        Some(summary)
    }

    /// Evict `path`. Returns `None` when the file was not indexed.
    pub fn remove_file(&self, path: &Path) -> Option<IndexEvent> {
        let event = {
            let mut state = self.state.write();
            let old = state.files.remove(path)?;
            let changed = old.diff(&FileIndex::default()).changed_sections();
            state.global_version += 1;
            let version = state.global_version;
            for name in &changed {
                state.section_versions.insert(name.clone(), version);
            }
            state.file_versions.remove(path);
            IndexEvent {
                kind: IndexEventKind::FileDeleted,
                file_path: Some(path.to_path_buf()),
                changed_sections: changed,
                global_version: version,
            }
        };
        self.open_documents.write().remove(path);
        tracing::debug!("[IndexManager] {event}");
        self.events.emit(&event);
        Some(event)
    }

    /// Drop every entry. The event lists every section name that was indexed.
    pub fn clear(&self) -> IndexEvent {
        let event = {
            let mut state = self.state.write();
            let mut names = BTreeSet::new();
            for index in state.files.values() {
                names.extend(index.diff(&FileIndex::default()).changed_sections());
            }
            state.files.clear();
            state.file_versions.clear();
            state.section_versions.clear();
            state.global_version += 1;
            IndexEvent {
                kind: IndexEventKind::IndexCleared,
                file_path: None,
                changed_sections: names.into_iter().collect(),
                global_version: state.global_version,
            }
        };
        tracing::info!("[IndexManager] {event}");
        self.events.emit(&event);
        event
    }

    fn commit(&self, path: &Path, index: FileIndex) -> IndexEvent {
        let event = {
            let mut state = self.state.write();
            let (diff, is_new) = match state.files.get(path) {
                Some(old) => (old.diff(&index), false),
                None => (FileIndex::default().diff(&index), true),
            };
            let changed = diff.changed_sections();
            if !changed.is_empty() {
                state.global_version += 1;
                let version = state.global_version;
                for name in &changed {
                    state.section_versions.insert(name.clone(), version);
                }
                state.file_versions.insert(path.to_path_buf(), version);
            } else if is_new {
                let version = state.global_version;
                state.file_versions.insert(path.to_path_buf(), version);
            }
            state.files.insert(path.to_path_buf(), index);
            IndexEvent {
                kind: IndexEventKind::FileUpdated,
                file_path: Some(path.to_path_buf()),
                changed_sections: changed,
                global_version: state.global_version,
            }
        };
        tracing::debug!("[IndexManager] {event}");
        self.events.emit(&event);
        event
    }

    pub fn global_version(&self) -> u64 {
        self.state.read().global_version
    }

    pub fn file_version(&self, path: &Path) -> u64 {
        self.state
            .read()
            .file_versions
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn section_version(&self, name: &str) -> u64 {
        self.state
            .read()
            .section_versions
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn indexed_files(&self) -> Vec<PathBuf> {
        self.state.read().files.keys().cloned().collect()
    }

    pub fn is_indexed(&self, path: &Path) -> bool {
        self.state.read().files.contains_key(path)
    }

    pub fn file_index(&self, path: &Path) -> Option<FileIndex> {
        self.state.read().files.get(path).cloned()
    }

    /// Every header named exactly `name`, ordered by file then line.
    pub fn find_section_definitions(&self, name: &str) -> Vec<SectionInfo> {
        self.state
            .read()
            .files
            .values()
            .filter_map(|index| index.sections.get(name))
            .flatten()
            .cloned()
            .collect()
    }

    /// References to `name`, falling back to a case-insensitive match when there is no exact one.
    pub fn find_section_references(&self, name: &str) -> Vec<SectionReference> {
        let state = self.state.read();
        let exact: Vec<SectionReference> = state
            .files
            .iter()
            .filter_map(|(file, index)| index.references.get(name).map(|refs| (file, refs)))
            .flat_map(|(file, refs)| refs.iter().map(|r| SectionReference::new(file, r)))
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        let lowered = name.to_lowercase();
        let needle = lowered.as_str();
        state
            .files
            .iter()
            .flat_map(|(file, index)| {
                index
                    .references
                    .iter()
                    .filter(move |(token, _)| token.to_lowercase() == needle)
                    .flat_map(move |(_, refs)| {
                        refs.iter().map(move |r| SectionReference::new(file, r))
                    })
            })
            .collect()
    }

    pub fn get_all_sections(&self) -> BTreeSet<String> {
        self.state
            .read()
            .files
            .values()
            .flat_map(|index| index.sections.keys().cloned())
            .collect()
    }

    /// Members of `register` across all files, deduplicated in first-appearance order.
    pub fn get_registered_values(&self, register: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.registered_values_by_file(register)
            .into_iter()
            .flat_map(|(_, values)| values)
            .filter(|value| seen.insert(value.clone()))
            .collect()
    }

    /// Members of `register` per defining file.
    pub fn registered_values_by_file(&self, register: &str) -> Vec<(PathBuf, Vec<String>)> {
        self.state
            .read()
            .files
            .iter()
            .filter_map(|(file, index)| {
                index
                    .registers
                    .get(register)
                    .map(|values| (file.clone(), values.clone()))
            })
            .collect()
    }

    /// Names of every registration section, in any file, that lists `value`.
    pub fn registers_containing(&self, value: &str) -> BTreeSet<String> {
        self.state
            .read()
            .files
            .values()
            .flat_map(|index| index.registers.iter())
            .filter(|(_, values)| values.iter().any(|v| v == value))
            .map(|(register, _)| register.clone())
            .collect()
    }

    pub fn all_register_names(&self) -> BTreeSet<String> {
        self.state
            .read()
            .files
            .values()
            .flat_map(|index| index.registers.keys().cloned())
            .collect()
    }
}

async fn load_file_index(
    path: &Path,
    overlay: Option<String>,
    max_size: u64,
    scanner: &LineScanner,
) -> Result<FileIndex, IniError> {
    if let Some(text) = overlay {
        return Ok(FileIndex::build_with(scanner, &text, path));
    }
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > max_size {
        return Err(IniError::FileTooLarge {
            path: path.display().to_string(),
            size: metadata.len(),
            limit: max_size,
        });
    }
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(FileIndex::build_with(scanner, &text, path)
        .with_metadata(metadata.modified().ok(), metadata.len()))
}
