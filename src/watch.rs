//! # Watch Service
//!
//! [`WatchService`] keeps an [`IndexManager`] in step with the filesystem. It watches the
//! manager's root recursively, debounces bursts of notifications, re-indexes created or
//! modified files that pass the manager's [`FileFilter`](crate::paths::FileFilter), and evicts
//! removed files.
//!
//! The index layer itself never debounces; this service is the throttle.
//!
//! ```rust,no_run
//! use ra2_ini_core::{config::IndexConfig, watch::WatchService, workspace::IndexManager};
//! use std::{sync::Arc, time::Duration};
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let manager = Arc::new(IndexManager::new("/path/to/mod", IndexConfig::default())?);
//! runtime.block_on(manager.index_workspace());
//!
//! let _service = WatchService::new(manager.clone(), runtime.handle().clone(), Duration::from_millis(500))?;
//! let mut events = manager.subscribe();
//! runtime.block_on(async {
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!     }
//! });
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Threading Model
//!
//! The debouncer callback runs on the watcher thread owned by `notify-debouncer-full`.
//! Removals are applied directly on that thread. Re-indexing needs file I/O, so it is spawned
//! onto the tokio runtime behind the supplied [`Handle`]. Two re-indexes of the same path can
//! race; the last one to commit wins, and each commit replaces the whole file entry.

use crate::{error::IniError, workspace::IndexManager};
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::runtime::Handle;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

type WorkspaceWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

pub struct WatchService {
    debouncer: WorkspaceWatcher,
    root: PathBuf,
}

impl WatchService {
    pub fn new(
        manager: Arc<IndexManager>,
        runtime: Handle,
        debounce: Duration,
    ) -> Result<WatchService, IniError> {
        let root = manager.root().to_path_buf();
        let callback_manager = manager.clone();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut reindex: Vec<PathBuf> = Vec::new();
                    for event in events.iter() {
                        match event.event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) => {
                                reindex.extend(
                                    event
                                        .paths
                                        .iter()
                                        .filter(|p| should_reindex(&callback_manager, p))
                                        .cloned(),
                                );
                            }
                            EventKind::Remove(_) => {
                                for path in &event.paths {
                                    if let Some(removed) = callback_manager.remove_file(path) {
                                        tracing::info!("[WatchService] {removed}");
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    reindex.sort();
                    reindex.dedup();
                    if !reindex.is_empty() {
                        tracing::info!("[WatchService] {} files to re-index", reindex.len());
                    }
                    for path in reindex {
                        let manager = callback_manager.clone();
                        runtime.spawn(async move {
                            if !path.exists() {
                                manager.remove_file(&path);
                                return;
                            }
                            manager.index_file(&path).await;
                        });
                    }
                }
                Err(errors) => {
                    tracing::error!("Notify debouncer returned errors: {:?}", errors);
                }
            }
        })?;
        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("[WatchService] watching {}", root.display());
        Ok(WatchService { debouncer, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching. Work already spawned still completes.
    pub fn stop(mut self) -> Result<(), IniError> {
        let unwatch_res = self.debouncer.watcher().unwatch(&self.root);
        tracing::debug!("Unwatch_res(path: {:?}) = {:?}", self.root, unwatch_res);
        Ok(unwatch_res?)
    }
}

fn should_reindex(manager: &IndexManager, path: &Path) -> bool {
    let is_hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !is_hidden && (manager.filter().accepts(manager.root(), path) || manager.is_indexed(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use tempfile::TempDir;

    #[test]
    fn reindex_filter_respects_whitelist_and_known_files() {
        let dir = TempDir::new().unwrap();
        let manager = IndexManager::new(dir.path(), IndexConfig::default()).unwrap();
        assert!(should_reindex(&manager, &dir.path().join("rulesmd.ini")));
        assert!(!should_reindex(&manager, &dir.path().join("notes.ini")));
        assert!(!should_reindex(&manager, &dir.path().join(".rulesmd.ini")));

        let custom = dir.path().join("custom.ini");
        manager.index_content(&custom, "[A]\n");
        assert!(should_reindex(&manager, &custom));
    }
}
