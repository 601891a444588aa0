//! Change events emitted by the [`IndexManager`](crate::workspace::IndexManager).
//!
//! Every mutation of the workspace index produces one [`IndexEvent`]. Events are delivered
//! synchronously, inside the operation that caused them, to every listener in the order the
//! listeners were registered. There is no batching or debouncing at this layer.

use crate::error::IniError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexEventKind {
    FileUpdated,
    FileDeleted,
    IndexCleared,
}

impl Display for IndexEventKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            IndexEventKind::FileUpdated => write!(f, "file-updated"),
            IndexEventKind::FileDeleted => write!(f, "file-deleted"),
            IndexEventKind::IndexCleared => write!(f, "index-cleared"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEvent {
    #[serde(rename = "type")]
    pub kind: IndexEventKind,
    /// `None` for [`IndexEventKind::IndexCleared`].
    pub file_path: Option<PathBuf>,
    /// Sorted, deduplicated section names whose definitions, references or registration
    /// membership changed.
    pub changed_sections: Vec<String>,
    pub global_version: u64,
}

impl IndexEvent {
    pub fn touches(&self, section: &str) -> bool {
        self.changed_sections
            .binary_search_by(|name| name.as_str().cmp(section))
            .is_ok()
    }
}

impl Display for IndexEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.file_path {
            Some(path) => write!(
                f,
                "{} {} (v{}, {} changed)",
                self.kind,
                path.display(),
                self.global_version,
                self.changed_sections.len()
            ),
            None => write!(
                f,
                "{} (v{}, {} changed)",
                self.kind,
                self.global_version,
                self.changed_sections.len()
            ),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&IndexEvent) + Send + Sync>;

/// Ordered list of synchronous listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&IndexEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Forward every event into an unbounded tokio channel. The listener stays registered
    /// until the receiver is dropped and the next event fails to send.
    pub fn subscribe_channel(self: &Arc<Self>) -> UnboundedReceiver<IndexEvent> {
        let (tx, rx) = unbounded_channel::<IndexEvent>();
        let bus = Arc::downgrade(self);
        let id_cell: Arc<parking_lot::Mutex<Option<ListenerId>>> = Arc::default();
        let listener_id_cell = id_cell.clone();
        let id = self.subscribe(move |event| {
            if let Err(e) = tx.send(event.clone()) {
                let err = IniError::from(e);
                tracing::debug!("[EventBus] {err}, receiver dropped, unsubscribing");
                if let (Some(bus), Some(id)) = (bus.upgrade(), *listener_id_cell.lock()) {
                    bus.unsubscribe(id);
                }
            }
        });
        *id_cell.lock() = Some(id);
        rx
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver `event` to every listener in registration order. The listener list is
    /// snapshotted first, so listeners may subscribe or unsubscribe while being called.
    pub fn emit(&self, event: &IndexEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        tracing::debug!("[EventBus] emitting {} to {} listeners", event, snapshot.len());
        for listener in snapshot {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn event(changed: &[&str]) -> IndexEvent {
        IndexEvent {
            kind: IndexEventKind::FileUpdated,
            file_path: Some(PathBuf::from("rulesmd.ini")),
            changed_sections: changed.iter().map(|s| s.to_string()).collect(),
            global_version: 1,
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().push(n));
        }
        bus.emit(&event(&["A"]));
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        let id = bus.subscribe(move |_| *c.lock() += 1);
        bus.emit(&event(&[]));
        assert!(bus.unsubscribe(id));
        bus.emit(&event(&[]));
        assert_eq!(*calls.lock(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn channel_subscription_receives_events() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe_channel();
        bus.emit(&event(&["Colt45"]));
        let received = rx.try_recv().unwrap();
        assert!(received.touches("Colt45"));
        drop(rx);
        bus.emit(&event(&[]));
        assert!(bus.is_empty());
    }

    #[test]
    fn event_serializes_with_kebab_case_type() {
        let json = serde_json::to_value(event(&["A"])).unwrap();
        assert_eq!(json["type"], "file-updated");
        assert_eq!(json["changedSections"][0], "A");
    }
}
