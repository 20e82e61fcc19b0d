//! Topic-keyed listener registry.
//!
//! Listeners carry no payload: they are told that a topic changed and read
//! the new value through the engine's snapshot accessors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use val_path::{ModuleFilePath, SourcePath};

/// What a listener observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Optimistic tree of one module.
    Module(ModuleFilePath),
    Schemas,
    SyncStatus(ModuleFilePath),
    PendingOpsCount,
    Render(ModuleFilePath),
    /// Shallow view at one combined address. Fires only when that view
    /// changes, not when a descendant does.
    Shallow(SourcePath),
    ServiceStatus,
    Initialized,
}

pub type Listener = Arc<dyn Fn() + Send + Sync>;

type Table = Mutex<HashMap<Topic, Vec<(u64, Listener)>>>;

#[derive(Default)]
pub struct ListenerRegistry {
    table: Arc<Table>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.table
            .lock()
            .entry(topic.clone())
            .or_default()
            .push((id, listener));
        Subscription {
            table: Arc::downgrade(&self.table),
            topic,
            id,
            release: None,
        }
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.table.lock().get(topic).map_or(0, Vec::len)
    }

    /// Invoke every listener of `topics`. The table lock is released before
    /// any listener runs, so listeners may subscribe or unsubscribe.
    pub fn notify(&self, topics: &[Topic]) {
        let listeners: Vec<Listener> = {
            let table = self.table.lock();
            topics
                .iter()
                .filter_map(|topic| table.get(topic))
                .flatten()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };
        for listener in listeners {
            listener();
        }
    }
}

/// Disposer returned by [`ListenerRegistry::subscribe`]. Dropping it
/// unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    table: Weak<Table>,
    topic: Topic,
    id: u64,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Run `release` after the listener is removed.
    pub(crate) fn on_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            let mut table = table.lock();
            if let Some(listeners) = table.get_mut(&self.topic) {
                listeners.retain(|(id, _)| *id != self.id);
                if listeners.is_empty() {
                    table.remove(&self.topic);
                }
            }
        }
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
