//! State store that emits reconciled snapshots

use crate::model::{Path, Value};
use crate::ops::{ReconcileOptions, Reconciler};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with each newly emitted state
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`StateStore::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Holds the last emitted state tree
///
/// Every incoming snapshot is reconciled against the last emitted one
/// before anyone sees it. Unchanged subtrees therefore keep their handles,
/// and a snapshot equal to the current state emits nothing at all.
pub struct StateStore {
    reconciler: Reconciler,
    current: RwLock<Value>,
    /// Serializes read-reconcile-swap so concurrent writers do not race
    write_lock: Mutex<()>,
    /// Taken before `write_lock` is released, so emissions reach listeners
    /// in the order they were swapped in
    notify_lock: Mutex<()>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl StateStore {
    /// Create a store with default reconciler options
    pub fn new(initial: Value) -> Self {
        Self::with_options(initial, ReconcileOptions::default())
    }

    pub fn with_options(initial: Value, options: ReconcileOptions) -> Self {
        StateStore {
            reconciler: Reconciler::new(options),
            current: RwLock::new(initial),
            write_lock: Mutex::new(()),
            notify_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// The last emitted state
    pub fn get(&self) -> Value {
        self.current.read().clone()
    }

    /// Subtree of the current state at `path`
    pub fn select(&self, path: &Path) -> Option<Value> {
        self.current.read().pointer(path)
    }

    /// Offer a new snapshot
    ///
    /// Returns `true` if the state changed and listeners were notified.
    /// Listeners run on the calling thread once the state lock is released,
    /// and see emissions in the same order as `get()` does. They may read
    /// the store but must not write to it.
    pub fn set(&self, next: Value) -> bool {
        self.apply(|_| next)
    }

    /// Derive the next snapshot from the current one
    ///
    /// `f` runs while other writers are held off, so concurrent updates
    /// never start from a stale state. Like a listener, it must not write
    /// to the store.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) -> bool {
        self.apply(f)
    }

    fn apply(&self, f: impl FnOnce(&Value) -> Value) -> bool {
        let writer = self.write_lock.lock();
        let previous = self.get();
        let next = f(&previous);
        let merged = self.reconciler.reconcile_with_stats(&previous, &next);
        if merged.value.is_same(&previous) {
            tracing::debug!("snapshot unchanged, nothing emitted");
            return false;
        }
        *self.current.write() = merged.value.clone();
        tracing::debug!(
            rebuilt = merged.stats.rebuilt,
            reused = merged.stats.reused,
            "emitting new state"
        );

        let _notifying = self.notify_lock.lock();
        drop(writer);

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&merged.value);
        }
        true
    }

    pub fn subscribe(&self, listener: impl Fn(&Value) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        StateStore::new(Value::Null)
    }
}
