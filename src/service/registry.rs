//! Ordered request id → job bookkeeping

use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable point-in-time view of a [`JobRegistry`], in insertion order.
pub type Snapshot<T> = Arc<Vec<(i32, T)>>;

/// Insertion-ordered map of active jobs keyed by request id.
///
/// Not synchronized: the owning service task is the only writer. Readers get
/// snapshots through [`watch`](Self::watch); a fresh snapshot is published on
/// every insert and every effective removal, before the mutating call returns.
pub struct JobRegistry<T> {
    entries: IndexMap<i32, T>,
    changes: watch::Sender<Snapshot<T>>,
}

impl<T: Clone> Default for JobRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> JobRegistry<T> {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries: IndexMap::new(),
            changes,
        }
    }

    /// Insert or overwrite. Returns the entry previously stored under `request_id`.
    ///
    /// An overwritten entry keeps its position.
    pub fn register(&mut self, request_id: i32, job: T) -> Option<T> {
        let previous = self.entries.insert(request_id, job);
        self.publish();
        previous
    }

    pub fn remove(&mut self, request_id: i32) -> Option<T> {
        self.remove_if(request_id, |_| true)
    }

    /// Remove `request_id` only if `predicate` accepts the stored entry.
    pub fn remove_if(&mut self, request_id: i32, predicate: impl FnOnce(&T) -> bool) -> Option<T> {
        if !self.entries.get(&request_id).is_some_and(predicate) {
            return None;
        }
        let removed = self.entries.shift_remove(&request_id);
        self.publish();
        removed
    }

    /// Empty the registry, returning every entry in order.
    pub fn drain(&mut self) -> Vec<(i32, T)> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let drained = self.entries.drain(..).collect();
        self.publish();
        drained
    }

    pub fn get(&self, request_id: i32) -> Option<&T> {
        self.entries.get(&request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.changes.borrow().clone()
    }

    /// Receiver of snapshots; the current one is marked as already seen.
    pub fn watch(&self) -> watch::Receiver<Snapshot<T>> {
        self.changes.subscribe()
    }

    fn publish(&self) {
        let view: Vec<(i32, T)> = self.entries.iter().map(|(id, job)| (*id, job.clone())).collect();
        self.changes.send_replace(Arc::new(view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<T>(snapshot: &Snapshot<T>) -> Vec<i32> {
        snapshot.iter().map(|(id, _)| *id).collect()
    }

    #[test]
    fn test_register_and_remove() {
        let mut registry = JobRegistry::new();
        let mut rx = registry.watch();

        assert!(registry.register(1, "a").is_none());
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        registry.register(2, "b");
        assert_eq!(registry.remove(1), Some("a"));
        assert_eq!(ids(&registry.snapshot()), vec![2]);
        assert_eq!(ids(&rx.borrow_and_update()), vec![2]);
    }

    #[test]
    fn test_remove_unknown_is_silent() {
        let mut registry: JobRegistry<&str> = JobRegistry::new();
        registry.register(1, "a");
        let rx = registry.watch();

        assert!(registry.remove(42).is_none());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut registry = JobRegistry::new();
        registry.register(7, "old");
        registry.register(8, "other");

        assert_eq!(registry.register(7, "new"), Some("old"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(7), Some(&"new"));
        assert_eq!(ids(&registry.snapshot()), vec![7, 8]);
    }

    #[test]
    fn test_remove_if() {
        let mut registry = JobRegistry::new();
        registry.register(3, "current");

        assert!(registry.remove_if(3, |job| *job == "stale").is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove_if(3, |job| *job == "current"), Some("current"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let mut registry = JobRegistry::new();
        registry.register(1, "a");
        let before = registry.snapshot();

        registry.register(2, "b");
        let drained = registry.drain();

        assert_eq!(ids(&before), vec![1]);
        assert_eq!(drained.len(), 2);
        assert!(registry.snapshot().is_empty());
    }
}
