//! Batched Update Emitter
//!
//! Collects updates between flushes, keeps one entry per key and emits them as
//! a single batch.
//!
//! # Deduplication
//!
//! Updates are processed most recent first: the newest update for a key wins,
//! and may fold in older state for the same key through
//! [`BatchItem::absorb`]. The batch is ordered by the first appearance of each
//! key when scanning from the newest update backwards.

use std::hash::Hash;
use std::time::{Duration, Instant};

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::identity::NodeId;
use crate::schedule::Throttle;

/// An update that can be batched.
pub trait BatchItem {
    type Key: Eq + Hash + Clone;

    /// Updates with equal keys collapse into one.
    fn key(&self) -> Self::Key;

    /// Fold an older update for the same key into this one.
    fn absorb(&mut self, _older: &Self) {}
}

impl BatchItem for NodeId {
    type Key = NodeId;

    fn key(&self) -> NodeId {
        self.clone()
    }
}

/// Collapse `items` to one entry per key, most recent first.
pub fn dedupe<T: BatchItem>(items: Vec<T>) -> Vec<T> {
    let mut latest: IndexMap<T::Key, T> = IndexMap::with_capacity(items.len());
    for item in items.into_iter().rev() {
        match latest.entry(item.key()) {
            Entry::Occupied(mut entry) => entry.get_mut().absorb(&item),
            Entry::Vacant(entry) => {
                entry.insert(item);
            }
        }
    }
    latest.into_values().collect()
}

/// Accumulates updates and releases them at most once per interval.
#[derive(Debug)]
pub struct BatchedUpdates<T> {
    pending: Vec<T>,
    throttle: Throttle,
}

impl<T: BatchItem> BatchedUpdates<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            pending: Vec::new(),
            throttle: Throttle::new(interval),
        }
    }

    /// Queue an update, opening a flush window if none is open.
    pub fn push(&mut self, item: T, now: Instant) {
        self.pending.push(item);
        self.throttle.trigger(now);
    }

    /// Drain every queued update, deduplicated.
    pub fn flush(&mut self) -> Vec<T> {
        self.throttle.cancel();
        dedupe(std::mem::take(&mut self.pending))
    }

    /// Flush if the window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<T>> {
        if !self.throttle.take_due(now) {
            return None;
        }
        let batch = dedupe(std::mem::take(&mut self.pending));
        (!batch.is_empty()).then_some(batch)
    }

    /// Drop queued updates and cancel the pending flush.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.throttle.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.throttle.is_pending()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Update {
        key: &'static str,
        payload: i32,
        updated: bool,
    }

    impl BatchItem for Update {
        type Key = &'static str;

        fn key(&self) -> &'static str {
            self.key
        }

        fn absorb(&mut self, older: &Self) {
            self.updated |= older.updated;
        }
    }

    fn update(key: &'static str, payload: i32, updated: bool) -> Update {
        Update { key, payload, updated }
    }

    #[test]
    fn latest_payload_wins_and_order_is_most_recent_first() {
        let batch = dedupe(vec![
            update("a", 1, false),
            update("b", 1, false),
            update("a", 2, false),
        ]);
        assert_eq!(batch, vec![update("a", 2, false), update("b", 1, false)]);
    }

    #[test]
    fn absorb_merges_older_flags() {
        let batch = dedupe(vec![update("a", 1, true), update("a", 2, false)]);
        assert_eq!(batch, vec![update("a", 2, true)]);
    }

    #[test]
    fn poll_waits_for_the_window() {
        let start = Instant::now();
        let mut batch = BatchedUpdates::new(Duration::from_millis(16));

        batch.push(NodeId::from("#1"), start);
        batch.push(NodeId::from("#1"), start + Duration::from_millis(5));
        assert_eq!(batch.poll(start + Duration::from_millis(10)), None);

        let flushed = batch.poll(start + Duration::from_millis(16)).unwrap();
        assert_eq!(flushed, vec![NodeId::from("#1")]);
        assert!(!batch.is_pending());
    }

    #[test]
    fn clear_cancels_the_flush() {
        let start = Instant::now();
        let mut batch = BatchedUpdates::new(Duration::from_millis(16));
        batch.push(NodeId::from("#1"), start);
        batch.clear();
        assert_eq!(batch.poll(start + Duration::from_secs(1)), None);
        assert!(batch.flush().is_empty());
    }
}
