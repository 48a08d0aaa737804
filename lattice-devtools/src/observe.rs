//! Observation
//!
//! Installs and removes hooks on host nodes, and keeps a ledger of every hook
//! a consumer installed so that it can take all of them down again in one
//! call.

use indexmap::IndexMap;
use tracing::warn;

use crate::graph::{GraphNode, Hook, HookTag, WeakNode};
use crate::identity::NodeId;

/// Install `hook` on `node` under `tag`.
///
/// Re-observing with the same tag replaces the previous hook. Observing a
/// disposed node does nothing and returns `false`.
pub fn observe(node: &GraphNode, tag: HookTag, hook: Hook) -> bool {
    if node.is_disposed() {
        warn!(?tag, id = ?node.slot().id(), "ignoring hook on disposed node");
        return false;
    }
    node.subscribe(tag, hook)
}

/// Remove the hook installed under `tag`, leaving other tags in place.
pub fn unobserve(node: &GraphNode, tag: &HookTag) -> bool {
    node.unsubscribe(tag)
}

/// The set of hooks one consumer has installed.
#[derive(Debug, Default)]
pub struct Subscriptions {
    entries: IndexMap<(NodeId, HookTag), WeakNode>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `node` and remember the subscription.
    pub fn observe(&mut self, id: NodeId, node: &GraphNode, tag: HookTag, hook: Hook) -> bool {
        if !observe(node, tag.clone(), hook) {
            return false;
        }
        self.entries.insert((id, tag), node.downgrade());
        true
    }

    /// Remove every remembered hook. Safe to call repeatedly.
    pub fn release(&mut self) {
        for ((_, tag), node) in self.entries.drain(..) {
            if let Some(node) = node.upgrade() {
                unobserve(&node, &tag);
            }
        }
    }

    /// Remove remembered hooks on nodes that `keep` rejects.
    pub fn release_where<F>(&mut self, mut keep: F)
    where
        F: FnMut(&NodeId) -> bool,
    {
        self.entries.retain(|(id, tag), node| {
            if keep(id) {
                return true;
            }
            if let Some(node) = node.upgrade() {
                unobserve(&node, tag);
            }
            false
        });
    }

    /// Fold another ledger into this one.
    pub fn extend(&mut self, other: Subscriptions) {
        self.entries.extend(other.entries);
    }

    /// Whether a hook for `(id, tag)` is remembered.
    pub fn contains(&self, id: &NodeId, tag: &HookTag) -> bool {
        self.entries.contains_key(&(id.clone(), tag.clone()))
    }

    /// IDs with at least one remembered hook.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.keys().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
