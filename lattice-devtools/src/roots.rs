//! Tracked Roots
//!
//! Keeps the set of roots the debugger mirrors, where each one is attached,
//! and which of them need a new walk.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::graph::{GraphNode, HookTag, Owner, WeakOwner};
use crate::identity::{IdentityRegistry, NodeId};
use crate::observe::Subscriptions;

/// A root the debugger mirrors.
#[derive(Debug)]
pub struct TrackedRoot {
    pub owner: Owner,
    /// Node the root is mounted under, for sub-roots.
    pub attached_to: Option<NodeId>,
    attached_owner: Option<WeakOwner>,
    observed: Subscriptions,
}

/// Roots to walk and roots that went away since the last flush.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RootsWork {
    pub walk: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// The set of tracked roots.
#[derive(Debug, Default)]
pub struct Roots {
    tracked: IndexMap<NodeId, TrackedRoot>,
    dirty: IndexSet<NodeId>,
    removed: Vec<NodeId>,
    update_all: bool,
}

/// First live, non-disposed owner at or above `owner`.
fn closest_alive(owner: Option<Owner>) -> Option<Owner> {
    let mut cursor = owner;
    while let Some(current) = cursor {
        if !current.is_disposed() {
            return Some(current);
        }
        cursor = current.parent();
    }
    None
}

impl Roots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `owner`.
    ///
    /// A root created under a live owner becomes a sub-root attached to that
    /// owner. Internal, disposed and already tracked roots are ignored.
    pub fn register(&mut self, owner: &Owner, registry: &mut IdentityRegistry) -> Option<NodeId> {
        if owner.is_internal() || owner.is_disposed() {
            return None;
        }
        let id = registry.id_of(&owner.clone().into());
        if self.tracked.contains_key(&id) {
            return None;
        }

        let parent = closest_alive(owner.parent());
        let attached_to = parent
            .as_ref()
            .map(|parent| registry.id_of(&GraphNode::Owner(parent.clone())));
        debug!(root = %id, attached_to = ?attached_to, "tracking root");

        self.tracked.insert(
            id.clone(),
            TrackedRoot {
                owner: owner.clone(),
                attached_to,
                attached_owner: parent.as_ref().map(Owner::downgrade),
                observed: Subscriptions::new(),
            },
        );
        self.removed.retain(|removed| *removed != id);
        self.dirty.insert(id.clone());
        Some(id)
    }

    /// Re-attach a tracked root under `parent`, or make it top-level.
    pub fn attach(
        &mut self,
        id: &NodeId,
        parent: Option<&Owner>,
        registry: &mut IdentityRegistry,
    ) -> bool {
        let Some(tracked) = self.tracked.get_mut(id) else {
            return false;
        };
        tracked.attached_to = parent.map(|parent| registry.id_of(&parent.clone().into()));
        tracked.attached_owner = parent.map(Owner::downgrade);
        self.dirty.insert(id.clone());
        true
    }

    /// Stop tracking a root and release its hooks.
    pub fn remove(&mut self, id: &NodeId) -> bool {
        let Some(mut tracked) = self.tracked.shift_remove(id) else {
            return false;
        };
        tracked.observed.release();
        self.dirty.shift_remove(id);
        self.removed.push(id.clone());
        debug!(root = %id, "root removed");
        true
    }

    /// Remove disposed roots and re-attach roots whose mount target was
    /// disposed. Returns whether anything changed.
    pub fn sweep_disposed(&mut self, registry: &mut IdentityRegistry) -> bool {
        let disposed: Vec<NodeId> = self
            .tracked
            .iter()
            .filter(|(_, tracked)| tracked.owner.is_disposed())
            .map(|(id, _)| id.clone())
            .collect();
        let mut changed = !disposed.is_empty();
        for id in &disposed {
            self.remove(id);
        }

        for (id, tracked) in &mut self.tracked {
            let Some(target) = &tracked.attached_owner else {
                continue;
            };
            let target = target.upgrade();
            if target.as_ref().is_some_and(|target| !target.is_disposed()) {
                continue;
            }
            let parent = closest_alive(target.and_then(|target| target.parent()));
            tracked.attached_to = parent
                .as_ref()
                .map(|parent| registry.id_of(&parent.clone().into()));
            tracked.attached_owner = parent.as_ref().map(Owner::downgrade);
            self.dirty.insert(id.clone());
            changed = true;
        }
        changed
    }

    /// Schedule a walk of one root.
    pub fn mark_dirty(&mut self, id: &NodeId) {
        if self.tracked.contains_key(id) {
            self.dirty.insert(id.clone());
        }
    }

    /// Schedule a walk of every root.
    pub fn mark_all(&mut self) {
        self.update_all = true;
    }

    /// Take the scheduled work.
    pub fn take_work(&mut self) -> RootsWork {
        let walk = if std::mem::take(&mut self.update_all) {
            self.dirty.clear();
            self.tracked.keys().cloned().collect()
        } else {
            std::mem::take(&mut self.dirty).into_iter().collect()
        };
        RootsWork {
            walk,
            removed: std::mem::take(&mut self.removed),
        }
    }

    /// Store the structure hooks of a fresh walk, releasing hooks on nodes the
    /// walk no longer reached.
    pub fn replace_observed(&mut self, id: &NodeId, observed: Subscriptions) {
        let Some(tracked) = self.tracked.get_mut(id) else {
            let mut observed = observed;
            observed.release();
            return;
        };
        let tag = HookTag::Structure(id.clone());
        let mut previous = std::mem::replace(&mut tracked.observed, observed);
        let current = &tracked.observed;
        previous.release_where(|node| current.contains(node, &tag));
    }

    /// Release every hook and forget pending work. Roots stay tracked.
    pub fn release_all(&mut self) {
        for tracked in self.tracked.values_mut() {
            tracked.observed.release();
        }
        self.dirty.clear();
        self.removed.clear();
        self.update_all = false;
    }

    pub fn get(&self, id: &NodeId) -> Option<&TrackedRoot> {
        self.tracked.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.tracked.contains_key(id)
    }

    /// IDs of tracked roots, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.tracked.keys()
    }

    /// Number of structure hooks installed on the root's tree.
    pub fn observed_len(&self, id: &NodeId) -> usize {
        self.tracked.get(id).map_or(0, |tracked| tracked.observed.len())
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
