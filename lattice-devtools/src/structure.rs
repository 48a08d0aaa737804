//! Structure Mirror
//!
//! Persists the walked trees of every tracked root and keeps them current by
//! reconciling fresh walks into the stored nodes.
//!
//! # Overview
//!
//! Nodes live in an arena keyed by [`NodeId`]; parent, child and attachment
//! links are IDs. Each tracked root has its own tree whose root node sits at
//! level 0. A sub-root is additionally mounted under the node it is attached
//! to, through that node's `subroots` list.
//!
//! # Reconciliation
//!
//! Children are diffed positionally: index `i` of the old list is compared
//! with index `i` of the new one. Equal IDs keep the stored node and recurse;
//! different IDs discard the old subtree and build the new one; the tail is
//! appended or discarded. Moving a node within a list is therefore reported as
//! replacements, never as a move. [`ReconcileStats`] counts what happened.
//!
//! Replaced and surplus nodes are discarded before anything is built, and a
//! discard only removes a node still listed under the parent doing the
//! discarding. A node that moved elsewhere in the same update survives.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::graph::NodeKind;
use crate::identity::NodeId;
use crate::protocol::{MappedOwner, MappedRoot, StructureUpdates};

/// One stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub kind: NodeKind,
    pub frozen: bool,
    pub hmr: bool,
    pub children: Vec<NodeId>,
    /// Sub-roots mounted under this node.
    pub subroots: Vec<NodeId>,
    /// `None` for root nodes.
    pub parent: Option<NodeId>,
    /// For a mounted sub-root: the node it is mounted under.
    pub attached: Option<NodeId>,
    /// Depth below the node's own root.
    pub level: usize,
    pub root_id: NodeId,
}

/// What one [`Structure::apply`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Nodes built.
    pub created: usize,
    /// Nodes discarded.
    pub removed: usize,
    /// Positions whose ID changed.
    pub replaced: usize,
    /// Nodes updated in place.
    pub reused: usize,
}

/// The persisted mirror of every tracked root.
#[derive(Debug, Default)]
pub struct Structure {
    nodes: HashMap<NodeId, StructureNode>,
    /// Top-level roots, in registration order.
    roots: Vec<NodeId>,
    /// Sub-root to the node it should be mounted under.
    attachments: HashMap<NodeId, NodeId>,
    /// Mount target to sub-roots waiting for it to appear.
    pending: IndexMap<NodeId, Vec<NodeId>>,
    stats: ReconcileStats,
    serial: u64,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of root-level changes and return what it did.
    pub fn apply(&mut self, updates: &StructureUpdates) -> ReconcileStats {
        self.stats = ReconcileStats::default();

        for id in &updates.removed {
            self.remove_root(id);
        }
        for root in &updates.updated {
            self.update_root(root);
        }

        self.serial += 1;
        debug!(
            serial = self.serial,
            created = self.stats.created,
            removed = self.stats.removed,
            replaced = self.stats.replaced,
            reused = self.stats.reused,
            "applied structure updates"
        );
        self.stats
    }

    fn remove_root(&mut self, id: &NodeId) {
        self.detach(id);
        self.pending.shift_remove(id);
        self.discard(id, None);
    }

    fn update_root(&mut self, root: &MappedRoot) {
        let is_stored_root = self
            .nodes
            .get(&root.id)
            .is_some_and(|node| node.parent.is_none());

        if is_stored_root {
            self.update(&root.tree, None, 0, &root.id);
        } else {
            self.build(&root.tree, None, 0, &root.id);
        }

        let current = self.attachments.get(&root.id).cloned();
        let placed = current.is_some() || self.roots.contains(&root.id);
        if !placed || current != root.attached_to {
            self.detach(&root.id);
            self.attach(&root.id, root.attached_to.as_ref());
        }
    }

    /// Reconcile the stored children of `parent` against `next`.
    pub fn reconcile(&mut self, parent: &NodeId, next: &[MappedOwner]) {
        let Some(node) = self.nodes.get(parent) else {
            return;
        };
        let (level, root_id) = (node.level, node.root_id.clone());
        self.reconcile_children(parent, next, level, &root_id);
    }

    fn reconcile_children(
        &mut self,
        parent: &NodeId,
        next: &[MappedOwner],
        level: usize,
        root_id: &NodeId,
    ) {
        let mut prev = match self.nodes.get_mut(parent) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        let shared = prev.len().min(next.len());

        for (old, new) in prev.iter().zip(next) {
            if *old != new.id {
                self.stats.replaced += 1;
                self.discard(old, Some(parent));
            }
        }
        for surplus in prev.drain(shared..).collect::<Vec<_>>() {
            self.discard(&surplus, Some(parent));
        }

        for (index, mapped) in next.iter().enumerate() {
            if index < shared && prev[index] == mapped.id && self.nodes.contains_key(&mapped.id) {
                self.update(mapped, Some(parent), level + 1, root_id);
            } else {
                self.build(mapped, Some(parent), level + 1, root_id);
                if index < shared {
                    prev[index] = mapped.id.clone();
                } else {
                    prev.push(mapped.id.clone());
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(parent) {
            node.children = prev;
        }
    }

    fn update(
        &mut self,
        mapped: &MappedOwner,
        parent: Option<&NodeId>,
        level: usize,
        root_id: &NodeId,
    ) {
        let Some(node) = self.nodes.get_mut(&mapped.id) else {
            self.build(mapped, parent, level, root_id);
            return;
        };
        node.name = mapped.name.clone();
        node.kind = mapped.kind;
        node.frozen = mapped.frozen;
        node.hmr = mapped.hmr;
        node.parent = parent.cloned();
        node.level = level;
        node.root_id = root_id.clone();
        self.stats.reused += 1;

        self.reconcile_children(&mapped.id, &mapped.children, level, root_id);
    }

    fn build(
        &mut self,
        mapped: &MappedOwner,
        parent: Option<&NodeId>,
        level: usize,
        root_id: &NodeId,
    ) {
        if let Some(stale) = self.nodes.get(&mapped.id) {
            let stale_parent = stale.parent.clone();
            self.discard(&mapped.id, stale_parent.as_ref());
        }

        self.nodes.insert(
            mapped.id.clone(),
            StructureNode {
                id: mapped.id.clone(),
                name: mapped.name.clone(),
                kind: mapped.kind,
                frozen: mapped.frozen,
                hmr: mapped.hmr,
                children: mapped.children.iter().map(|c| c.id.clone()).collect(),
                subroots: Vec::new(),
                parent: parent.cloned(),
                attached: None,
                level,
                root_id: root_id.clone(),
            },
        );
        self.stats.created += 1;

        for child in &mapped.children {
            self.build(child, Some(&mapped.id), level + 1, root_id);
        }

        if let Some(waiting) = self.pending.shift_remove(&mapped.id) {
            for subroot in waiting {
                self.mount(&subroot, &mapped.id);
            }
        }
    }

    /// Remove `id` and its subtree if it is still listed under `parent`.
    /// Mounted sub-roots fall back to pending.
    fn discard(&mut self, id: &NodeId, parent: Option<&NodeId>) {
        let owned_here = self
            .nodes
            .get(id)
            .is_some_and(|node| node.parent.as_ref() == parent);
        if !owned_here {
            return;
        }
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        self.stats.removed += 1;

        for subroot in node.subroots {
            if let Some(sub) = self.nodes.get_mut(&subroot) {
                sub.attached = None;
            }
            self.pending.entry(id.clone()).or_default().push(subroot);
        }
        for child in &node.children {
            self.discard(child, Some(id));
        }
    }

    fn attach(&mut self, id: &NodeId, target: Option<&NodeId>) {
        match target {
            None => {
                if !self.roots.contains(id) {
                    self.roots.push(id.clone());
                }
            }
            Some(target) => {
                self.attachments.insert(id.clone(), target.clone());
                if self.nodes.contains_key(target) {
                    self.mount(id, target);
                } else {
                    self.pending.entry(target.clone()).or_default().push(id.clone());
                }
            }
        }
    }

    fn mount(&mut self, id: &NodeId, target: &NodeId) {
        if let Some(node) = self.nodes.get_mut(target) {
            if !node.subroots.contains(id) {
                node.subroots.push(id.clone());
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.attached = Some(target.clone());
        }
    }

    fn detach(&mut self, id: &NodeId) {
        self.roots.retain(|root| root != id);
        if let Some(target) = self.attachments.remove(id) {
            if let Some(node) = self.nodes.get_mut(&target) {
                node.subroots.retain(|sub| sub != id);
            }
            if let Some(waiting) = self.pending.get_mut(&target) {
                waiting.retain(|sub| sub != id);
                if waiting.is_empty() {
                    self.pending.shift_remove(&target);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.attached = None;
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get(&self, id: &NodeId) -> Option<&StructureNode> {
        self.nodes.get(id)
    }

    /// Top-level roots.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// IDs from the top-level root down to `id`, crossing sub-root mounts.
    /// Empty when `id` is unknown.
    pub fn path(&self, id: &NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.nodes.get(id);

        while let Some(node) = cursor {
            if !seen.insert(&node.id) {
                break;
            }
            path.push(node.id.clone());
            let next = node.parent.as_ref().or(node.attached.as_ref());
            cursor = next.and_then(|next| self.nodes.get(next));
        }

        path.reverse();
        path
    }

    /// The root whose tree contains `id`.
    pub fn root_of(&self, id: &NodeId) -> Option<&NodeId> {
        self.nodes.get(id).map(|node| &node.root_id)
    }

    /// Whether `id` is a sub-root waiting for its mount target.
    pub fn is_pending(&self, id: &NodeId) -> bool {
        self.pending.values().any(|waiting| waiting.contains(id))
    }

    /// Rebuild the mapped subtree rooted at `id`. Sub-roots are not included.
    pub fn to_mapped(&self, id: &NodeId) -> Option<MappedOwner> {
        let node = self.nodes.get(id)?;
        Some(MappedOwner {
            id: node.id.clone(),
            kind: node.kind,
            name: node.name.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.to_mapped(child))
                .collect(),
            frozen: node.frozen,
            hmr: node.hmr,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.attachments.clear();
        self.pending.clear();
        self.stats = ReconcileStats::default();
    }

    /// Counters of the last [`apply`](Self::apply).
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Number of applied update batches.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn node(s: &str, children: Vec<MappedOwner>) -> MappedOwner {
        MappedOwner {
            children,
            ..MappedOwner::leaf(id(s), NodeKind::Computation, Some(s))
        }
    }

    fn root(s: &str, children: Vec<MappedOwner>, attached_to: Option<&str>) -> MappedRoot {
        MappedRoot {
            id: id(s),
            tree: MappedOwner {
                children,
                ..MappedOwner::leaf(id(s), NodeKind::Root, None)
            },
            attached_to: attached_to.map(id),
        }
    }

    fn updated(roots: Vec<MappedRoot>) -> StructureUpdates {
        StructureUpdates {
            updated: roots,
            removed: Vec::new(),
        }
    }

    fn children_of(structure: &Structure, s: &str) -> Vec<NodeId> {
        structure.get(&id(s)).unwrap().children.clone()
    }

    #[test]
    fn builds_a_fresh_root() {
        let mut structure = Structure::new();
        let tree = vec![node("a", vec![node("b", vec![])])];
        let stats = structure.apply(&updated(vec![root("r", tree, None)]));

        assert_eq!(stats.created, 3);
        assert_eq!(structure.roots(), &[id("r")]);
        assert_eq!(structure.get(&id("b")).unwrap().level, 2);
        assert_eq!(structure.get(&id("b")).unwrap().parent, Some(id("a")));
        assert_eq!(structure.root_of(&id("b")), Some(&id("r")));
    }

    #[test]
    fn identical_update_only_reuses() {
        let mut structure = Structure::new();
        let tree = || updated(vec![root("r", vec![node("a", vec![]), node("b", vec![])], None)]);
        structure.apply(&tree());

        let stats = structure.apply(&tree());
        assert_eq!(
            stats,
            ReconcileStats {
                created: 0,
                removed: 0,
                replaced: 0,
                reused: 3,
            }
        );
    }

    #[test]
    fn tail_growth_appends() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![root("r", vec![node("a", vec![])], None)]));

        let tree = vec![node("a", vec![]), node("b", vec![])];
        let stats = structure.apply(&updated(vec![root("r", tree, None)]));
        assert_eq!((stats.created, stats.replaced, stats.removed), (1, 0, 0));
        assert_eq!(children_of(&structure, "r"), vec![id("a"), id("b")]);
    }

    #[test]
    fn surplus_is_discarded() {
        let mut structure = Structure::new();
        let tree = vec![node("a", vec![]), node("b", vec![node("c", vec![])])];
        structure.apply(&updated(vec![root("r", tree, None)]));

        let stats = structure.apply(&updated(vec![root("r", vec![node("a", vec![])], None)]));
        assert_eq!(stats.removed, 2);
        assert!(structure.get(&id("c")).is_none());
        assert_eq!(structure.len(), 2);
    }

    #[test]
    fn reordering_is_full_replacement() {
        let mut structure = Structure::new();
        let tree = vec![node("a", vec![]), node("b", vec![])];
        structure.apply(&updated(vec![root("r", tree, None)]));

        let tree = vec![node("b", vec![]), node("a", vec![])];
        let stats = structure.apply(&updated(vec![root("r", tree, None)]));
        assert_eq!((stats.replaced, stats.removed, stats.created), (2, 2, 2));
        assert_eq!(children_of(&structure, "r"), vec![id("b"), id("a")]);
        assert_eq!(structure.len(), 3);
    }

    #[test]
    fn middle_replacement_keeps_neighbours() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![root(
            "r",
            vec![node("a", vec![]), node("b", vec![]), node("c", vec![])],
            None,
        )]));

        let stats = structure.apply(&updated(vec![root(
            "r",
            vec![node("a", vec![]), node("x", vec![]), node("c", vec![])],
            None,
        )]));
        assert_eq!((stats.replaced, stats.reused), (1, 3));
        assert!(structure.get(&id("b")).is_none());
    }

    #[test]
    fn node_moved_to_another_parent_survives() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![root(
            "r",
            vec![node("a", vec![]), node("b", vec![node("m", vec![])])],
            None,
        )]));

        structure.apply(&updated(vec![root(
            "r",
            vec![node("a", vec![node("m", vec![])]), node("b", vec![])],
            None,
        )]));
        assert_eq!(structure.get(&id("m")).unwrap().parent, Some(id("a")));
        assert_eq!(structure.len(), 4);
    }

    #[test]
    fn subroot_waits_for_its_target() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![root("s", vec![node("s1", vec![])], Some("t"))]));
        assert!(structure.is_pending(&id("s")));
        assert!(structure.roots().is_empty());

        structure.apply(&updated(vec![root("r", vec![node("t", vec![])], None)]));
        assert!(!structure.is_pending(&id("s")));
        assert_eq!(structure.get(&id("t")).unwrap().subroots, vec![id("s")]);
        assert_eq!(structure.path(&id("s1")), vec![id("r"), id("t"), id("s"), id("s1")]);
        assert_eq!(structure.get(&id("s1")).unwrap().level, 1);
    }

    #[test]
    fn discarded_target_sends_subroot_back_to_pending() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![
            root("r", vec![node("t", vec![])], None),
            root("s", vec![], Some("t")),
        ]));

        structure.apply(&updated(vec![root("r", vec![], None)]));
        assert!(structure.is_pending(&id("s")));
        assert!(structure.get(&id("s")).unwrap().attached.is_none());

        structure.apply(&updated(vec![root("r", vec![node("t", vec![])], None)]));
        assert_eq!(structure.get(&id("s")).unwrap().attached, Some(id("t")));
    }

    #[test]
    fn reattaching_keeps_the_subtree() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![
            root("r", vec![node("t", vec![]), node("u", vec![])], None),
            root("s", vec![node("s1", vec![])], Some("t")),
        ]));

        let stats = structure.apply(&updated(vec![root("s", vec![node("s1", vec![])], Some("u"))]));
        assert_eq!(stats.created, 0);
        assert!(structure.get(&id("t")).unwrap().subroots.is_empty());
        assert_eq!(structure.get(&id("u")).unwrap().subroots, vec![id("s")]);

        structure.apply(&updated(vec![root("s", vec![node("s1", vec![])], None)]));
        assert_eq!(structure.roots(), &[id("r"), id("s")]);
        assert!(structure.get(&id("u")).unwrap().subroots.is_empty());
    }

    #[test]
    fn removed_root_is_detached_and_discarded() {
        let mut structure = Structure::new();
        structure.apply(&updated(vec![
            root("r", vec![node("t", vec![])], None),
            root("s", vec![node("s1", vec![])], Some("t")),
        ]));

        let stats = structure.apply(&StructureUpdates {
            updated: Vec::new(),
            removed: vec![id("s")],
        });
        assert_eq!(stats.removed, 2);
        assert!(structure.get(&id("t")).unwrap().subroots.is_empty());
        assert_eq!(structure.len(), 2);
    }

    #[test]
    fn to_mapped_round_trips_the_stored_tree() {
        let mut structure = Structure::new();
        let tree = root("r", vec![node("a", vec![node("b", vec![])])], None);
        structure.apply(&updated(vec![tree.clone()]));
        assert_eq!(structure.to_mapped(&id("r")), Some(tree.tree));
    }
}
