//! Node Identity
//!
//! Every node the devtools touch gets an opaque [`NodeId`] that stays stable
//! for the life of the node. The ID is stamped into a write-once slot on the
//! node itself the first time it is visited, so re-walking a subtree always
//! reports the same IDs.
//!
//! The [`IdentityRegistry`] keeps a reverse index from ID to node so that
//! requests coming back from the inspection UI ("focus #1f") can be resolved.
//! The index only holds weak references: it never keeps a disposed subtree
//! alive.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::graph::{GraphNode, WeakNode};

/// Opaque, process-unique node identifier, rendered as `#<base36>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a new unique node ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(format!("#{}", to_base36(COUNTER.fetch_add(1, Ordering::Relaxed))))
    }

    /// The ID as sent over the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

/// Reverse index from [`NodeId`] to live nodes.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    nodes: HashMap<NodeId, WeakNode>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node's ID, stamping a fresh one on first call.
    ///
    /// A memo reached as an owner and as a source gets one ID, because the
    /// slot lives on the node.
    pub fn id_of(&mut self, node: &GraphNode) -> NodeId {
        let id = node.slot().id_or_init(NodeId::new).clone();
        self.nodes
            .entry(id.clone())
            .or_insert_with(|| node.downgrade());
        id
    }

    /// Resolve an ID back to its node.
    ///
    /// Returns `None` when the node was dropped or disposed.
    pub fn get(&self, id: &NodeId) -> Option<GraphNode> {
        self.nodes
            .get(id)
            .and_then(WeakNode::upgrade)
            .filter(|node| !node.is_disposed())
    }

    /// Drop index entries whose node is gone. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, node| {
            node.upgrade()
                .map(|node| !node.is_disposed())
                .unwrap_or(false)
        });
        before - self.nodes.len()
    }

    /// Number of indexed IDs, live or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{value, Owner, OwnerTraits};

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with('#'));
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn id_is_stable_across_calls() {
        let mut registry = IdentityRegistry::new();
        let root = Owner::root(None);
        let node: GraphNode = root.clone().into();

        let first = registry.id_of(&node);
        let second = registry.id_of(&root.into());
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn memo_has_one_identity_as_owner_and_source() {
        let mut registry = IdentityRegistry::new();
        let root = Owner::root(None);
        let memo = root.create_child(OwnerTraits::memo(), Some("m"));
        let effect = root.create_child(OwnerTraits::effect(), None);
        effect.track(&memo.clone().into());

        let as_owner = registry.id_of(&memo.into());
        let as_source = registry.id_of(&effect.sources()[0]);
        assert_eq!(as_owner, as_source);
    }

    #[test]
    fn disposed_and_dropped_nodes_do_not_resolve() {
        let mut registry = IdentityRegistry::new();
        let root = Owner::root(None);
        let child = root.create_child(OwnerTraits::computation(), None);
        let signal = root.create_signal(None, value(1_u8));

        let child_id = registry.id_of(&child.clone().into());
        let signal_id = registry.id_of(&signal.into());
        assert!(registry.get(&child_id).is_some());

        child.dispose();
        assert!(registry.get(&child_id).is_none());

        drop(root);
        assert!(registry.get(&signal_id).is_none());
        assert_eq!(registry.prune(), 2);
        assert!(registry.is_empty());
    }
}
