//! Update hooks on host nodes.
//!
//! Every owner and signal carries a [`HookSet`]: the explicit capability the
//! host runtime exposes so that inspection tools can be told when a
//! computation re-runs or a value is written. Hooks are keyed by a
//! [`HookTag`], so independent consumers (the structure walker, the
//! dependency graph extractor, the inspector) can observe the same node
//! without clobbering each other.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::node::Value;
use crate::identity::NodeId;

/// Identifies one subscriber on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookTag {
    /// Installed by the tree walker on every walked computation, keyed by the
    /// root the walk started from.
    Structure(NodeId),
    /// Installed by the inspector on the focused owner and its signals.
    Inspector,
    /// Installed by one dependency graph extraction, numbered by generation.
    DependencyGraph(u64),
    /// Free-form tag for host-side consumers such as value loggers.
    Named(String),
}

/// What happened to the node.
#[derive(Clone)]
pub enum HookEvent {
    /// A computation finished re-running.
    Ran,
    /// A signal (or memo) value was written.
    ValueChanged { value: Value, previous: Value },
}

impl fmt::Debug for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ran => f.write_str("Ran"),
            Self::ValueChanged { .. } => f.write_str("ValueChanged"),
        }
    }
}

/// A hook callback. Hooks must not assume anything about the thread they run
/// on beyond "the thread that mutated the node".
pub type Hook = Arc<dyn Fn(&HookEvent) + Send + Sync>;

#[derive(Default)]
struct HookState {
    /// Flipped on the first install and never reset: later installs reuse
    /// the same notification path.
    instrumented: bool,
    entries: SmallVec<[(HookTag, Hook); 2]>,
}

/// Per-node hook registry.
#[derive(Default)]
pub struct HookSet {
    state: Mutex<HookState>,
}

impl HookSet {
    /// Create an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook` under `tag`, replacing an existing hook with the same tag.
    pub fn insert(&self, tag: HookTag, hook: Hook) {
        let mut state = self.state.lock();
        state.instrumented = true;
        match state.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = hook,
            None => state.entries.push((tag, hook)),
        }
    }

    /// Remove the hook installed under `tag`. Returns whether one was found.
    pub fn remove(&self, tag: &HookTag) -> bool {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|(t, _)| t != tag);
        state.entries.len() != before
    }

    /// Drop every hook.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Invoke every installed hook.
    ///
    /// The hooks are cloned out first, so a hook may install or remove hooks
    /// on the same node while it runs.
    pub fn fire(&self, event: &HookEvent) {
        let hooks: SmallVec<[Hook; 2]> = self
            .state
            .lock()
            .entries
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();

        for hook in hooks {
            hook(event);
        }
    }

    /// Whether a hook was ever installed on this node.
    pub fn is_instrumented(&self) -> bool {
        self.state.lock().instrumented
    }

    /// Whether a hook is installed under `tag`.
    pub fn contains(&self, tag: &HookTag) -> bool {
        self.state.lock().entries.iter().any(|(t, _)| t == tag)
    }

    /// Number of installed hooks.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no hook is installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HookSet")
            .field("instrumented", &state.instrumented)
            .field(
                "tags",
                &state.entries.iter().map(|(tag, _)| tag).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_hook(count: &Arc<AtomicI32>) -> Hook {
        let count = Arc::clone(count);
        Arc::new(move |_: &HookEvent| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn hooks_fire_per_tag() {
        let hooks = HookSet::new();
        let a = Arc::new(AtomicI32::new(0));
        let b = Arc::new(AtomicI32::new(0));

        hooks.insert(HookTag::Structure(NodeId::from("#0")), counting_hook(&a));
        hooks.insert(HookTag::Inspector, counting_hook(&b));
        hooks.fire(&HookEvent::Ran);

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.len(), 2);
    }

    #[test]
    fn same_tag_replaces_previous_hook() {
        let hooks = HookSet::new();
        let old = Arc::new(AtomicI32::new(0));
        let new = Arc::new(AtomicI32::new(0));

        hooks.insert(HookTag::Inspector, counting_hook(&old));
        hooks.insert(HookTag::Inspector, counting_hook(&new));
        hooks.fire(&HookEvent::Ran);

        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn removing_one_tag_keeps_the_others() {
        let hooks = HookSet::new();
        let a = Arc::new(AtomicI32::new(0));
        let b = Arc::new(AtomicI32::new(0));

        hooks.insert(HookTag::DependencyGraph(1), counting_hook(&a));
        hooks.insert(HookTag::Named("logger".into()), counting_hook(&b));

        assert!(hooks.remove(&HookTag::DependencyGraph(1)));
        assert!(!hooks.remove(&HookTag::DependencyGraph(1)));
        hooks.fire(&HookEvent::Ran);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert!(hooks.is_instrumented());
    }

    #[test]
    fn hook_may_unsubscribe_itself_while_firing() {
        let hooks = Arc::new(HookSet::new());
        let weak = Arc::downgrade(&hooks);
        hooks.insert(
            HookTag::Inspector,
            Arc::new(move |_: &HookEvent| {
                if let Some(hooks) = weak.upgrade() {
                    hooks.remove(&HookTag::Inspector);
                }
            }),
        );

        hooks.fire(&HookEvent::Ran);
        assert!(hooks.is_empty());
    }
}
