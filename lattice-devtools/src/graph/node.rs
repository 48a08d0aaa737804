//! Graph Nodes
//!
//! This module defines the live nodes of a host owner graph: [`Owner`]s
//! (roots, computations, effects, memos, components) and [`Signal`]s.
//!
//! # Ownership
//!
//! - An owner strongly owns its `owned` children and declared signals.
//! - A computation strongly references its sources.
//! - Parent and observer links are weak, so the graph has no reference
//!   cycles and dropping a root releases its subtree.
//!
//! Handles are cheap to clone and share state, like the lattice reactive
//! primitives they mirror.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::hooks::{Hook, HookEvent, HookSet, HookTag};
use crate::identity::NodeId;

/// An opaque runtime value. The inspector never looks inside; values are
/// handed to a [`ValueEncoder`](crate::encode::ValueEncoder).
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a value for storage in a signal or memo.
pub fn value<T: Any + Send + Sync>(value: T) -> Value {
    Arc::new(value)
}

/// The kind of a node as reported to the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A detachable subtree entry point. Roots never re-run.
    Root,
    /// A component function call.
    Component,
    /// A user effect.
    Effect,
    /// A render effect (impure, not user-created).
    #[serde(rename = "render")]
    RenderEffect,
    /// A derived, cached value. Both an owner and a signal.
    Memo,
    /// A pure computation that is not a memo.
    Computation,
    /// The hot-reload memo wrapping a component.
    Refresh,
    /// An effect providing a context value.
    Context,
    /// A plain value cell.
    Signal,
}

impl NodeKind {
    /// Human readable name of the kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Component => "Component",
            Self::Effect => "Effect",
            Self::RenderEffect => "Render Effect",
            Self::Memo => "Memo",
            Self::Computation => "Computation",
            Self::Refresh => "Refresh",
            Self::Context => "Context",
            Self::Signal => "Signal",
        }
    }

    /// Whether nodes of this kind re-run.
    pub fn is_computation(&self) -> bool {
        !matches!(self, Self::Root | Self::Signal)
    }
}

/// Write-once annotations the inspector stamps onto a live node.
///
/// The slot lives on the node itself, so it is dropped together with the
/// node and never extends its lifetime.
#[derive(Debug, Default)]
pub struct NodeSlot {
    id: OnceLock<NodeId>,
    kind: OnceLock<NodeKind>,
}

impl NodeSlot {
    /// The stamped ID, if the node was ever visited.
    pub fn id(&self) -> Option<&NodeId> {
        self.id.get()
    }

    /// The stamped ID, stamping `init()` on first call.
    pub fn id_or_init(&self, init: impl FnOnce() -> NodeId) -> &NodeId {
        self.id.get_or_init(init)
    }

    /// The cached classification, if any.
    pub fn kind(&self) -> Option<NodeKind> {
        self.kind.get().copied()
    }

    /// The cached classification, classifying with `init()` on first call.
    pub fn kind_or_init(&self, init: impl FnOnce() -> NodeKind) -> NodeKind {
        *self.kind.get_or_init(init)
    }
}

/// Component metadata carried by component owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Raw component name, possibly carrying a hot-reload prefix.
    pub name: String,
}

/// A handle to something a component rendered (an element, a widget).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: u64,
    pub tag: String,
}

impl ElementHandle {
    pub fn new(id: u64, tag: impl Into<String>) -> Self {
        Self { id, tag: tag.into() }
    }
}

/// Structural traits of an owner. The walker classifies owners from these,
/// the same way it would inspect an untyped runtime object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerTraits {
    /// Has a function that re-runs. Owners without one are roots.
    pub computation: bool,
    /// Pure computations derive values; impure ones are effects.
    pub pure: bool,
    /// Created by user code (as opposed to the renderer).
    pub user: bool,
    /// Provides a context value.
    pub context: bool,
    /// Has an equality comparator, which together with `pure` marks a memo.
    pub comparator: bool,
    /// Present on component owners.
    pub component: Option<ComponentInfo>,
}

impl OwnerTraits {
    /// Traits of a root.
    pub fn root() -> Self {
        Self::default()
    }

    /// A pure computation.
    pub fn computation() -> Self {
        Self {
            computation: true,
            pure: true,
            ..Self::default()
        }
    }

    /// A memo.
    pub fn memo() -> Self {
        Self {
            comparator: true,
            ..Self::computation()
        }
    }

    /// A renderer-created effect.
    pub fn render_effect() -> Self {
        Self {
            computation: true,
            ..Self::default()
        }
    }

    /// A user effect.
    pub fn effect() -> Self {
        Self {
            user: true,
            ..Self::render_effect()
        }
    }

    /// A context provider.
    pub fn context() -> Self {
        Self {
            context: true,
            ..Self::render_effect()
        }
    }

    /// A component. Components are memos with component info attached.
    pub fn component(name: impl Into<String>) -> Self {
        Self {
            component: Some(ComponentInfo { name: name.into() }),
            ..Self::memo()
        }
    }
}

// ----------------------------------------------------------------------------
// Owner
// ----------------------------------------------------------------------------

struct OwnerInner {
    slot: NodeSlot,
    name: Option<String>,
    traits: OwnerTraits,
    internal: bool,
    parent: RwLock<Weak<OwnerInner>>,
    owned: RwLock<Vec<Owner>>,
    signals: RwLock<Vec<Signal>>,
    sources: RwLock<Vec<GraphNode>>,
    /// Computations reading this owner's value (memos only).
    observers: RwLock<Vec<Weak<OwnerInner>>>,
    value: RwLock<Option<Value>>,
    rendered: RwLock<Vec<ElementHandle>>,
    hooks: HookSet,
    disposed: AtomicBool,
}

/// A node of the ownership tree.
///
/// # Example
///
/// ```rust
/// use lattice_devtools::graph::{value, Owner, OwnerTraits};
///
/// let root = Owner::root(Some("app"));
/// let count = root.create_signal(Some("count"), value(0_i64));
/// let effect = root.create_child(OwnerTraits::effect(), Some("log"));
/// effect.track(&count.clone().into());
///
/// assert_eq!(count.observers().len(), 1);
/// ```
#[derive(Clone)]
pub struct Owner {
    inner: Arc<OwnerInner>,
}

impl Owner {
    fn with_parent(
        name: Option<&str>,
        traits: OwnerTraits,
        internal: bool,
        parent: Weak<OwnerInner>,
    ) -> Self {
        Self {
            inner: Arc::new(OwnerInner {
                slot: NodeSlot::default(),
                name: name.map(str::to_owned),
                traits,
                internal,
                parent: RwLock::new(parent),
                owned: RwLock::new(Vec::new()),
                signals: RwLock::new(Vec::new()),
                sources: RwLock::new(Vec::new()),
                observers: RwLock::new(Vec::new()),
                value: RwLock::new(None),
                rendered: RwLock::new(Vec::new()),
                hooks: HookSet::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a detached, top-level root.
    pub fn root(name: Option<&str>) -> Self {
        Self::with_parent(name, OwnerTraits::root(), false, Weak::new())
    }

    /// Create a root that points at `parent` without being owned by it.
    ///
    /// This is how a runtime creates roots inside a running computation:
    /// the parent does not list the root in its `owned` children, so the
    /// root is invisible to a walk of the parent until it is attached as a
    /// sub-root.
    pub fn root_under(parent: &Owner, name: Option<&str>) -> Self {
        Self::with_parent(
            name,
            OwnerTraits::root(),
            false,
            Arc::downgrade(&parent.inner),
        )
    }

    /// Create a root used by tooling itself. Internal roots are never
    /// registered with the debugger.
    pub fn internal_root() -> Self {
        Self::with_parent(None, OwnerTraits::root(), true, Weak::new())
    }

    /// Create an owned child.
    pub fn create_child(&self, traits: OwnerTraits, name: Option<&str>) -> Owner {
        let child = Self::with_parent(name, traits, false, Arc::downgrade(&self.inner));
        self.inner.owned.write().push(child.clone());
        child
    }

    /// Append an existing owner to this owner's `owned` children and point
    /// its parent here. The child is not removed from any other list.
    pub fn adopt(&self, child: &Owner) {
        *child.inner.parent.write() = Arc::downgrade(&self.inner);
        self.inner.owned.write().push(child.clone());
    }

    /// Declare a signal inside this owner.
    pub fn create_signal(&self, name: Option<&str>, initial: Value) -> Signal {
        let signal = Signal::with_graph(name, initial, Arc::downgrade(&self.inner));
        self.inner.signals.write().push(signal.clone());
        signal
    }

    /// Record that this computation reads `source`.
    pub fn track(&self, source: &GraphNode) {
        if self.inner.sources.read().iter().any(|s| s.ptr_eq(source)) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        match source {
            GraphNode::Signal(signal) => signal.inner.observers.write().push(weak),
            GraphNode::Owner(owner) => owner.inner.observers.write().push(weak),
        }
        self.inner.sources.write().push(source.clone());
    }

    /// Drop every source edge of this computation.
    pub fn untrack_all(&self) {
        let sources = std::mem::take(&mut *self.inner.sources.write());
        let weak = Arc::downgrade(&self.inner);
        for source in sources {
            let observers = match &source {
                GraphNode::Signal(signal) => &signal.inner.observers,
                GraphNode::Owner(owner) => &owner.inner.observers,
            };
            observers.write().retain(|o| !Weak::ptr_eq(o, &weak));
        }
    }

    /// Re-run this computation.
    ///
    /// Owned children and declared signals are disposed and sources are
    /// cleared, then `body` rebuilds them. Hooks fire with
    /// [`HookEvent::Ran`] once the body returns.
    pub fn rerun<F>(&self, body: F)
    where
        F: FnOnce(&Owner),
    {
        if self.is_disposed() {
            return;
        }

        let children = std::mem::take(&mut *self.inner.owned.write());
        for child in children {
            child.dispose();
        }
        let signals = std::mem::take(&mut *self.inner.signals.write());
        for signal in signals {
            signal.dispose();
        }
        self.untrack_all();

        body(self);

        self.inner.hooks.fire(&HookEvent::Ran);
    }

    /// Write this owner's value (memos and components) and notify hooks.
    pub fn set_value(&self, next: Value) {
        let previous = self.inner.value.write().replace(Arc::clone(&next));
        let previous = previous.unwrap_or_else(|| value(()));
        self.inner.hooks.fire(&HookEvent::ValueChanged {
            value: next,
            previous,
        });
    }

    /// Replace the element handles a component rendered.
    pub fn set_rendered(&self, elements: Vec<ElementHandle>) {
        *self.inner.rendered.write() = elements;
    }

    /// Dispose this owner and its subtree.
    ///
    /// Disposed nodes keep their stamped ID but never fire hooks again.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let children = std::mem::take(&mut *self.inner.owned.write());
        for child in children {
            child.dispose();
        }
        let signals = std::mem::take(&mut *self.inner.signals.write());
        for signal in signals {
            signal.dispose();
        }
        self.untrack_all();
        self.inner.hooks.clear();

        if let Some(parent) = self.parent() {
            parent
                .inner
                .owned
                .write()
                .retain(|child| !Arc::ptr_eq(&child.inner, &self.inner));
        }
    }

    /// Name given at creation.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Structural traits.
    pub fn traits(&self) -> &OwnerTraits {
        &self.inner.traits
    }

    /// Whether this is a tooling root.
    pub fn is_internal(&self) -> bool {
        self.inner.internal
    }

    /// Whether this owner has no re-running function.
    pub fn is_root(&self) -> bool {
        !self.inner.traits.computation
    }

    /// Whether this owner is a memo (pure computation with a comparator).
    pub fn is_memo(&self) -> bool {
        let traits = &self.inner.traits;
        traits.computation && traits.pure && traits.comparator
    }

    /// The parent owner, if alive.
    pub fn parent(&self) -> Option<Owner> {
        self.inner.parent.read().upgrade().map(|inner| Owner { inner })
    }

    /// Owned children, in creation order.
    pub fn owned(&self) -> Vec<Owner> {
        self.inner.owned.read().clone()
    }

    /// Signals declared in this owner.
    pub fn signals(&self) -> Vec<Signal> {
        self.inner.signals.read().clone()
    }

    /// Nodes this computation reads.
    pub fn sources(&self) -> Vec<GraphNode> {
        self.inner.sources.read().clone()
    }

    /// Live computations reading this owner's value.
    pub fn observers(&self) -> Vec<Owner> {
        upgrade_all(&self.inner.observers.read())
    }

    /// Current value, if one was ever written.
    pub fn value(&self) -> Option<Value> {
        self.inner.value.read().clone()
    }

    /// Element handles the component rendered.
    pub fn rendered(&self) -> Vec<ElementHandle> {
        self.inner.rendered.read().clone()
    }

    /// Whether the owner was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Inspector annotations.
    pub fn slot(&self) -> &NodeSlot {
        &self.inner.slot
    }

    /// Install `hook` under `tag`. Returns `false` when the owner is disposed.
    pub fn subscribe(&self, tag: HookTag, hook: Hook) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.inner.hooks.insert(tag, hook);
        true
    }

    /// Remove the hook installed under `tag`.
    pub fn unsubscribe(&self, tag: &HookTag) -> bool {
        self.inner.hooks.remove(tag)
    }

    /// The owner's hook set.
    pub fn hooks(&self) -> &HookSet {
        &self.inner.hooks
    }

    /// A weak handle.
    pub fn downgrade(&self) -> WeakOwner {
        WeakOwner(Arc::downgrade(&self.inner))
    }

    /// Whether both handles point at the same owner.
    pub fn ptr_eq(&self, other: &Owner) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.slot().id())
            .field("name", &self.name())
            .field("kind", &self.slot().kind())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A non-owning owner handle.
#[derive(Clone, Default)]
pub struct WeakOwner(Weak<OwnerInner>);

impl WeakOwner {
    /// The owner, if it is still allocated.
    pub fn upgrade(&self) -> Option<Owner> {
        self.0.upgrade().map(|inner| Owner { inner })
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &WeakOwner) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakOwner")
    }
}

fn upgrade_all(observers: &[Weak<OwnerInner>]) -> Vec<Owner> {
    observers
        .iter()
        .filter_map(Weak::upgrade)
        .map(|inner| Owner { inner })
        .collect()
}

// ----------------------------------------------------------------------------
// Signal
// ----------------------------------------------------------------------------

struct SignalInner {
    slot: NodeSlot,
    name: Option<String>,
    value: RwLock<Value>,
    observers: RwLock<Vec<Weak<OwnerInner>>>,
    graph: Weak<OwnerInner>,
    hooks: HookSet,
    disposed: AtomicBool,
}

/// A reactive value cell.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    fn with_graph(name: Option<&str>, initial: Value, graph: Weak<OwnerInner>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                slot: NodeSlot::default(),
                name: name.map(str::to_owned),
                value: RwLock::new(initial),
                observers: RwLock::new(Vec::new()),
                graph,
                hooks: HookSet::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a signal that is not declared in any owner.
    pub fn new(name: Option<&str>, initial: Value) -> Self {
        Self::with_graph(name, initial, Weak::new())
    }

    /// Current value.
    pub fn get(&self) -> Value {
        Arc::clone(&self.inner.value.read())
    }

    /// Write a new value and notify hooks.
    pub fn set(&self, value: Value) {
        let previous = std::mem::replace(&mut *self.inner.value.write(), Arc::clone(&value));
        self.inner
            .hooks
            .fire(&HookEvent::ValueChanged { value, previous });
    }

    /// Name given at creation.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Live computations reading this signal.
    pub fn observers(&self) -> Vec<Owner> {
        upgrade_all(&self.inner.observers.read())
    }

    /// The owner that declared this signal, if alive.
    pub fn graph_owner(&self) -> Option<Owner> {
        self.inner.graph.upgrade().map(|inner| Owner { inner })
    }

    /// Mark the signal disposed and drop its hooks.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.hooks.clear();
        }
    }

    /// Whether the signal was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Inspector annotations.
    pub fn slot(&self) -> &NodeSlot {
        &self.inner.slot
    }

    /// Install `hook` under `tag`. Returns `false` when the signal is disposed.
    pub fn subscribe(&self, tag: HookTag, hook: Hook) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.inner.hooks.insert(tag, hook);
        true
    }

    /// Remove the hook installed under `tag`.
    pub fn unsubscribe(&self, tag: &HookTag) -> bool {
        self.inner.hooks.remove(tag)
    }

    /// The signal's hook set.
    pub fn hooks(&self) -> &HookSet {
        &self.inner.hooks
    }

    /// Whether both handles point at the same signal.
    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.slot().id())
            .field("name", &self.name())
            .field("observer_count", &self.inner.observers.read().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Any node
// ----------------------------------------------------------------------------

/// Either kind of node. Dependency edges point at `GraphNode`s because a
/// computation can read plain signals and memos alike.
#[derive(Clone, Debug)]
pub enum GraphNode {
    Owner(Owner),
    Signal(Signal),
}

impl GraphNode {
    /// Inspector annotations.
    pub fn slot(&self) -> &NodeSlot {
        match self {
            Self::Owner(owner) => owner.slot(),
            Self::Signal(signal) => signal.slot(),
        }
    }

    /// Name given at creation. Components report their component name.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Owner(owner) => owner
                .traits()
                .component
                .as_ref()
                .map(|c| c.name.as_str())
                .or_else(|| owner.name()),
            Self::Signal(signal) => signal.name(),
        }
    }

    /// Whether the node was disposed.
    pub fn is_disposed(&self) -> bool {
        match self {
            Self::Owner(owner) => owner.is_disposed(),
            Self::Signal(signal) => signal.is_disposed(),
        }
    }

    /// Nodes this node reads. Signals have none.
    pub fn sources(&self) -> Vec<GraphNode> {
        match self {
            Self::Owner(owner) => owner.sources(),
            Self::Signal(_) => Vec::new(),
        }
    }

    /// Computations reading this node. Only signals and memos have observers.
    pub fn observers(&self) -> Vec<Owner> {
        match self {
            Self::Owner(owner) => owner.observers(),
            Self::Signal(signal) => signal.observers(),
        }
    }

    /// Whether this node has a value other computations can read.
    pub fn is_readable(&self) -> bool {
        match self {
            Self::Owner(owner) => owner.is_memo(),
            Self::Signal(_) => true,
        }
    }

    /// Install `hook` under `tag`.
    pub fn subscribe(&self, tag: HookTag, hook: Hook) -> bool {
        match self {
            Self::Owner(owner) => owner.subscribe(tag, hook),
            Self::Signal(signal) => signal.subscribe(tag, hook),
        }
    }

    /// Remove the hook installed under `tag`.
    pub fn unsubscribe(&self, tag: &HookTag) -> bool {
        match self {
            Self::Owner(owner) => owner.unsubscribe(tag),
            Self::Signal(signal) => signal.unsubscribe(tag),
        }
    }

    /// The node's hook set.
    pub fn hooks(&self) -> &HookSet {
        match self {
            Self::Owner(owner) => owner.hooks(),
            Self::Signal(signal) => signal.hooks(),
        }
    }

    /// A weak handle.
    pub fn downgrade(&self) -> WeakNode {
        match self {
            Self::Owner(owner) => WeakNode::Owner(owner.downgrade()),
            Self::Signal(signal) => WeakNode::Signal(WeakSignal(Arc::downgrade(&signal.inner))),
        }
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &GraphNode) -> bool {
        match (self, other) {
            (Self::Owner(a), Self::Owner(b)) => a.ptr_eq(b),
            (Self::Signal(a), Self::Signal(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The owner, if this is one.
    pub fn as_owner(&self) -> Option<&Owner> {
        match self {
            Self::Owner(owner) => Some(owner),
            Self::Signal(_) => None,
        }
    }
}

impl From<Owner> for GraphNode {
    fn from(owner: Owner) -> Self {
        Self::Owner(owner)
    }
}

impl From<Signal> for GraphNode {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

/// A non-owning handle to either kind of node.
#[derive(Clone)]
pub enum WeakNode {
    Owner(WeakOwner),
    Signal(WeakSignal),
}

/// A non-owning signal handle.
#[derive(Clone)]
pub struct WeakSignal(Weak<SignalInner>);

impl WeakSignal {
    /// The signal, if it is still allocated.
    pub fn upgrade(&self) -> Option<Signal> {
        self.0.upgrade().map(|inner| Signal { inner })
    }
}

impl WeakNode {
    /// The node, if it is still allocated.
    pub fn upgrade(&self) -> Option<GraphNode> {
        match self {
            Self::Owner(owner) => owner.upgrade().map(GraphNode::Owner),
            Self::Signal(signal) => signal.upgrade().map(GraphNode::Signal),
        }
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner(_) => f.write_str("WeakNode::Owner"),
            Self::Signal(_) => f.write_str("WeakNode::Signal"),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn counter() -> (Arc<AtomicI32>, Hook) {
        let count = Arc::new(AtomicI32::new(0));
        let clone = Arc::clone(&count);
        let hook: Hook = Arc::new(move |_: &HookEvent| {
            clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, hook)
    }

    #[test]
    fn children_are_owned_in_creation_order() {
        let root = Owner::root(None);
        let a = root.create_child(OwnerTraits::computation(), Some("a"));
        let b = root.create_child(OwnerTraits::effect(), Some("b"));

        let owned = root.owned();
        assert_eq!(owned.len(), 2);
        assert!(owned[0].ptr_eq(&a));
        assert!(owned[1].ptr_eq(&b));
        assert!(a.parent().unwrap().ptr_eq(&root));
    }

    #[test]
    fn tracking_links_sources_and_observers() {
        let root = Owner::root(None);
        let signal = root.create_signal(Some("s"), value(1_i64));
        let memo = root.create_child(OwnerTraits::memo(), Some("m"));
        let effect = root.create_child(OwnerTraits::effect(), Some("e"));

        memo.track(&signal.clone().into());
        effect.track(&memo.clone().into());
        effect.track(&memo.clone().into());

        assert_eq!(signal.observers().len(), 1);
        assert_eq!(memo.observers().len(), 1);
        assert_eq!(effect.sources().len(), 1);

        effect.untrack_all();
        assert!(memo.observers().is_empty());
        assert!(effect.sources().is_empty());
    }

    #[test]
    fn rerun_rebuilds_children_and_fires_hooks() {
        let root = Owner::root(None);
        let comp = root.create_child(OwnerTraits::computation(), None);
        let first = comp.create_child(OwnerTraits::computation(), None);
        let (count, hook) = counter();
        comp.subscribe(HookTag::Inspector, hook);

        comp.rerun(|owner| {
            owner.create_child(OwnerTraits::computation(), None);
            owner.create_child(OwnerTraits::computation(), None);
        });

        assert!(first.is_disposed());
        assert_eq!(comp.owned().len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_set_fires_value_hooks() {
        let signal = Signal::new(Some("s"), value(1_i64));
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        signal.subscribe(
            HookTag::Inspector,
            Arc::new(move |event: &HookEvent| {
                if let HookEvent::ValueChanged { value, previous } = event {
                    let value = *value.downcast_ref::<i64>().unwrap();
                    let previous = *previous.downcast_ref::<i64>().unwrap();
                    seen_clone.write().push((previous, value));
                }
            }),
        );

        signal.set(value(2_i64));
        signal.set(value(3_i64));

        assert_eq!(*seen.read(), vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn disposed_nodes_refuse_hooks() {
        let root = Owner::root(None);
        let comp = root.create_child(OwnerTraits::computation(), None);
        let (count, hook) = counter();
        comp.subscribe(HookTag::Inspector, Arc::clone(&hook));

        comp.dispose();
        assert!(root.owned().is_empty());
        assert!(!comp.subscribe(HookTag::Inspector, hook));

        comp.rerun(|_| {});
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn weak_handles_do_not_keep_nodes_alive() {
        let root = Owner::root(None);
        let weak = root.downgrade();
        assert!(weak.upgrade().is_some());
        drop(root);
        assert!(weak.upgrade().is_none());
    }
}
