//! Dependency Graph Extraction
//!
//! Extracts the sources and observers reachable from one focused node, and
//! keeps watching them so the graph can be re-published when any of them
//! updates.
//!
//! # Overview
//!
//! Extraction runs two breadth-first traversals from the focused node:
//!
//! - upwards over `sources` (what the node reads, transitively);
//! - downwards over `observers` (what reads the node, transitively).
//!
//! Each traversal carries its own visited set, so diamonds and cycles are
//! visited once. Every node added to the graph gets a
//! [`HookTag::DependencyGraph`] hook; [`Teardown`] removes exactly those.
//!
//! The depth of a node is its distance from the top of its ownership chain.
//! Depths are memoized per extraction in an [`ExtractionContext`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DebuggerError, Result};
use crate::graph::{GraphNode, HookEvent, HookTag, NodeKind};
use crate::identity::{IdentityRegistry, NodeId};
use crate::observe::Subscriptions;
use crate::schedule::Throttle;
use crate::walker::{display_name_of, kind_of};

/// Where a node sits in the ownership tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Depth {
    /// The top-level root of the node's ownership chain.
    pub root: NodeId,
    /// Steps from that root down to the node.
    pub distance: usize,
}

/// One node of a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DGraphNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub depth: Option<Depth>,
    /// Present on computations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<NodeId>>,
    /// Present on signals and memos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observers: Option<Vec<NodeId>>,
}

/// A dependency graph, in discovery order.
pub type DGraph = IndexMap<NodeId, DGraphNode>;

/// Called with the ID of a graph node that re-ran or changed value.
pub type NodeUpdateHandler = Arc<dyn Fn(NodeId) + Send + Sync>;

/// Removes the hooks one extraction installed.
#[derive(Debug, Default)]
pub struct Teardown {
    subscriptions: Subscriptions,
}

impl Teardown {
    /// Remove the hooks. Later calls do nothing.
    pub fn run(&mut self) {
        self.subscriptions.release();
    }

    /// Whether no hooks remain.
    pub fn is_done(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Result of one extraction.
#[derive(Debug)]
pub struct Collected {
    pub graph: DGraph,
    pub teardown: Teardown,
}

/// State of one extraction.
pub struct ExtractionContext<'r> {
    registry: &'r mut IdentityRegistry,
    graph: DGraph,
    depths: HashMap<NodeId, Option<Depth>>,
    subscriptions: Subscriptions,
    tag: HookTag,
    on_update: NodeUpdateHandler,
}

impl<'r> ExtractionContext<'r> {
    pub fn new(
        registry: &'r mut IdentityRegistry,
        generation: u64,
        on_update: NodeUpdateHandler,
    ) -> Self {
        Self {
            registry,
            graph: DGraph::new(),
            depths: HashMap::new(),
            subscriptions: Subscriptions::new(),
            tag: HookTag::DependencyGraph(generation),
            on_update,
        }
    }

    /// Depth of `node`, memoized along its whole ownership chain.
    pub fn depth_of(&mut self, node: &GraphNode) -> Option<Depth> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(node.clone());
        let mut base = None;

        while let Some(current) = cursor.take() {
            let id = self.registry.id_of(&current);
            if let Some(known) = self.depths.get(&id) {
                base = known.clone();
                break;
            }
            if !seen.insert(id.clone()) {
                break;
            }
            match &current {
                GraphNode::Owner(owner) => match owner.parent() {
                    None if owner.is_root() => {
                        base = Some(Depth {
                            root: id.clone(),
                            distance: 0,
                        });
                        self.depths.insert(id, base.clone());
                    }
                    parent => {
                        chain.push(id);
                        cursor = parent.map(GraphNode::Owner);
                    }
                },
                GraphNode::Signal(signal) => {
                    chain.push(id);
                    cursor = signal.graph_owner().map(GraphNode::Owner);
                }
            }
        }

        for id in chain.into_iter().rev() {
            base = base.map(|depth| Depth {
                root: depth.root,
                distance: depth.distance + 1,
            });
            self.depths.insert(id, base.clone());
        }
        base
    }

    /// Add `node` to the graph and observe it. Returns `false` if it was
    /// already present.
    fn add(&mut self, node: &GraphNode) -> bool {
        let id = self.registry.id_of(node);
        if self.graph.contains_key(&id) {
            return false;
        }

        let on_update = Arc::clone(&self.on_update);
        let hook_id = id.clone();
        self.subscriptions.observe(
            id.clone(),
            node,
            self.tag.clone(),
            Arc::new(move |_: &HookEvent| on_update(hook_id.clone())),
        );

        let depth = self.depth_of(node);
        let sources = node.as_owner().map(|owner| {
            owner
                .sources()
                .iter()
                .map(|source| self.registry.id_of(source))
                .collect()
        });
        let observers = node.is_readable().then(|| {
            node.observers()
                .into_iter()
                .map(|observer| self.registry.id_of(&observer.into()))
                .collect()
        });

        self.graph.insert(
            id,
            DGraphNode {
                name: display_name_of(node),
                kind: kind_of(node),
                depth,
                sources,
                observers,
            },
        );
        true
    }

    fn visit_sources(&mut self, focused: &GraphNode) {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<GraphNode> = focused.sources().into();

        while let Some(node) = queue.pop_front() {
            let id = self.registry.id_of(&node);
            if !visited.insert(id) {
                continue;
            }
            self.add(&node);
            queue.extend(node.sources());
        }
    }

    fn visit_observers(&mut self, focused: &GraphNode) {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<GraphNode> = focused
            .observers()
            .into_iter()
            .map(GraphNode::Owner)
            .collect();

        while let Some(node) = queue.pop_front() {
            let id = self.registry.id_of(&node);
            if !visited.insert(id) {
                continue;
            }
            self.add(&node);
            queue.extend(node.observers().into_iter().map(GraphNode::Owner));
        }
    }

    fn finish(self) -> Collected {
        Collected {
            graph: self.graph,
            teardown: Teardown {
                subscriptions: self.subscriptions,
            },
        }
    }
}

/// Extract the dependency graph around `focused`.
pub fn collect(
    focused: &GraphNode,
    registry: &mut IdentityRegistry,
    generation: u64,
    on_update: NodeUpdateHandler,
) -> Collected {
    let mut ctx = ExtractionContext::new(registry, generation, on_update);
    ctx.add(focused);
    ctx.visit_sources(focused);
    ctx.visit_observers(focused);
    ctx.finish()
}

/// Lifecycle of the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    /// No graph: nothing focused, or the focus has no dependencies to show.
    Idle,
    Collecting,
    /// A graph was published and its nodes are watched.
    Observing,
}

/// Keeps the dependency graph of the focused node current.
pub struct DependencyGraphExtractor {
    state: ExtractorState,
    focus: Option<GraphNode>,
    teardown: Option<Teardown>,
    generation: u64,
    throttle: Throttle,
    on_update: NodeUpdateHandler,
}

impl DependencyGraphExtractor {
    pub fn new(interval: Duration, on_update: NodeUpdateHandler) -> Self {
        Self {
            state: ExtractorState::Idle,
            focus: None,
            teardown: None,
            generation: 0,
            throttle: Throttle::new(interval),
            on_update,
        }
    }

    /// Change the focused node and extract its graph right away.
    pub fn set_focus(
        &mut self,
        focus: Option<GraphNode>,
        registry: &mut IdentityRegistry,
    ) -> Option<DGraph> {
        self.focus = focus;
        self.throttle.cancel();
        self.extract(registry)
    }

    /// Re-extract the graph of the current focus.
    ///
    /// Roots, components and disposed nodes have no graph.
    pub fn extract(&mut self, registry: &mut IdentityRegistry) -> Option<DGraph> {
        self.release();
        self.state = ExtractorState::Collecting;

        let Some(focus) = self.focus.clone() else {
            self.state = ExtractorState::Idle;
            return None;
        };
        if let Err(err) = Self::check_focus(&focus, registry) {
            debug!(%err, "no dependency graph for focus");
            self.state = ExtractorState::Idle;
            return None;
        }

        self.generation += 1;
        let collected = collect(&focus, registry, self.generation, Arc::clone(&self.on_update));
        debug!(
            generation = self.generation,
            nodes = collected.graph.len(),
            "extracted dependency graph"
        );

        self.teardown = Some(collected.teardown);
        self.state = ExtractorState::Observing;
        Some(collected.graph)
    }

    fn check_focus(node: &GraphNode, registry: &mut IdentityRegistry) -> Result<()> {
        if node.is_disposed() {
            return Err(DebuggerError::StaleReference(registry.id_of(node)));
        }
        if matches!(kind_of(node), NodeKind::Root | NodeKind::Component) {
            return Err(DebuggerError::NotAComputation(registry.id_of(node)));
        }
        Ok(())
    }

    /// Request a throttled re-extraction.
    pub fn schedule_refresh(&mut self, now: Instant) {
        if self.state == ExtractorState::Observing {
            self.throttle.trigger(now);
        }
    }

    /// Run a due re-extraction. The outer `Option` is `None` when nothing ran.
    pub fn poll(
        &mut self,
        now: Instant,
        registry: &mut IdentityRegistry,
    ) -> Option<Option<DGraph>> {
        if !self.throttle.take_due(now) {
            return None;
        }
        Some(self.extract(registry))
    }

    /// Drop the focus and every installed hook.
    pub fn clear(&mut self) {
        self.release();
        self.focus = None;
        self.throttle.cancel();
        self.state = ExtractorState::Idle;
    }

    fn release(&mut self) {
        if let Some(mut teardown) = self.teardown.take() {
            teardown.run();
        }
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for DependencyGraphExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraphExtractor")
            .field("state", &self.state)
            .field("focus", &self.focus)
            .field("generation", &self.generation)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{value, Owner, OwnerTraits, Signal};
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<NodeId>>>, NodeUpdateHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let clone = Arc::clone(&seen);
        (seen, Arc::new(move |id| clone.lock().push(id)))
    }

    /// root
    /// ├─ s (signal)
    /// ├─ left  (memo, reads s)
    /// ├─ right (memo, reads s)
    /// └─ sink  (effect, reads left and right)
    struct Diamond {
        root: Owner,
        s: Signal,
        left: Owner,
        right: Owner,
        sink: Owner,
    }

    fn diamond() -> Diamond {
        let root = Owner::root(Some("root"));
        let s = root.create_signal(Some("s"), value(1_i32));
        let left = root.create_child(OwnerTraits::memo(), Some("left"));
        let right = root.create_child(OwnerTraits::memo(), Some("right"));
        let sink = root.create_child(OwnerTraits::effect(), Some("sink"));
        left.track(&s.clone().into());
        right.track(&s.clone().into());
        sink.track(&left.clone().into());
        sink.track(&right.clone().into());
        Diamond { root, s, left, right, sink }
    }

    #[test]
    fn diamond_is_visited_once_per_node() {
        let d = diamond();
        let mut registry = IdentityRegistry::new();
        let (_, handler) = recorder();

        let collected = collect(&d.sink.clone().into(), &mut registry, 1, handler);
        assert_eq!(collected.graph.len(), 4);

        let s_id = registry.id_of(&d.s.clone().into());
        let s_node = &collected.graph[&s_id];
        assert_eq!(s_node.kind, NodeKind::Signal);
        assert_eq!(s_node.observers.as_ref().map(Vec::len), Some(2));
        assert!(s_node.sources.is_none());

        let sink_id = registry.id_of(&d.sink.clone().into());
        let sink_node = &collected.graph[&sink_id];
        assert!(sink_node.observers.is_none());
        assert_eq!(sink_node.sources.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn memo_focus_collects_both_directions() {
        let d = diamond();
        let mut registry = IdentityRegistry::new();
        let (_, handler) = recorder();

        let collected = collect(&d.left.clone().into(), &mut registry, 1, handler);
        let ids: Vec<NodeId> = collected.graph.keys().cloned().collect();
        assert_eq!(
            ids,
            vec![
                registry.id_of(&d.left.clone().into()),
                registry.id_of(&d.s.clone().into()),
                registry.id_of(&d.sink.clone().into()),
            ]
        );
        let left = &collected.graph[&ids[0]];
        assert!(left.sources.is_some() && left.observers.is_some());
    }

    #[test]
    fn depth_counts_steps_from_the_top_root() {
        let d = diamond();
        let nested = d.sink.create_child(OwnerTraits::computation(), None);
        let sub = Owner::root_under(&nested, None);
        let deep = sub.create_child(OwnerTraits::computation(), None);

        let mut registry = IdentityRegistry::new();
        let (_, handler) = recorder();
        let mut ctx = ExtractionContext::new(&mut registry, 1, handler);

        let root_id = ctx.registry.id_of(&d.root.clone().into());
        let expect = |distance| Some(Depth { root: root_id.clone(), distance });
        assert_eq!(ctx.depth_of(&deep.clone().into()), expect(4));
        assert_eq!(ctx.depth_of(&d.s.clone().into()), expect(1));
        assert_eq!(ctx.depth_of(&nested.into()), expect(2));
        assert_eq!(ctx.depth_of(&d.root.clone().into()), expect(0));
    }

    #[test]
    fn updates_fire_until_teardown() {
        let d = diamond();
        let mut registry = IdentityRegistry::new();
        let (seen, handler) = recorder();

        let mut collected = collect(&d.sink.clone().into(), &mut registry, 7, handler);
        d.s.set(value(2_i32));
        d.right.rerun(|_| {});
        assert_eq!(seen.lock().len(), 2);

        collected.teardown.run();
        collected.teardown.run();
        assert!(collected.teardown.is_done());
        d.s.set(value(3_i32));
        assert_eq!(seen.lock().len(), 2);
        assert!(d.s.hooks().is_empty());
    }

    #[test]
    fn roots_and_components_have_no_graph() {
        let d = diamond();
        let comp = d.root.create_child(OwnerTraits::component("App"), None);
        let mut registry = IdentityRegistry::new();
        let (_, handler) = recorder();
        let mut extractor = DependencyGraphExtractor::new(Duration::from_millis(200), handler);

        assert!(extractor.set_focus(Some(d.root.clone().into()), &mut registry).is_none());
        assert_eq!(extractor.state(), ExtractorState::Idle);
        assert!(extractor.set_focus(Some(comp.into()), &mut registry).is_none());

        assert!(extractor.set_focus(Some(d.left.clone().into()), &mut registry).is_some());
        assert_eq!(extractor.state(), ExtractorState::Observing);
    }

    #[test]
    fn refocusing_tears_down_the_previous_graph() {
        let d = diamond();
        let mut registry = IdentityRegistry::new();
        let (_, handler) = recorder();
        let mut extractor = DependencyGraphExtractor::new(Duration::from_millis(200), handler);

        extractor.set_focus(Some(d.sink.clone().into()), &mut registry);
        assert!(d.left.hooks().contains(&HookTag::DependencyGraph(1)));

        extractor.set_focus(Some(d.s.clone().into()), &mut registry);
        assert!(!d.left.hooks().contains(&HookTag::DependencyGraph(1)));
        assert!(d.left.hooks().contains(&HookTag::DependencyGraph(2)));

        extractor.clear();
        assert!(d.left.hooks().is_empty());
        assert_eq!(extractor.state(), ExtractorState::Idle);
    }

    #[test]
    fn refresh_is_throttled() {
        let d = diamond();
        let mut registry = IdentityRegistry::new();
        let (_, handler) = recorder();
        let mut extractor = DependencyGraphExtractor::new(Duration::from_millis(200), handler);
        extractor.set_focus(Some(d.sink.clone().into()), &mut registry);

        let start = Instant::now();
        extractor.schedule_refresh(start);
        extractor.schedule_refresh(start + Duration::from_millis(50));
        assert!(extractor.poll(start + Duration::from_millis(100), &mut registry).is_none());

        let refreshed = extractor.poll(start + Duration::from_millis(200), &mut registry);
        assert!(matches!(refreshed, Some(Some(graph)) if graph.len() == 4));
        assert_eq!(extractor.generation(), 2);
    }
}
