//! Debugger
//!
//! Ties the pieces together: tracked roots are walked into the structure
//! mirror, computation re-runs are batched into node updates, and the focused
//! owner is inspected and its dependency graph kept current.
//!
//! # Flow
//!
//! Hooks fire synchronously on the host thread and only record into a shared
//! inbox. Everything else happens in [`Debugger::tick`]:
//!
//! 1. drain the inbox, marking roots whose structure changed;
//! 2. drop disposed roots;
//! 3. re-walk dirty roots once the structure throttle is due and send the
//!    reconciled changes;
//! 4. flush node updates, inspector updates and dependency graph refreshes
//!    that are due.
//!
//! Every output goes through the [`Transport`].

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::batch::BatchedUpdates;
use crate::config::DebuggerConfig;
use crate::dgraph::DependencyGraphExtractor;
use crate::encode::{BasicEncoder, ValueEncoder};
use crate::graph::{GraphNode, Owner};
use crate::identity::{IdentityRegistry, NodeId};
use crate::inspector::Inspector;
use crate::protocol::{
    FocusRequest, InputMessage, MappedComponent, MappedRoot, OutputMessage, StructureUpdates,
    ValueItemId,
};
use crate::roots::Roots;
use crate::schedule::Throttle;
use crate::structure::Structure;
use crate::transport::Transport;
use crate::walker::{walk, ComputationFire, ComputationHandler, TreeWalkerMode, WalkConfig};

/// Events recorded by hooks between ticks.
#[derive(Debug, Default)]
struct Inbox {
    fires: Vec<ComputationFire>,
    dgraph: Vec<NodeId>,
}

/// Mirrors a host owner graph to a [`Transport`].
pub struct Debugger<T: Transport> {
    config: DebuggerConfig,
    enabled: bool,
    registry: IdentityRegistry,
    roots: Roots,
    structure: Structure,
    structure_throttle: Throttle,
    node_updates: BatchedUpdates<NodeId>,
    inspector: Inspector,
    dgraph: DependencyGraphExtractor,
    focus: Option<FocusRequest>,
    components: IndexMap<NodeId, Vec<MappedComponent>>,
    inbox: Arc<Mutex<Inbox>>,
    transport: T,
}

impl<T: Transport> Debugger<T> {
    /// Create an enabled debugger using the [`BasicEncoder`].
    pub fn new(config: DebuggerConfig, transport: T) -> Self {
        Self::with_encoder(config, Arc::new(BasicEncoder), transport)
    }

    pub fn with_encoder(
        config: DebuggerConfig,
        encoder: Arc<dyn ValueEncoder>,
        transport: T,
    ) -> Self {
        let inbox = Arc::new(Mutex::new(Inbox::default()));
        let dgraph_inbox = Arc::clone(&inbox);

        Self {
            enabled: true,
            registry: IdentityRegistry::new(),
            roots: Roots::new(),
            structure: Structure::new(),
            structure_throttle: Throttle::new(config.structure_interval()),
            node_updates: BatchedUpdates::new(config.updates_interval()),
            inspector: Inspector::new(encoder, config.inspector_interval()),
            dgraph: DependencyGraphExtractor::new(
                config.dgraph_throttle(),
                Arc::new(move |id| dgraph_inbox.lock().dgraph.push(id)),
            ),
            focus: None,
            components: IndexMap::new(),
            inbox,
            config,
            transport,
        }
    }

    // ------------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------------

    /// Start mirroring a root. Returns its ID when it was newly tracked.
    pub fn register_root(&mut self, owner: &Owner, now: Instant) -> Option<NodeId> {
        let id = self.roots.register(owner, &mut self.registry)?;
        if self.enabled {
            self.structure_throttle.trigger(now);
        }
        Some(id)
    }

    /// Mount a tracked root under `parent`, or make it top-level.
    pub fn attach_root(&mut self, root: &Owner, parent: Option<&Owner>, now: Instant) -> bool {
        let id = self.registry.id_of(&root.clone().into());
        if !self.roots.attach(&id, parent, &mut self.registry) {
            return false;
        }
        if self.enabled {
            self.structure_throttle.trigger(now);
        }
        true
    }

    /// Re-walk every root on the next structure flush.
    pub fn update_all_roots(&mut self, now: Instant) {
        self.roots.mark_all();
        self.structure_throttle.trigger(now);
    }

    /// Drop the mirror and re-send every root on the next tick.
    pub fn force_update_all_roots(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        self.structure.clear();
        self.roots.mark_all();
        self.structure_throttle.trigger_now(now);
    }

    pub fn set_walker_mode(&mut self, mode: TreeWalkerMode, now: Instant) {
        if self.config.walker_mode == mode {
            return;
        }
        self.config.walker_mode = mode;
        self.force_update_all_roots(now);
    }

    // ------------------------------------------------------------------------
    // Ticking
    // ------------------------------------------------------------------------

    /// Process recorded hook events and flush whatever is due.
    pub fn tick(&mut self, now: Instant) {
        let Inbox { fires, dgraph } = std::mem::take(&mut *self.inbox.lock());
        if !self.enabled {
            return;
        }

        for fire in fires {
            if fire.structure_changed {
                self.roots.mark_dirty(&fire.root_id);
                self.structure_throttle.trigger(now);
            }
            self.node_updates.push(fire.id, now);
        }
        for id in dgraph {
            self.node_updates.push(id, now);
            self.dgraph.schedule_refresh(now);
        }

        if self.roots.sweep_disposed(&mut self.registry) {
            self.structure_throttle.trigger(now);
        }
        if self.structure_throttle.take_due(now) {
            self.flush_structure();
        }

        if let Some(ids) = self.node_updates.poll(now) {
            self.transport.send(OutputMessage::NodeUpdates(ids));
        }

        self.inspector.collect(now);
        if let Some(updates) = self.inspector.poll(now) {
            self.transport.send(OutputMessage::InspectorUpdate(updates));
        }

        if let Some(graph) = self.dgraph.poll(now, &mut self.registry) {
            self.transport.send(OutputMessage::DgraphUpdate(graph));
        }
    }

    /// Walk dirty roots, reconcile them into the mirror and send the changes.
    pub fn flush_structure(&mut self) {
        let work = self.roots.take_work();
        for id in &work.removed {
            self.components.shift_remove(id);
        }

        let mut updates = StructureUpdates {
            updated: Vec::with_capacity(work.walk.len()),
            removed: work.removed,
        };
        for id in &work.walk {
            if let Some((root, _)) = self.walk_root(id, None) {
                updates.updated.push(root);
            }
        }
        self.registry.prune();

        if updates.is_empty() {
            return;
        }
        let stats = self.structure.apply(&updates);
        debug!(
            updated = updates.updated.len(),
            removed = updates.removed.len(),
            created = stats.created,
            "flushed structure"
        );
        self.transport.send(OutputMessage::StructureUpdates(updates));
    }

    fn fire_handler(&self) -> ComputationHandler {
        let inbox = Arc::clone(&self.inbox);
        Arc::new(move |fire| inbox.lock().fires.push(fire))
    }

    /// Walk one tracked root. On failure the root keeps its previous mirror.
    fn walk_root(
        &mut self,
        id: &NodeId,
        focused: Option<&NodeId>,
    ) -> Option<(MappedRoot, Option<Owner>)> {
        let (owner, attached_to) = {
            let tracked = self.roots.get(id)?;
            (tracked.owner.clone(), tracked.attached_to.clone())
        };

        let config = WalkConfig {
            root_id: id.clone(),
            on_computation_fire: self.fire_handler(),
            gather_components: self.config.gather_components,
            focused_id: focused,
            mode: self.config.walker_mode,
        };
        let result = match walk(&owner, &mut self.registry, config) {
            Ok(result) => result,
            Err(err) => {
                warn!(root = %id, %err, "walk aborted, keeping previous structure");
                return None;
            }
        };

        self.roots.replace_observed(id, result.observed);
        self.components.insert(id.clone(), result.components);
        Some((
            MappedRoot {
                id: id.clone(),
                tree: result.tree,
                attached_to,
            },
            result.focused_owner,
        ))
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Inspect one owner, or clear the inspection with `None`.
    ///
    /// The owner is resolved by walking its root, so the structure of that
    /// root is refreshed as well. A stale request yields empty details.
    /// A selected signal takes over the dependency graph from the owner.
    pub fn focus(&mut self, request: Option<FocusRequest>) {
        if !self.enabled {
            return;
        }
        self.focus = request.clone();

        let signal = request
            .as_ref()
            .and_then(|request| request.signal_id.as_ref())
            .and_then(|id| self.registry.get(id))
            .filter(GraphNode::is_readable);

        let owner = request.and_then(|request| {
            let walked = self.walk_root(&request.root_id, Some(&request.node_id));
            let Some((root, focused)) = walked else {
                warn!(root = %request.root_id, node = %request.node_id, "focus on unknown root");
                return None;
            };
            let updates = StructureUpdates {
                updated: vec![root],
                removed: Vec::new(),
            };
            self.structure.apply(&updates);
            self.transport.send(OutputMessage::StructureUpdates(updates));

            if focused.is_none() {
                warn!(node = %request.node_id, "focused node is no longer in its root");
            }
            focused
        });

        let details = self.inspector.inspect(owner.as_ref(), &mut self.registry);
        self.transport.send(OutputMessage::InspectedDetails(details));

        let graph_focus = signal.or_else(|| owner.map(GraphNode::Owner));
        let graph = self.dgraph.set_focus(graph_focus, &mut self.registry);
        self.transport.send(OutputMessage::DgraphUpdate(graph));
    }

    /// Expand or collapse one inspected value.
    pub fn toggle_signal(&mut self, item: &ValueItemId, selected: bool, now: Instant) -> bool {
        self.enabled && self.inspector.toggle_signal(item, selected, now)
    }

    // ------------------------------------------------------------------------
    // Enabling
    // ------------------------------------------------------------------------

    /// Turn mirroring on or off.
    ///
    /// Disabling removes every hook the debugger installed and drops all
    /// pending work before returning. Enabling schedules a full walk.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;

        if enabled {
            self.roots.mark_all();
            self.structure_throttle.trigger_now(now);
            return;
        }

        self.roots.release_all();
        self.inspector.clear();
        self.dgraph.clear();
        self.node_updates.clear();
        self.structure_throttle.cancel();
        self.structure.clear();
        self.components.clear();
        self.focus = None;
        *self.inbox.lock() = Inbox::default();
        debug!("debugger disabled");
    }

    /// Apply a message from the inspection UI.
    pub fn handle_message(&mut self, message: InputMessage, now: Instant) {
        match message {
            InputMessage::SetEnabled(enabled) => self.set_enabled(enabled, now),
            InputMessage::ForceUpdate => self.force_update_all_roots(now),
            InputMessage::ResetState => self.focus(None),
            InputMessage::SetInspectedNode(request) => self.focus(request),
            InputMessage::ToggleInspectedValue { id, selected } => {
                self.toggle_signal(&id, selected, now);
            }
            InputMessage::TreeViewModeChange(mode) => self.set_walker_mode(mode, now),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn registry(&mut self) -> &mut IdentityRegistry {
        &mut self.registry
    }

    /// The current focus request.
    pub fn focused(&self) -> Option<&FocusRequest> {
        self.focus.as_ref()
    }

    /// Components gathered by the last walk of `root`.
    pub fn components(&self, root: &NodeId) -> &[MappedComponent] {
        self.components.get(root).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport> std::fmt::Debug for Debugger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger")
            .field("enabled", &self.enabled)
            .field("roots", &self.roots.len())
            .field("structure", &self.structure.len())
            .field("focus", &self.focus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{value, HookTag, OwnerTraits};
    use crate::transport::RecordingTransport;
    use std::time::Duration;

    fn debugger() -> Debugger<RecordingTransport> {
        Debugger::new(DebuggerConfig::default(), RecordingTransport::new())
    }

    fn structure_messages(debugger: &mut Debugger<RecordingTransport>) -> Vec<StructureUpdates> {
        debugger
            .transport_mut()
            .take()
            .into_iter()
            .filter_map(|message| match message {
                OutputMessage::StructureUpdates(updates) => Some(updates),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn registered_root_is_sent_after_the_structure_interval() {
        let mut debugger = debugger();
        let root = Owner::root(None);
        root.create_child(OwnerTraits::computation(), None);
        let start = Instant::now();

        let id = debugger.register_root(&root, start).unwrap();
        debugger.tick(start + Duration::from_millis(100));
        assert!(structure_messages(&mut debugger).is_empty());

        debugger.tick(start + Duration::from_millis(250));
        let sent = structure_messages(&mut debugger);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].updated[0].id, id);
        assert_eq!(debugger.structure().len(), 2);
    }

    #[test]
    fn walk_failure_keeps_previous_mirror() {
        let mut debugger = debugger();
        let root = Owner::root(None);
        let a = root.create_child(OwnerTraits::computation(), None);
        let b = root.create_child(OwnerTraits::computation(), None);
        let start = Instant::now();
        debugger.register_root(&root, start);
        debugger.flush_structure();
        structure_messages(&mut debugger);

        b.adopt(&a);
        debugger.update_all_roots(start);
        debugger.flush_structure();
        assert!(structure_messages(&mut debugger).is_empty());
        assert_eq!(debugger.structure().len(), 3);
    }

    #[test]
    fn walk_failure_keeps_reporting_reruns() {
        let mut debugger = debugger();
        let root = Owner::root(None);
        let c = root.create_child(OwnerTraits::computation(), None);
        let a = root.create_child(OwnerTraits::computation(), None);
        let b = root.create_child(OwnerTraits::computation(), None);
        let start = Instant::now();
        let root_id = debugger.register_root(&root, start).unwrap();
        debugger.flush_structure();
        let c_id = debugger.registry().id_of(&c.clone().into());

        b.adopt(&a);
        debugger.update_all_roots(start);
        debugger.flush_structure();
        debugger.transport_mut().take();
        assert!(c.hooks().contains(&HookTag::Structure(root_id.clone())));
        assert_eq!(debugger.roots().observed_len(&root_id), 3);

        c.rerun(|owner| {
            owner.create_child(OwnerTraits::computation(), None);
        });
        debugger.tick(start + Duration::from_secs(1));
        debugger.tick(start + Duration::from_secs(2));

        assert_eq!(
            debugger.transport_mut().take(),
            vec![OutputMessage::NodeUpdates(vec![c_id])]
        );
    }

    #[test]
    fn disabled_debugger_ignores_hooks() {
        let mut debugger = debugger();
        let root = Owner::root(None);
        let comp = root.create_child(OwnerTraits::computation(), None);
        let signal = comp.create_signal(None, value(0_i32));
        let start = Instant::now();
        debugger.register_root(&root, start);
        debugger.flush_structure();

        debugger.set_enabled(false, start);
        assert!(comp.hooks().is_empty());
        assert!(signal.hooks().is_empty());
        assert_eq!(debugger.roots().observed_len(root.slot().id().unwrap()), 0);

        comp.rerun(|_| {});
        debugger.transport_mut().take();
        debugger.tick(start + Duration::from_secs(1));
        assert!(debugger.transport().messages().is_empty());
    }
}
