//! Tree Walker
//!
//! Maps a live owner tree into a serializable [`MappedOwner`] tree.
//!
//! # Overview
//!
//! The walk is a depth-first pre-order traversal over owned children. For
//! every visited owner it:
//!
//! 1. resolves a stable ID through the [`IdentityRegistry`];
//! 2. classifies the owner from its traits (cached on the node);
//! 3. prepares a [`HookTag::Structure`] hook, keyed by the walked root, for
//!    every computation, so the caller hears about every re-run and whether
//!    it changed the tree;
//! 4. optionally records rendered elements of components.
//!
//! Roots found among owned children are not descended into: they are walked as
//! their own roots and mounted by the structure mirror.
//!
//! Hooks are installed only once the whole walk succeeded. A failed walk
//! leaves the hooks of the previous walk in place.
//!
//! # Modes
//!
//! In [`TreeWalkerMode::Components`] only roots and components are kept. The
//! owners in between are flattened away and their component descendants are
//! lifted to the nearest kept ancestor.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{DebuggerError, Result};
use crate::graph::{GraphNode, Hook, HookEvent, HookTag, NodeKind, Owner, WeakOwner};
use crate::identity::{IdentityRegistry, NodeId};
use crate::observe::Subscriptions;
use crate::protocol::{MappedComponent, MappedOwner};

/// Prefix hot-reload tooling puts in front of wrapped component names.
pub const HMR_PREFIX: &str = "_Hot$$";

/// Placeholder for nodes without a name.
pub const UNNAMED: &str = "(unnamed)";

const MAX_NAME_LEN: usize = 20;

/// Which owners appear in a walked tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeWalkerMode {
    /// Every owner.
    #[default]
    Owners,
    /// Roots and components only.
    Components,
}

impl TreeWalkerMode {
    fn includes(&self, kind: NodeKind) -> bool {
        match self {
            Self::Owners => true,
            Self::Components => matches!(kind, NodeKind::Root | NodeKind::Component),
        }
    }
}

/// Reported by a structure hook after a computation re-ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputationFire {
    /// Root the computation was walked under.
    pub root_id: NodeId,
    /// The computation, or in components mode its nearest kept ancestor.
    pub id: NodeId,
    /// Whether the computation's owned children differ from the walked ones.
    pub structure_changed: bool,
}

/// Callback receiving [`ComputationFire`]s.
pub type ComputationHandler = Arc<dyn Fn(ComputationFire) + Send + Sync>;

/// Options of one walk.
pub struct WalkConfig<'a> {
    pub root_id: NodeId,
    pub on_computation_fire: ComputationHandler,
    pub gather_components: bool,
    pub focused_id: Option<&'a NodeId>,
    pub mode: TreeWalkerMode,
}

/// Output of one walk.
#[derive(Debug)]
pub struct WalkResult {
    pub tree: MappedOwner,
    /// Components in traversal order, when gathering was requested.
    pub components: Vec<MappedComponent>,
    /// The owner matching `focused_id`, if it was visited.
    pub focused_owner: Option<Owner>,
    /// Structure hooks installed by this walk.
    pub observed: Subscriptions,
}

/// Classify an owner from its traits.
///
/// The result is cached on the node, so later calls are free.
pub fn classify(owner: &Owner) -> NodeKind {
    owner.slot().kind_or_init(|| {
        let traits = owner.traits();
        if !traits.computation {
            return NodeKind::Root;
        }
        if traits.component.is_some() {
            return NodeKind::Component;
        }
        if owner.is_memo() {
            let under_hot_component = owner
                .parent()
                .and_then(|parent| parent.traits().component.clone())
                .is_some_and(|component| component.name.starts_with(HMR_PREFIX));
            return if under_hot_component {
                NodeKind::Refresh
            } else {
                NodeKind::Memo
            };
        }
        if !traits.pure {
            return if traits.user {
                NodeKind::Effect
            } else if traits.context {
                NodeKind::Context
            } else {
                NodeKind::RenderEffect
            };
        }
        NodeKind::Computation
    })
}

/// Kind of any node. Signals are always [`NodeKind::Signal`].
pub fn kind_of(node: &GraphNode) -> NodeKind {
    match node {
        GraphNode::Owner(owner) => classify(owner),
        GraphNode::Signal(_) => NodeKind::Signal,
    }
}

/// Untrimmed name of a node. Component names lose their hot-reload prefix.
pub fn node_name(node: &GraphNode) -> Option<String> {
    match node {
        GraphNode::Owner(owner) => match &owner.traits().component {
            Some(component) => Some(
                component
                    .name
                    .strip_prefix(HMR_PREFIX)
                    .unwrap_or(&component.name)
                    .to_owned(),
            ),
            None => owner.name().map(str::to_owned),
        },
        GraphNode::Signal(signal) => signal.name().map(str::to_owned),
    }
}

/// Trim a name for display.
pub fn display_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_LEN {
        let mut trimmed: String = name.chars().take(MAX_NAME_LEN).collect();
        trimmed.push('…');
        trimmed
    } else {
        name.to_owned()
    }
}

/// Display name of a node, falling back to [`UNNAMED`].
pub fn display_name_of(node: &GraphNode) -> String {
    node_name(node)
        .map(|name| display_name(&name))
        .unwrap_or_else(|| UNNAMED.to_owned())
}

/// Walk `root` and everything it owns.
///
/// # Errors
///
/// Returns [`DebuggerError::AliasedNode`] when a node is reachable twice.
/// No hook is touched in that case.
pub fn walk(
    root: &Owner,
    registry: &mut IdentityRegistry,
    config: WalkConfig<'_>,
) -> Result<WalkResult> {
    let mut ctx = WalkContext {
        config,
        registry,
        visited: HashSet::new(),
        components: Vec::new(),
        focused: None,
        staged: Vec::new(),
    };

    let mut mapped = ctx.visit(root, None)?;

    // The walked root is always kept, so exactly one node comes back.
    let tree = mapped
        .pop()
        .ok_or_else(|| DebuggerError::StaleReference(ctx.config.root_id.clone()))?;
    debug!(root = %ctx.config.root_id, nodes = ctx.visited.len(), "walked root");

    let tag = HookTag::Structure(ctx.config.root_id.clone());
    let mut observed = Subscriptions::new();
    for (id, node, hook) in ctx.staged {
        observed.observe(id, &node, tag.clone(), hook);
    }

    Ok(WalkResult {
        tree,
        components: ctx.components,
        focused_owner: ctx.focused,
        observed,
    })
}

/// State threaded through one walk.
struct WalkContext<'a, 'r> {
    config: WalkConfig<'a>,
    registry: &'r mut IdentityRegistry,
    visited: HashSet<NodeId>,
    components: Vec<MappedComponent>,
    focused: Option<Owner>,
    /// Structure hooks to install if the walk succeeds.
    staged: Vec<(NodeId, GraphNode, Hook)>,
}

impl WalkContext<'_, '_> {
    /// Map `owner` and its subtree. Returns the owner itself, or when it is
    /// flattened away, its kept descendants.
    fn visit(&mut self, owner: &Owner, anchor: Option<&NodeId>) -> Result<Vec<MappedOwner>> {
        let node: GraphNode = owner.clone().into();
        let id = self.registry.id_of(&node);
        if !self.visited.insert(id.clone()) {
            error!(id = %id, root = %self.config.root_id, "owner reached twice in one walk");
            return Err(DebuggerError::AliasedNode(id));
        }

        let kind = classify(owner);
        let is_root = anchor.is_none();
        let included = is_root || self.config.mode.includes(kind);
        let report_id = match anchor {
            Some(anchor) if !included => anchor.clone(),
            _ => id.clone(),
        };

        if self.config.focused_id == Some(&id) {
            self.focused = Some(owner.clone());
        }
        if kind == NodeKind::Component && self.config.gather_components {
            self.components.push(MappedComponent {
                id: id.clone(),
                name: display_name_of(&node),
                elements: owner.rendered(),
            });
        }
        if kind.is_computation() {
            self.observe_structure(&id, &node, owner, report_id.clone());
        }

        let mut descend: Vec<Owner> = owner.owned().into_iter().filter(|c| !c.is_root()).collect();
        let mut hmr = false;
        if kind == NodeKind::Component {
            if let [only] = descend.as_slice() {
                if classify(only) == NodeKind::Refresh {
                    let refresh = only.clone();
                    let refresh_node: GraphNode = refresh.clone().into();
                    let refresh_id = self.registry.id_of(&refresh_node);
                    if !self.visited.insert(refresh_id.clone()) {
                        error!(id = %refresh_id, "refresh memo reached twice in one walk");
                        return Err(DebuggerError::AliasedNode(refresh_id));
                    }
                    self.observe_structure(&refresh_id, &refresh_node, &refresh, report_id.clone());
                    descend = refresh.owned().into_iter().filter(|c| !c.is_root()).collect();
                    hmr = true;
                }
            }
        }

        let mut children = Vec::new();
        for child in &descend {
            children.extend(self.visit(child, Some(&report_id))?);
        }

        if !included {
            return Ok(children);
        }

        let frozen = kind != NodeKind::Root && owner.sources().is_empty();

        Ok(vec![MappedOwner {
            id,
            kind,
            name: node_name(&node).map(|name| display_name(&name)),
            children,
            frozen,
            hmr,
        }])
    }

    fn observe_structure(
        &mut self,
        id: &NodeId,
        node: &GraphNode,
        owner: &Owner,
        report_id: NodeId,
    ) {
        let walked: Vec<WeakOwner> = owner.owned().iter().map(Owner::downgrade).collect();
        let weak = owner.downgrade();
        let root_id = self.config.root_id.clone();
        let handler = Arc::clone(&self.config.on_computation_fire);

        self.staged.push((
            id.clone(),
            node.clone(),
            Arc::new(move |event: &HookEvent| {
                if !matches!(event, HookEvent::Ran) {
                    return;
                }
                let Some(owner) = weak.upgrade() else {
                    return;
                };
                let current = owner.owned();
                let structure_changed = current.len() != walked.len()
                    || current
                        .iter()
                        .zip(&walked)
                        .any(|(now, then)| !now.downgrade().ptr_eq(then));
                handler(ComputationFire {
                    root_id: root_id.clone(),
                    id: report_id.clone(),
                    structure_changed,
                });
            }),
        ));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
