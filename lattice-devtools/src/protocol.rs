//! Wire Protocol
//!
//! Messages exchanged between the debugger and an inspection UI. Everything
//! here is plain serde data: the mirror never hands out live nodes.
//!
//! Messages are adjacently tagged (`{"kind": ..., "data": ...}`) and can be
//! framed as JSON or MessagePack.

use serde::{Deserialize, Serialize};

use crate::dgraph::DGraph;
use crate::encode::EncodedValue;
use crate::error::Result;
use crate::graph::{ElementHandle, NodeKind};
use crate::identity::NodeId;
use crate::walker::TreeWalkerMode;

fn is_false(value: &bool) -> bool {
    !*value
}

/// One node of a walked tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedOwner {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<MappedOwner>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub frozen: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hmr: bool,
}

impl MappedOwner {
    /// A childless node.
    pub fn leaf(id: NodeId, kind: NodeKind, name: Option<&str>) -> Self {
        Self {
            id,
            kind,
            name: name.map(str::to_owned),
            children: Vec::new(),
            frozen: false,
            hmr: false,
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(MappedOwner::size).sum::<usize>()
    }
}

/// A walked root and, for sub-roots, the node it is mounted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedRoot {
    pub id: NodeId,
    pub tree: MappedOwner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<NodeId>,
}

/// A component and the element handles it rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedComponent {
    pub id: NodeId,
    pub name: String,
    pub elements: Vec<ElementHandle>,
}

/// A batch of root-level structure changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureUpdates {
    pub updated: Vec<MappedRoot>,
    pub removed: Vec<NodeId>,
}

impl StructureUpdates {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Request to inspect one owner of one root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusRequest {
    pub root_id: NodeId,
    pub node_id: NodeId,
    /// A signal or memo selected inside the owner. When set, the dependency
    /// graph is built around it instead of the owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<NodeId>,
}

impl FocusRequest {
    /// Focus an owner.
    pub fn owner(root_id: NodeId, node_id: NodeId) -> Self {
        Self {
            root_id,
            node_id,
            signal_id: None,
        }
    }

    /// Focus a signal declared in (or read by) an owner.
    pub fn signal(root_id: NodeId, node_id: NodeId, signal_id: NodeId) -> Self {
        Self {
            signal_id: Some(signal_id),
            ..Self::owner(root_id, node_id)
        }
    }
}

/// Addresses one inspectable value of the focused owner: one of its signals
/// or its own value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueItemId(String);

impl ValueItemId {
    /// The owner's own value.
    pub fn own_value() -> Self {
        Self("value".to_owned())
    }

    /// A declared signal.
    pub fn signal(id: &NodeId) -> Self {
        Self(format!("signal:{id}"))
    }

    /// The signal ID, when this addresses a signal.
    pub fn signal_id(&self) -> Option<NodeId> {
        self.0.strip_prefix("signal:").map(NodeId::from)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A signal declared by the inspected owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedSignal {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub value: EncodedValue,
}

/// Details of the inspected owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerDetails {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub signals: Vec<MappedSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<EncodedValue>,
}

/// A changed value of the inspected owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueUpdate {
    pub id: ValueItemId,
    pub value: EncodedValue,
    /// Whether the value was written (as opposed to re-encoded on request).
    pub updated: bool,
}

/// Debugger to UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum OutputMessage {
    StructureUpdates(StructureUpdates),
    /// Computations that re-ran since the last flush.
    NodeUpdates(Vec<NodeId>),
    InspectedDetails(Option<OwnerDetails>),
    InspectorUpdate(Vec<ValueUpdate>),
    DgraphUpdate(Option<DGraph>),
}

/// UI to debugger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum InputMessage {
    /// The UI opened (`true`) or closed (`false`).
    SetEnabled(bool),
    /// Re-walk every root and send the whole structure.
    ForceUpdate,
    /// Drop focus and every pending update.
    ResetState,
    SetInspectedNode(Option<FocusRequest>),
    ToggleInspectedValue { id: ValueItemId, selected: bool },
    TreeViewModeChange(TreeWalkerMode),
}

/// Frame a message as JSON.
pub fn encode_json(message: &OutputMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Frame a message as MessagePack, with named fields.
pub fn encode_msgpack(message: &OutputMessage) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(message)?)
}

/// Parse an incoming JSON message.
pub fn decode_json(input: &str) -> Result<InputMessage> {
    Ok(serde_json::from_str(input)?)
}
