//! Error types for the devtools.

use thiserror::Error;

use crate::identity::NodeId;

/// Errors raised while mirroring a host graph.
///
/// None of these are ever propagated into the host runtime: the debugger logs
/// them and keeps its previous state.
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// The same node was reached twice in one walk.
    #[error("node {0} was visited twice in one walk")]
    AliasedNode(NodeId),

    /// An ID no longer resolves to a live node.
    #[error("node {0} is no longer alive")]
    StaleReference(NodeId),

    /// The operation needs a computation, but the node is a root or a component.
    #[error("node {0} is not a computation")]
    NotAComputation(NodeId),

    #[error("failed to encode message as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode message as MessagePack: {0}")]
    MsgPack(#[from] rmp_serde::encode::Error),
}

pub type Result<T, E = DebuggerError> = std::result::Result<T, E>;
