//! Host Graph
//!
//! This module models the live owner graph of a reactive runtime: the thing
//! the devtools observe.
//!
//! # Overview
//!
//! The graph has two kinds of edges:
//!
//! - Ownership: every owner exclusively owns the computations created while it
//!   ran. Disposing or re-running an owner disposes its owned subtree.
//! - Dependencies: a computation reads signals and memos (its sources); the
//!   read nodes list the computation among their observers.
//!
//! Roots may also point at a parent without being owned by it. Those are
//! sub-roots: a walk of the parent does not see them, and the debugger mounts
//! them under the parent separately.
//!
//! # Hooks
//!
//! Nodes expose [`HookSet`]s instead of being patched from the outside. A hook
//! installed on a computation fires after every re-run; a hook on a signal or
//! memo fires on every value write. Hooks are keyed by [`HookTag`] so several
//! consumers can watch one node.

mod hooks;
mod node;

pub use hooks::{Hook, HookEvent, HookSet, HookTag};
pub use node::{
    value, ComponentInfo, ElementHandle, GraphNode, NodeKind, NodeSlot, Owner, OwnerTraits,
    Signal, Value, WeakNode, WeakOwner, WeakSignal,
};
