//! Lattice Devtools
//!
//! This crate mirrors a live reactive owner graph to an external inspection
//! UI. It implements:
//!
//! - A host graph model with explicit update hooks
//! - Stable node identities
//! - A tree walker producing serializable owner trees
//! - A positional structure reconciler
//! - Batched, deduplicated update emission
//! - Dependency graph extraction around a focused node
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: owners, signals and their hook sets
//! - `identity`: node IDs and the ID to node index
//! - `observe`: installing and releasing hooks
//! - `walker`: owner tree to [`MappedOwner`](protocol::MappedOwner) tree
//! - `structure`: the persisted, reconciled mirror
//! - `batch` / `schedule`: throttled, deduplicated emission
//! - `dgraph`: sources and observers of one node
//! - `inspector`: details and value updates of the focused owner
//! - `roots` / `debugger`: orchestration
//! - `protocol` / `transport` / `driver`: getting messages out
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//!
//! use lattice_devtools::graph::{value, Owner, OwnerTraits};
//! use lattice_devtools::protocol::OutputMessage;
//! use lattice_devtools::{Debugger, DebuggerConfig, RecordingTransport};
//!
//! let mut debugger = Debugger::new(DebuggerConfig::default(), RecordingTransport::new());
//!
//! // Build a small graph
//! let app = Owner::root(Some("app"));
//! let count = app.create_signal(Some("count"), value(0_i64));
//! let view = app.create_child(OwnerTraits::render_effect(), Some("view"));
//! view.track(&count.into());
//!
//! // Register it and let the structure throttle elapse
//! let start = Instant::now();
//! debugger.register_root(&app, start);
//! debugger.tick(start + Duration::from_millis(250));
//!
//! assert!(matches!(
//!     debugger.transport().messages(),
//!     [OutputMessage::StructureUpdates(_)]
//! ));
//! ```

pub mod batch;
pub mod config;
pub mod debugger;
pub mod dgraph;
pub mod driver;
pub mod encode;
pub mod error;
pub mod graph;
pub mod identity;
pub mod inspector;
pub mod observe;
pub mod protocol;
pub mod roots;
pub mod schedule;
pub mod structure;
pub mod transport;
pub mod walker;

pub use config::DebuggerConfig;
pub use debugger::Debugger;
pub use error::{DebuggerError, Result};
pub use identity::{IdentityRegistry, NodeId};
pub use structure::{ReconcileStats, Structure};
pub use transport::{ChannelTransport, RecordingTransport, Transport};
pub use walker::{walk, TreeWalkerMode, WalkConfig, WalkResult};
