//! Owner Inspector
//!
//! Describes the focused owner (its signals, memos and own value) and streams
//! value changes while it stays focused.
//!
//! Hooks only record which value changed. Values are read and encoded when
//! the batch is flushed, so a burst of writes costs one encoding.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::batch::{BatchItem, BatchedUpdates};
use crate::encode::{EncodedValue, ValueEncoder};
use crate::graph::{value, GraphNode, Hook, HookEvent, HookTag, NodeKind, Owner, Value};
use crate::identity::{IdentityRegistry, NodeId};
use crate::observe::Subscriptions;
use crate::protocol::{MappedSignal, OwnerDetails, ValueItemId, ValueUpdate};
use crate::walker::{classify, display_name_of};

/// A value that changed (or was toggled) since the last flush.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingValue {
    id: ValueItemId,
    updated: bool,
}

impl BatchItem for PendingValue {
    type Key = ValueItemId;

    fn key(&self) -> ValueItemId {
        self.id.clone()
    }

    fn absorb(&mut self, older: &Self) {
        self.updated |= older.updated;
    }
}

/// Source of one inspectable value.
#[derive(Debug, Clone)]
enum ValueSource {
    Node(GraphNode),
    OwnValue(Owner),
}

impl ValueSource {
    fn current(&self) -> Option<Value> {
        match self {
            Self::Node(GraphNode::Signal(signal)) => Some(signal.get()),
            Self::Node(GraphNode::Owner(owner)) | Self::OwnValue(owner) => owner.value(),
        }
    }
}

#[derive(Debug)]
struct Inspected {
    id: NodeId,
    values: IndexMap<ValueItemId, ValueSource>,
    expanded: HashSet<ValueItemId>,
    subscriptions: Subscriptions,
}

/// Details and value updates of the focused owner.
pub struct Inspector {
    encoder: Arc<dyn ValueEncoder>,
    inspected: Option<Inspected>,
    updates: BatchedUpdates<PendingValue>,
    inbox: Arc<Mutex<Vec<ValueItemId>>>,
}

impl Inspector {
    pub fn new(encoder: Arc<dyn ValueEncoder>, interval: Duration) -> Self {
        Self {
            encoder,
            inspected: None,
            updates: BatchedUpdates::new(interval),
            inbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Focus `owner` and describe it. Passing `None` clears the focus.
    pub fn inspect(
        &mut self,
        owner: Option<&Owner>,
        registry: &mut IdentityRegistry,
    ) -> Option<OwnerDetails> {
        self.clear();
        let owner = owner.filter(|owner| !owner.is_disposed())?;

        let owner_node: GraphNode = owner.clone().into();
        let id = registry.id_of(&owner_node);
        let mut values = IndexMap::new();
        let mut signals = Vec::new();
        let mut subscriptions = Subscriptions::new();

        let readable = owner
            .signals()
            .into_iter()
            .map(GraphNode::Signal)
            .chain(
                owner
                    .owned()
                    .into_iter()
                    .filter(|child| classify(child) == NodeKind::Memo)
                    .map(GraphNode::Owner),
            );
        for node in readable {
            let signal_id = registry.id_of(&node);
            let item = ValueItemId::signal(&signal_id);
            let source = ValueSource::Node(node.clone());
            signals.push(MappedSignal {
                id: signal_id.clone(),
                name: display_name_of(&node),
                kind: if matches!(node, GraphNode::Signal(_)) {
                    NodeKind::Signal
                } else {
                    NodeKind::Memo
                },
                value: self.encode(source.current(), false),
            });
            let hook = self.value_hook(item.clone());
            subscriptions.observe(signal_id, &node, HookTag::Inspector, hook);
            values.insert(item, source);
        }

        let kind = classify(owner);
        let own_value = owner.value();
        let value = own_value.map(|value| self.encoder.encode(&value, false));
        if kind.is_computation() {
            let item = ValueItemId::own_value();
            let hook = self.value_hook(item.clone());
            subscriptions.observe(id.clone(), &owner_node, HookTag::Inspector, hook);
            values.insert(item, ValueSource::OwnValue(owner.clone()));
        }

        self.inspected = Some(Inspected {
            id: id.clone(),
            values,
            expanded: HashSet::new(),
            subscriptions,
        });

        Some(OwnerDetails {
            id,
            name: display_name_of(&owner_node),
            kind,
            signals,
            value,
        })
    }

    fn value_hook(&self, item: ValueItemId) -> Hook {
        let inbox = Arc::clone(&self.inbox);
        Arc::new(move |event: &HookEvent| {
            if matches!(event, HookEvent::ValueChanged { .. }) {
                inbox.lock().push(item.clone());
            }
        })
    }

    fn encode(&self, current: Option<Value>, expand: bool) -> EncodedValue {
        let current = current.unwrap_or_else(|| value(()));
        self.encoder.encode(&current, expand)
    }

    /// Expand or collapse one value, and queue its re-encoding.
    pub fn toggle_signal(&mut self, item: &ValueItemId, expanded: bool, now: Instant) -> bool {
        let Some(inspected) = self.inspected.as_mut() else {
            return false;
        };
        if !inspected.values.contains_key(item) {
            warn!(item = item.as_str(), "unknown inspected value");
            return false;
        }
        if expanded {
            inspected.expanded.insert(item.clone());
        } else {
            inspected.expanded.remove(item);
        }
        self.updates.push(
            PendingValue {
                id: item.clone(),
                updated: false,
            },
            now,
        );
        true
    }

    /// Move recorded value changes into the batch.
    pub fn collect(&mut self, now: Instant) {
        let changed = std::mem::take(&mut *self.inbox.lock());
        if self.inspected.is_none() {
            return;
        }
        for id in changed {
            self.updates.push(PendingValue { id, updated: true }, now);
        }
    }

    /// Encode and release the batch if its window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<ValueUpdate>> {
        let pending = self.updates.poll(now)?;
        let inspected = self.inspected.as_ref()?;

        let updates: Vec<ValueUpdate> = pending
            .into_iter()
            .filter_map(|pending| {
                let source = inspected.values.get(&pending.id)?;
                let expand = inspected.expanded.contains(&pending.id);
                Some(ValueUpdate {
                    value: self.encode(source.current(), expand),
                    id: pending.id,
                    updated: pending.updated,
                })
            })
            .collect();
        (!updates.is_empty()).then_some(updates)
    }

    /// Drop the focus, its hooks and every pending update.
    pub fn clear(&mut self) {
        if let Some(mut inspected) = self.inspected.take() {
            inspected.subscriptions.release();
        }
        self.inbox.lock().clear();
        self.updates.clear();
    }

    /// ID of the focused owner.
    pub fn inspected_id(&self) -> Option<&NodeId> {
        self.inspected.as_ref().map(|inspected| &inspected.id)
    }

    pub fn is_pending(&self) -> bool {
        self.updates.is_pending()
    }
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("inspected", &self.inspected_id())
            .field("pending", &self.updates.len())
            .finish()
    }
}
