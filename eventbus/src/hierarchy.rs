//! Event kind to listener list resolution.
//!
//! The index owns every [`ListenerListNode`] of a bus in a single arena and
//! maps event kinds to arena slots. Lookups read an immutable snapshot and
//! never lock. Creating a node for a kind seen for the first time computes
//! everything it can outside of the lock, then finalizes under one mutex; a
//! thread that loses the race returns the winner's node instead.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::{EventBusError, EventBusResult};
use crate::event::EventKind;
use crate::listener_list::{KindInfo, ListenerListNode, NodeId};

#[derive(Default, Clone)]
struct IndexSnapshot {
    by_type: HashMap<TypeId, NodeId>,
    nodes: Vec<Arc<ListenerListNode>>,
}

/// Arena of listener list nodes, keyed by event kind.
pub struct TypeHierarchyIndex {
    snapshot: ArcSwap<IndexSnapshot>,
    finalize: Mutex<()>,
    track_phases: bool,
}

impl TypeHierarchyIndex {
    /// Creates an empty index.
    ///
    /// With `track_phases`, nodes precompute per-priority listener arrays
    /// alongside the full flattened array.
    pub fn new(track_phases: bool) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(IndexSnapshot::default()),
            finalize: Mutex::new(()),
            track_phases,
        }
    }

    /// Returns the node for `kind`, creating it and any missing ancestor nodes.
    ///
    /// Fails when the abstract parent of `kind` has a concrete ancestor. The
    /// failure repeats on every call since no node is ever created for such
    /// a kind.
    pub fn node_for(&self, kind: EventKind) -> EventBusResult<Arc<ListenerListNode>> {
        if let Some(node) = self.lookup(kind.type_id()) {
            return Ok(node);
        }

        let parent = match kind.parent() {
            Some(parent) => {
                if parent.is_abstract() {
                    check_abstract_chain(kind, parent)?;
                }
                Some(self.node_for(parent)?)
            }
            None => None,
        };
        let info = KindInfo::derive(&kind, parent.as_deref());

        let _guard = self.finalize.lock();
        let current = self.snapshot.load_full();
        if let Some(&id) = current.by_type.get(&kind.type_id()) {
            return Ok(Arc::clone(&current.nodes[id.0]));
        }

        let id = NodeId(current.nodes.len());
        let node = Arc::new(ListenerListNode::new(
            id,
            kind,
            parent.as_ref().map(|parent| parent.id()),
            info,
            self.track_phases,
        ));
        // Linked before publishing so an invalidation of the parent can never
        // miss a child that readers can already see.
        if let Some(parent) = &parent {
            parent.add_child(id);
        }

        let mut next = IndexSnapshot::clone(&current);
        next.by_type.insert(kind.type_id(), id);
        next.nodes.push(Arc::clone(&node));
        self.snapshot.store(Arc::new(next));

        tracing::debug!(
            event = kind.name(),
            node = id.value(),
            depth = info.depth,
            cancellable = info.cancellable,
            "created listener list"
        );
        Ok(node)
    }

    /// Returns the node for an event type without creating it.
    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<ListenerListNode>> {
        let snapshot = self.snapshot.load();
        snapshot
            .by_type
            .get(&type_id)
            .map(|id| Arc::clone(&snapshot.nodes[id.0]))
    }

    /// Returns the node stored at `id`.
    pub fn node(&self, id: NodeId) -> Option<Arc<ListenerListNode>> {
        self.snapshot.load().nodes.get(id.0).cloned()
    }

    /// All nodes created so far, in creation order.
    pub fn nodes(&self) -> Vec<Arc<ListenerListNode>> {
        self.snapshot.load().nodes.clone()
    }

    /// Number of nodes created so far.
    pub fn node_count(&self) -> usize {
        self.snapshot.load().nodes.len()
    }

    /// Event kinds that have a node, in creation order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.snapshot
            .load()
            .nodes
            .iter()
            .map(|node| node.kind())
            .collect()
    }

    /// Whether per-priority arrays are precomputed.
    pub fn tracks_phases(&self) -> bool {
        self.track_phases
    }
}

impl std::fmt::Debug for TypeHierarchyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeHierarchyIndex")
            .field("nodes", &self.node_count())
            .field("track_phases", &self.track_phases)
            .finish()
    }
}

/// Every ancestor of an abstract parent must be abstract as well.
fn check_abstract_chain(kind: EventKind, parent: EventKind) -> EventBusResult<()> {
    match parent.ancestors().find(|ancestor| !ancestor.is_abstract()) {
        Some(ancestor) => Err(EventBusError::BrokenAbstractChain {
            event: kind.name(),
            parent: parent.name(),
            ancestor: ancestor.name(),
        }),
        None => Ok(()),
    }
}
