//! Per-event-kind listener lists.
//!
//! Every event kind that has been registered to or posted gets one
//! [`ListenerListNode`]. A node owns five priority buckets for the listeners
//! registered directly on its kind and a cached, flattened array that also
//! contains everything inherited from its ancestors. The cache is rebuilt
//! lazily on the next read after any change to the node or an ancestor.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};

use crate::bucket::PriorityBucket;
use crate::event::EventKind;
use crate::hierarchy::TypeHierarchyIndex;
use crate::listener::{EventListener, ListenerId};
use crate::priority::EventPriority;

/// Shared, immutable listener array.
pub type ListenerArray = Arc<[Arc<EventListener>]>;

/// Index of a node inside its [`TypeHierarchyIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the numeric value of this node ID.
    pub fn value(self) -> usize {
        self.0
    }
}

/// Facts about an event kind derived once, when its node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    /// Whether the kind or any ancestor is cancellable.
    pub cancellable: bool,
    /// Number of ancestors above the kind.
    pub depth: usize,
}

impl KindInfo {
    pub(crate) fn derive(kind: &EventKind, parent: Option<&ListenerListNode>) -> Self {
        match parent {
            Some(parent) => Self {
                cancellable: kind.declares_cancellable() || parent.info.cancellable,
                depth: parent.info.depth + 1,
            },
            None => Self {
                cancellable: kind.declares_cancellable(),
                depth: 0,
            },
        }
    }
}

/// The flattened listener view of one node, as of one generation.
#[derive(Debug)]
pub struct FlattenedListeners {
    generation: u64,
    merged: [ListenerArray; EventPriority::COUNT],
    listeners: ListenerArray,
    phases: Option<[ListenerArray; EventPriority::COUNT]>,
}

impl FlattenedListeners {
    fn empty() -> Self {
        Self {
            generation: 0,
            merged: std::array::from_fn(|_| empty_array()),
            listeners: empty_array(),
            phases: None,
        }
    }

    /// All listeners in dispatch order.
    pub fn listeners(&self) -> &ListenerArray {
        &self.listeners
    }

    /// Listeners of a single priority, if per-phase lists are tracked.
    pub fn phase(&self, priority: EventPriority) -> Option<&ListenerArray> {
        self.phases
            .as_ref()
            .map(|phases| &phases[priority.ordinal()])
    }

    /// Generation of the node this view was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn empty_array() -> ListenerArray {
    Arc::from(Vec::new())
}

/// Listener list of a single event kind.
///
/// Writers serialize on a fair per-node lock. Readers load the cached
/// flattened array without locking; only a reader that finds the cache stale
/// takes the per-node rebuild lock.
pub struct ListenerListNode {
    id: NodeId,
    kind: EventKind,
    parent: Option<NodeId>,
    info: KindInfo,
    track_phases: bool,
    buckets: Mutex<[PriorityBucket; EventPriority::COUNT]>,
    // Bumped on every change to this node or an ancestor. The cache is
    // dirty while its generation lags behind.
    generation: AtomicU64,
    rebuild_lock: Mutex<()>,
    cache: ArcSwap<FlattenedListeners>,
    children: Mutex<Vec<NodeId>>,
}

impl ListenerListNode {
    pub(crate) fn new(
        id: NodeId,
        kind: EventKind,
        parent: Option<NodeId>,
        info: KindInfo,
        track_phases: bool,
    ) -> Self {
        Self {
            id,
            kind,
            parent,
            info,
            track_phases,
            buckets: Mutex::new(std::array::from_fn(|_| PriorityBucket::new())),
            // Starts dirty so the first read pulls in inherited listeners.
            generation: AtomicU64::new(1),
            rebuild_lock: Mutex::new(()),
            cache: ArcSwap::from_pointee(FlattenedListeners::empty()),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Index of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Event kind of this node.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Index of the parent node, `None` for a root kind.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Facts derived for this node's kind.
    pub fn info(&self) -> KindInfo {
        self.info
    }

    /// Indices of the direct child nodes created so far.
    pub fn children(&self) -> Vec<NodeId> {
        self.children.lock().clone()
    }

    pub(crate) fn add_child(&self, child: NodeId) {
        self.children.lock().push(child);
    }

    /// Number of listeners registered directly on this kind.
    pub fn listener_count(&self) -> usize {
        self.buckets.lock().iter().map(PriorityBucket::len).sum()
    }

    /// Whether the cached array is out of date.
    pub fn is_dirty(&self) -> bool {
        self.cache.load().generation != self.generation.load(Ordering::Acquire)
    }

    /// Adds a listener at `priority` and invalidates this node and all descendants.
    pub fn register(
        &self,
        index: &TypeHierarchyIndex,
        priority: EventPriority,
        listener: Arc<EventListener>,
    ) {
        let mut buckets = self.buckets.lock();
        buckets[priority.ordinal()].add(listener);
        MutexGuard::unlock_fair(buckets);
        self.mark_dirty(index);
    }

    /// Removes the listener with `id` from whichever bucket holds it.
    ///
    /// Returns whether it was found. Nothing is invalidated otherwise.
    pub fn unregister(&self, index: &TypeHierarchyIndex, id: ListenerId) -> bool {
        let mut buckets = self.buckets.lock();
        let removed = buckets.iter_mut().any(|bucket| bucket.remove(id));
        MutexGuard::unlock_fair(buckets);
        if removed {
            self.mark_dirty(index);
        }
        removed
    }

    /// Removes every listener whose id is in `ids`. Returns whether any was found.
    pub fn unregister_all(&self, index: &TypeHierarchyIndex, ids: &HashSet<ListenerId>) -> bool {
        let mut buckets = self.buckets.lock();
        let mut removed = false;
        for bucket in buckets.iter_mut() {
            removed |= bucket.remove_all(ids);
        }
        MutexGuard::unlock_fair(buckets);
        if removed {
            self.mark_dirty(index);
        }
        removed
    }

    fn mark_dirty(&self, index: &TypeHierarchyIndex) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let children = self.children.lock().clone();
        for child in children {
            // A child missing from the index is not published yet and has
            // never been flattened.
            if let Some(node) = index.node(child) {
                node.mark_dirty(index);
            }
        }
    }

    /// Returns the flattened listener array, rebuilding it if stale.
    ///
    /// Any registration that returned before this call began is included.
    pub fn flattened(&self, index: &TypeHierarchyIndex) -> Arc<FlattenedListeners> {
        let cached = self.cache.load_full();
        if cached.generation == self.generation.load(Ordering::Acquire) {
            return cached;
        }

        let _guard = self.rebuild_lock.lock();
        // Read before the buckets so that a concurrent change re-dirties us.
        let generation = self.generation.load(Ordering::Acquire);
        let cached = self.cache.load_full();
        if cached.generation == generation {
            return cached;
        }

        let rebuilt = Arc::new(self.rebuild(index, generation));
        self.cache.store(Arc::clone(&rebuilt));
        rebuilt
    }

    /// Listeners of one priority, merged with those inherited from ancestors.
    pub fn phase_listeners(
        &self,
        index: &TypeHierarchyIndex,
        priority: EventPriority,
    ) -> ListenerArray {
        let flattened = self.flattened(index);
        match flattened.phase(priority) {
            Some(phase) => Arc::clone(phase),
            None => self.finish(flattened.merged[priority.ordinal()].iter()),
        }
    }

    fn rebuild(&self, index: &TypeHierarchyIndex, generation: u64) -> FlattenedListeners {
        let inherited = self
            .parent
            .and_then(|parent| index.node(parent))
            .map(|parent| parent.flattened(index));

        let buckets = self.buckets.lock();
        let merged: [ListenerArray; EventPriority::COUNT] = std::array::from_fn(|ordinal| {
            let own = buckets[ordinal].listeners().iter();
            match &inherited {
                Some(parent) => own.chain(parent.merged[ordinal].iter()).cloned().collect(),
                None => own.cloned().collect(),
            }
        });
        MutexGuard::unlock_fair(buckets);

        let listeners = self.finish(merged.iter().flat_map(|phase| phase.iter()));
        let phases = self
            .track_phases
            .then(|| std::array::from_fn(|ordinal| self.finish(merged[ordinal].iter())));

        tracing::trace!(
            event = self.kind.name(),
            generation,
            listeners = listeners.len(),
            "rebuilt listener list"
        );

        FlattenedListeners {
            generation,
            merged,
            listeners,
            phases,
        }
    }

    // Drops the cancellation check when this kind can never be canceled.
    fn finish<'a>(&self, entries: impl Iterator<Item = &'a Arc<EventListener>>) -> ListenerArray {
        if self.info.cancellable {
            entries.cloned().collect()
        } else {
            entries.map(EventListener::unwrap_if_safe).collect()
        }
    }
}

impl fmt::Debug for ListenerListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerListNode")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("parent", &self.parent)
            .field("info", &self.info)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}
