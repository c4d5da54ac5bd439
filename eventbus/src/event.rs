//! Core event trait and event kind descriptors.
//!
//! Events form single-inheritance hierarchies. A subtype embeds its parent
//! event as a field, and the [`Event`] implementation generated by
//! `#[derive(Event)]` exposes that chain through [`EventKind::parent`] and
//! [`Event::upcast_mut`]. A listener declared on an ancestor therefore
//! receives every descendant, viewed as the ancestor.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{EventBusError, EventBusResult};

/// Static description of a concrete event type.
///
/// Descriptors are cheap to copy and compare by type identity. The parent is
/// stored as a function pointer so that hierarchies can be described without
/// any global registry.
///
/// # Examples
///
/// ```rust
/// use eventbus::{Event, EventKind};
///
/// #[derive(Event, Debug, Default)]
/// #[event(abstract)]
/// struct BlockEvent;
///
/// #[derive(Event, Debug, Default)]
/// struct BlockBreak {
///     #[event(parent)]
///     base: BlockEvent,
/// }
///
/// let kind = BlockBreak::kind();
/// assert_eq!(kind.parent(), Some(BlockEvent::kind()));
/// assert!(kind.parent().unwrap().is_abstract());
/// ```
#[derive(Clone, Copy)]
pub struct EventKind {
    type_id: TypeId,
    name: &'static str,
    parent: Option<fn() -> EventKind>,
    is_abstract: bool,
    cancellable: bool,
    markers: &'static [fn() -> TypeId],
}

impl EventKind {
    /// Creates a descriptor for a root, concrete, non-cancellable event type.
    pub fn new<E: Any>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name,
            parent: None,
            is_abstract: false,
            cancellable: false,
            markers: &[],
        }
    }

    /// Returns the descriptor of `E`.
    pub fn of<E: Event>() -> Self {
        E::kind()
    }

    /// Sets the parent event type.
    pub fn with_parent<P: Event>(mut self) -> Self {
        self.parent = Some(P::kind);
        self
    }

    /// Marks the event type as abstract. Abstract types cannot have listeners.
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Declares the event type cancellable. Subtypes inherit cancellability.
    pub fn with_cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    /// Attaches marker types, checked by [`crate::MarkerTypeChecker`].
    pub fn with_markers(mut self, markers: &'static [fn() -> TypeId]) -> Self {
        self.markers = markers;
        self
    }

    /// Type identity of the event.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human readable type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Descriptor of the parent type, `None` for a root type.
    pub fn parent(&self) -> Option<EventKind> {
        self.parent.map(|parent| parent())
    }

    /// Whether this type is abstract.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether this type itself declares cancellability.
    ///
    /// Use [`EventKind::is_cancellable`] for the inherited answer.
    pub fn declares_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Whether this type or any ancestor is cancellable.
    pub fn is_cancellable(&self) -> bool {
        self.ancestors().any(|kind| kind.cancellable)
    }

    /// Marker types declared directly on this type.
    pub fn declared_markers(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.markers.iter().map(|marker| marker())
    }

    /// Whether this type or any ancestor carries the marker `marker`.
    pub fn has_marker(&self, marker: TypeId) -> bool {
        self.ancestors()
            .any(|kind| kind.declared_markers().any(|declared| declared == marker))
    }

    /// Iterates over this type and then each ancestor up to the root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors { next: Some(*self) }
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventKind")
            .field("name", &self.name)
            .field("parent", &self.parent().map(|parent| parent.name))
            .field("is_abstract", &self.is_abstract)
            .field("cancellable", &self.cancellable)
            .finish()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Iterator over an event type and its ancestors, most specific first.
#[derive(Debug, Clone)]
pub struct Ancestors {
    next: Option<EventKind>,
}

impl Iterator for Ancestors {
    type Item = EventKind;

    fn next(&mut self) -> Option<EventKind> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

/// Core trait that all events must implement.
///
/// Most events should use `#[derive(Event)]`, which supports these attributes:
///
/// * `#[event(abstract)]` on the type: no listeners may be registered for it.
/// * `#[event(cancellable)]` on the type, together with a `bool` field marked
///   `#[event(canceled)]` holding the cancellation state.
/// * `#[event(markers(A, B))]` on the type: marker types checked by
///   [`crate::MarkerTypeChecker`].
/// * `#[event(parent)]` on the field embedding the parent event.
///
/// # Manual Implementation
///
/// ```rust
/// use std::any::{Any, TypeId};
/// use eventbus::{Event, EventKind};
///
/// struct Heartbeat;
///
/// impl Event for Heartbeat {
///     fn kind() -> EventKind {
///         EventKind::new::<Self>("Heartbeat")
///     }
///
///     fn event_kind(&self) -> EventKind {
///         Self::kind()
///     }
///
///     fn upcast_ref(&self, target: TypeId) -> Option<&dyn Any> {
///         (target == TypeId::of::<Self>()).then_some(self as &dyn Any)
///     }
///
///     fn upcast_mut(&mut self, target: TypeId) -> Option<&mut dyn Any> {
///         (target == TypeId::of::<Self>()).then_some(self as &mut dyn Any)
///     }
/// }
/// ```
pub trait Event: Any + Send + Sync {
    /// Returns the descriptor of this event type.
    fn kind() -> EventKind
    where
        Self: Sized;

    /// Returns the descriptor of the runtime type of this event.
    fn event_kind(&self) -> EventKind;

    /// Views this event as the type identified by `target`, which must be the
    /// event's own type or one of its ancestors.
    fn upcast_ref(&self, target: TypeId) -> Option<&dyn Any>;

    /// Mutable counterpart of [`Event::upcast_ref`].
    fn upcast_mut(&mut self, target: TypeId) -> Option<&mut dyn Any>;

    /// Storage of the cancellation state, if this event is cancellable.
    fn canceled_flag(&self) -> Option<&bool> {
        None
    }

    /// Mutable storage of the cancellation state, if this event is cancellable.
    fn canceled_flag_mut(&mut self) -> Option<&mut bool> {
        None
    }

    /// Whether the event has been canceled. Always `false` for events that
    /// cannot be canceled.
    fn is_canceled(&self) -> bool {
        self.canceled_flag().copied().unwrap_or(false)
    }

    /// Sets the cancellation state.
    ///
    /// Listeners registered without `receive_canceled` are skipped once an
    /// event is canceled.
    fn set_canceled(&mut self, canceled: bool) -> EventBusResult<()> {
        let name = self.event_kind().name();
        match self.canceled_flag_mut() {
            Some(flag) => {
                *flag = canceled;
                Ok(())
            }
            None => Err(EventBusError::NotCancellable { event: name }),
        }
    }
}

impl dyn Event {
    /// Views the event as `E`, if `E` is its type or one of its ancestors.
    pub fn view<E: Event>(&self) -> Option<&E> {
        self.upcast_ref(TypeId::of::<E>())
            .and_then(|any| any.downcast_ref::<E>())
    }

    /// Mutable counterpart of [`view`](#method.view).
    pub fn view_mut<E: Event>(&mut self) -> Option<&mut E> {
        self.upcast_mut(TypeId::of::<E>())
            .and_then(|any| any.downcast_mut::<E>())
    }

    /// Whether the event is an `E` or a descendant of `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.upcast_ref(TypeId::of::<E>()).is_some()
    }
}

impl fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.event_kind().name())
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}
