//! Listener entries and the listener traits they are built from.
//!
//! An [`EventListener`] is what the listener lists store: an invocable
//! capability plus the metadata the bus needs to order it, filter it and
//! report it. Typed closures are turned into entries through [`Listener`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BoxError, ListenerError, ListenerResult};
use crate::event::{Event, EventKind};
use crate::priority::EventPriority;

/// Unique identifier of a registered listener.
///
/// Returned by the `add_listener` family and usable as an unregistration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Creates a new unique listener ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value of this listener ID.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// Type-erased listener body.
pub type ListenerFn = Arc<dyn Fn(&mut dyn Event) -> ListenerResult + Send + Sync>;

/// Conversion of listener return values into a [`ListenerResult`].
///
/// Implemented for `()` and for `Result<(), E>` where `E` converts into a
/// boxed error, so listeners may use `?` freely.
pub trait IntoListenerResult {
    /// Performs the conversion.
    fn into_listener_result(self) -> ListenerResult;
}

impl IntoListenerResult for () {
    fn into_listener_result(self) -> ListenerResult {
        Ok(())
    }
}

impl<Err> IntoListenerResult for Result<(), Err>
where
    Err: Into<BoxError>,
{
    fn into_listener_result(self) -> ListenerResult {
        self.map_err(|error| ListenerError::from_boxed(error.into()))
    }
}

/// Trait for typed event listeners.
///
/// Implemented for every closure or function taking `&mut E` and returning
/// `()` or a `Result`.
///
/// # Examples
///
/// ```rust
/// use eventbus::{Event, Listener};
///
/// #[derive(Event, Debug)]
/// struct Tick { count: u32 }
///
/// fn on_tick(tick: &mut Tick) {
///     tick.count += 1;
/// }
///
/// let mut tick = Tick { count: 0 };
/// Listener::<Tick>::call(&on_tick, &mut tick).unwrap();
/// assert_eq!(tick.count, 1);
/// ```
pub trait Listener<E: Event>: Send + Sync + 'static {
    /// Handles the given event.
    fn call(&self, event: &mut E) -> ListenerResult;

    /// Returns the name of this listener for diagnostics.
    ///
    /// The default implementation uses the type name.
    fn listener_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F, E, R> Listener<E> for F
where
    F: Fn(&mut E) -> R + Send + Sync + 'static,
    E: Event,
    R: IntoListenerResult,
{
    fn call(&self, event: &mut E) -> ListenerResult {
        self(event).into_listener_result()
    }
}

/// Erases a typed listener into a body accepting any event viewable as `E`.
pub(crate) fn erase<E: Event, L: Listener<E>>(listener: L) -> ListenerFn {
    Arc::new(move |event: &mut dyn Event| {
        let actual = event.event_kind().name();
        match event.view_mut::<E>() {
            Some(typed) => listener.call(typed),
            None => Err(ListenerError::EventMismatch {
                expected: E::kind().name(),
                actual,
            }),
        }
    })
}

#[derive(Clone)]
enum CancelCheck {
    /// Invokes the body unconditionally.
    None,
    /// Skips canceled events, then delegates to the unchecked entry.
    SkipCanceled(Arc<EventListener>),
}

/// A registered listener.
///
/// Entries that do not receive canceled events come in two forms: the
/// checked form skips canceled events, and its [`unwrap_if_safe`] form calls
/// the body directly. Listener lists hand out the unchecked form for event
/// kinds that can never be canceled.
///
/// [`unwrap_if_safe`]: EventListener::unwrap_if_safe
#[derive(Clone)]
pub struct EventListener {
    id: ListenerId,
    kind: EventKind,
    priority: EventPriority,
    receive_canceled: bool,
    description: Arc<str>,
    body: ListenerFn,
    check: CancelCheck,
}

impl EventListener {
    /// Creates a new entry with a fresh id.
    pub fn new(
        kind: EventKind,
        priority: EventPriority,
        receive_canceled: bool,
        description: impl Into<Arc<str>>,
        body: ListenerFn,
    ) -> Arc<Self> {
        Self::with_id(ListenerId::new(), kind, priority, receive_canceled, description, body)
    }

    pub(crate) fn with_id(
        id: ListenerId,
        kind: EventKind,
        priority: EventPriority,
        receive_canceled: bool,
        description: impl Into<Arc<str>>,
        body: ListenerFn,
    ) -> Arc<Self> {
        let unchecked = Arc::new(Self {
            id,
            kind,
            priority,
            receive_canceled,
            description: description.into(),
            body,
            check: CancelCheck::None,
        });
        if receive_canceled {
            return unchecked;
        }
        Arc::new(Self {
            check: CancelCheck::SkipCanceled(Arc::clone(&unchecked)),
            ..(*unchecked).clone()
        })
    }

    /// Identity of this listener. Checked and unchecked forms share it.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Event kind the listener was registered for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Priority the listener was registered at.
    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    /// Whether the listener receives canceled events.
    pub fn receives_canceled(&self) -> bool {
        self.receive_canceled
    }

    /// Whether this form checks the cancellation state before running.
    pub fn checks_cancellation(&self) -> bool {
        matches!(self.check, CancelCheck::SkipCanceled(_))
    }

    /// Human readable description used in diagnostics.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the form of this entry that skips the cancellation check.
    pub fn unwrap_if_safe(self: &Arc<Self>) -> Arc<EventListener> {
        match &self.check {
            CancelCheck::SkipCanceled(inner) => Arc::clone(inner),
            CancelCheck::None => Arc::clone(self),
        }
    }

    /// Whether invoking this form on `event` runs the listener body.
    pub fn runs_for(&self, event: &dyn Event) -> bool {
        !(self.checks_cancellation() && event.is_canceled())
    }

    /// Invokes the listener.
    pub fn invoke(&self, event: &mut dyn Event) -> ListenerResult {
        if let CancelCheck::SkipCanceled(inner) = &self.check {
            if !self.runs_for(event) {
                return Ok(());
            }
            return inner.invoke(event);
        }
        (self.body)(event)
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("priority", &self.priority)
            .field("receive_canceled", &self.receive_canceled)
            .field("checks_cancellation", &self.checks_cancellation())
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
