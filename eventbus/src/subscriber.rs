//! Subscriber descriptors.
//!
//! A subscriber is a type whose listener methods are described by a
//! [`SubscriberClass`], normally generated by the `#[subscriber]` attribute
//! on an `impl` block. The bus validates the description, binds each method
//! to a listener body, and records everything it registered under a
//! [`SubscriberKey`] so that it can be unregistered as a unit.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::error::{EventBusError, EventBusResult, ListenerError, ListenerResult};
use crate::event::{Event, EventKind};
use crate::listener::{IntoListenerResult, ListenerFn, ListenerId};
use crate::priority::EventPriority;

/// A type whose listener methods can be registered as a unit.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use eventbus::{subscriber, Event, EventBus, EventPriority};
///
/// #[derive(Event, Debug)]
/// struct Tick;
///
/// #[derive(Default)]
/// struct Clock {
///     ticks: AtomicU32,
/// }
///
/// #[subscriber]
/// impl Clock {
///     #[subscribe_event(priority = High)]
///     fn on_tick(&self, _tick: &mut Tick) {
///         self.ticks.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let bus = EventBus::new();
/// let clock = Arc::new(Clock::default());
/// bus.register(&clock).unwrap();
/// bus.post(Tick).unwrap();
/// assert_eq!(clock.ticks.load(Ordering::Relaxed), 1);
/// ```
pub trait Subscriber: Send + Sync + 'static {
    /// Describes the listener methods declared directly by this type.
    fn describe() -> SubscriberClass<Self>
    where
        Self: Sized;
}

/// Listener methods and supertypes of a subscriber type.
pub struct SubscriberClass<T> {
    /// Type name used in diagnostics.
    pub name: &'static str,
    /// Listener methods declared directly by the type.
    pub methods: Vec<SubscribeMethod<T>>,
    /// Supertypes the type builds on. None of them may declare listener methods.
    pub supertypes: Vec<SupertypeInfo>,
}

impl<T> fmt::Debug for SubscriberClass<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberClass")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("supertypes", &self.supertypes)
            .finish()
    }
}

/// Listener-method summary of a supertype.
#[derive(Debug, Clone, Default)]
pub struct SupertypeInfo {
    /// Type name used in diagnostics.
    pub name: &'static str,
    /// Names of listener methods the supertype declares.
    pub listener_methods: Vec<&'static str>,
    /// Supertypes of the supertype.
    pub supertypes: Vec<SupertypeInfo>,
}

impl SupertypeInfo {
    /// Describes a supertype by hand, e.g. a trait with default listener methods.
    pub fn new(name: &'static str, listener_methods: Vec<&'static str>) -> Self {
        Self {
            name,
            listener_methods,
            supertypes: Vec::new(),
        }
    }

    /// Describes another subscriber type acting as a supertype.
    pub fn of<S: Subscriber>() -> Self {
        let class = S::describe();
        Self {
            name: class.name,
            listener_methods: class.methods.iter().map(|method| method.name).collect(),
            supertypes: class.supertypes,
        }
    }

    /// Adds supertypes of this supertype.
    pub fn with_supertypes(mut self, supertypes: Vec<SupertypeInfo>) -> Self {
        self.supertypes = supertypes;
        self
    }
}

/// Declared type of a listener method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamType {
    name: &'static str,
    kind: Option<EventKind>,
}

impl ParamType {
    /// A parameter of event type `E`.
    pub fn event<E: Event>() -> Self {
        let kind = E::kind();
        Self {
            name: kind.name(),
            kind: Some(kind),
        }
    }

    /// A parameter that is not an event.
    pub fn other(name: &'static str) -> Self {
        Self { name, kind: None }
    }

    /// Declared type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Event kind of the parameter, if it is an event.
    pub fn event_kind(&self) -> Option<EventKind> {
        self.kind
    }
}

/// Generated call shim of a listener method.
pub enum Invoker<T> {
    /// A method taking `&self`.
    Instance(fn(&T, &mut dyn Event) -> ListenerResult),
    /// An associated function without a receiver.
    Static(fn(&mut dyn Event) -> ListenerResult),
}

impl<T> Clone for Invoker<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Invoker<T> {}

/// Description of one listener method.
pub struct SubscribeMethod<T> {
    /// Method name.
    pub name: &'static str,
    /// Declared parameters, excluding the receiver.
    pub params: Vec<ParamType>,
    /// Whether the method has no receiver.
    pub is_static: bool,
    /// Priority to register at.
    pub priority: EventPriority,
    /// Whether the method receives canceled events.
    pub receive_canceled: bool,
    /// Call shim, absent when the signature cannot be called as a listener.
    pub invoker: Option<Invoker<T>>,
}

impl<T> fmt::Debug for SubscribeMethod<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("is_static", &self.is_static)
            .field("priority", &self.priority)
            .field("receive_canceled", &self.receive_canceled)
            .field("invocable", &self.invoker.is_some())
            .finish()
    }
}

impl<T: Subscriber> SubscribeMethod<T> {
    /// Binds the method to a listener body, capturing `target` for instance methods.
    pub fn bind(&self, subscriber: &'static str, target: Option<&Arc<T>>) -> EventBusResult<ListenerFn> {
        match (self.invoker, target) {
            (Some(Invoker::Instance(invoke)), Some(target)) => {
                let target = Arc::clone(target);
                Ok(Arc::new(move |event: &mut dyn Event| invoke(&target, event)))
            }
            (Some(Invoker::Static(invoke)), None) => Ok(Arc::new(invoke)),
            (Some(_), _) => Err(EventBusError::invalid_listener(
                subscriber,
                self.name,
                "receiver does not match the registration",
            )),
            (None, _) => Err(EventBusError::invalid_listener(
                subscriber,
                self.name,
                "method cannot be invoked as a listener",
            )),
        }
    }
}

/// Calls `call` with the event viewed as `E`.
///
/// Used by generated invokers.
#[doc(hidden)]
pub fn invoke_as<E, R>(event: &mut dyn Event, call: impl FnOnce(&mut E) -> R) -> ListenerResult
where
    E: Event,
    R: IntoListenerResult,
{
    let actual = event.event_kind().name();
    match event.view_mut::<E>() {
        Some(typed) => call(typed).into_listener_result(),
        None => Err(ListenerError::EventMismatch {
            expected: E::kind().name(),
            actual,
        }),
    }
}

/// Identity under which a registration is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKey {
    /// A subscriber instance, identified by its allocation.
    Instance {
        /// Subscriber type.
        type_id: TypeId,
        /// Address of the shared allocation.
        address: usize,
    },
    /// The static listener methods of a subscriber type.
    Static(TypeId),
    /// A single listener added through the `add_listener` family.
    Listener(ListenerId),
}

impl SubscriberKey {
    /// Key of a subscriber instance.
    pub fn instance<T: Subscriber>(target: &Arc<T>) -> Self {
        Self::Instance {
            type_id: TypeId::of::<T>(),
            address: Arc::as_ptr(target) as *const () as usize,
        }
    }

    /// Key of the static listener methods of `T`.
    pub fn of_static<T: Subscriber>() -> Self {
        Self::Static(TypeId::of::<T>())
    }
}

impl<T: Subscriber> From<&Arc<T>> for SubscriberKey {
    fn from(target: &Arc<T>) -> Self {
        Self::instance(target)
    }
}

impl From<ListenerId> for SubscriberKey {
    fn from(id: ListenerId) -> Self {
        Self::Listener(id)
    }
}
