//! The event bus.
//!
//! This module provides [`EventBus`], which registers subscribers and
//! listeners and dispatches posted events to them in priority order.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{check_types_on_dispatch_override, BusBuilder, BusConfig};
use crate::error::{EventBusError, EventBusResult, ListenerError, ListenerResult};
use crate::event::{Event, EventKind};
use crate::exception::EventExceptionHandler;
use crate::hierarchy::TypeHierarchyIndex;
use crate::listener::{self, EventListener, IntoListenerResult, Listener, ListenerId};
use crate::listener_list::{ListenerArray, ListenerListNode};
use crate::priority::EventPriority;
use crate::subscriber::{Subscriber, SubscriberClass, SubscriberKey};
use crate::validator::{EventClassChecker, RegistrationShape, RegistrationValidator};

#[cfg(feature = "metrics")]
use crate::metrics::BusMetrics;

type PendingListener = (Arc<ListenerListNode>, Arc<EventListener>);

/// Typed, hierarchy-aware, priority-ordered event bus.
///
/// Listeners registered for an event kind also receive every subtype of it.
/// All operations take `&self` and may be called from any number of threads;
/// listeners run on the posting thread and may post again.
///
/// # Examples
///
/// ```rust
/// use eventbus::{Event, EventBus, EventPriority};
///
/// #[derive(Event, Debug, Default)]
/// struct PlayerJoined {
///     greetings: Vec<&'static str>,
/// }
///
/// let bus = EventBus::new();
/// bus.add_listener(|event: &mut PlayerJoined| event.greetings.push("normal")).unwrap();
/// bus.add_listener_with_priority(EventPriority::High, |event: &mut PlayerJoined| {
///     event.greetings.push("high")
/// })
/// .unwrap();
///
/// let event = bus.post(PlayerJoined::default()).unwrap();
/// assert_eq!(event.greetings, vec!["high", "normal"]);
/// ```
pub struct EventBus {
    config: BusConfig,
    check_types_on_dispatch: bool,
    index: TypeHierarchyIndex,
    registrations: RwLock<HashMap<SubscriberKey, Vec<Arc<EventListener>>>>,
    shutdown: AtomicBool,
    exception_handler: Arc<dyn EventExceptionHandler>,
    class_checker: Arc<dyn EventClassChecker>,
    #[cfg(feature = "metrics")]
    metrics: Option<BusMetrics>,
}

impl EventBus {
    /// Creates a new bus with default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a bus.
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// Creates a bus with the given configuration and default collaborators.
    pub fn with_config(config: BusConfig) -> Self {
        Self::builder().with_config(config).build()
    }

    pub(crate) fn from_builder(builder: BusBuilder) -> Self {
        let config = builder.config;
        Self {
            check_types_on_dispatch: config.check_types_on_dispatch
                || check_types_on_dispatch_override(),
            index: TypeHierarchyIndex::new(config.allow_per_phase_post),
            registrations: RwLock::new(HashMap::new()),
            shutdown: AtomicBool::new(config.start_shutdown),
            exception_handler: builder.exception_handler,
            class_checker: builder.class_checker,
            #[cfg(feature = "metrics")]
            metrics: builder.metrics,
            config,
        }
    }

    /// Returns the configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Returns the type hierarchy index holding this bus' listener lists.
    pub fn hierarchy(&self) -> &TypeHierarchyIndex {
        &self.index
    }

    fn validator(&self) -> RegistrationValidator<'_> {
        RegistrationValidator::new(self.class_checker.as_ref())
    }

    /// Registers the `&self` listener methods of `target`.
    ///
    /// Registering the same instance twice is a no-op. The instance is kept
    /// alive by the bus until it is unregistered.
    pub fn register<T: Subscriber>(&self, target: &Arc<T>) -> EventBusResult<()> {
        let key = SubscriberKey::instance(target);
        if self.is_registered(key) {
            return Ok(());
        }
        let class = T::describe();
        let pending = self.prepare(&class, RegistrationShape::Instance, Some(target))?;
        self.commit(key, class.name, pending);
        Ok(())
    }

    /// Registers the associated-function listener methods of `T`.
    ///
    /// Registering the same type twice is a no-op.
    pub fn register_static<T: Subscriber>(&self) -> EventBusResult<()> {
        let key = SubscriberKey::of_static::<T>();
        if self.is_registered(key) {
            return Ok(());
        }
        let class = T::describe();
        let pending = self.prepare(&class, RegistrationShape::Static, None)?;
        self.commit(key, class.name, pending);
        Ok(())
    }

    // Validates and binds every method before anything is registered.
    fn prepare<T: Subscriber>(
        &self,
        class: &SubscriberClass<T>,
        shape: RegistrationShape,
        target: Option<&Arc<T>>,
    ) -> EventBusResult<Vec<PendingListener>> {
        let validator = self.validator();
        let methods = validator.select_methods(class, shape)?;

        let mut pending = Vec::with_capacity(methods.len());
        for method in methods {
            let kind = validator.check_method(class.name, method)?;
            let node = self.index.node_for(kind)?;
            let body = method.bind(class.name, target)?;
            let listener = EventListener::new(
                kind,
                method.priority,
                method.receive_canceled,
                format!("{}::{}({})", class.name, method.name, kind.name()),
                body,
            );
            pending.push((node, listener));
        }
        Ok(pending)
    }

    // The key is claimed before the nodes change, so concurrent registrations
    // of one key insert at most once and different keys never wait on each
    // other while nodes are updated.
    fn commit(&self, key: SubscriberKey, name: &str, pending: Vec<PendingListener>) {
        let listeners: Vec<Arc<EventListener>> =
            pending.iter().map(|(_, listener)| Arc::clone(listener)).collect();
        let ids: HashSet<ListenerId> = listeners.iter().map(|listener| listener.id()).collect();
        match self.registrations.write().entry(key) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                slot.insert(listeners);
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.listeners_added(ids.len());
        }
        for (node, listener) in &pending {
            node.register(&self.index, listener.priority(), Arc::clone(listener));
        }

        // An unregister that ran before the nodes were filled missed these
        // entries.
        let still_registered = self.registrations.read().get(&key).is_some_and(|current| {
            current.iter().any(|listener| ids.contains(&listener.id()))
        });
        if !still_registered {
            for (node, _) in &pending {
                node.unregister_all(&self.index, &ids);
            }
            tracing::debug!(subscriber = name, "registration raced with unregister");
            return;
        }
        tracing::debug!(subscriber = name, listeners = ids.len(), "registered subscriber");
    }

    /// Adds a listener for `E` at normal priority that skips canceled events.
    pub fn add_listener<E, L>(&self, listener: L) -> EventBusResult<ListenerId>
    where
        E: Event,
        L: Listener<E>,
    {
        self.add_listener_with(EventPriority::Normal, false, listener)
    }

    /// Adds a listener for `E` at `priority` that skips canceled events.
    pub fn add_listener_with_priority<E, L>(
        &self,
        priority: EventPriority,
        listener: L,
    ) -> EventBusResult<ListenerId>
    where
        E: Event,
        L: Listener<E>,
    {
        self.add_listener_with(priority, false, listener)
    }

    /// Adds a listener for `E` at `priority`.
    ///
    /// With `receive_canceled`, the listener also runs for canceled events.
    pub fn add_listener_with<E, L>(
        &self,
        priority: EventPriority,
        receive_canceled: bool,
        listener: L,
    ) -> EventBusResult<ListenerId>
    where
        E: Event,
        L: Listener<E>,
    {
        let kind = E::kind();
        let description = format!("{} for {}", listener.listener_name(), kind.name());
        self.add_erased(kind, priority, receive_canceled, description, listener::erase(listener))
    }

    /// Adds a type-erased listener for an explicitly given event kind.
    ///
    /// The listener receives events of `kind` and of all its subtypes.
    pub fn add_dyn_listener<F, R>(
        &self,
        kind: EventKind,
        priority: EventPriority,
        receive_canceled: bool,
        listener: F,
    ) -> EventBusResult<ListenerId>
    where
        F: Fn(&mut dyn Event) -> R + Send + Sync + 'static,
        R: IntoListenerResult,
    {
        let description = format!("{} for {}", std::any::type_name::<F>(), kind.name());
        let body: listener::ListenerFn =
            Arc::new(move |event: &mut dyn Event| -> ListenerResult {
                listener(event).into_listener_result()
            });
        self.add_erased(kind, priority, receive_canceled, description, body)
    }

    fn add_erased(
        &self,
        kind: EventKind,
        priority: EventPriority,
        receive_canceled: bool,
        description: String,
        body: listener::ListenerFn,
    ) -> EventBusResult<ListenerId> {
        self.validator().check_listener_target(&kind)?;
        let node = self.index.node_for(kind)?;
        let listener = EventListener::new(kind, priority, receive_canceled, description, body);
        let id = listener.id();
        self.commit(SubscriberKey::Listener(id), kind.name(), vec![(node, listener)]);
        Ok(id)
    }

    /// Removes everything registered under `key`.
    ///
    /// Returns whether anything was registered. Unknown or already removed
    /// keys are ignored.
    pub fn unregister(&self, key: impl Into<SubscriberKey>) -> bool {
        let key = key.into();
        let Some(listeners) = self.registrations.write().remove(&key) else {
            return false;
        };

        let ids: HashSet<ListenerId> = listeners.iter().map(|listener| listener.id()).collect();
        for node in self.index.nodes() {
            node.unregister_all(&self.index, &ids);
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.listeners_removed(listeners.len());
        }
        tracing::debug!(?key, listeners = listeners.len(), "unregistered");
        true
    }

    /// Whether anything is registered under `key`.
    pub fn is_registered(&self, key: impl Into<SubscriberKey>) -> bool {
        self.registrations.read().contains_key(&key.into())
    }

    /// Number of listeners a post of `E` would run, inherited ones included.
    pub fn listener_count<E: Event>(&self) -> EventBusResult<usize> {
        let node = self.index.node_for(E::kind())?;
        Ok(node.flattened(&self.index).listeners().len())
    }

    /// Posts `event` to every listener of its kind and its ancestors' kinds.
    ///
    /// Returns the event after all listeners ran. While the bus is shut down
    /// the event is returned untouched. The first failing listener stops the
    /// dispatch; its error is returned after the exception handler saw it.
    /// A panicking listener is reported the same way and the panic resumes.
    pub fn post<E: Event>(&self, mut event: E) -> EventBusResult<E> {
        self.post_mut(&mut event)?;
        Ok(event)
    }

    /// Posts an event in place. See [`post`](Self::post).
    pub fn post_mut(&self, event: &mut dyn Event) -> EventBusResult<()> {
        if self.is_shutdown() {
            return Ok(());
        }
        let node = self.node_for_post(event)?;
        let listeners = Arc::clone(node.flattened(&self.index).listeners());
        self.dispatch(event, &listeners)
    }

    /// Posts `event` to the listeners of a single priority only.
    ///
    /// Fails unless the bus was built with `allow_per_phase_post`, even while
    /// shut down.
    pub fn post_phase<E: Event>(&self, phase: EventPriority, mut event: E) -> EventBusResult<E> {
        self.post_phase_mut(phase, &mut event)?;
        Ok(event)
    }

    /// Posts an event in place to a single priority. See [`post_phase`](Self::post_phase).
    pub fn post_phase_mut(&self, phase: EventPriority, event: &mut dyn Event) -> EventBusResult<()> {
        if !self.config.allow_per_phase_post {
            return Err(EventBusError::PerPhasePostDisabled);
        }
        if self.is_shutdown() {
            return Ok(());
        }
        let node = self.node_for_post(event)?;
        let listeners = node.phase_listeners(&self.index, phase);
        self.dispatch(event, &listeners)
    }

    fn node_for_post(&self, event: &dyn Event) -> EventBusResult<Arc<ListenerListNode>> {
        let kind = event.event_kind();
        if kind.is_abstract() {
            return Err(EventBusError::AbstractEvent { event: kind.name() });
        }
        if self.check_types_on_dispatch {
            self.validator().check_accepted(&kind)?;
        }
        self.index.node_for(kind)
    }

    fn dispatch(&self, event: &mut dyn Event, listeners: &ListenerArray) -> EventBusResult<()> {
        let mut ran = 0;
        for (index, listener) in listeners.iter().enumerate() {
            if listener.runs_for(&*event) {
                ran += 1;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(&mut *event)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(payload) => {
                    let error = ListenerError::from_panic_payload(payload.as_ref());
                    self.record_post(ran);
                    self.report_failure(event, listeners, index, &error);
                    panic::resume_unwind(payload);
                }
            };
            self.record_post(ran);
            self.report_failure(event, listeners, index, &error);
            return Err(EventBusError::ListenerFailed {
                index,
                listener: listener.description().to_string(),
                source: error,
            });
        }

        self.record_post(ran);
        Ok(())
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_post(&self, ran: usize) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_post(ran);
        }
    }

    fn report_failure(
        &self,
        event: &dyn Event,
        listeners: &[Arc<EventListener>],
        index: usize,
        error: &ListenerError,
    ) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_failure();
        }
        self.exception_handler
            .handle_exception(self, event, listeners, index, error);
    }

    /// Leaves the shut down state. Has no effect on a running bus.
    pub fn start(&self) {
        if self.shutdown.swap(false, Ordering::AcqRel) {
            tracing::debug!("event bus started");
        }
    }

    /// Whether posts are currently ignored.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("check_types_on_dispatch", &self.check_types_on_dispatch)
            .field("shutdown", &self.is_shutdown())
            .field("index", &self.index)
            .field("registrations", &self.registrations.read().len())
            .finish_non_exhaustive()
    }
}
