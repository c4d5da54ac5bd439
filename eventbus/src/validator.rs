//! Registration-time checks.
//!
//! Everything here fails hard: a subscriber or listener that does not pass is
//! rejected with an [`EventBusError`] and nothing of it is registered.

use std::any::TypeId;
use std::fmt;

use crate::error::{EventBusError, EventBusResult};
use crate::event::EventKind;
use crate::subscriber::{SubscribeMethod, SubscriberClass, SupertypeInfo};

/// Decides which event kinds a bus accepts.
///
/// Implemented for closures taking an [`EventKind`] and returning the
/// rejection reason as `Err`.
pub trait EventClassChecker: Send + Sync {
    /// Checks `kind`, returning a human readable reason when it is rejected.
    fn check(&self, kind: &EventKind) -> Result<(), String>;
}

impl<F> EventClassChecker for F
where
    F: Fn(&EventKind) -> Result<(), String> + Send + Sync,
{
    fn check(&self, kind: &EventKind) -> Result<(), String> {
        self(kind)
    }
}

/// Accepts every event kind. The default checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EventClassChecker for AcceptAll {
    fn check(&self, _kind: &EventKind) -> Result<(), String> {
        Ok(())
    }
}

/// Accepts only event kinds carrying a marker type, directly or inherited.
#[derive(Clone, Copy)]
pub struct MarkerTypeChecker {
    marker: TypeId,
    name: &'static str,
}

impl MarkerTypeChecker {
    /// Creates a checker requiring marker `M`.
    pub fn new<M: 'static>() -> Self {
        Self {
            marker: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }
}

impl EventClassChecker for MarkerTypeChecker {
    fn check(&self, kind: &EventKind) -> Result<(), String> {
        if kind.has_marker(self.marker) {
            Ok(())
        } else {
            Err(format!(
                "this bus only accepts events marked with {}, which {} is not",
                self.name,
                kind.name()
            ))
        }
    }
}

impl fmt::Debug for MarkerTypeChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerTypeChecker")
            .field("marker", &self.name)
            .finish()
    }
}

/// Shape of a subscriber registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationShape {
    /// A subscriber instance; only `&self` methods may be declared.
    Instance,
    /// A subscriber type; only receiver-less methods may be declared.
    Static,
}

impl RegistrationShape {
    fn name(self) -> &'static str {
        match self {
            RegistrationShape::Instance => "instance",
            RegistrationShape::Static => "static",
        }
    }
}

/// Checks subscribers and listener targets against a bus' rules.
pub struct RegistrationValidator<'a> {
    checker: &'a dyn EventClassChecker,
}

impl<'a> RegistrationValidator<'a> {
    /// Creates a validator using `checker` for event class acceptance.
    pub fn new(checker: &'a dyn EventClassChecker) -> Self {
        Self { checker }
    }

    /// Checks that listeners may be registered for `kind`.
    pub fn check_listener_target(&self, kind: &EventKind) -> EventBusResult<()> {
        if kind.is_abstract() {
            return Err(EventBusError::AbstractEvent { event: kind.name() });
        }
        self.check_accepted(kind)
    }

    /// Runs the bus' event class checker on `kind`.
    pub fn check_accepted(&self, kind: &EventKind) -> EventBusResult<()> {
        self.checker
            .check(kind)
            .map_err(|reason| EventBusError::RejectedEvent {
                event: kind.name(),
                reason,
            })
    }

    /// Returns the listener methods of `class` matching `shape`.
    ///
    /// Fails if a supertype declares listener methods, if a method's
    /// receiver does not match the shape, or if nothing is left.
    pub fn select_methods<'c, T>(
        &self,
        class: &'c SubscriberClass<T>,
        shape: RegistrationShape,
    ) -> EventBusResult<Vec<&'c SubscribeMethod<T>>> {
        check_supertypes(class.name, &class.supertypes)?;

        let mut selected = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            match (shape, method.is_static) {
                (RegistrationShape::Instance, false) | (RegistrationShape::Static, true) => {
                    selected.push(method)
                }
                (RegistrationShape::Instance, true) => {
                    return Err(EventBusError::invalid_listener(
                        class.name,
                        method.name,
                        "expected a `&self` method; register the type with `register_static` \
                         for associated functions",
                    ))
                }
                (RegistrationShape::Static, false) => {
                    return Err(EventBusError::invalid_listener(
                        class.name,
                        method.name,
                        "expected an associated function; register an instance with `register` \
                         for `&self` methods",
                    ))
                }
            }
        }

        if selected.is_empty() {
            return Err(EventBusError::NoListeners {
                subscriber: class.name,
                shape: shape.name(),
            });
        }
        Ok(selected)
    }

    /// Checks one listener method and returns the event kind it listens to.
    pub fn check_method<T>(
        &self,
        subscriber: &'static str,
        method: &SubscribeMethod<T>,
    ) -> EventBusResult<EventKind> {
        let [param] = method.params.as_slice() else {
            return Err(EventBusError::invalid_listener(
                subscriber,
                method.name,
                format!(
                    "listener methods take exactly one event parameter, found {}",
                    method.params.len()
                ),
            ));
        };
        let Some(kind) = param.event_kind() else {
            return Err(EventBusError::invalid_listener(
                subscriber,
                method.name,
                format!("parameter type {} is not an event", param.name()),
            ));
        };
        if method.invoker.is_none() {
            return Err(EventBusError::invalid_listener(
                subscriber,
                method.name,
                "method cannot be invoked as a listener",
            ));
        }
        self.check_listener_target(&kind)?;
        Ok(kind)
    }
}

impl fmt::Debug for RegistrationValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationValidator").finish_non_exhaustive()
    }
}

fn check_supertypes(subscriber: &'static str, supertypes: &[SupertypeInfo]) -> EventBusResult<()> {
    for supertype in supertypes {
        if !supertype.listener_methods.is_empty() {
            return Err(EventBusError::InheritedListeners {
                subscriber,
                supertype: supertype.name,
                methods: supertype.listener_methods.clone(),
            });
        }
        check_supertypes(subscriber, &supertype.supertypes)?;
    }
    Ok(())
}
