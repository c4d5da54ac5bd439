//! Error types for the event bus.
//!
//! Registration and configuration problems surface as [`EventBusError`] and
//! leave the bus usable. Failures raised by listeners while an event is being
//! dispatched are captured as [`ListenerError`] and handed back to the poster.

use thiserror::Error;

/// Boxed error type accepted from fallible listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during event bus operations.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// A listener failed while an event was being dispatched.
    #[error("Listener #{index} ({listener}) failed: {source}")]
    ListenerFailed {
        /// Position of the failing listener in the dispatched listener array.
        index: usize,
        /// Description of the failing listener.
        listener: String,
        /// The failure raised by the listener.
        #[source]
        source: ListenerError,
    },

    /// An abstract event kind was used as a listener target or posted.
    #[error("Event {event} is abstract and cannot be listened to or posted")]
    AbstractEvent {
        /// Name of the abstract event kind.
        event: &'static str,
    },

    /// An abstract event kind sits below a concrete one in a hierarchy.
    #[error(
        "Abstract event {parent} (parent of {event}) has a non-abstract ancestor {ancestor}"
    )]
    BrokenAbstractChain {
        /// Event kind whose node was being created.
        event: &'static str,
        /// Abstract immediate parent of `event`.
        parent: &'static str,
        /// First concrete ancestor found above `parent`.
        ancestor: &'static str,
    },

    /// The bus' event class checker rejected an event kind.
    #[error("Event {event} is not accepted by this bus: {reason}")]
    RejectedEvent {
        /// Name of the rejected event kind.
        event: &'static str,
        /// Reason reported by the checker.
        reason: String,
    },

    /// A listener method has an unusable signature.
    #[error("Invalid listener method {subscriber}::{method}: {reason}")]
    InvalidListener {
        /// Subscriber declaring the method.
        subscriber: &'static str,
        /// Method name.
        method: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A supertype of a subscriber declares listener methods of its own.
    #[error(
        "Subscriber {subscriber} inherits listener methods {methods:?} from {supertype}; \
         register the supertype separately"
    )]
    InheritedListeners {
        /// Subscriber being registered.
        subscriber: &'static str,
        /// Supertype declaring listener methods.
        supertype: &'static str,
        /// Names of the offending methods.
        methods: Vec<&'static str>,
    },

    /// A subscriber produced no listeners for the requested registration shape.
    #[error("{subscriber} has no {shape} listener methods")]
    NoListeners {
        /// Subscriber being registered.
        subscriber: &'static str,
        /// `"instance"` or `"static"`.
        shape: &'static str,
    },

    /// Per-phase posting was attempted on a bus that does not allow it.
    #[error("Posting a single phase is not enabled on this bus")]
    PerPhasePostDisabled,

    /// Cancellation was requested on an event kind that cannot be canceled.
    #[error("Event {event} is not cancellable")]
    NotCancellable {
        /// Name of the event kind.
        event: &'static str,
    },

    /// Configuration error occurred.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// The configuration error message.
        message: String,
    },
}

/// Errors raised by listeners during dispatch.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// A listener panicked during execution.
    #[error("Listener panicked: {message}")]
    Panic {
        /// The panic message.
        message: String,
    },

    /// Listener failed with a custom error.
    #[error("{0}")]
    Custom(BoxError),

    /// A listener received an event it cannot view as its declared kind.
    #[error("Listener expected {expected} but received {actual}")]
    EventMismatch {
        /// Event kind the listener was declared for.
        expected: &'static str,
        /// Event kind that was dispatched.
        actual: &'static str,
    },
}

/// Convenience type alias for EventBus operation results.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Result returned by a single listener invocation.
pub type ListenerResult = Result<(), ListenerError>;

impl EventBusError {
    /// Creates a new configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Creates a new invalid listener error.
    pub fn invalid_listener<S: Into<String>>(
        subscriber: &'static str,
        method: &'static str,
        reason: S,
    ) -> Self {
        Self::InvalidListener {
            subscriber,
            method,
            reason: reason.into(),
        }
    }

    /// Returns the listener failure carried by this error, if any.
    pub fn listener_error(&self) -> Option<&ListenerError> {
        match self {
            Self::ListenerFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ListenerError {
    /// Creates a new panic error.
    pub fn panic<S: Into<String>>(message: S) -> Self {
        Self::Panic {
            message: message.into(),
        }
    }

    /// Creates a new custom error from any error type.
    pub fn custom<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Custom(Box::new(error))
    }

    /// Wraps a boxed error, unwrapping it if it already is a `ListenerError`.
    pub fn from_boxed(error: BoxError) -> Self {
        match error.downcast::<ListenerError>() {
            Ok(inner) => *inner,
            Err(other) => Self::Custom(other),
        }
    }

    /// Builds a panic error from a payload captured by `catch_unwind`.
    pub(crate) fn from_panic_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panic { message }
    }

    /// Returns the custom error if this failure came from a listener's own error value.
    pub fn as_custom(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Custom(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<EventBusError> for ListenerError {
    fn from(error: EventBusError) -> Self {
        Self::Custom(Box::new(error))
    }
}
