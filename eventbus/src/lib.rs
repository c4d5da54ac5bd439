//! # eventbus - Typed, Hierarchy-Aware Event Bus
//!
//! `eventbus` is an in-process publish/subscribe library. Independent
//! components communicate by posting events and registering listeners,
//! without holding references to one another.
//!
//! ## Features
//!
//! - **Event Hierarchies**: A listener for an event kind also receives every subtype
//! - **Priorities**: Five priority levels, from `Highest` to `Lowest`
//! - **Cancellation**: Cancellable events skip listeners that do not ask for canceled events
//! - **Subscribers**: Register all listener methods of a type in one call
//! - **Thread-Safe**: Register, unregister and post concurrently from any thread
//! - **Lazy Caches**: Flattened listener arrays are rebuilt only after changes
//!
//! ## Quick Start
//!
//! ```rust
//! use eventbus::{Event, EventBus, EventPriority};
//!
//! #[derive(Event, Debug)]
//! #[event(abstract)]
//! struct EntityEvent;
//!
//! #[derive(Event, Debug)]
//! #[event(cancellable)]
//! struct EntityJoin {
//!     #[event(parent)]
//!     base: EntityEvent,
//!     #[event(canceled)]
//!     canceled: bool,
//!     name: String,
//! }
//!
//! let bus = EventBus::new();
//!
//! bus.add_listener_with_priority(EventPriority::High, |event: &mut EntityJoin| {
//!     if event.name.is_empty() {
//!         event.canceled = true;
//!     }
//! })
//! .unwrap();
//!
//! bus.add_listener(|event: &mut EntityJoin| {
//!     println!("{} joined", event.name);
//! })
//! .unwrap();
//!
//! let event = bus
//!     .post(EntityJoin {
//!         base: EntityEvent,
//!         canceled: false,
//!         name: String::new(),
//!     })
//!     .unwrap();
//! assert!(event.canceled);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Lets the derive macros' `::eventbus` paths resolve inside this crate.
extern crate self as eventbus;

// Re-export derive macros
pub use eventbus_derive::{subscriber, Event};

// Core modules
pub mod bucket;
pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod exception;
pub mod hierarchy;
pub mod listener;
pub mod listener_list;
pub mod priority;
pub mod subscriber;
pub mod validator;

// Feature-gated modules
#[cfg(feature = "metrics")]
pub mod metrics;

// Re-exports for convenience
pub use bucket::PriorityBucket;
pub use bus::EventBus;
pub use config::{BusBuilder, BusConfig, CHECK_TYPES_ON_DISPATCH_ENV};
pub use error::*;
pub use event::{Ancestors, Event, EventKind};
pub use exception::{describe_failure, EventExceptionHandler, LoggingExceptionHandler};
pub use hierarchy::TypeHierarchyIndex;
pub use listener::{EventListener, IntoListenerResult, Listener, ListenerFn, ListenerId};
pub use listener_list::{FlattenedListeners, KindInfo, ListenerArray, ListenerListNode, NodeId};
pub use priority::EventPriority;
pub use subscriber::{
    Invoker, ParamType, SubscribeMethod, Subscriber, SubscriberClass, SubscriberKey,
    SupertypeInfo,
};
pub use validator::{
    AcceptAll, EventClassChecker, MarkerTypeChecker, RegistrationShape, RegistrationValidator,
};

#[cfg(feature = "metrics")]
pub use metrics::BusMetrics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{EventBusError, EventBusResult, ListenerError, ListenerResult};
    pub use crate::{
        subscriber, BusBuilder, BusConfig, Event, EventBus, EventKind, EventListener,
        EventPriority, ListenerId, Subscriber, SubscriberKey,
    };

    #[cfg(feature = "metrics")]
    pub use crate::BusMetrics;
}

/// Version information for the eventbus library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod test_builder;

#[cfg(test)]
mod test_listener_list;

#[cfg(test)]
mod test_hierarchy;


#[cfg(test)]
mod test_thread_safe;

#[cfg(all(test, feature = "metrics"))]
mod test_metrics;
