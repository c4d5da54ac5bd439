//! Reporting of listener failures.
//!
//! When a listener fails, dispatch stops and the bus' [`EventExceptionHandler`]
//! is told which listener failed, together with the full listener array it
//! was iterating. The failure is then handed back to the poster.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::error::ListenerError;
use crate::event::Event;
use crate::listener::EventListener;

/// Observer of listener failures.
pub trait EventExceptionHandler: Send + Sync {
    /// Called once for the first failing listener of a post.
    ///
    /// `index` is the position of the failing listener in `listeners`.
    fn handle_exception(
        &self,
        bus: &EventBus,
        event: &dyn Event,
        listeners: &[Arc<EventListener>],
        index: usize,
        error: &ListenerError,
    );
}

impl<F> EventExceptionHandler for F
where
    F: Fn(&EventBus, &dyn Event, &[Arc<EventListener>], usize, &ListenerError) + Send + Sync,
{
    fn handle_exception(
        &self,
        bus: &EventBus,
        event: &dyn Event,
        listeners: &[Arc<EventListener>],
        index: usize,
        error: &ListenerError,
    ) {
        self(bus, event, listeners, index, error)
    }
}

/// Logs every failure at error level. The default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExceptionHandler;

impl EventExceptionHandler for LoggingExceptionHandler {
    fn handle_exception(
        &self,
        _bus: &EventBus,
        event: &dyn Event,
        listeners: &[Arc<EventListener>],
        index: usize,
        error: &ListenerError,
    ) {
        tracing::error!(
            event = event.event_kind().name(),
            index,
            "{}",
            describe_failure(event, listeners, index, error)
        );
    }
}

/// Formats a multi-line report of a failed post, listing every listener.
pub fn describe_failure(
    event: &dyn Event,
    listeners: &[Arc<EventListener>],
    index: usize,
    error: &ListenerError,
) -> String {
    let mut report = String::new();
    let _ = writeln!(
        report,
        "Exception caught during firing event {}: {}",
        event.event_kind().name(),
        error
    );
    let _ = writeln!(report, "\tIndex: {index}");
    let _ = write!(report, "\tListeners:");
    for (position, listener) in listeners.iter().enumerate() {
        let _ = write!(
            report,
            "\n\t\t{}: {} {}",
            position,
            listener.priority(),
            listener.description()
        );
    }
    report
}
