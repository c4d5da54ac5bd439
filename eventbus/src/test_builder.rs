//! Test file for BusBuilder functionality

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::{BusConfig, Event, EventBus, EventBusError, EventKind, EventListener, ListenerError};

    struct ClientBus;

    #[derive(Event, Debug, Default)]
    #[event(markers(ClientBus))]
    struct Frame {
        number: u64,
    }

    #[derive(Event, Debug, Default)]
    struct Unmarked;

    #[test]
    fn test_event_bus_builder() {
        let bus = EventBus::builder()
            .start_shutdown()
            .check_types_on_dispatch()
            .allow_per_phase_post()
            .build();

        let config = bus.config();
        assert!(config.start_shutdown);
        assert!(config.check_types_on_dispatch);
        assert!(config.allow_per_phase_post);
        assert!(bus.is_shutdown());
        assert!(bus.hierarchy().tracks_phases());
    }

    #[test]
    fn test_event_bus_builder_defaults() {
        let bus = EventBus::builder().build();

        assert_eq!(bus.config(), &BusConfig::default());
        assert!(!bus.is_shutdown());
        assert!(!bus.hierarchy().tracks_phases());
        assert_eq!(bus.hierarchy().node_count(), 0);
    }

    #[test]
    fn test_with_config() {
        let bus = EventBus::with_config(BusConfig {
            start_shutdown: true,
            ..Default::default()
        });
        assert!(bus.is_shutdown());

        bus.start();
        assert!(!bus.is_shutdown());
        // Starting twice is harmless.
        bus.start();
        assert!(!bus.is_shutdown());
    }

    #[test]
    fn test_marker_type_restricts_registration() {
        let bus = EventBus::builder().marker_type::<ClientBus>().build();

        bus.add_listener(|frame: &mut Frame| frame.number += 1).unwrap();
        let error = bus.add_listener(|_: &mut Unmarked| {}).unwrap_err();
        assert!(matches!(
            error,
            EventBusError::RejectedEvent {
                event: "Unmarked",
                ..
            }
        ));

        // Without dispatch checks, posting an unmarked event is allowed.
        assert!(bus.post(Unmarked).is_ok());
        assert_eq!(bus.post(Frame::default()).unwrap().number, 1);
    }

    #[test]
    fn test_check_types_on_dispatch() {
        let bus = EventBus::builder()
            .marker_type::<ClientBus>()
            .check_types_on_dispatch()
            .build();

        let error = bus.post(Unmarked).unwrap_err();
        assert!(matches!(error, EventBusError::RejectedEvent { .. }));
        assert!(bus.post(Frame::default()).is_ok());
    }

    #[test]
    fn test_custom_class_checker() {
        let checked = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&checked);
        let bus = EventBus::builder()
            .with_class_checker(move |kind: &EventKind| {
                seen.fetch_add(1, Ordering::SeqCst);
                if kind.name() == "Unmarked" {
                    Err("not allowed here".to_string())
                } else {
                    Ok(())
                }
            })
            .build();

        bus.add_listener(|_: &mut Frame| {}).unwrap();
        let error = bus.add_listener(|_: &mut Unmarked| {}).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Event Unmarked is not accepted by this bus: not allowed here"
        );
        assert_eq!(checked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_custom_exception_handler() {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        let bus = EventBus::builder()
            .with_exception_handler(
                move |_: &EventBus,
                      _: &dyn Event,
                      _: &[Arc<EventListener>],
                      _: usize,
                      _: &ListenerError| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
            .build();

        bus.add_listener(|_: &mut Frame| -> Result<(), String> { Err("boom".into()) })
            .unwrap();
        assert!(bus.post(Frame::default()).is_err());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builder_debug() {
        let builder = EventBus::builder().allow_per_phase_post();
        let debug = format!("{builder:?}");
        assert!(debug.contains("allow_per_phase_post: true"));
    }
}
