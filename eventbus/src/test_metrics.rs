//! Test file for metrics functionality

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use prometheus::Registry;

    use crate::{subscriber, BusMetrics, Event, EventBus, EventPriority};

    #[derive(Event, Debug, Default)]
    struct Tick;

    #[derive(Event, Debug, Default)]
    #[event(cancellable)]
    struct Shot {
        #[event(canceled)]
        canceled: bool,
    }

    struct Watcher;

    #[subscriber]
    impl Watcher {
        #[subscribe_event]
        fn first(&self, _tick: &mut Tick) {}

        #[subscribe_event]
        fn second(&self, _tick: &mut Tick) -> Result<(), String> {
            Err("second failed".to_string())
        }
    }

    fn bus_with_metrics(prefix: &str) -> (EventBus, BusMetrics) {
        let metrics = BusMetrics::new(prefix).unwrap();
        let bus = EventBus::builder().with_metrics(metrics.clone()).build();
        (bus, metrics)
    }

    #[test]
    fn test_metrics_registration() {
        let registry = Registry::new();
        let metrics = BusMetrics::new("test_bus").unwrap();
        metrics.register(&registry).unwrap();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"test_bus_posts_total".to_string()));
        assert!(names.contains(&"test_bus_listener_failures_total".to_string()));
        assert!(names.contains(&"test_bus_registered_listeners".to_string()));

        // The same names cannot be registered twice.
        assert!(metrics.register(&registry).is_err());
    }

    #[test]
    fn test_posts_and_invocations() {
        let (bus, metrics) = bus_with_metrics("posts");
        bus.add_listener(|_: &mut Tick| {}).unwrap();
        bus.add_listener(|_: &mut Tick| {}).unwrap();

        bus.post(Tick).unwrap();
        bus.post(Tick).unwrap();

        assert_eq!(metrics.posts(), 2);
        assert_eq!(metrics.invocations(), 4);
        assert_eq!(metrics.failures(), 0);
        assert_eq!(metrics.registered_listeners(), 2);
    }

    #[test]
    fn test_failures_and_unregistration() {
        let (bus, metrics) = bus_with_metrics("failures");
        let watcher = Arc::new(Watcher);
        bus.register(&watcher).unwrap();
        assert_eq!(metrics.registered_listeners(), 2);

        assert!(bus.post(Tick).is_err());
        assert_eq!(metrics.posts(), 1);
        assert_eq!(metrics.invocations(), 2);
        assert_eq!(metrics.failures(), 1);

        bus.unregister(&watcher);
        assert_eq!(metrics.registered_listeners(), 0);
    }

    #[test]
    fn test_skipped_listeners_are_not_counted() {
        let (bus, metrics) = bus_with_metrics("canceled");
        bus.add_listener_with_priority(EventPriority::High, |shot: &mut Shot| {
            shot.canceled = true;
        })
        .unwrap();
        bus.add_listener(|_: &mut Shot| {}).unwrap();
        bus.add_listener_with(EventPriority::Low, true, |_: &mut Shot| {})
            .unwrap();

        bus.post(Shot::default()).unwrap();
        assert_eq!(metrics.posts(), 1);
        assert_eq!(metrics.invocations(), 2);

        bus.post(Shot { canceled: true }).unwrap();
        assert_eq!(metrics.invocations(), 3);
    }

    #[test]
    fn test_shutdown_posts_are_not_counted() {
        let metrics = BusMetrics::new("shutdown").unwrap();
        let bus = EventBus::builder()
            .start_shutdown()
            .with_metrics(metrics.clone())
            .build();
        bus.add_listener(|_: &mut Tick| {}).unwrap();

        bus.post(Tick).unwrap();
        assert_eq!(metrics.posts(), 0);
        assert_eq!(metrics.invocations(), 0);
    }
}
