//! Test file for concurrent use of EventBus

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::{subscriber, Event, EventBus, EventPriority};

    #[derive(Event, Debug, Default)]
    struct Counted;

    #[derive(Event, Debug, Default)]
    struct Parent {
        hits: usize,
    }

    #[derive(Event, Debug, Default)]
    struct ChildEvent {
        #[event(parent)]
        base: Parent,
    }

    #[derive(Default)]
    struct Tally;

    #[subscriber]
    impl Tally {
        #[subscribe_event]
        fn on_parent(&self, event: &mut Parent) {
            event.hits += 1;
        }
    }

    const THREADS: usize = 8;
    const PER_THREAD: usize = 1000;

    #[test]
    fn test_concurrent_registration_loses_nothing() {
        let bus = Arc::new(EventBus::new());
        let invocations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|thread_index| {
                let bus = Arc::clone(&bus);
                let invocations = Arc::clone(&invocations);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        let invocations = Arc::clone(&invocations);
                        let priority = EventPriority::ALL[(thread_index + i) % EventPriority::COUNT];
                        bus.add_listener_with_priority(priority, move |_: &mut Counted| {
                            invocations.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bus.listener_count::<Counted>().unwrap(), THREADS * PER_THREAD);
        bus.post(Counted).unwrap();
        assert_eq!(invocations.load(Ordering::Relaxed), THREADS * PER_THREAD);
    }

    #[test]
    fn test_posting_while_registering() {
        let bus = Arc::new(EventBus::new());
        let done = Arc::new(AtomicBool::new(false));

        let poster = {
            let bus = Arc::clone(&bus);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last = 0;
                while !done.load(Ordering::Acquire) {
                    let event = bus.post(ChildEvent::default()).unwrap();
                    // Listeners are only ever added, so no post sees fewer than an earlier one.
                    assert!(event.base.hits >= last);
                    last = event.base.hits;
                }
            })
        };

        let registrars: Vec<_> = (0..4)
            .map(|index| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    for _ in 0..250 {
                        if index % 2 == 0 {
                            bus.add_listener(|e: &mut Parent| e.hits += 1).unwrap();
                        } else {
                            bus.add_listener(|e: &mut ChildEvent| e.base.hits += 1).unwrap();
                        }
                    }
                })
            })
            .collect();

        for handle in registrars {
            handle.join().unwrap();
        }
        done.store(true, Ordering::Release);
        poster.join().unwrap();

        // Every registration that returned is visible to the next post.
        assert_eq!(bus.post(ChildEvent::default()).unwrap().base.hits, 1000);
        assert_eq!(bus.post(Parent::default()).unwrap().hits, 500);
    }

    #[test]
    fn test_concurrent_register_and_unregister() {
        let bus = Arc::new(EventBus::new());
        let keep = bus.add_listener(|e: &mut Parent| e.hits += 1).unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let id = bus.add_listener(|e: &mut Parent| e.hits += 100).unwrap();
                        bus.post(ChildEvent::default()).unwrap();
                        assert!(bus.unregister(id));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(bus.is_registered(keep));
        assert_eq!(bus.post(ChildEvent::default()).unwrap().base.hits, 1);
    }

    #[test]
    fn test_register_racing_unregister_leaves_no_stale_listeners() {
        let bus = Arc::new(EventBus::new());

        for _ in 0..500 {
            let target = Arc::new(Tally);
            let barrier = Arc::new(Barrier::new(2));

            let registering = {
                let bus = Arc::clone(&bus);
                let target = Arc::clone(&target);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    bus.register(&target).unwrap();
                })
            };
            let unregistering = {
                let bus = Arc::clone(&bus);
                let target = Arc::clone(&target);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    bus.unregister(&target);
                })
            };
            registering.join().unwrap();
            unregistering.join().unwrap();

            // The nodes agree with the registration record either way.
            let expected = usize::from(bus.is_registered(&target));
            assert_eq!(bus.listener_count::<Parent>().unwrap(), expected);
            assert_eq!(bus.post(Parent::default()).unwrap().hits, expected);

            bus.unregister(&target);
            assert_eq!(bus.listener_count::<Parent>().unwrap(), 0);
        }
    }

    #[test]
    fn test_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventBus>();
    }
}
