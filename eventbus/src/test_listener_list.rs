//! Test file for ListenerListNode functionality

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::listener::erase;
    use crate::{
        Event, EventListener, EventPriority, ListenerListNode, ListenerId, TypeHierarchyIndex,
    };

    #[derive(Event, Debug, Default)]
    #[event(abstract)]
    struct Root;

    #[derive(Event, Debug, Default)]
    struct Child {
        #[event(parent)]
        base: Root,
    }

    #[derive(Event, Debug, Default)]
    struct GrandChild {
        #[event(parent)]
        base: Child,
    }

    #[derive(Event, Debug, Default)]
    #[event(cancellable)]
    struct Guarded {
        #[event(canceled)]
        canceled: bool,
    }

    #[derive(Event, Debug, Default)]
    struct GuardedChild {
        #[event(parent)]
        base: Guarded,
    }

    fn entry<E: Event>(name: &str, priority: EventPriority) -> Arc<EventListener> {
        EventListener::new(E::kind(), priority, false, name.to_string(), erase(|_: &mut E| {}))
    }

    fn add<E: Event>(
        index: &TypeHierarchyIndex,
        node: &ListenerListNode,
        name: &str,
        priority: EventPriority,
    ) -> ListenerId {
        let listener = entry::<E>(name, priority);
        let id = listener.id();
        node.register(index, priority, listener);
        id
    }

    fn order(index: &TypeHierarchyIndex, node: &ListenerListNode) -> Vec<String> {
        node.flattened(index)
            .listeners()
            .iter()
            .map(|listener| listener.description().to_string())
            .collect()
    }

    #[test]
    fn test_priority_then_insertion_order() {
        let index = TypeHierarchyIndex::new(false);
        let node = index.node_for(Child::kind()).unwrap();

        add::<Child>(&index, &node, "low", EventPriority::Low);
        add::<Child>(&index, &node, "highest-1", EventPriority::Highest);
        add::<Child>(&index, &node, "normal", EventPriority::Normal);
        add::<Child>(&index, &node, "highest-2", EventPriority::Highest);
        add::<Child>(&index, &node, "lowest", EventPriority::Lowest);

        assert_eq!(
            order(&index, &node),
            vec!["highest-1", "highest-2", "normal", "low", "lowest"]
        );
        assert_eq!(node.listener_count(), 5);
    }

    #[test]
    fn test_specific_kind_first_within_priority() {
        let index = TypeHierarchyIndex::new(false);
        let root = index.node_for(Root::kind()).unwrap();
        let child = index.node_for(Child::kind()).unwrap();
        let grand = index.node_for(GrandChild::kind()).unwrap();

        add::<Root>(&index, &root, "root-high", EventPriority::High);
        add::<Root>(&index, &root, "root-normal", EventPriority::Normal);
        add::<Child>(&index, &child, "child-normal", EventPriority::Normal);
        add::<Child>(&index, &child, "child-low", EventPriority::Low);
        add::<GrandChild>(&index, &grand, "grand-normal", EventPriority::Normal);

        assert_eq!(
            order(&index, &child),
            vec!["root-high", "child-normal", "root-normal", "child-low"]
        );
        assert_eq!(
            order(&index, &grand),
            vec![
                "root-high",
                "grand-normal",
                "child-normal",
                "root-normal",
                "child-low"
            ]
        );
        assert_eq!(order(&index, &root), vec!["root-high", "root-normal"]);
    }

    #[test]
    fn test_parent_change_invalidates_descendants() {
        let index = TypeHierarchyIndex::new(false);
        let grand = index.node_for(GrandChild::kind()).unwrap();
        let root = index.lookup(Root::kind().type_id()).unwrap();
        let child = index.lookup(Child::kind().type_id()).unwrap();

        assert!(grand.is_dirty());
        assert!(order(&index, &grand).is_empty());
        assert!(!grand.is_dirty());
        assert!(!child.is_dirty());

        let generation = grand.flattened(&index).generation();
        add::<Root>(&index, &root, "late", EventPriority::Normal);
        assert!(root.is_dirty());
        assert!(child.is_dirty());
        assert!(grand.is_dirty());

        assert_eq!(order(&index, &grand), vec!["late"]);
        assert!(grand.flattened(&index).generation() > generation);
        assert!(!child.is_dirty());
    }

    #[test]
    fn test_clean_cache_is_shared() {
        let index = TypeHierarchyIndex::new(false);
        let node = index.node_for(Child::kind()).unwrap();
        add::<Child>(&index, &node, "only", EventPriority::Normal);

        let first = node.flattened(&index);
        let second = node.flattened(&index);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_child_created_after_registration_inherits() {
        let index = TypeHierarchyIndex::new(false);
        let child = index.node_for(Child::kind()).unwrap();
        add::<Child>(&index, &child, "child", EventPriority::High);
        assert_eq!(order(&index, &child), vec!["child"]);

        let grand = index.node_for(GrandChild::kind()).unwrap();
        assert_eq!(order(&index, &grand), vec!["child"]);
    }

    #[test]
    fn test_unregister() {
        let index = TypeHierarchyIndex::new(false);
        let node = index.node_for(Child::kind()).unwrap();
        let first = add::<Child>(&index, &node, "first", EventPriority::Normal);
        add::<Child>(&index, &node, "second", EventPriority::Low);
        assert_eq!(order(&index, &node).len(), 2);

        assert!(node.unregister(&index, first));
        assert!(!node.unregister(&index, first));
        assert_eq!(order(&index, &node), vec!["second"]);
        assert!(!node.is_dirty());
    }

    #[test]
    fn test_cancellation_check_dropped_for_plain_kinds() {
        let index = TypeHierarchyIndex::new(false);
        let plain = index.node_for(Child::kind()).unwrap();
        add::<Child>(&index, &plain, "plain", EventPriority::Normal);
        let flattened = plain.flattened(&index);
        assert!(!flattened.listeners()[0].checks_cancellation());

        let guarded = index.node_for(Guarded::kind()).unwrap();
        add::<Guarded>(&index, &guarded, "guarded", EventPriority::Normal);
        let flattened = guarded.flattened(&index);
        assert!(flattened.listeners()[0].checks_cancellation());

        // Inherited cancellability keeps the check on subtypes as well.
        let sub = index.node_for(GuardedChild::kind()).unwrap();
        assert!(sub.info().cancellable);
        assert!(sub.flattened(&index).listeners()[0].checks_cancellation());
    }

    #[test]
    fn test_unwrapped_entries_keep_identity() {
        let listener = entry::<Child>("same", EventPriority::Normal);
        let unwrapped = listener.unwrap_if_safe();
        assert_eq!(listener.id(), unwrapped.id());
        assert!(listener.checks_cancellation());
        assert!(!unwrapped.checks_cancellation());
        assert!(Arc::ptr_eq(&unwrapped, &unwrapped.unwrap_if_safe()));
    }

    #[test]
    fn test_phase_listeners() {
        for track_phases in [false, true] {
            let index = TypeHierarchyIndex::new(track_phases);
            let root = index.node_for(Root::kind()).unwrap();
            let child = index.node_for(Child::kind()).unwrap();
            add::<Root>(&index, &root, "root-high", EventPriority::High);
            add::<Child>(&index, &child, "child-high", EventPriority::High);
            add::<Child>(&index, &child, "child-low", EventPriority::Low);

            let high: Vec<String> = child
                .phase_listeners(&index, EventPriority::High)
                .iter()
                .map(|listener| listener.description().to_string())
                .collect();
            assert_eq!(high, vec!["child-high", "root-high"]);
            assert_eq!(child.phase_listeners(&index, EventPriority::Low).len(), 1);
            assert!(child
                .phase_listeners(&index, EventPriority::Highest)
                .is_empty());
            assert_eq!(
                child.flattened(&index).phase(EventPriority::High).is_some(),
                track_phases
            );
        }
    }
}
