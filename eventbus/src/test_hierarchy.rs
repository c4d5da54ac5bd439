//! Test file for TypeHierarchyIndex functionality

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::{Event, EventBusError, TypeHierarchyIndex};

    #[derive(Event, Debug, Default)]
    #[event(abstract)]
    struct Root;

    #[derive(Event, Debug, Default)]
    #[event(abstract)]
    struct Middle {
        #[event(parent)]
        base: Root,
    }

    #[derive(Event, Debug, Default)]
    struct Leaf {
        #[event(parent)]
        base: Middle,
    }

    #[derive(Event, Debug, Default)]
    struct Concrete;

    #[derive(Event, Debug, Default)]
    #[event(abstract)]
    struct Gap {
        #[event(parent)]
        base: Concrete,
    }

    #[derive(Event, Debug, Default)]
    struct BelowGap {
        #[event(parent)]
        base: Gap,
    }

    #[test]
    fn test_ancestor_nodes_are_created() {
        let index = TypeHierarchyIndex::new(false);
        let leaf = index.node_for(Leaf::kind()).unwrap();

        assert_eq!(index.node_count(), 3);
        let names: Vec<&str> = index.kinds().iter().map(|kind| kind.name()).collect();
        assert_eq!(names, vec!["Root", "Middle", "Leaf"]);

        let middle = index.node(leaf.parent().unwrap()).unwrap();
        assert_eq!(middle.kind(), Middle::kind());
        assert_eq!(middle.children(), vec![leaf.id()]);
        assert_eq!(leaf.info().depth, 2);
        assert!(!leaf.info().cancellable);

        let root = index.lookup(Root::kind().type_id()).unwrap();
        assert!(root.parent().is_none());
        assert_eq!(root.children(), vec![middle.id()]);
    }

    #[test]
    fn test_node_for_is_stable() {
        let index = TypeHierarchyIndex::new(false);
        let first = index.node_for(Leaf::kind()).unwrap();
        let second = index.node_for(Leaf::kind()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(index.node_count(), 3);
        assert!(index.lookup(Concrete::kind().type_id()).is_none());
    }

    #[test]
    fn test_broken_abstract_chain() {
        let index = TypeHierarchyIndex::new(false);

        for _ in 0..2 {
            let error = index.node_for(BelowGap::kind()).unwrap_err();
            assert!(matches!(
                error,
                EventBusError::BrokenAbstractChain {
                    event: "BelowGap",
                    parent: "Gap",
                    ancestor: "Concrete",
                }
            ));
        }
        assert_eq!(index.node_count(), 0);

        // The abstract kind itself sits directly below a concrete one.
        assert!(index.node_for(Gap::kind()).is_ok());
        assert!(index.node_for(BelowGap::kind()).is_err());
    }

    #[test]
    fn test_concurrent_creation_converges() {
        let index = Arc::new(TypeHierarchyIndex::new(true));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    index.node_for(Leaf::kind()).unwrap()
                })
            })
            .collect();

        let nodes: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        for node in &nodes[1..] {
            assert!(Arc::ptr_eq(&nodes[0], node));
        }
        assert_eq!(index.node_count(), 3);

        let root = index.lookup(Root::kind().type_id()).unwrap();
        assert_eq!(root.children().len(), 1);
    }
}
