use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use worldsync_store::{ActionKind, ReceptorError, Store, StoreOptions};

#[derive(Debug, Clone, PartialEq)]
struct Seq(u32);

impl ActionKind for Seq {
    fn kind(&self) -> &'static str {
        "test.seq"
    }
}

proptest! {
    #[test]
    fn receptors_observe_dispatch_order(
        values in prop::collection::vec(any::<u32>(), 0..64),
        passes in 1usize..4,
    ) {
        let mut store: Store<Seq> = Store::new(StoreOptions::new("fifo"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.add_action_receptor(move |_, action| {
            sink.borrow_mut().push(action.payload.0);
            Ok(())
        });

        // Spread the dispatches over several passes.
        let chunk = values.len() / passes + 1;
        for part in values.chunks(chunk) {
            for v in part {
                store.dispatch(Seq(*v));
            }
            store.apply_incoming_actions();
        }

        prop_assert_eq!(&*seen.borrow(), &values);
        let history: Vec<u32> = store
            .actions()
            .incoming_history
            .iter()
            .map(|a| a.payload.0)
            .collect();
        prop_assert_eq!(history, values);
    }

    #[test]
    fn faulty_receptor_never_stalls_queue(
        values in prop::collection::vec(0u32..10, 1..32),
    ) {
        let mut store: Store<Seq> = Store::new(StoreOptions::new("faulty"));
        store.add_action_receptor(|_, action| {
            if action.payload.0 % 3 == 0 {
                Err(ReceptorError::Rejected(format!("bad {}", action.payload.0)))
            } else {
                Ok(())
            }
        });
        let count = Rc::new(RefCell::new(0usize));
        let sink = count.clone();
        store.add_action_receptor(move |_, _| {
            *sink.borrow_mut() += 1;
            Ok(())
        });

        for v in &values {
            store.dispatch(Seq(*v));
        }
        prop_assert_eq!(store.apply_incoming_actions(), values.len());
        prop_assert_eq!(*count.borrow(), values.len());
        prop_assert!(store.actions().incoming.is_empty());
    }
}
