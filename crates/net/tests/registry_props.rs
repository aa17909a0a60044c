use proptest::prelude::*;
use std::collections::BTreeSet;
use worldsync_common::{PeerIndex, UserId};
use worldsync_kernel::WorldAction;
use worldsync_net::{ClientRegistry, install_network_world, network_world};
use worldsync_store::{Store, StoreOptions};

#[derive(Debug, Clone)]
enum Op {
    Create(usize, Option<u32>),
    Remove(usize),
    Clear(bool),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..8, prop::option::of(0u32..8)).prop_map(|(u, hint)| Op::Create(u, hint)),
        3 => (0usize..8).prop_map(Op::Remove),
        1 => any::<bool>().prop_map(Op::Clear),
    ]
}

fn to_action(op: &Op, users: &[UserId]) -> WorldAction {
    match op {
        Op::Create(u, hint) => WorldAction::ClientCreated {
            user_id: users[*u],
            name: format!("user-{u}"),
            index: hint.map(PeerIndex),
        },
        Op::Remove(u) => WorldAction::ClientRemoved { user_id: users[*u] },
        Op::Clear(remove_self) => WorldAction::ClientsCleared {
            remove_self: *remove_self,
        },
    }
}

fn run(users: &[UserId], actions: impl IntoIterator<Item = WorldAction>) -> Store<WorldAction> {
    let me = users[0];
    let mut store = Store::new(StoreOptions::new("props").dispatch_id(move || me));
    install_network_world(&mut store, me).unwrap();
    for action in actions {
        store.dispatch(action);
    }
    store.apply_incoming_actions();
    store
}

proptest! {
    #[test]
    fn registry_stays_bidirectionally_consistent(ops in prop::collection::vec(op(), 0..64)) {
        let users: Vec<UserId> = (0..8).map(|_| UserId::new()).collect();
        let mut reg = ClientRegistry::new();
        for op in &ops {
            match op {
                Op::Create(u, hint) => {
                    let index = reg.create(users[*u], "u", hint.map(PeerIndex));
                    prop_assert_eq!(reg.user_at(index), Some(users[*u]));
                }
                Op::Remove(u) => {
                    reg.remove(&users[*u]);
                    prop_assert!(reg.index_of(&users[*u]).is_none());
                }
                Op::Clear(keep_first) => {
                    reg.remove_all(keep_first.then_some(users[0]));
                }
            }
            prop_assert!(reg.is_consistent());
            let indices: BTreeSet<PeerIndex> = reg.iter().map(|c| c.index).collect();
            prop_assert_eq!(indices.len(), reg.len());
        }
    }

    #[test]
    fn duplicate_removals_change_nothing(
        ops in prop::collection::vec(op(), 0..48),
        victim in 0usize..8,
    ) {
        let users: Vec<UserId> = (0..8).map(|_| UserId::new()).collect();
        let base: Vec<WorldAction> = ops.iter().map(|op| to_action(op, &users)).collect();
        let removal = WorldAction::ClientRemoved { user_id: users[victim] };

        let once = run(&users, base.iter().cloned().chain([removal.clone()]));
        let twice = run(&users, base.iter().cloned().chain([removal.clone(), removal]));

        let once = network_world(&once).unwrap();
        let twice = network_world(&twice).unwrap();
        prop_assert_eq!(once.digest(), twice.digest());
        prop_assert!(twice.clients().is_consistent());
        prop_assert!(!twice.clients().contains(&users[victim]));
    }
}
