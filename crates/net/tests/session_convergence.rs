use proptest::prelude::*;
use worldsync_common::{NetworkId, Transform, UserId};
use worldsync_net::{Session, SessionConfig};

#[derive(Debug, Clone)]
enum Step {
    Join,
    Leave(usize),
    Move(usize, f32),
    Teleport(usize),
    Tick,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Join),
        1 => (1usize..8).prop_map(Step::Leave),
        3 => (0usize..8, -10.0f32..10.0).prop_map(|(p, x)| Step::Move(p, x)),
        1 => (0usize..8).prop_map(Step::Teleport),
        2 => Just(Step::Tick),
    ]
}

fn pick(session: &Session, slot: usize) -> Option<UserId> {
    let peers = session.peers();
    if peers.is_empty() {
        None
    } else {
        Some(peers[slot % peers.len()].user())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn peers_converge_after_settling(
        steps in prop::collection::vec(step(), 1..24),
        delay in 0u64..3,
    ) {
        let config = SessionConfig {
            default_dispatch_delay: delay,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config).unwrap();
        session.join("host").unwrap();

        for (n, step) in steps.iter().enumerate() {
            match step {
                Step::Join => {
                    session.join(&format!("peer-{n}")).unwrap();
                }
                Step::Leave(slot) => {
                    let peers = session.peers().len();
                    if peers > 1 {
                        let user = session.peers()[1 + slot % (peers - 1)].user();
                        session.leave(&user).unwrap();
                    }
                }
                Step::Move(slot, x) => {
                    if let Some(user) = pick(&session, *slot) {
                        let peer = session.peer_mut(&user).unwrap();
                        if !peer.is_teleporting() {
                            let target = glam::Vec3::new(*x, 0.0, 0.0);
                            peer.move_avatar(Transform::from_position(target));
                        }
                    }
                }
                Step::Teleport(slot) => {
                    if let Some(user) = pick(&session, *slot) {
                        session.teleport(&user).unwrap();
                        session.settle(16);
                        session.rejoin(&user).unwrap();
                    }
                }
                Step::Tick => {
                    session.tick();
                }
            }
        }
        session.settle(64);
        // Deferred actions need the clock to pass their stamp.
        session.run(delay + 1);
        session.settle(64);

        prop_assert!(session.converged().unwrap());
        let roster = session.roster();
        for peer in session.peers() {
            let net = peer.network().unwrap();
            prop_assert_eq!(net.clients().len(), roster.len());
            for client in roster.iter() {
                prop_assert_eq!(net.clients().index_of(&client.user_id), Some(client.index));
                prop_assert!(net.object(client.user_id, NetworkId::AVATAR).is_some());
            }
        }
    }
}
