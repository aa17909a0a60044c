use crate::network::{NETWORK_SLICE, NetworkWorld};
use tracing::{debug, info};
use worldsync_common::UserId;
use worldsync_kernel::WorldAction;
use worldsync_store::{Action, ReceptorContext, ReceptorError, Store, StoreError};

/// Applies client and network-object actions to the [`NETWORK_SLICE`].
///
/// Actions that refer to a client or object this peer does not know are
/// dropped with a debug log: across the network an update may overtake the
/// create it depends on.
pub fn network_action_receptor(
    ctx: &mut ReceptorContext<'_, WorldAction>,
    action: &Action<WorldAction>,
) -> Result<(), ReceptorError> {
    let net = ctx.state_mut::<NetworkWorld>(NETWORK_SLICE)?;
    match &action.payload {
        WorldAction::ClientCreated {
            user_id,
            name,
            index,
        } => {
            let assigned = net.clients_mut().create(*user_id, name.clone(), *index);
            if index.is_some_and(|hint| hint != assigned) {
                debug!(user = %user_id, hint = ?index, %assigned, "index hint already taken");
            }
            info!(user = %user_id, index = %assigned, name = %name, "client joined");
        }
        WorldAction::AvatarDetailUpdated {
            user_id,
            avatar_detail,
        } => {
            if !net.clients_mut().update_avatar(user_id, avatar_detail.clone()) {
                stale(action, user_id);
            }
        }
        WorldAction::ClientNameUpdated { user_id, name } => {
            if !net.clients_mut().update_name(user_id, name.clone()) {
                stale(action, user_id);
            }
        }
        WorldAction::ChatSubscriptionsUpdated { user_id, channels } => {
            if !net.clients_mut().update_subscriptions(user_id, channels.clone()) {
                stale(action, user_id);
            }
        }
        WorldAction::ClientRemoved { user_id } => {
            if net.remove_client(user_id).is_some() {
                info!(user = %user_id, "client left");
            } else {
                debug!(user = %user_id, "client already removed");
            }
        }
        WorldAction::ClientsCleared { remove_self } => {
            let removed = net.remove_all_network_clients(*remove_self);
            info!(removed, remove_self, "network clients cleared");
        }
        WorldAction::ObjectSpawned {
            owner,
            network_id,
            prefab,
            transform,
        } => {
            if !net.spawn_object(*owner, *network_id, prefab.clone(), *transform) {
                debug!(
                    owner = %owner,
                    network_id = network_id.0,
                    "spawn dropped: unknown owner or duplicate"
                );
            }
        }
        WorldAction::ObjectDestroyed { owner, network_id } => {
            if net.destroy_object(*owner, *network_id).is_none() {
                debug!(owner = %owner, network_id = network_id.0, "object already destroyed");
            }
        }
        WorldAction::ObjectTeleported {
            owner,
            network_id,
            transform,
        } => {
            if !net.teleport_object(*owner, *network_id, *transform) {
                stale(action, owner);
            }
        }
        WorldAction::AuthorityTransferred {
            owner,
            network_id,
            new_authority,
        } => {
            if !net.transfer_authority(*owner, *network_id, *new_authority) {
                stale(action, owner);
            }
        }
        WorldAction::BrowserNotSupported { .. }
        | WorldAction::ResetEngine { .. }
        | WorldAction::UserAvatarTapped { .. }
        | WorldAction::InitializeEngine { .. }
        | WorldAction::SceneUnloaded
        | WorldAction::SceneLoading
        | WorldAction::SceneLoaded
        | WorldAction::SceneLoadingProgress { .. }
        | WorldAction::JoinedWorld
        | WorldAction::LeaveWorld
        | WorldAction::ConnectToWorld { .. }
        | WorldAction::ConnectToWorldTimeout { .. }
        | WorldAction::SetTeleporting { .. }
        | WorldAction::SetUserHasInteracted
        | WorldAction::EntityErrorUpdate { .. }
        | WorldAction::XrSupported { .. }
        | WorldAction::ObjectActivation { .. } => {}
    }
    Ok(())
}

fn stale(action: &Action<WorldAction>, user: &UserId) {
    debug!(kind = action.kind(), user = %user, from = %action.from, "stale reference dropped");
}

/// Register the network slice for `local_user` and its receptor on `store`.
pub fn install_network_world(
    store: &mut Store<WorldAction>,
    local_user: UserId,
) -> Result<(), StoreError> {
    store.register_state(NETWORK_SLICE, NetworkWorld::new(local_user))?;
    store.add_action_receptor(network_action_receptor);
    Ok(())
}

/// Read the network slice.
pub fn network_world(store: &Store<WorldAction>) -> Result<&NetworkWorld, StoreError> {
    store.state(NETWORK_SLICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldsync_common::{NetworkId, PeerIndex, Transform};
    use worldsync_kernel::AvatarDetail;
    use worldsync_store::StoreOptions;

    fn store(local: UserId) -> Store<WorldAction> {
        let mut store = Store::new(StoreOptions::new("net-test").dispatch_id(move || local));
        install_network_world(&mut store, local).unwrap();
        store
    }

    fn created(user: UserId, name: &str) -> WorldAction {
        WorldAction::ClientCreated {
            user_id: user,
            name: name.into(),
            index: None,
        }
    }

    fn detail(url: &str) -> AvatarDetail {
        AvatarDetail {
            avatar_url: url.into(),
            thumbnail_url: format!("{url}.png"),
        }
    }

    #[test]
    fn create_then_update_avatar() {
        let me = UserId::new();
        let mut store = store(me);
        store.dispatch(created(me, "me"));
        store.dispatch(WorldAction::AvatarDetailUpdated {
            user_id: me,
            avatar_detail: detail("robot.glb"),
        });
        store.apply_incoming_actions();

        let net = network_world(&store).unwrap();
        let client = net.clients().get(&me).unwrap();
        assert_eq!(client.index, PeerIndex(0));
        assert_eq!(client.avatar_detail, Some(detail("robot.glb")));
    }

    #[test]
    fn avatar_update_before_create_is_dropped() {
        let me = UserId::new();
        let late = UserId::new();
        let mut store = store(me);
        store.dispatch(WorldAction::AvatarDetailUpdated {
            user_id: late,
            avatar_detail: detail("early.glb"),
        });
        store.dispatch(created(late, "late"));
        assert_eq!(store.apply_incoming_actions(), 2);

        let net = network_world(&store).unwrap();
        assert_eq!(net.clients().get(&late).unwrap().avatar_detail, None);
    }

    #[test]
    fn removing_twice_matches_removing_once() {
        let me = UserId::new();
        let other = UserId::new();
        let mut once = store(me);
        let mut twice = store(me);
        for s in [&mut once, &mut twice] {
            s.dispatch(created(me, "me"));
            s.dispatch(created(other, "other"));
            s.dispatch(WorldAction::ClientRemoved { user_id: other });
        }
        twice.dispatch(WorldAction::ClientRemoved { user_id: other });
        once.apply_incoming_actions();
        twice.apply_incoming_actions();

        let a = network_world(&once).unwrap();
        let b = network_world(&twice).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(b.clients().len(), 1);
        assert!(b.clients().is_consistent());
    }

    #[test]
    fn clients_cleared_keeps_self_when_asked() {
        let me = UserId::new();
        let mut store = store(me);
        store.dispatch(created(me, "me"));
        store.dispatch(created(UserId::new(), "a"));
        store.dispatch(created(UserId::new(), "b"));
        store.dispatch(WorldAction::ClientsCleared { remove_self: false });
        store.apply_incoming_actions();
        let net = network_world(&store).unwrap();
        assert_eq!(net.clients().len(), 1);
        assert!(net.clients().contains(&me));
    }

    #[test]
    fn object_lifecycle_through_actions() {
        let me = UserId::new();
        let mut store = store(me);
        store.dispatch(created(me, "me"));
        store.dispatch(WorldAction::ObjectSpawned {
            owner: me,
            network_id: NetworkId::AVATAR,
            prefab: "avatar".into(),
            transform: Transform::default(),
        });
        store.dispatch(WorldAction::ObjectTeleported {
            owner: me,
            network_id: NetworkId::AVATAR,
            transform: Transform::from_position(glam::Vec3::X),
        });
        store.apply_incoming_actions();
        let net = network_world(&store).unwrap();
        let entity = net.object(me, NetworkId::AVATAR).unwrap().entity;
        assert_eq!(net.world().get(entity).unwrap().transform.position, glam::Vec3::X);

        store.dispatch(WorldAction::ObjectDestroyed {
            owner: me,
            network_id: NetworkId::AVATAR,
        });
        store.dispatch(WorldAction::ObjectDestroyed {
            owner: me,
            network_id: NetworkId::AVATAR,
        });
        assert_eq!(store.apply_incoming_actions(), 2);
        assert_eq!(network_world(&store).unwrap().object_count(), 0);
    }

    #[test]
    fn engine_actions_are_ignored() {
        let me = UserId::new();
        let mut store = store(me);
        store.dispatch(WorldAction::JoinedWorld);
        store.apply_incoming_actions();
        assert!(network_world(&store).unwrap().clients().is_empty());
    }
}
