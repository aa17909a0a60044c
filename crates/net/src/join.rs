use serde::{Deserialize, Serialize};
use tracing::info;
use worldsync_common::{DispatchTime, NetworkId, PeerIndex, Transform};
use worldsync_kernel::{AvatarDetail, WorldAction};
use worldsync_store::{
    Action, ActionDraft, PendingWait, ReceptorId, Store, WaitCancelled, wait_for_action,
};

/// Prefab name used for every avatar object.
pub const AVATAR_PREFAB: &str = "avatar";

/// The slot the host assigned to a joining client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedClient {
    pub index: PeerIndex,
    pub name: String,
}

/// What the host sends a peer entering the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWorldResponse {
    pub elapsed_time: DispatchTime,
    pub client: JoinedClient,
    /// The host's cached actions, oldest first.
    pub cached_actions: Vec<Action<WorldAction>>,
    /// Announced to everyone when present. Left out when rejoining.
    #[serde(default)]
    pub avatar_detail: Option<AvatarDetail>,
    #[serde(default)]
    pub avatar_spawn_pose: Option<Transform>,
}

/// Bring a store into the world described by `response`.
///
/// Registers the local client, replays the cached actions in order, then marks
/// the world joined. A fresh avatar is announced to the other peers through
/// the store's outgoing queue.
pub fn receive_join_world(store: &mut Store<WorldAction>, response: JoinWorldResponse) {
    let me = store.dispatch_id();
    let JoinWorldResponse {
        elapsed_time,
        client,
        cached_actions,
        avatar_detail,
        avatar_spawn_pose,
    } = response;
    info!(
        store = store.name(),
        index = %client.index,
        cached = cached_actions.len(),
        elapsed_time,
        "joining world"
    );

    store.dispatch_local(WorldAction::ClientCreated {
        user_id: me,
        name: client.name,
        index: Some(client.index),
    });
    // Replayed history is already in the host's cache.
    for mut action in cached_actions {
        action.cache = false;
        store.receive(action);
    }
    store.dispatch_local(WorldAction::JoinedWorld);

    if let Some(avatar_detail) = avatar_detail {
        store.dispatch(
            ActionDraft::new(WorldAction::AvatarDetailUpdated {
                user_id: me,
                avatar_detail,
            })
            .cached(),
        );
    }
    if let Some(transform) = avatar_spawn_pose {
        store.dispatch(
            ActionDraft::new(WorldAction::ObjectSpawned {
                owner: me,
                network_id: NetworkId::AVATAR,
                prefab: AVATAR_PREFAB.into(),
                transform,
            })
            .cached(),
        );
    }
}

/// A teleport in flight, waiting for the next `JoinedWorld`.
#[derive(Debug)]
pub struct TeleportHandle {
    wait: PendingWait<()>,
    arrived: bool,
}

impl TeleportHandle {
    pub fn receptor(&self) -> ReceptorId {
        self.wait.receptor()
    }

    pub fn has_arrived(&self) -> bool {
        self.arrived
    }

    /// Check for arrival; on the first successful check the teleport flag is
    /// cleared. Returns `Err` if the wait was cancelled.
    pub fn poll_arrival(&mut self, store: &mut Store<WorldAction>) -> Result<bool, WaitCancelled> {
        if self.arrived {
            return Ok(true);
        }
        if self.wait.try_take()?.is_none() {
            return Ok(false);
        }
        self.arrived = true;
        store.dispatch_local(WorldAction::SetTeleporting {
            is_teleporting: false,
        });
        info!(store = store.name(), "teleport complete");
        Ok(true)
    }

    /// The underlying wait, for callers that prefer to await it.
    pub fn into_wait(self) -> PendingWait<()> {
        self.wait
    }
}

/// Leave the current scene: every remote client is dropped locally and the
/// engine enters its teleporting state until the world is joined again.
pub fn teleport_to_scene(store: &mut Store<WorldAction>) -> TeleportHandle {
    info!(store = store.name(), "teleporting");
    store.dispatch_local(WorldAction::ClientsCleared { remove_self: false });
    store.dispatch_local(WorldAction::SetTeleporting {
        is_teleporting: true,
    });
    // Only a join applied after the teleport flag counts; an earlier one may
    // still be queued.
    let mut armed = false;
    let wait = wait_for_action(store, move |action: &Action<WorldAction>| match action.payload {
        WorldAction::SetTeleporting { is_teleporting: true } => {
            armed = true;
            None
        }
        WorldAction::JoinedWorld if armed => Some(()),
        _ => None,
    });
    TeleportHandle {
        wait,
        arrived: false,
    }
}

/// Give up on a pending teleport.
pub fn abort_teleport(store: &mut Store<WorldAction>, handle: TeleportHandle) {
    if handle.arrived {
        return;
    }
    store.remove_action_receptor(handle.receptor());
    store.dispatch_local(WorldAction::SetTeleporting {
        is_teleporting: false,
    });
    info!(store = store.name(), "teleport aborted");
}
