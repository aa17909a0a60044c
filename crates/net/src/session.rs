//! In-process session driver: a host and its peers connected through a
//! [`MemoryHub`], all stamping time from one [`LogicalClock`].
//!
//! The first peer to join is the host. It assigns client indices, broadcasts
//! each joiner's `ClientCreated`, and its cache is the snapshot late joiners
//! replay.

use crate::config::{ConfigError, SessionConfig};
use crate::join::{
    JoinWorldResponse, JoinedClient, TeleportHandle, abort_teleport, receive_join_world,
    teleport_to_scene,
};
use crate::network::NetworkWorld;
use crate::receptor::{install_network_world, network_world};
use crate::registry::ClientRegistry;
use crate::transport::{HubConnection, MemoryHub, TransportError, pump};
use glam::Vec3;
use tracing::{debug, info, warn};
use worldsync_common::{DispatchTime, LogicalClock, NetworkId, PeerIndex, Transform, UserId};
use worldsync_kernel::{
    AvatarDetail, EngineState, WorldAction, engine_state, install_engine_state, kinds,
};
use worldsync_store::{Action, ActionDraft, Store, StoreError, receive_action_once};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no peer {0} in this session")]
    UnknownPeer(UserId),
    #[error("the host cannot leave the session")]
    HostCannotLeave,
    #[error("peer {0} is not teleporting")]
    NotTeleporting(UserId),
}

/// One participant: its store and its end of the hub.
#[derive(Debug)]
pub struct Peer {
    user: UserId,
    name: String,
    store: Store<WorldAction>,
    connection: HubConnection,
    teleport: Option<TeleportHandle>,
    connection_lost: bool,
}

impl Peer {
    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Store<WorldAction> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<WorldAction> {
        &mut self.store
    }

    pub fn is_connected(&self) -> bool {
        !self.connection_lost
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleport.is_some()
    }

    pub fn engine(&self) -> Result<&EngineState, StoreError> {
        engine_state(&self.store)
    }

    pub fn network(&self) -> Result<&NetworkWorld, StoreError> {
        network_world(&self.store)
    }

    /// Move this peer's avatar for everyone, late joiners included.
    pub fn move_avatar(&mut self, transform: Transform) {
        self.store.dispatch(
            ActionDraft::new(WorldAction::ObjectTeleported {
                owner: self.user,
                network_id: NetworkId::AVATAR,
                transform,
            })
            .cached(),
        );
    }

    /// Exchange frames with the hub, then run one processing pass.
    /// Returns how many actions were applied.
    pub fn sync(&mut self) -> usize {
        if !self.connection_lost {
            match pump(&mut self.store, &mut self.connection) {
                Ok(_) => {}
                Err(TransportError::Disconnected(_)) => self.connection_lost = true,
                Err(err) => warn!(peer = %self.user, error = %err, "pump failed"),
            }
        }
        let applied = self.store.apply_incoming_actions();
        self.poll_teleport();
        applied
    }

    fn poll_teleport(&mut self) {
        let Some(handle) = self.teleport.as_mut() else {
            return;
        };
        let done = match handle.poll_arrival(&mut self.store) {
            Ok(arrived) => arrived,
            Err(err) => {
                warn!(peer = %self.user, error = %err, "teleport wait dropped");
                true
            }
        };
        if done {
            self.teleport = None;
        }
    }

    /// Nothing queued locally and nothing waiting on the hub.
    fn is_idle(&self) -> bool {
        let actions = self.store.actions();
        actions.incoming.is_empty()
            && actions.outgoing.is_empty()
            && (self.connection_lost || self.connection.pending() == 0)
    }
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    clock: LogicalClock,
    hub: MemoryHub,
    roster: ClientRegistry,
    peers: Vec<Peer>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            clock: LogicalClock::new(),
            hub: MemoryHub::new(),
            roster: ClientRegistry::new(),
            peers: Vec::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn now(&self) -> DispatchTime {
        self.clock.now()
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }

    /// The host's index assignments.
    pub fn roster(&self) -> &ClientRegistry {
        &self.roster
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn host(&self) -> Option<&Peer> {
        self.peers.first()
    }

    pub fn peer(&self, user: &UserId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.user == *user)
    }

    pub fn peer_mut(&mut self, user: &UserId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|peer| peer.user == *user)
    }

    fn position(&self, user: &UserId) -> Result<usize, SessionError> {
        self.peers
            .iter()
            .position(|peer| peer.user == *user)
            .ok_or(SessionError::UnknownPeer(*user))
    }

    /// Add a peer named `name`. The first peer becomes the host.
    pub fn join(&mut self, name: &str) -> Result<UserId, SessionError> {
        let user = UserId::new();
        let mut store = Store::new(self.config.store_options(
            format!("{}/{}", self.config.world, name),
            user,
            &self.clock,
        ));
        install_engine_state(&mut store)?;
        install_network_world(&mut store, user)?;

        // The snapshot must hold everything sent before the joiner connects
        // and nothing it will also receive from the hub.
        if let Some(host) = self.peers.first_mut() {
            host.sync();
        }
        let connection = self.hub.connect(user);
        let cached_actions = self.host_snapshot();
        let index = self.roster.create(user, name, None);

        let created = ActionDraft::new(WorldAction::ClientCreated {
            user_id: user,
            name: name.to_owned(),
            index: Some(index),
        })
        .cached();
        match self.peers.first_mut() {
            Some(host) => {
                host.store.dispatch(created);
                host.sync();
            }
            None => store.dispatch(created),
        }

        load_scene(&mut store);
        let world = self.config.world.clone();
        receive_action_once(&mut store, kinds::JOINED_WORLD, move |action| {
            debug!(user = %action.from, world = %world, time = action.time, "joined world applied");
        });
        receive_join_world(
            &mut store,
            JoinWorldResponse {
                elapsed_time: self.clock.now(),
                client: JoinedClient {
                    index,
                    name: name.to_owned(),
                },
                cached_actions,
                avatar_detail: Some(avatar_for(name)),
                avatar_spawn_pose: Some(spawn_pose(index)),
            },
        );
        info!(
            user = %user,
            index = %index,
            name,
            host = self.peers.is_empty(),
            "peer joined session"
        );

        self.peers.push(Peer {
            user,
            name: name.to_owned(),
            store,
            connection,
            teleport: None,
            connection_lost: false,
        });
        Ok(user)
    }

    /// Cached actions applied or pending on the host, oldest first.
    ///
    /// Actions about users who already left are skipped: the host may apply
    /// and cache them after it dispatched their removal.
    fn host_snapshot(&self) -> Vec<Action<WorldAction>> {
        let Some(host) = self.peers.first() else {
            return Vec::new();
        };
        let actions = host.store.actions();
        actions
            .cached
            .iter()
            .chain(actions.incoming.iter().filter(|action| action.cache))
            .filter(|action| {
                subjects(&action.payload)
                    .iter()
                    .all(|user| self.roster.contains(user))
            })
            .cloned()
            .collect()
    }

    /// Remove a peer cleanly: it flushes what it has queued, then the host
    /// forgets it and announces the removal.
    pub fn leave(&mut self, user: &UserId) -> Result<Peer, SessionError> {
        let position = self.position(user)?;
        if position == 0 {
            return Err(SessionError::HostCannotLeave);
        }
        let mut peer = self.peers.remove(position);
        peer.store.dispatch_local(WorldAction::LeaveWorld);
        peer.sync();
        self.hub.disconnect(user);
        self.forget(*user);
        info!(user = %user, "peer left session");
        Ok(peer)
    }

    /// Drop a peer's connection without a goodbye. The peer stays in the
    /// session and learns about it on its next sync.
    pub fn disconnect(&mut self, user: &UserId) -> Result<(), SessionError> {
        if self.position(user)? == 0 {
            return Err(SessionError::HostCannotLeave);
        }
        self.hub.disconnect(user);
        self.forget(*user);
        info!(user = %user, "peer connection dropped");
        Ok(())
    }

    fn forget(&mut self, user: UserId) {
        self.roster.remove(&user);
        let Some(host) = self.peers.first_mut() else {
            return;
        };
        let dropped = host.store.retain_cached(|action| !concerns_user(&action.payload, &user));
        host.store
            .dispatch(WorldAction::ClientRemoved { user_id: user });
        info!(user = %user, dropped, "host cleared cached actions");
    }

    /// Start a scene teleport for `user`; finish it with [`Session::rejoin`].
    ///
    /// A teleport still waiting for its join is aborted first, so the new one
    /// always clears the scene and waits for the next rejoin.
    pub fn teleport(&mut self, user: &UserId) -> Result<(), SessionError> {
        let position = self.position(user)?;
        let peer = &mut self.peers[position];
        if let Some(pending) = peer.teleport.take() {
            abort_teleport(&mut peer.store, pending);
        }
        peer.teleport = Some(teleport_to_scene(&mut peer.store));
        Ok(())
    }

    /// Re-enter the world after a teleport, replaying the host's cache.
    pub fn rejoin(&mut self, user: &UserId) -> Result<(), SessionError> {
        let position = self.position(user)?;
        if self.peers[position].teleport.is_none() {
            return Err(SessionError::NotTeleporting(*user));
        }
        let index: PeerIndex = self
            .roster
            .index_of(user)
            .ok_or(SessionError::UnknownPeer(*user))?;
        if let Some(host) = self.peers.first_mut() {
            host.sync();
        }
        let cached_actions = self.host_snapshot();
        let elapsed_time = self.clock.now();

        let peer = &mut self.peers[position];
        load_scene(&mut peer.store);
        receive_join_world(
            &mut peer.store,
            JoinWorldResponse {
                elapsed_time,
                client: JoinedClient {
                    index,
                    name: peer.name.clone(),
                },
                cached_actions,
                avatar_detail: None,
                avatar_spawn_pose: None,
            },
        );
        info!(user = %user, "peer rejoined after teleport");
        Ok(())
    }

    /// Sync every peer once, in join order, then advance the clock.
    pub fn tick(&mut self) -> usize {
        let applied = self.peers.iter_mut().map(Peer::sync).sum();
        self.clock.advance(1);
        applied
    }

    pub fn run(&mut self, ticks: u64) -> usize {
        (0..ticks).map(|_| self.tick()).sum()
    }

    /// Tick until nothing is queued or in flight, at most `max_ticks` times.
    /// Returns the number of ticks run.
    pub fn settle(&mut self, max_ticks: u64) -> u64 {
        for ticks in 0..max_ticks {
            if self.peers.iter().all(Peer::is_idle) {
                return ticks;
            }
            self.tick();
        }
        max_ticks
    }

    /// Network digest of every connected peer, in join order.
    pub fn digests(&self) -> Result<Vec<(UserId, u64)>, SessionError> {
        self.peers
            .iter()
            .filter(|peer| peer.is_connected())
            .map(|peer| -> Result<(UserId, u64), SessionError> {
                Ok((peer.user, peer.network()?.digest()))
            })
            .collect()
    }

    /// Every connected peer agrees on the shared state.
    pub fn converged(&self) -> Result<bool, SessionError> {
        let digests = self.digests()?;
        Ok(digests.windows(2).all(|pair| pair[0].1 == pair[1].1))
    }
}

fn load_scene(store: &mut Store<WorldAction>) {
    store.dispatch_local(WorldAction::ConnectToWorld {
        connected_world: true,
    });
    store.dispatch_local(WorldAction::SceneLoading);
    store.dispatch_local(WorldAction::SceneLoaded);
}

fn avatar_for(name: &str) -> AvatarDetail {
    AvatarDetail {
        avatar_url: format!("avatars/{name}.glb"),
        thumbnail_url: format!("avatars/{name}.png"),
    }
}

fn spawn_pose(index: PeerIndex) -> Transform {
    Transform::from_position(Vec3::new(index.0 as f32 * 2.0, 0.0, 0.0))
}

/// The users an action describes, or whose objects it touches.
fn subjects(action: &WorldAction) -> Vec<UserId> {
    match action {
        WorldAction::ClientCreated { user_id, .. }
        | WorldAction::AvatarDetailUpdated { user_id, .. }
        | WorldAction::ClientNameUpdated { user_id, .. }
        | WorldAction::ChatSubscriptionsUpdated { user_id, .. } => vec![*user_id],
        WorldAction::ObjectSpawned { owner, .. }
        | WorldAction::ObjectDestroyed { owner, .. }
        | WorldAction::ObjectTeleported { owner, .. } => vec![*owner],
        WorldAction::AuthorityTransferred {
            owner,
            new_authority,
            ..
        } => vec![*owner, *new_authority],
        _ => Vec::new(),
    }
}

fn concerns_user(action: &WorldAction, user: &UserId) -> bool {
    subjects(action).contains(user)
}
