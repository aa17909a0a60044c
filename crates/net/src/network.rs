use crate::registry::{ClientRegistry, NetworkClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use worldsync_common::{EntityId, NetworkId, Transform, UserId};
use worldsync_kernel::{Fnv, World};

/// Name of the network state slice.
pub const NETWORK_SLICE: &str = "network";

/// A simulation entity owned by a network participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkObject {
    pub owner: UserId,
    pub network_id: NetworkId,
    pub prefab: String,
    pub entity: EntityId,
    /// Who currently simulates the object. Starts as the owner.
    pub authority: UserId,
}

/// Everything a peer knows about the shared session.
///
/// Objects are keyed by `(owner, network_id)`; their entity ids are derived
/// from that key, so peers applying the same actions agree on the world.
#[derive(Debug, Clone)]
pub struct NetworkWorld {
    local_user: UserId,
    clients: ClientRegistry,
    objects: BTreeMap<(UserId, NetworkId), NetworkObject>,
    world: World,
}

impl NetworkWorld {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            clients: ClientRegistry::new(),
            objects: BTreeMap::new(),
            world: World::new(),
        }
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn clients_mut(&mut self) -> &mut ClientRegistry {
        &mut self.clients
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn object(&self, owner: UserId, network_id: NetworkId) -> Option<&NetworkObject> {
        self.objects.get(&(owner, network_id))
    }

    pub fn objects(&self) -> impl Iterator<Item = &NetworkObject> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Spawn an object for a registered owner.
    ///
    /// Returns false when the owner is unknown or the object already exists.
    pub fn spawn_object(
        &mut self,
        owner: UserId,
        network_id: NetworkId,
        prefab: impl Into<String>,
        transform: Transform,
    ) -> bool {
        if !self.clients.contains(&owner) || self.objects.contains_key(&(owner, network_id)) {
            return false;
        }
        let entity = EntityId::for_network_object(owner, network_id);
        if !self.world.spawn_with_id(entity, transform) {
            return false;
        }
        self.objects.insert(
            (owner, network_id),
            NetworkObject {
                owner,
                network_id,
                prefab: prefab.into(),
                entity,
                authority: owner,
            },
        );
        true
    }

    /// Remove an object and its entity. Absent objects are a no-op.
    pub fn destroy_object(
        &mut self,
        owner: UserId,
        network_id: NetworkId,
    ) -> Option<NetworkObject> {
        let object = self.objects.remove(&(owner, network_id))?;
        self.world.despawn(object.entity);
        Some(object)
    }

    pub fn teleport_object(
        &mut self,
        owner: UserId,
        network_id: NetworkId,
        transform: Transform,
    ) -> bool {
        match self.objects.get(&(owner, network_id)) {
            Some(object) => self.world.set_transform(object.entity, transform),
            None => false,
        }
    }

    /// Hand simulation authority to another registered client.
    pub fn transfer_authority(
        &mut self,
        owner: UserId,
        network_id: NetworkId,
        new_authority: UserId,
    ) -> bool {
        if !self.clients.contains(&new_authority) {
            return false;
        }
        match self.objects.get_mut(&(owner, network_id)) {
            Some(object) => {
                object.authority = new_authority;
                true
            }
            None => false,
        }
    }

    /// Remove a client with its objects; objects it merely had authority
    /// over go back to their owners.
    pub fn remove_client(&mut self, user: &UserId) -> Option<NetworkClient> {
        let client = self.clients.remove(user)?;
        let owned: Vec<(UserId, NetworkId)> = self
            .objects
            .keys()
            .filter(|(owner, _)| owner == user)
            .copied()
            .collect();
        for (owner, network_id) in owned {
            self.destroy_object(owner, network_id);
        }
        for object in self.objects.values_mut() {
            if object.authority == *user {
                object.authority = object.owner;
            }
        }
        debug!(user = %user, index = %client.index, "client removed");
        Some(client)
    }

    /// Remove every client, keeping the local one unless `remove_self`.
    /// Returns how many were removed.
    pub fn remove_all_network_clients(&mut self, remove_self: bool) -> usize {
        let doomed: Vec<UserId> = self
            .clients
            .iter()
            .map(|client| client.user_id)
            .filter(|user| remove_self || *user != self.local_user)
            .collect();
        for user in &doomed {
            self.remove_client(user);
        }
        doomed.len()
    }

    /// Digest of the shared state: clients, objects and world.
    ///
    /// Excludes the local user id, so peers in the same session compare equal.
    pub fn digest(&self) -> u64 {
        let mut h = Fnv::new();
        for client in self.clients.iter() {
            h.write(client.user_id.0.as_bytes());
            h.write(&client.index.0.to_le_bytes());
            h.write_str(&client.name);
            match &client.avatar_detail {
                Some(detail) => {
                    h.write(&[1]);
                    h.write_str(&detail.avatar_url);
                    h.write_str(&detail.thumbnail_url);
                }
                None => h.write(&[0]),
            }
            h.write(&(client.subscribed_chat_updates.len() as u64).to_le_bytes());
            for channel in &client.subscribed_chat_updates {
                h.write_str(channel);
            }
        }
        for object in self.objects.values() {
            h.write(object.owner.0.as_bytes());
            h.write(&object.network_id.0.to_le_bytes());
            h.write_str(&object.prefab);
            h.write(object.authority.0.as_bytes());
        }
        h.write(&self.world.state_hash().to_le_bytes());
        h.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn world_with(users: &[UserId]) -> NetworkWorld {
        let mut net = NetworkWorld::new(users[0]);
        for user in users {
            net.clients_mut().create(*user, "u", None);
        }
        net
    }

    #[test]
    fn spawn_requires_known_owner_and_fresh_id() {
        let me = UserId::new();
        let mut net = world_with(&[me]);
        assert!(net.spawn_object(me, NetworkId(1), "crate", Transform::default()));
        assert!(!net.spawn_object(me, NetworkId(1), "crate", Transform::default()));
        assert!(!net.spawn_object(UserId::new(), NetworkId(1), "crate", Transform::default()));
        assert_eq!(net.object_count(), 1);
        assert_eq!(net.world().entity_count(), 1);
    }

    #[test]
    fn removing_client_drops_its_objects_and_returns_authority() {
        let a = UserId::new();
        let b = UserId::new();
        let mut net = world_with(&[a, b]);
        net.spawn_object(a, NetworkId(0), "avatar", Transform::default());
        net.spawn_object(b, NetworkId(0), "avatar", Transform::default());
        assert!(net.transfer_authority(a, NetworkId(0), b));

        net.remove_client(&b);
        assert!(net.object(b, NetworkId(0)).is_none());
        assert_eq!(net.object(a, NetworkId(0)).unwrap().authority, a);
        assert_eq!(net.world().entity_count(), 1);
        assert!(net.remove_client(&b).is_none());
    }

    #[test]
    fn teleport_moves_entity() {
        let me = UserId::new();
        let mut net = world_with(&[me]);
        net.spawn_object(me, NetworkId(2), "ball", Transform::default());
        let target = Transform::from_position(Vec3::new(0.0, 4.0, 0.0));
        assert!(net.teleport_object(me, NetworkId(2), target));
        let entity = net.object(me, NetworkId(2)).unwrap().entity;
        assert_eq!(net.world().get(entity).unwrap().transform, target);
        assert!(!net.teleport_object(me, NetworkId(3), target));
    }

    #[test]
    fn clear_keeps_local_client() {
        let me = UserId::new();
        let other = UserId::new();
        let mut net = world_with(&[me, other]);
        net.spawn_object(me, NetworkId(0), "avatar", Transform::default());
        net.spawn_object(other, NetworkId(0), "avatar", Transform::default());

        assert_eq!(net.remove_all_network_clients(false), 1);
        assert!(net.clients().contains(&me));
        assert_eq!(net.object_count(), 1);

        assert_eq!(net.remove_all_network_clients(true), 1);
        assert!(net.clients().is_empty());
        assert_eq!(net.world().entity_count(), 0);
    }

    #[test]
    fn digest_ignores_local_user() {
        let a = UserId::new();
        let b = UserId::new();
        let mut from_a = NetworkWorld::new(a);
        let mut from_b = NetworkWorld::new(b);
        for net in [&mut from_a, &mut from_b] {
            net.clients_mut().create(a, "a", Some(worldsync_common::PeerIndex(0)));
            net.clients_mut().create(b, "b", Some(worldsync_common::PeerIndex(1)));
            net.spawn_object(a, NetworkId(0), "avatar", Transform::default());
        }
        assert_eq!(from_a.digest(), from_b.digest());
    }

    #[test]
    fn digest_separates_adjacent_strings() {
        let me = UserId::new();
        let mut left = world_with(&[me]);
        let mut right = world_with(&[me]);
        left.clients_mut().update_subscriptions(&me, vec!["ab".into(), "c".into()]);
        right.clients_mut().update_subscriptions(&me, vec!["a".into(), "bc".into()]);
        assert_ne!(left.digest(), right.digest());

        right.clients_mut().update_subscriptions(&me, vec!["ab".into(), "c".into()]);
        assert_eq!(left.digest(), right.digest());
    }
}
