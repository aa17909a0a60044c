use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldsync_common::{EntityId, Transform};

/// Per-entity data stored in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub transform: Transform,
}

/// Simulation entities that networked objects are bound to.
///
/// Entities live in a BTreeMap so iteration and [`World::state_hash`] are
/// independent of insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    entities: BTreeMap<EntityId, EntityData>,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All entities, in id order.
    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    /// Look up an entity by id.
    pub fn get(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    /// Whether the entity is alive.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Spawn an entity under a caller-chosen id. Returns false if the id is taken.
    pub fn spawn_with_id(&mut self, id: EntityId, transform: Transform) -> bool {
        if self.entities.contains_key(&id) {
            return false;
        }
        self.entities.insert(id, EntityData { transform });
        true
    }

    /// Remove an entity, returning its data if it was alive.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityData> {
        self.entities.remove(&id)
    }

    /// Move an entity. Returns false if the entity does not exist.
    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool {
        let Some(data) = self.entities.get_mut(&id) else {
            return false;
        };
        data.transform = transform;
        true
    }

    /// FNV-1a over entities in canonical order.
    pub fn state_hash(&self) -> u64 {
        let mut h = Fnv::new();
        for (id, data) in &self.entities {
            h.write(id.0.as_bytes());
            let t = &data.transform;
            for v in t.position.to_array() {
                h.write(&v.to_le_bytes());
            }
            for v in t.rotation.to_array() {
                h.write(&v.to_le_bytes());
            }
            for v in t.scale.to_array() {
                h.write(&v.to_le_bytes());
            }
        }
        h.finish()
    }
}

/// 64-bit FNV-1a, shared by the state digests in this workspace.
#[derive(Debug, Clone, Copy)]
pub struct Fnv(u64);

impl Fnv {
    pub fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
        }
    }

    /// Length-prefixed, so adjacent strings cannot shift bytes between them.
    pub fn write_str(&mut self, s: &str) {
        self.write(&(s.len() as u64).to_le_bytes());
        self.write(s.as_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for Fnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn world_starts_empty() {
        let w = World::new();
        assert_eq!(w.entity_count(), 0);
        assert!(w.entities().is_empty());
    }

    #[test]
    fn spawn_with_taken_id_is_refused() {
        let mut w = World::new();
        let id = EntityId::new();
        assert!(w.spawn_with_id(id, Transform::default()));
        assert!(!w.spawn_with_id(id, Transform::from_position(Vec3::X)));
        assert_eq!(w.get(id).unwrap().transform, Transform::default());
        assert_eq!(w.entity_count(), 1);
    }

    #[test]
    fn despawn_missing_is_none() {
        let mut w = World::new();
        assert!(w.despawn(EntityId::new()).is_none());
        let id = EntityId::new();
        w.spawn_with_id(id, Transform::default());
        assert!(w.despawn(id).is_some());
        assert!(!w.contains(id));
    }

    #[test]
    fn set_transform_moves_live_entities_only() {
        let mut w = World::new();
        let id = EntityId::new();
        w.spawn_with_id(id, Transform::default());
        let moved = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(w.set_transform(id, moved));
        assert!(!w.set_transform(EntityId::new(), Transform::default()));
        assert_eq!(w.get(id).unwrap().transform, moved);
    }

    #[test]
    fn state_hash_ignores_insertion_order() {
        let ids: Vec<EntityId> = (0..20).map(|_| EntityId::new()).collect();
        let mut forward = World::new();
        let mut backward = World::new();
        for id in &ids {
            forward.spawn_with_id(*id, Transform::default());
        }
        for id in ids.iter().rev() {
            backward.spawn_with_id(*id, Transform::default());
        }
        assert_eq!(forward.state_hash(), backward.state_hash());

        backward.set_transform(ids[0], Transform::from_position(Vec3::Y));
        assert_ne!(forward.state_hash(), backward.state_hash());
    }

    #[test]
    fn fnv_strings_are_length_prefixed() {
        let mut split_late = Fnv::new();
        split_late.write_str("ab");
        split_late.write_str("c");
        let mut split_early = Fnv::new();
        split_early.write_str("a");
        split_early.write_str("bc");
        assert_ne!(split_late.finish(), split_early.finish());
    }
}
