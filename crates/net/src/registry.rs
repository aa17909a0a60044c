use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use worldsync_common::{PeerIndex, UserId};
use worldsync_kernel::AvatarDetail;

/// A connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkClient {
    pub user_id: UserId,
    pub index: PeerIndex,
    pub name: String,
    pub avatar_detail: Option<AvatarDetail>,
    pub subscribed_chat_updates: Vec<String>,
}

/// Bidirectional map between user ids and per-session indices.
///
/// Index policy: a freed index goes on a free list and the smallest freed
/// index is handed out first; otherwise a monotonic counter supplies the next
/// one. An index bound to a connected user is never handed out.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<UserId, NetworkClient>,
    user_to_index: BTreeMap<UserId, PeerIndex>,
    index_to_user: BTreeMap<PeerIndex, UserId>,
    free: BTreeSet<PeerIndex>,
    next_index: u32,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user`, or refresh its name if already registered.
    ///
    /// `hint` is used when it is not bound to another user. Returns the
    /// user's index.
    pub fn create(
        &mut self,
        user: UserId,
        name: impl Into<String>,
        hint: Option<PeerIndex>,
    ) -> PeerIndex {
        let name = name.into();
        if let Some(existing) = self.clients.get_mut(&user) {
            existing.name = name;
            return existing.index;
        }

        let index = match hint {
            Some(index) if !self.index_to_user.contains_key(&index) => {
                self.free.remove(&index);
                index
            }
            _ => self.allocate(),
        };
        self.user_to_index.insert(user, index);
        self.index_to_user.insert(index, user);
        self.clients.insert(
            user,
            NetworkClient {
                user_id: user,
                index,
                name,
                avatar_detail: None,
                subscribed_chat_updates: Vec::new(),
            },
        );
        index
    }

    fn allocate(&mut self) -> PeerIndex {
        while let Some(index) = self.free.pop_first() {
            if !self.index_to_user.contains_key(&index) {
                return index;
            }
        }
        loop {
            let index = PeerIndex(self.next_index);
            self.next_index = self.next_index.wrapping_add(1);
            // A hinted create may already hold this slot.
            if !self.index_to_user.contains_key(&index) {
                return index;
            }
        }
    }

    /// Remove `user` from both directions. Removing an absent user is a no-op.
    pub fn remove(&mut self, user: &UserId) -> Option<NetworkClient> {
        let client = self.clients.remove(user)?;
        self.user_to_index.remove(user);
        self.index_to_user.remove(&client.index);
        self.free.insert(client.index);
        Some(client)
    }

    /// Remove every client except `keep`, returning the removed ids.
    pub fn remove_all(&mut self, keep: Option<UserId>) -> Vec<UserId> {
        let doomed: Vec<UserId> = self
            .clients
            .keys()
            .copied()
            .filter(|user| Some(*user) != keep)
            .collect();
        for user in &doomed {
            self.remove(user);
        }
        doomed
    }

    /// Returns false if the user is not registered.
    pub fn update_avatar(&mut self, user: &UserId, detail: AvatarDetail) -> bool {
        match self.clients.get_mut(user) {
            Some(client) => {
                client.avatar_detail = Some(detail);
                true
            }
            None => false,
        }
    }

    pub fn update_name(&mut self, user: &UserId, name: impl Into<String>) -> bool {
        match self.clients.get_mut(user) {
            Some(client) => {
                client.name = name.into();
                true
            }
            None => false,
        }
    }

    pub fn update_subscriptions(&mut self, user: &UserId, channels: Vec<String>) -> bool {
        match self.clients.get_mut(user) {
            Some(client) => {
                client.subscribed_chat_updates = channels;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user: &UserId) -> Option<&NetworkClient> {
        self.clients.get(user)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.clients.contains_key(user)
    }

    pub fn index_of(&self, user: &UserId) -> Option<PeerIndex> {
        self.user_to_index.get(user).copied()
    }

    pub fn user_at(&self, index: PeerIndex) -> Option<UserId> {
        self.index_to_user.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clients in user id order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkClient> {
        self.clients.values()
    }

    /// Both directions agree, every client has exactly one index, and no
    /// bound index sits on the free list.
    pub fn is_consistent(&self) -> bool {
        self.clients.len() == self.user_to_index.len()
            && self.user_to_index.len() == self.index_to_user.len()
            && self.user_to_index.iter().all(|(user, index)| {
                self.index_to_user.get(index) == Some(user)
                    && self.clients.get(user).is_some_and(|c| c.index == *index)
            })
            && self.free.iter().all(|index| !self.index_to_user.contains_key(index))
    }
}
