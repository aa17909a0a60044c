use serde::{Deserialize, Serialize};
use worldsync_common::{EntityId, NetworkId, PeerIndex, Transform, UserId};
use worldsync_store::ActionKind;

/// Avatar model and thumbnail locations for a connected user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarDetail {
    pub avatar_url: String,
    pub thumbnail_url: String,
}

/// What the user activated, as reported by the interaction layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionData {
    pub interaction_type: String,
    #[serde(default)]
    pub interaction_text: String,
    #[serde(default)]
    pub interaction_url: Option<String>,
}

/// Every action the world store understands.
///
/// The serde `type` tag of each variant is the string `kind()` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WorldAction {
    // --- engine lifecycle ---
    #[serde(rename = "engine.browser_not_supported")]
    BrowserNotSupported { msg: String },
    #[serde(rename = "engine.reset")]
    ResetEngine { instance: bool },
    #[serde(rename = "engine.user_avatar_tapped")]
    UserAvatarTapped { user_id: UserId },
    #[serde(rename = "engine.initialized")]
    InitializeEngine { initialised: bool },
    #[serde(rename = "engine.scene_unloaded")]
    SceneUnloaded,
    #[serde(rename = "engine.scene_loading")]
    SceneLoading,
    #[serde(rename = "engine.scene_loaded")]
    SceneLoaded,
    #[serde(rename = "engine.scene_loading_progress")]
    SceneLoadingProgress { progress: u8 },
    #[serde(rename = "engine.joined_world")]
    JoinedWorld,
    #[serde(rename = "engine.leave_world")]
    LeaveWorld,
    #[serde(rename = "engine.connect_to_world")]
    ConnectToWorld { connected_world: bool },
    /// The transport lost its connection.
    #[serde(rename = "engine.connect_to_world_timeout")]
    ConnectToWorldTimeout { instance: bool },
    #[serde(rename = "engine.set_teleporting")]
    SetTeleporting { is_teleporting: bool },
    #[serde(rename = "engine.user_has_interacted")]
    SetUserHasInteracted,
    #[serde(rename = "engine.entity_error")]
    EntityErrorUpdate { entity: EntityId, is_resolved: bool },
    #[serde(rename = "engine.xr_supported")]
    XrSupported { xr_supported: bool },
    #[serde(rename = "engine.object_activation")]
    ObjectActivation { interaction_data: InteractionData },

    // --- network clients ---
    /// `index` is the slot the host assigned, if any.
    #[serde(rename = "network.client_created")]
    ClientCreated {
        user_id: UserId,
        name: String,
        #[serde(default)]
        index: Option<PeerIndex>,
    },
    #[serde(rename = "network.avatar_detail_updated")]
    AvatarDetailUpdated {
        user_id: UserId,
        avatar_detail: AvatarDetail,
    },
    #[serde(rename = "network.client_name_updated")]
    ClientNameUpdated { user_id: UserId, name: String },
    #[serde(rename = "network.chat_subscriptions_updated")]
    ChatSubscriptionsUpdated {
        user_id: UserId,
        channels: Vec<String>,
    },
    #[serde(rename = "network.client_removed")]
    ClientRemoved { user_id: UserId },
    /// Drop every client; the local one survives unless `remove_self`.
    #[serde(rename = "network.clients_cleared")]
    ClientsCleared { remove_self: bool },

    // --- network objects ---
    #[serde(rename = "network.object_spawned")]
    ObjectSpawned {
        owner: UserId,
        network_id: NetworkId,
        prefab: String,
        transform: Transform,
    },
    #[serde(rename = "network.object_destroyed")]
    ObjectDestroyed { owner: UserId, network_id: NetworkId },
    #[serde(rename = "network.object_teleported")]
    ObjectTeleported {
        owner: UserId,
        network_id: NetworkId,
        transform: Transform,
    },
    #[serde(rename = "network.authority_transferred")]
    AuthorityTransferred {
        owner: UserId,
        network_id: NetworkId,
        new_authority: UserId,
    },
}

impl ActionKind for WorldAction {
    fn kind(&self) -> &'static str {
        match self {
            Self::BrowserNotSupported { .. } => "engine.browser_not_supported",
            Self::ResetEngine { .. } => "engine.reset",
            Self::UserAvatarTapped { .. } => "engine.user_avatar_tapped",
            Self::InitializeEngine { .. } => "engine.initialized",
            Self::SceneUnloaded => "engine.scene_unloaded",
            Self::SceneLoading => "engine.scene_loading",
            Self::SceneLoaded => "engine.scene_loaded",
            Self::SceneLoadingProgress { .. } => "engine.scene_loading_progress",
            Self::JoinedWorld => "engine.joined_world",
            Self::LeaveWorld => "engine.leave_world",
            Self::ConnectToWorld { .. } => "engine.connect_to_world",
            Self::ConnectToWorldTimeout { .. } => "engine.connect_to_world_timeout",
            Self::SetTeleporting { .. } => "engine.set_teleporting",
            Self::SetUserHasInteracted => "engine.user_has_interacted",
            Self::EntityErrorUpdate { .. } => "engine.entity_error",
            Self::XrSupported { .. } => "engine.xr_supported",
            Self::ObjectActivation { .. } => "engine.object_activation",
            Self::ClientCreated { .. } => "network.client_created",
            Self::AvatarDetailUpdated { .. } => "network.avatar_detail_updated",
            Self::ClientNameUpdated { .. } => "network.client_name_updated",
            Self::ChatSubscriptionsUpdated { .. } => "network.chat_subscriptions_updated",
            Self::ClientRemoved { .. } => "network.client_removed",
            Self::ClientsCleared { .. } => "network.clients_cleared",
            Self::ObjectSpawned { .. } => "network.object_spawned",
            Self::ObjectDestroyed { .. } => "network.object_destroyed",
            Self::ObjectTeleported { .. } => "network.object_teleported",
            Self::AuthorityTransferred { .. } => "network.authority_transferred",
        }
    }
}

/// Kind strings callers match on.
pub mod kinds {
    pub const JOINED_WORLD: &str = "engine.joined_world";
    pub const SCENE_LOADED: &str = "engine.scene_loaded";
    pub const CLIENT_CREATED: &str = "network.client_created";
    pub const CLIENT_REMOVED: &str = "network.client_removed";
}
