use crate::action::{InteractionData, WorldAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldsync_common::{EntityId, UserId};
use worldsync_store::{Action, ReceptorContext, ReceptorError, Store, StoreError};

/// Name of the engine state slice.
pub const ENGINE_SLICE: &str = "engine";

/// Global world lifecycle flags.
///
/// Only [`EngineState::reduce`], run by [`engine_receptor`], changes this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub is_engine_initialized: bool,
    pub scene_loading: bool,
    pub scene_loaded: bool,
    pub joined_world: bool,
    pub loading_progress: u8,
    pub connected_world: bool,
    pub is_teleporting: bool,
    pub socket_instance: bool,
    pub connection_timeout_instance: bool,
    pub avatar_tapped_id: Option<UserId>,
    pub user_has_interacted: bool,
    pub xr_supported: bool,
    /// The most recently activated interactable.
    pub interaction_data: Option<InteractionData>,
    /// Set when the client reported it cannot run the world.
    pub unsupported_browser: Option<String>,
    /// `true` while the entity has an unresolved error.
    pub error_entities: BTreeMap<EntityId, bool>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one action. Each arm is a single merge; network actions are ignored.
    pub fn reduce(&mut self, action: &WorldAction) {
        match action {
            WorldAction::BrowserNotSupported { msg } => {
                self.unsupported_browser = Some(msg.clone());
            }
            WorldAction::ResetEngine { instance } => {
                self.socket_instance = *instance;
            }
            WorldAction::UserAvatarTapped { user_id } => {
                self.avatar_tapped_id = Some(*user_id);
            }
            WorldAction::InitializeEngine { initialised } => {
                self.is_engine_initialized = *initialised;
            }
            WorldAction::SceneUnloaded => {
                self.scene_loaded = false;
                self.scene_loading = false;
            }
            WorldAction::SceneLoading => {
                self.scene_loaded = false;
                self.scene_loading = true;
                self.loading_progress = 0;
            }
            WorldAction::SceneLoaded => {
                self.scene_loaded = true;
                self.scene_loading = false;
                self.loading_progress = 100;
            }
            WorldAction::SceneLoadingProgress { progress } => {
                self.loading_progress = (*progress).min(100);
            }
            WorldAction::JoinedWorld => {
                self.joined_world = true;
                // Joining after the scene finished must not leave a stale progress value.
                if self.scene_loaded {
                    self.loading_progress = 100;
                }
            }
            WorldAction::LeaveWorld => {
                self.joined_world = false;
            }
            WorldAction::ConnectToWorld { connected_world } => {
                self.connected_world = *connected_world;
            }
            WorldAction::ConnectToWorldTimeout { instance } => {
                self.connection_timeout_instance = *instance;
            }
            WorldAction::SetTeleporting { is_teleporting } => {
                if *is_teleporting {
                    self.connected_world = false;
                    self.scene_loaded = false;
                    self.joined_world = false;
                }
                self.is_teleporting = *is_teleporting;
            }
            WorldAction::SetUserHasInteracted => {
                self.user_has_interacted = true;
            }
            WorldAction::EntityErrorUpdate {
                entity,
                is_resolved,
            } => {
                self.error_entities.insert(*entity, !is_resolved);
            }
            WorldAction::XrSupported { xr_supported } => {
                self.xr_supported = *xr_supported;
            }
            WorldAction::ObjectActivation { interaction_data } => {
                self.interaction_data = Some(interaction_data.clone());
            }
            WorldAction::ClientCreated { .. }
            | WorldAction::AvatarDetailUpdated { .. }
            | WorldAction::ClientNameUpdated { .. }
            | WorldAction::ChatSubscriptionsUpdated { .. }
            | WorldAction::ClientRemoved { .. }
            | WorldAction::ClientsCleared { .. }
            | WorldAction::ObjectSpawned { .. }
            | WorldAction::ObjectDestroyed { .. }
            | WorldAction::ObjectTeleported { .. }
            | WorldAction::AuthorityTransferred { .. } => {}
        }
    }

    /// Ready to simulate: scene loaded and world joined.
    pub fn is_ready(&self) -> bool {
        self.scene_loaded && self.joined_world
    }
}

/// Receptor applying every action to the [`ENGINE_SLICE`].
pub fn engine_receptor(
    ctx: &mut ReceptorContext<'_, WorldAction>,
    action: &Action<WorldAction>,
) -> Result<(), ReceptorError> {
    ctx.state_mut::<EngineState>(ENGINE_SLICE)?
        .reduce(&action.payload);
    Ok(())
}

/// Register the engine slice and its receptor on `store`.
pub fn install_engine_state(store: &mut Store<WorldAction>) -> Result<(), StoreError> {
    store.register_state(ENGINE_SLICE, EngineState::new())?;
    store.add_action_receptor(engine_receptor);
    Ok(())
}

/// Read the engine slice.
pub fn engine_state(store: &Store<WorldAction>) -> Result<&EngineState, StoreError> {
    store.state(ENGINE_SLICE)
}
