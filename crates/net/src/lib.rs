//! Networking for worldsync: the client registry and its receptor, the JSON
//! wire format, transports, join/teleport flows and an in-process session.
//!
//! # Invariants
//! - `user -> index` and `index -> user` always agree ([`ClientRegistry::is_consistent`]).
//! - Removing a client twice leaves the same state as removing it once.
//! - Transports only move frames; stores apply them in arrival order.

pub mod config;
pub mod join;
pub mod network;
pub mod receptor;
pub mod registry;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::{ConfigError, SessionConfig};
pub use join::{
    AVATAR_PREFAB, JoinWorldResponse, JoinedClient, TeleportHandle, abort_teleport,
    receive_join_world, teleport_to_scene,
};
pub use network::{NETWORK_SLICE, NetworkObject, NetworkWorld};
pub use receptor::{install_network_world, network_action_receptor, network_world};
pub use registry::{ClientRegistry, NetworkClient};
pub use session::{Peer, Session, SessionError};
pub use transport::{HubConnection, LoopbackTransport, MemoryHub, Transport, TransportError, pump};
pub use wire::{WireError, decode_action, encode_action};
