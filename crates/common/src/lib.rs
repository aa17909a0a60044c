//! Shared types for the worldsync workspace: identities, transforms, logical time.

pub mod clock;
pub mod types;

pub use clock::{DispatchTime, LogicalClock};
pub use types::{EntityId, NetworkId, PeerIndex, Transform, UserId};
