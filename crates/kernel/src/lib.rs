//! World kernel: the closed action set, the engine lifecycle reducer and the
//! simulation world networked objects are bound to.
//!
//! # Invariants
//! - Engine state changes only through [`engine_receptor`].
//! - World iteration order is deterministic.

pub mod action;
pub mod engine;
pub mod world;

pub use action::{AvatarDetail, InteractionData, WorldAction, kinds};
pub use engine::{ENGINE_SLICE, EngineState, engine_receptor, engine_state, install_engine_state};
pub use world::{EntityData, Fnv, World};
