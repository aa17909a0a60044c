//! JSON framing for actions on the wire.

use serde::Serialize;
use serde::de::DeserializeOwned;
use worldsync_store::Action;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode action: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode an action as one JSON frame: `{"type", "$from", "$to", "$time", ...fields}`.
pub fn encode_action<A: Serialize>(action: &Action<A>) -> Result<String, WireError> {
    serde_json::to_string(action).map_err(WireError::Encode)
}

pub fn decode_action<A: DeserializeOwned>(frame: &str) -> Result<Action<A>, WireError> {
    serde_json::from_str(frame).map_err(WireError::Decode)
}
