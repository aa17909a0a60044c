use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use worldsync_common::{DispatchTime, UserId};

/// A closed set of action payloads a store can carry.
///
/// `kind()` must return the same string the payload serializes under as its
/// wire `type` field; `receive_action_once` matches on it.
pub trait ActionKind: Clone + fmt::Debug + 'static {
    fn kind(&self) -> &'static str;
}

/// Who an action is addressed to.
///
/// On the wire this is either the literal `"all"` or the target user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionTarget {
    #[default]
    All,
    User(UserId),
}

impl ActionTarget {
    pub fn includes(&self, user: &UserId) -> bool {
        match self {
            Self::All => true,
            Self::User(target) => target == user,
        }
    }
}

impl Serialize for ActionTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::User(user) => user.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ActionTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "all" {
            return Ok(Self::All);
        }
        raw.parse()
            .map(|uuid| Self::User(UserId(uuid)))
            .map_err(de::Error::custom)
    }
}

/// A stamped action: the immutable record that flows through a store's queues.
///
/// Wire shape: `{ "type", "$from", "$to", "$time", "$cache", ...payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action<A> {
    #[serde(rename = "$from")]
    pub from: UserId,
    #[serde(rename = "$to", default)]
    pub to: ActionTarget,
    #[serde(rename = "$time")]
    pub time: DispatchTime,
    #[serde(rename = "$cache", default, skip_serializing_if = "std::ops::Not::not")]
    pub cache: bool,
    #[serde(flatten)]
    pub payload: A,
}

impl<A: ActionKind> Action<A> {
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// An action that has not been dispatched yet.
///
/// `$from` and `$time` are filled in by the store at dispatch unless set here.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDraft<A> {
    pub payload: A,
    pub from: Option<UserId>,
    pub to: ActionTarget,
    pub time: Option<DispatchTime>,
    pub cache: bool,
}

impl<A> ActionDraft<A> {
    pub fn new(payload: A) -> Self {
        Self {
            payload,
            from: None,
            to: ActionTarget::All,
            time: None,
            cache: false,
        }
    }

    pub fn from_user(mut self, from: UserId) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: ActionTarget) -> Self {
        self.to = to;
        self
    }

    pub fn at(mut self, time: DispatchTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Mark the action for retention in the host's cache for late joiners.
    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }
}

impl<A> From<A> for ActionDraft<A> {
    fn from(payload: A) -> Self {
        Self::new(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum Ping {
        #[serde(rename = "test.ping")]
        Ping { seq: u32 },
        #[serde(rename = "test.reset")]
        Reset,
    }

    impl ActionKind for Ping {
        fn kind(&self) -> &'static str {
            match self {
                Ping::Ping { .. } => "test.ping",
                Ping::Reset => "test.reset",
            }
        }
    }

    #[test]
    fn wire_shape_uses_dollar_fields() {
        let from = UserId::new();
        let action = Action {
            from,
            to: ActionTarget::All,
            time: 7,
            cache: false,
            payload: Ping::Ping { seq: 3 },
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "test.ping");
        assert_eq!(value["$from"], from.to_string());
        assert_eq!(value["$to"], "all");
        assert_eq!(value["$time"], 7);
        assert_eq!(value["seq"], 3);
        assert!(value.get("$cache").is_none());
    }

    #[test]
    fn targeted_action_parses_user() {
        let target = UserId::new();
        let json = format!(
            r#"{{"type":"test.reset","$from":"{}","$to":"{}","$time":1,"$cache":true}}"#,
            UserId::new(),
            target
        );
        let action: Action<Ping> = serde_json::from_str(&json).unwrap();
        assert_eq!(action.to, ActionTarget::User(target));
        assert!(action.cache);
        assert_eq!(action.kind(), "test.reset");
    }

    #[test]
    fn missing_type_is_rejected() {
        let json = format!(r#"{{"$from":"{}","$to":"all","$time":1}}"#, UserId::new());
        assert!(serde_json::from_str::<Action<Ping>>(&json).is_err());
    }

    #[test]
    fn target_includes() {
        let a = UserId::new();
        let b = UserId::new();
        assert!(ActionTarget::All.includes(&a));
        assert!(ActionTarget::User(a).includes(&a));
        assert!(!ActionTarget::User(a).includes(&b));
    }
}
