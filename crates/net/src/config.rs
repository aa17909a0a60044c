use serde::{Deserialize, Serialize};
use std::path::Path;
use worldsync_common::{DispatchTime, LogicalClock, UserId};
use worldsync_store::StoreOptions;

/// Errors from loading a session config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for a simulated session. Every field has a default, so an empty
/// file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// World name, used to label peer stores.
    pub world: String,
    /// Number of peers, host included.
    pub peers: usize,
    /// Ticks to run after everyone has joined.
    pub ticks: u64,
    /// Added to the clock when stamping `$time`.
    pub default_dispatch_delay: DispatchTime,
    /// History retention per queue; unbounded when absent.
    pub history_limit: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            world: "lobby".into(),
            peers: 3,
            ticks: 10,
            default_dispatch_delay: 0,
            history_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.trim().is_empty() {
            return Err(ConfigError::Invalid("world name is empty".into()));
        }
        if self.peers == 0 {
            return Err(ConfigError::Invalid("a session needs at least one peer".into()));
        }
        if self.history_limit == Some(0) {
            return Err(ConfigError::Invalid("history_limit must be positive".into()));
        }
        Ok(())
    }

    /// Options for the networked store of `user`, stamping time from `clock`.
    pub fn store_options(
        &self,
        name: impl Into<String>,
        user: UserId,
        clock: &LogicalClock,
    ) -> StoreOptions {
        let clock = clock.clone();
        StoreOptions::new(name)
            .networked(true)
            .dispatch_id(move || user)
            .dispatch_time(move || clock.now())
            .default_dispatch_delay(self.default_dispatch_delay)
            .history_limit(self.history_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SessionConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config =
            SessionConfig::from_yaml_str("world: plaza\npeers: 5\nhistory_limit: 64\n").unwrap();
        assert_eq!(config.world, "plaza");
        assert_eq!(config.peers, 5);
        assert_eq!(config.ticks, 10);
        assert_eq!(config.history_limit, Some(64));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            SessionConfig::from_yaml_str("peers: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_yaml_str("history_limit: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_yaml_str("tick_rate: 60"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "world: arena\nticks: 3").unwrap();
        let config = SessionConfig::load(tmp.path()).unwrap();
        assert_eq!(config.world, "arena");
        assert_eq!(config.ticks, 3);

        assert!(matches!(
            SessionConfig::load(tmp.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn store_options_follow_the_clock() {
        let clock = LogicalClock::new();
        let user = UserId::new();
        let config = SessionConfig {
            default_dispatch_delay: 2,
            ..SessionConfig::default()
        };
        let store = worldsync_store::Store::<worldsync_kernel::WorldAction>::new(
            config.store_options("peer", user, &clock),
        );
        clock.set(4);
        assert!(store.is_networked());
        assert_eq!(store.dispatch_id(), user);
        assert_eq!(store.dispatch_time(), 4);
    }
}
