//! Repository behavior configuration.
//!
//! Hosts pass this as JSON; absent fields keep their defaults.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What `delete` does locally when the remote delete fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteFailurePolicy {
    /// The item stays removed locally; the failure is recorded as the
    /// collection's last error and the call succeeds. Current product behavior.
    #[default]
    KeepLocalRemoval,
    /// The item is restored at its prior position and the error is returned.
    Rollback,
}

/// Tunables shared by every optimistic collection of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub delete_failure: DeleteFailurePolicy,
    /// Keep unconfirmed local entries when a live snapshot arrives. When
    /// false, snapshots replace the cache wholesale.
    pub merge_pending_on_snapshot: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            delete_failure: DeleteFailurePolicy::default(),
            merge_pending_on_snapshot: true,
        }
    }
}

impl RepositoryConfig {
    /// Parses a JSON object; an empty or blank input yields the defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(ConfigError::Parse)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid repository config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeleteFailurePolicy, RepositoryConfig};

    #[test]
    fn blank_input_uses_defaults() {
        let config = RepositoryConfig::from_json("  ").unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.delete_failure, DeleteFailurePolicy::KeepLocalRemoval);
        assert!(config.merge_pending_on_snapshot);
    }

    #[test]
    fn partial_json_overrides_named_fields() {
        let config = RepositoryConfig::from_json(r#"{ "delete_failure": "rollback" }"#).unwrap();
        assert_eq!(config.delete_failure, DeleteFailurePolicy::Rollback);
        assert!(config.merge_pending_on_snapshot);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(RepositoryConfig::from_json(r#"{ "delete_failure": "ignore" }"#).is_err());
    }
}
