//! Registry configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::TransitionPolicy;

/// Settings for a [`SessionRegistry`](crate::SessionRegistry).
///
/// Deserializes from whatever format the host loads its configuration
/// from; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory of the embedded player database.
    pub player_db: PathBuf,

    /// Client uuid that always holds every role.
    pub owner_uuid: Option<String>,

    /// Upper bound (milliseconds) on a durable flush. Slower flushes are
    /// reported as storage failures.
    pub store_timeout_ms: u64,

    /// How out-of-order handshake events are treated.
    pub transition_policy: TransitionPolicy,
}

impl RegistryConfig {
    /// The store timeout as a `Duration`.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            player_db: PathBuf::from("config/player_db"),
            owner_uuid: None,
            store_timeout_ms: 5_000,
            transition_policy: TransitionPolicy::Permissive,
        }
    }
}
