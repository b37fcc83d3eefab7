use std::time::Duration;

use constellation_fabric::transport::{MemoryBroker, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default time a caller waits for a reply
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default queue group shared by replicas of a service
pub const DEFAULT_QUEUE_GROUP: &str = "constellation";

/// Settings for callers and services
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```
/// use constellation_rpc::RpcConfig;
///
/// let config = RpcConfig::from_toml_str("queue_group = \"greeter\"").unwrap();
/// assert_eq!(config.queue_group, "greeter");
/// assert_eq!(config.request_timeout_ms, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Queue group every listener of a service joins
    pub queue_group: String,
    /// Call timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Largest payload the transport is expected to accept
    pub max_payload: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            queue_group: DEFAULT_QUEUE_GROUP.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl RpcConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_group.trim().is_empty() {
            return Err(Error::Config("queue_group must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_payload == 0 {
            return Err(Error::Config(
                "max_payload must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build an in-process broker enforcing the configured payload limit
    pub fn memory_broker(&self) -> MemoryBroker {
        MemoryBroker::builder().max_payload(self.max_payload).build()
    }
}
