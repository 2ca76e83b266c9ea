use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::PeerDescriptor;

fn default_min_timeout() -> f64 {
    0.150
}

fn default_max_timeout() -> f64 {
    0.300
}

/// Construction parameters for a [`crate::Cluster`].
///
/// Mirrors the configuration shape in the specification: an identifier, the
/// address this node listens on for inbound RPCs, the fixed peer set, and
/// the randomized election-timeout bounds (in seconds, matching the
/// original's `min_timeout`/`max_timeout` floats).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub identifier: String,
    pub listen_host: String,
    pub listen_port: u16,
    #[serde(default)]
    pub peers: Vec<PeerDescriptor>,
    #[serde(default = "default_min_timeout")]
    pub min_timeout: f64,
    #[serde(default = "default_max_timeout")]
    pub max_timeout: f64,
    /// Optional metadata a host can attach to its own identity, for use if
    /// it registers itself with another node's registry via `/raft/register`.
    #[serde(default)]
    pub node_metadata: serde_json::Map<String, serde_json::Value>,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identifier.is_empty() {
            return Err(ConfigError::EmptyIdentifier);
        }
        if self.listen_port == 0 {
            return Err(ConfigError::InvalidListenPort);
        }
        let min = self.min_timeout_duration();
        let max = self.max_timeout_duration();
        if min > max {
            return Err(ConfigError::TimeoutRangeInverted { min, max });
        }
        Ok(())
    }

    pub fn min_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.min_timeout.max(0.0))
    }

    pub fn max_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_timeout.max(0.0))
    }

    pub fn listen_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        format!("{}:{}", self.listen_host, self.listen_port)
            .parse()
            .map_err(|source| ConfigError::InvalidListenAddress {
                host: self.listen_host.clone(),
                port: self.listen_port,
                source,
            })
    }
}
