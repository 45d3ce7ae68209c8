//! Gateway configuration

use std::{net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

/// Role of the node this gateway fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Node that may create transactions itself
    #[default]
    Community,
    /// Read-only node that relays every transaction
    Citizen,
}

impl NodeRole {
    /// Whether the node may create transactions locally
    pub fn accepts_writes(self) -> bool {
        matches!(self, NodeRole::Community)
    }
}

/// Durations are written as whole seconds.
mod duration_seconds_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server bind address
    pub http_addr: SocketAddr,

    /// Channel served when the route does not name one
    pub channel: String,

    /// Role of the fronted node
    pub node_role: NodeRole,

    /// Relay target overriding the one reported by the backend
    pub relay_target: Option<String>,

    /// Base URL of the backend services
    pub backend_url: String,

    /// Interval between websocket heartbeats
    #[serde(with = "duration_seconds_format")]
    pub ws_heartbeat_interval: Duration,

    /// Bound on a single backend call
    #[serde(with = "duration_seconds_format")]
    pub backend_timeout: Duration,

    /// Retries on backend connection failure
    pub backend_retry: usize,

    /// Bound on one long-poll round
    #[serde(with = "duration_seconds_format")]
    pub long_poll_timeout: Duration,

    /// Bound on a relayed transaction
    #[serde(with = "duration_seconds_format")]
    pub relay_timeout: Duration,

    /// Ask the backend's DoS guard before accepting a transaction
    pub dos_guard_enable: bool,

    /// Largest accepted batch
    pub max_batch_size: usize,

    /// Requests per second per caller IP, 0 disables limiting
    pub rate_limit_per_ip: u32,

    /// Enable CORS
    pub enable_cors: bool,

    /// CORS allowed origins (comma-separated, use * for all)
    pub cors_origins: String,

    /// CORS allowed methods (comma-separated)
    pub cors_methods: String,

    /// CORS allowed headers (comma-separated)
    pub cors_headers: String,

    /// CORS max age in seconds
    pub cors_max_age: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            channel: "icon_dex".to_string(),
            node_role: NodeRole::Community,
            relay_target: None,
            backend_url: "http://127.0.0.1:9100".to_string(),
            ws_heartbeat_interval: Duration::from_secs(30),
            backend_timeout: Duration::from_secs(30),
            backend_retry: 5,
            long_poll_timeout: Duration::from_secs(120),
            relay_timeout: Duration::from_secs(10),
            dos_guard_enable: false,
            max_batch_size: 100,
            rate_limit_per_ip: 0,
            enable_cors: true,
            cors_origins: "*".to_string(),
            cors_methods: "GET,POST,OPTIONS".to_string(),
            cors_headers: "Content-Type,Authorization,X-Requested-With".to_string(),
            cors_max_age: 3600,
        }
    }
}

impl GatewayConfig {
    /// Relay target from configuration, ignoring blank values
    pub fn relay_override(&self) -> Option<&str> {
        self.relay_target.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}
