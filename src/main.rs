//! ICON RPC gateway
//!
//! Standalone JSON-RPC gateway in front of a node's backend services.
//!
//! Usage:
//! ```bash
//! cargo run --release -- --http 127.0.0.1:9000 --channel icon_dex --backend-url http://127.0.0.1:9100
//! ```

use clap::Parser;
use icon_rpc_gateway::{GatewayConfig, GatewayState, HttpBackend, NodeRole, RpcServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ICON RPC Gateway")]
#[command(about = "JSON-RPC 2.0 gateway for ICON nodes", long_about = None)]
struct Args {
    /// HTTP server bind address
    #[arg(long, env = "GATEWAY_HTTP", default_value = "127.0.0.1:9000")]
    http: String,

    /// Channel served when the route does not name one
    #[arg(long, env = "GATEWAY_CHANNEL", default_value = "icon_dex")]
    channel: String,

    /// Role of the fronted node
    #[arg(long, env = "GATEWAY_NODE_ROLE", value_enum, default_value = "community")]
    node_role: NodeRole,

    /// Relay target overriding the one reported by the backend
    #[arg(long, env = "GATEWAY_RELAY_TARGET")]
    relay_target: Option<String>,

    /// Base URL of the backend services
    #[arg(long, env = "GATEWAY_BACKEND_URL", default_value = "http://127.0.0.1:9100")]
    backend_url: String,

    /// Seconds between websocket heartbeats
    #[arg(long, default_value = "30")]
    ws_heartbeat_interval: u64,

    /// Seconds a backend call may take
    #[arg(long, default_value = "30")]
    backend_timeout: u64,

    /// Retries on backend connection failure
    #[arg(long, default_value = "5")]
    backend_retry: usize,

    /// Seconds one long-poll round may take
    #[arg(long, default_value = "120")]
    long_poll_timeout: u64,

    /// Seconds a relayed transaction may take
    #[arg(long, default_value = "10")]
    relay_timeout: u64,

    /// Ask the backend's DoS guard before accepting a transaction
    #[arg(long, default_value = "false")]
    dos_guard_enable: bool,

    /// Largest accepted batch
    #[arg(long, default_value = "100")]
    max_batch_size: usize,

    /// Rate limit per IP (requests per second, 0 disables)
    #[arg(long, default_value = "0")]
    rate_limit: u32,

    /// Enable CORS
    #[arg(long, default_value = "true")]
    enable_cors: bool,

    /// CORS allowed origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,

    /// CORS allowed methods (comma-separated)
    #[arg(long, default_value = "GET,POST,OPTIONS")]
    cors_methods: String,

    /// CORS allowed headers (comma-separated)
    #[arg(long, default_value = "Content-Type,Authorization,X-Requested-With")]
    cors_headers: String,

    /// CORS max age in seconds
    #[arg(long, default_value = "3600")]
    cors_max_age: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
        let http_addr: SocketAddr = self.http.parse()?;
        if self.ws_heartbeat_interval == 0 {
            return Err("--ws-heartbeat-interval must be at least 1 second".into());
        }

        Ok(GatewayConfig {
            http_addr,
            channel: self.channel,
            node_role: self.node_role,
            relay_target: self.relay_target,
            backend_url: self.backend_url,
            ws_heartbeat_interval: Duration::from_secs(self.ws_heartbeat_interval),
            backend_timeout: Duration::from_secs(self.backend_timeout),
            backend_retry: self.backend_retry,
            long_poll_timeout: Duration::from_secs(self.long_poll_timeout),
            relay_timeout: Duration::from_secs(self.relay_timeout),
            dos_guard_enable: self.dos_guard_enable,
            max_batch_size: self.max_batch_size,
            rate_limit_per_ip: self.rate_limit,
            enable_cors: self.enable_cors,
            cors_origins: self.cors_origins,
            cors_methods: self.cors_methods,
            cors_headers: self.cors_headers,
            cors_max_age: self.cors_max_age,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let config = args.into_config()?;

    info!("Starting ICON RPC gateway");
    info!("HTTP: {}", config.http_addr);
    info!("Channel: {}", config.channel);
    info!("Node role: {:?}", config.node_role);
    info!("Backend: {}", config.backend_url);
    if let Some(target) = config.relay_override() {
        info!("Relay target: {}", target);
    }

    let backend = HttpBackend::new(&config.backend_url, &config.channel, config.backend_retry);
    let channel = config.channel.clone();
    let state = GatewayState::new(config).with_backend(channel, Arc::new(backend));

    let server = RpcServer::new(state);
    let addr = server.start_http().await?;

    info!("RPC gateway started");
    info!("HTTP endpoint: http://{}/api/v3", addr);
    info!("WebSocket endpoint: ws://{}/api/ws/{}", addr, server.state().config.channel);
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    Ok(())
}

/// Initialize tracing/logging. `RUST_LOG` overrides `log_level` when set.
fn init_tracing(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_onto_config() {
        let config = Args::parse_from(["icon-rpc-gateway"]).into_config().unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.ws_heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.node_role, NodeRole::Community);
    }

    #[test]
    fn test_zero_heartbeat_interval_is_rejected() {
        let args = Args::parse_from(["icon-rpc-gateway", "--ws-heartbeat-interval", "0"]);
        assert!(args.into_config().is_err());
    }
}
