//! # ICON RPC Gateway
//!
//! JSON-RPC 2.0 gateway between blockchain clients and a node's backend
//! services.
//!
//! This crate provides:
//! - Versioned JSON-RPC endpoints (v2, v3, debug v3, node) over HTTP
//! - Request validation against per-method JSON schemas
//! - Value transcoding between wire form and backend form
//! - Transaction relay for nodes that may not accept writes
//! - Websocket block subscriptions with heartbeats
//! - Optional per-IP rate limiting
//!
//! ## Example Usage
//!
//! ```no_run
//! use icon_rpc_gateway::{GatewayConfig, GatewayState, HttpBackend, RpcServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::default();
//! let backend = HttpBackend::new(&config.backend_url, &config.channel, config.backend_retry);
//! let channel = config.channel.clone();
//!
//! let state = GatewayState::new(config).with_backend(channel, Arc::new(backend));
//! let server = RpcServer::new(state);
//! server.start_http().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![forbid(unsafe_code)]
#![recursion_limit = "256"]

pub mod backend;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rate_limit;
pub mod relay;
pub mod response_code;
pub mod rpc;
pub mod schema;
pub mod subscriptions;
pub mod template;
pub mod templates;

pub use backend::{BackendError, BackendRegistry, ChannelBackend, HttpBackend};
pub use config::{GatewayConfig, NodeRole};
pub use dispatcher::{ApiVersion, Dispatcher, RequestContext};
pub use error::JsonRpcError;
pub use rate_limit::RateLimiter;
pub use relay::{RelayDecision, RelayRouter};
pub use response_code::ResponseCode;
pub use rpc::{router, BatchResponse, GatewayState, JsonRpcRequest, JsonRpcResponse, RpcServer};
pub use subscriptions::{SubscribeRequest, SubscriptionManager};
