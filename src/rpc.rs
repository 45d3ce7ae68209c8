//! JSON-RPC 2.0 HTTP server
//!
//! Routes each protocol version to the [`Dispatcher`], upgrades websocket
//! subscriptions and answers health checks.

use crate::backend::{BackendRegistry, ChannelBackend};
use crate::config::GatewayConfig;
use crate::dispatcher::{ApiVersion, Dispatcher, RequestContext};
use crate::error::JsonRpcError;
use crate::rate_limit::RateLimiter;
use crate::relay::RelayRouter;
use crate::schema::SchemaRegistry;
use crate::subscriptions::SubscriptionManager;
use crate::templates::Templates;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State, WebSocketUpgrade},
    http::{header, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{net::SocketAddr, sync::Arc};

use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

/// Reply of the retired v1 endpoint
pub const V1_DISABLED: &str = "This api version not support any more!";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Parameters
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,

    /// Request ID (can be string, number, or null)
    #[serde(default)]
    pub id: JsonValue,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,

    /// Result (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,

    /// Error (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request ID
    pub id: JsonValue,
}

impl JsonRpcResponse {
    /// Successful response
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Error response
    pub fn failure(id: JsonValue, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Batch response (array of responses)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchResponse {
    /// Single response
    Single(JsonRpcResponse),
    /// Batch of responses
    Batch(Vec<JsonRpcResponse>),
}

/// Gateway state shared across handlers
pub struct GatewayState {
    /// Configuration
    pub config: GatewayConfig,

    /// Per-IP limiter
    pub rate_limiter: Arc<RateLimiter>,

    /// Backends by channel
    pub backends: Arc<BackendRegistry>,

    /// Request schemas
    pub schemas: SchemaRegistry,

    /// Conversion templates
    pub templates: Templates,

    /// Method tables
    pub dispatcher: Dispatcher,

    /// Transaction relay
    pub relay: RelayRouter,

    /// Websocket subscribers
    pub subscriptions: Arc<SubscriptionManager>,
}

impl GatewayState {
    /// Create state with no backends registered
    pub fn new(config: GatewayConfig) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_ip));
        let backends = Arc::new(BackendRegistry::new(
            config.backend_timeout,
            config.long_poll_timeout,
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&backends),
            config.ws_heartbeat_interval,
        ));
        let relay = RelayRouter::new(&config);

        Self {
            config,
            rate_limiter,
            backends,
            schemas: SchemaRegistry::new(),
            templates: Templates::new(),
            dispatcher: Dispatcher::new(),
            relay,
            subscriptions,
        }
    }

    /// Serve `channel` with `backend`
    pub fn with_backend(self, channel: impl Into<String>, backend: Arc<dyn ChannelBackend>) -> Self {
        self.backends.register(channel, backend);
        self
    }
}

/// Main RPC server
pub struct RpcServer {
    /// Shared server state
    state: Arc<GatewayState>,
}

impl RpcServer {
    /// Create a server over `state`
    pub fn new(state: GatewayState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Shared state
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Start the HTTP server, returning the bound address
    pub async fn start_http(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        let config = &self.state.config;
        info!("Starting HTTP JSON-RPC gateway on {}", config.http_addr);

        let app = router(Arc::clone(&self.state)).layer(cors_layer(config));

        let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("HTTP server listening on {}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                error!("HTTP server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

/// Build the CORS layer from configuration
fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    if !config.enable_cors {
        info!("CORS disabled");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
    }

    let methods: Vec<Method> = config
        .cors_methods
        .split(',')
        .filter_map(|m| match m.trim().to_uppercase().as_str() {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "HEAD" => Some(Method::HEAD),
            _ => None,
        })
        .collect();

    let headers: Vec<header::HeaderName> = config
        .cors_headers
        .split(',')
        .filter_map(|h| header::HeaderName::from_bytes(h.trim().as_bytes()).ok())
        .collect();

    let mut cors = CorsLayer::new()
        .allow_origin(Any)
        .max_age(std::time::Duration::from_secs(config.cors_max_age));

    cors = if methods.is_empty() {
        cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
    } else {
        cors.allow_methods(methods)
    };

    cors = if headers.is_empty() {
        cors.allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        cors.allow_headers(headers)
    };

    cors = cors.expose_headers([header::CONTENT_TYPE, header::CONTENT_LENGTH]);

    info!("CORS enabled with origins: {}", config.cors_origins);
    info!("CORS methods: {}", config.cors_methods);
    info!("CORS headers: {}", config.cors_headers);
    info!("CORS max age: {} seconds", config.cors_max_age);

    cors
}

/// Gateway routes without transport layers
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/v1", get(handle_v1).post(handle_v1))
        .route("/api/v2", post(handle_v2))
        .route("/api/v3", post(handle_v3))
        .route("/api/v3/:channel", post(handle_v3_channel))
        .route("/api/debug/v3", post(handle_debug))
        .route("/api/debug/v3/:channel", post(handle_debug_channel))
        .route("/api/node", post(handle_node))
        .route("/api/node/:channel", post(handle_node_channel))
        .route("/api/ws/:channel", get(handle_websocket_upgrade))
        .route("/health", get(handle_health))
        .with_state(state)
}

type Shared = State<Arc<GatewayState>>;
type Caller = ConnectInfo<SocketAddr>;

async fn handle_v2(State(state): Shared, ConnectInfo(addr): Caller, uri: Uri, body: Bytes) -> Response {
    let channel = state.config.channel.clone();
    handle_json_rpc(state, addr, ApiVersion::V2, channel, uri, body).await
}

async fn handle_v3(State(state): Shared, ConnectInfo(addr): Caller, uri: Uri, body: Bytes) -> Response {
    let channel = state.config.channel.clone();
    handle_json_rpc(state, addr, ApiVersion::V3, channel, uri, body).await
}

async fn handle_v3_channel(
    State(state): Shared,
    ConnectInfo(addr): Caller,
    Path(channel): Path<String>,
    uri: Uri,
    body: Bytes,
) -> Response {
    handle_json_rpc(state, addr, ApiVersion::V3, channel, uri, body).await
}

async fn handle_debug(State(state): Shared, ConnectInfo(addr): Caller, uri: Uri, body: Bytes) -> Response {
    let channel = state.config.channel.clone();
    handle_json_rpc(state, addr, ApiVersion::V3Debug, channel, uri, body).await
}

async fn handle_debug_channel(
    State(state): Shared,
    ConnectInfo(addr): Caller,
    Path(channel): Path<String>,
    uri: Uri,
    body: Bytes,
) -> Response {
    handle_json_rpc(state, addr, ApiVersion::V3Debug, channel, uri, body).await
}

async fn handle_node(State(state): Shared, ConnectInfo(addr): Caller, uri: Uri, body: Bytes) -> Response {
    let channel = state.config.channel.clone();
    handle_json_rpc(state, addr, ApiVersion::Node, channel, uri, body).await
}

async fn handle_node_channel(
    State(state): Shared,
    ConnectInfo(addr): Caller,
    Path(channel): Path<String>,
    uri: Uri,
    body: Bytes,
) -> Response {
    handle_json_rpc(state, addr, ApiVersion::Node, channel, uri, body).await
}

/// Rate limit, parse and dispatch one HTTP body
async fn handle_json_rpc(
    state: Arc<GatewayState>,
    addr: SocketAddr,
    version: ApiVersion,
    channel: String,
    uri: Uri,
    body: Bytes,
) -> Response {
    if !state.rate_limiter.check_rate_limit(addr.ip()) {
        warn!("Rate limit exceeded for {}", addr.ip());
        let error = JsonRpcError::rate_limit_exceeded();
        return (
            error.http_status,
            Json(JsonRpcResponse::failure(JsonValue::Null, error)),
        )
            .into_response();
    }

    let body: JsonValue = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!("Unparseable request from {}: {}", addr, e);
            let error = JsonRpcError::parse_error();
            return (
                error.http_status,
                Json(JsonRpcResponse::failure(JsonValue::Null, error)),
            )
                .into_response();
        }
    };

    let ctx = RequestContext::new(channel, uri.path())
        .with_url(uri.to_string())
        .with_caller_ip(addr.ip());

    let outcome = state.dispatcher.dispatch(&state, version, body, ctx).await;
    (outcome.status, Json(outcome.response)).into_response()
}

async fn handle_v1() -> &'static str {
    V1_DISABLED
}

async fn handle_health(State(state): Shared) -> Json<JsonValue> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "icon-rpc-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "channels": state.backends.channels(),
        "subscribers": state.subscriptions.session_count(),
    }))
}

async fn handle_websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): Shared,
    ConnectInfo(addr): Caller,
    Path(channel): Path<String>,
) -> Response {
    if !state.rate_limiter.check_rate_limit(addr.ip()) {
        warn!("Rate limit exceeded for websocket upgrade from {}", addr.ip());
        let error = JsonRpcError::rate_limit_exceeded();
        return (
            error.http_status,
            Json(JsonRpcResponse::failure(JsonValue::Null, error)),
        )
            .into_response();
    }

    info!("WebSocket upgrade request from {} on {}", addr, channel);
    let subscriptions = Arc::clone(&state.subscriptions);
    ws.on_upgrade(move |socket| async move {
        subscriptions.handle_connection(socket, channel, addr).await;
    })
}
