//! Transaction relay
//!
//! Decides whether a submitted transaction is created locally or forwarded
//! to a peer node, and performs the forward.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{GatewayConfig, NodeRole};
use crate::error::JsonRpcError;
use crate::response_code::ResponseCode;
use crate::rpc::JsonRpcRequest;

/// Method name of every relayed request
pub const RELAY_METHOD: &str = "icx_sendTransaction";

/// Relay failure
#[derive(Debug, Error)]
pub enum RelayError {
    /// Neither configuration nor backend named a usable target
    #[error("{}", ResponseCode::FAIL_INVALID_PEER_TARGET.message())]
    InvalidTarget,

    /// The upstream node answered with a JSON-RPC error
    #[error("{message}")]
    Upstream {
        /// Upstream error code
        code: i64,
        /// Upstream error message
        message: String,
    },

    /// The upstream node answered with a non-success HTTP status
    #[error("relay target answered with status {0}")]
    Status(StatusCode),

    /// The upstream node could not be reached
    #[error("relay failed: {0}")]
    Transport(String),

    /// The upstream answer was not JSON
    #[error("malformed relay response: {0}")]
    Decode(String),
}

impl From<RelayError> for JsonRpcError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Upstream { code, message } => {
                JsonRpcError::invalid_request(message).with_data(json!({"upstream_code": code}))
            }
            other => JsonRpcError::internal_error(other.to_string()),
        }
    }
}

/// What to do with a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecision {
    /// Create the transaction on the fronted node
    Local,
    /// Forward it to another node
    Relay,
}

/// Routes transactions between the local node and its relay target
#[derive(Debug, Clone)]
pub struct RelayRouter {
    client: reqwest::Client,
    role: NodeRole,
    override_target: Option<String>,
    timeout: Duration,
}

impl RelayRouter {
    /// Router configured from the gateway settings
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            role: config.node_role,
            override_target: config.relay_override().map(str::to_string),
            timeout: config.relay_timeout,
        }
    }

    /// Decision before asking the backend
    pub fn initial_decision(&self) -> RelayDecision {
        if self.role.accepts_writes() {
            RelayDecision::Local
        } else {
            RelayDecision::Relay
        }
    }

    /// Decision after the backend answered `create_icx_tx`
    pub fn decide(&self, response_code: ResponseCode) -> RelayDecision {
        if response_code == ResponseCode::FAIL_NO_PERMISSION {
            RelayDecision::Relay
        } else {
            RelayDecision::Local
        }
    }

    /// Target to forward to: configuration wins over what the backend reported
    pub fn resolve_target(&self, reported: Option<&str>) -> Result<String, RelayError> {
        self.override_target
            .as_deref()
            .or_else(|| reported.map(str::trim).filter(|t| !t.is_empty()))
            .map(|t| t.trim_end_matches('/').to_string())
            .ok_or(RelayError::InvalidTarget)
    }

    /// Forward `params` as an `icx_sendTransaction` call to `{target}/{path}`
    /// and return the upstream `result`.
    pub async fn relay(
        &self,
        target: &str,
        path: &str,
        id: &JsonValue,
        params: &JsonValue,
    ) -> Result<JsonValue, RelayError> {
        let uri = format!("{}/{}", target, path.trim_start_matches('/'));
        info!("Relaying {} to {}", RELAY_METHOD, uri);

        let body = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: RELAY_METHOD.to_string(),
            params: params.clone(),
            id: id.clone(),
        };

        let response = self
            .client
            .post(&uri)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let payload: Option<JsonValue> = serde_json::from_str(&text).ok();
        if let Some(error) = payload
            .as_ref()
            .and_then(|p| p.get("error"))
            .filter(|e| !e.is_null())
        {
            let code = error.get("code").and_then(JsonValue::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            warn!("Relay target {} rejected transaction: {}", uri, message);
            return Err(RelayError::Upstream { code, message });
        }

        if !status.is_success() {
            return Err(RelayError::Status(
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            ));
        }

        let payload = payload.ok_or_else(|| RelayError::Decode(text.clone()))?;
        debug!("Relay result from {}: {}", uri, payload);
        Ok(payload.get("result").cloned().unwrap_or(JsonValue::Null))
    }
}
