//! Backend service contract
//!
//! The gateway never answers queries itself. Every method ends in a call on a
//! per-channel [`ChannelBackend`]; the transport behind it is pluggable.
//! [`BackendRegistry`] maps channel names to backends and bounds every call by
//! the configured timeout.

pub mod http;

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::JsonRpcError;
use crate::response_code::ResponseCode;

pub use self::http::HttpBackend;

/// Failure talking to a backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// No backend serves the channel
    #[error("unknown channel {0}")]
    UnknownChannel(String),

    /// Connection to the backend was lost
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The call did not finish in time
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with an error payload
    #[error("backend error {code}: {message}")]
    Remote {
        /// Backend error code
        code: i64,
        /// Backend error message
        message: String,
    },

    /// The backend answer could not be decoded
    #[error("malformed backend response: {0}")]
    Decode(String),

    /// Transport level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend does not implement the operation
    #[error("operation {0} is not supported by this backend")]
    Unsupported(&'static str),
}

impl From<BackendError> for JsonRpcError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::UnknownChannel(_) => JsonRpcError::invalid_request("Invalid channel name"),
            BackendError::Remote { code, message } => {
                JsonRpcError::new(-code.abs(), message, StatusCode::BAD_REQUEST)
            }
            BackendError::Timeout(_)
            | BackendError::ConnectionLost(_)
            | BackendError::Transport(_) => {
                warn!("Backend unavailable: {}", error);
                JsonRpcError::internal_error(format!("Backend unavailable: {}", error))
            }
            BackendError::Decode(_) | BackendError::Unsupported(_) => {
                JsonRpcError::internal_error(error.to_string())
            }
        }
    }
}

/// Block selector for [`ChannelBackend::get_block`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockQuery {
    /// Block at a height
    Height(i64),
    /// Block with a hash (no `0x` prefix)
    Hash(String),
    /// Most recent block
    Latest,
}

/// Answer to [`ChannelBackend::get_block`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResult {
    /// Backend response code
    pub response_code: ResponseCode,
    /// Hash of the returned block
    #[serde(default)]
    pub block_hash: Option<String>,
    /// Commit proof of the block
    #[serde(default)]
    pub confirm_info: String,
    /// Block body, an empty object when the lookup failed
    #[serde(default)]
    pub block: JsonValue,
}

/// Block pushed to a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBlock {
    /// Block body
    pub block: JsonValue,
    /// Commit proof of the block
    #[serde(default)]
    pub confirm_info: String,
}

/// Answer to [`ChannelBackend::create_icx_tx`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTxResult {
    /// Backend response code
    pub response_code: ResponseCode,
    /// Hash of the accepted transaction
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Node that should receive the transaction instead
    #[serde(default)]
    pub relay_target: Option<String>,
}

/// Answer to [`ChannelBackend::get_invoke_result`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResult {
    /// Backend response code
    pub response_code: ResponseCode,
    /// Execution result serialized as JSON text
    #[serde(default)]
    pub result: Option<String>,
}

/// Answer to [`ChannelBackend::get_tx_info`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInfo {
    /// Backend response code
    pub response_code: ResponseCode,
    /// `{transaction, tx_index, block_height, block_hash}`
    #[serde(default)]
    pub tx_info: JsonValue,
}

/// Answer to [`ChannelBackend::get_tx_by_address`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressTxList {
    /// Transaction hashes, terminated by a sentinel entry
    pub tx_list: Vec<JsonValue>,
    /// Cursor for the next page
    pub next_index: JsonValue,
}

/// Operations one channel's backend exposes.
///
/// Operations a backend does not implement report
/// [`BackendError::Unsupported`].
#[async_trait]
pub trait ChannelBackend: Send + Sync {
    /// Register a websocket subscriber. `false` means the subscriber limit is reached.
    async fn register_citizen(
        &self,
        peer_id: &str,
        target: &str,
        connected_time: i64,
    ) -> Result<bool, BackendError> {
        let _ = (peer_id, target, connected_time);
        Err(BackendError::Unsupported("register_citizen"))
    }

    /// Drop a websocket subscriber
    async fn unregister_citizen(&self, peer_id: &str) -> Result<(), BackendError> {
        let _ = peer_id;
        Err(BackendError::Unsupported("unregister_citizen"))
    }

    /// Long-poll until the backend asks to drop `peer_id`
    async fn wait_for_unregister_signal(&self, peer_id: &str) -> Result<bool, BackendError> {
        let _ = peer_id;
        Err(BackendError::Unsupported("wait_for_unregister_signal"))
    }

    /// Long-poll until the block at `height` exists
    async fn announce_new_block(&self, height: u64, peer_id: &str) -> Result<NewBlock, BackendError> {
        let _ = (height, peer_id);
        Err(BackendError::Unsupported("announce_new_block"))
    }

    /// Create a transaction from client parameters
    async fn create_icx_tx(&self, params: &JsonValue) -> Result<CreateTxResult, BackendError> {
        let _ = params;
        Err(BackendError::Unsupported("create_icx_tx"))
    }

    /// Pre-validate a transaction request `{method, params}`
    async fn validate_transaction(&self, request: &JsonValue) -> Result<JsonValue, BackendError> {
        let _ = request;
        Err(BackendError::Unsupported("validate_transaction"))
    }

    /// Ask the DoS guard about transaction parameters
    async fn dos_guard(&self, params: &JsonValue) -> Result<JsonValue, BackendError> {
        let _ = params;
        Err(BackendError::Unsupported("dos_guard"))
    }

    /// Run a state query `{method, params}`
    async fn query(&self, request: &JsonValue) -> Result<JsonValue, BackendError> {
        let _ = request;
        Err(BackendError::Unsupported("query"))
    }

    /// Look up a block
    async fn get_block(&self, query: BlockQuery) -> Result<BlockResult, BackendError> {
        let _ = query;
        Err(BackendError::Unsupported("get_block"))
    }

    /// Execution result of a transaction
    async fn get_invoke_result(&self, tx_hash: &str) -> Result<InvokeResult, BackendError> {
        let _ = tx_hash;
        Err(BackendError::Unsupported("get_invoke_result"))
    }

    /// Transaction with its position in the chain
    async fn get_tx_info(&self, tx_hash: &str) -> Result<TxInfo, BackendError> {
        let _ = tx_hash;
        Err(BackendError::Unsupported("get_tx_info"))
    }

    /// Merkle proof of a transaction
    async fn get_tx_proof(&self, tx_hash: &str) -> Result<JsonValue, BackendError> {
        let _ = tx_hash;
        Err(BackendError::Unsupported("get_tx_proof"))
    }

    /// Merkle proof of a receipt
    async fn get_receipt_proof(&self, tx_hash: &str) -> Result<JsonValue, BackendError> {
        let _ = tx_hash;
        Err(BackendError::Unsupported("get_receipt_proof"))
    }

    /// Check a transaction proof
    async fn prove_tx(&self, tx_hash: &str, proof: &JsonValue) -> Result<JsonValue, BackendError> {
        let _ = (tx_hash, proof);
        Err(BackendError::Unsupported("prove_tx"))
    }

    /// Check a receipt proof
    async fn prove_receipt(
        &self,
        tx_hash: &str,
        proof: &JsonValue,
    ) -> Result<JsonValue, BackendError> {
        let _ = (tx_hash, proof);
        Err(BackendError::Unsupported("prove_receipt"))
    }

    /// Representatives recorded under a hash
    async fn get_reps_by_hash(&self, reps_hash: &str) -> Result<JsonValue, BackendError> {
        let _ = reps_hash;
        Err(BackendError::Unsupported("get_reps_by_hash"))
    }

    /// Page of transactions sent from an address
    async fn get_tx_by_address(
        &self,
        address: &str,
        index: i64,
    ) -> Result<AddressTxList, BackendError> {
        let _ = (address, index);
        Err(BackendError::Unsupported("get_tx_by_address"))
    }

    /// Hand a block confirmed elsewhere to this node
    async fn announce_confirmed_block(
        &self,
        block: &str,
        commit_state: &str,
    ) -> Result<ResponseCode, BackendError> {
        let _ = (block, commit_state);
        Err(BackendError::Unsupported("announce_confirmed_block"))
    }

    /// Channels known to the node
    async fn get_channel_infos(&self) -> Result<JsonValue, BackendError> {
        Err(BackendError::Unsupported("get_channel_infos"))
    }
}

/// Channel name to backend mapping
pub struct BackendRegistry {
    channels: DashMap<String, Arc<dyn ChannelBackend>>,
    call_timeout: Duration,
    long_poll_timeout: Duration,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new(call_timeout: Duration, long_poll_timeout: Duration) -> Self {
        Self {
            channels: DashMap::new(),
            call_timeout,
            long_poll_timeout,
        }
    }

    /// Serve `channel` with `backend`. Registering a channel twice replaces it.
    pub fn register(&self, channel: impl Into<String>, backend: Arc<dyn ChannelBackend>) {
        let channel = channel.into();
        debug!("Registered backend for channel {}", channel);
        self.channels.insert(channel, backend);
    }

    /// Backend serving `channel`
    pub fn get(&self, channel: &str) -> Result<Arc<dyn ChannelBackend>, BackendError> {
        self.channels
            .get(channel)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BackendError::UnknownChannel(channel.to_string()))
    }

    /// Registered channel names
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Run a request/response call under the call timeout
    pub async fn call<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        bounded(self.call_timeout, call).await
    }

    /// Run one long-poll round under the long-poll timeout
    pub async fn long_poll<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        bounded(self.long_poll_timeout, call).await
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}

/// Backends may ship JSON documents serialized as strings; decode those.
pub fn decode_embedded(value: JsonValue) -> Result<JsonValue, serde_json::Error> {
    match value {
        JsonValue::String(text) => serde_json::from_str(&text),
        other => Ok(other),
    }
}

/// Raise the `{error: {code, message}}` payload of a query answer
pub fn check_query_response(response: JsonValue) -> Result<JsonValue, JsonRpcError> {
    match response.get("error") {
        Some(error) if !error.is_null() => Err(JsonRpcError::from_query_error(error)),
        _ => Ok(response),
    }
}
