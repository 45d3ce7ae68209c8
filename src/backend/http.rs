//! Backend reached over HTTP
//!
//! Each operation is a POST of `{"method": <operation>, "params": {...}}` to
//! `{backend_url}/{channel}`. The answer body is the operation result.
//! Connection failures are retried with a Fibonacci backoff; long-poll
//! operations are sent once.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio_retry::{
    strategy::{jitter, FibonacciBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use super::{
    AddressTxList, BackendError, BlockQuery, BlockResult, ChannelBackend, CreateTxResult,
    InvokeResult, NewBlock, TxInfo,
};
use crate::response_code::ResponseCode;

/// Channel backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    retries: usize,
}

impl HttpBackend {
    /// Backend for `channel` served under `base_url`
    pub fn new(base_url: &str, channel: &str, retries: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), channel),
            retries,
        }
    }

    /// URL operations are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        FibonacciBackoff::from_millis(100)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.retries)
    }

    async fn post_once(&self, method: &str, params: &JsonValue) -> Result<JsonValue, BackendError> {
        let body = json!({"method": method, "params": params});
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let payload: JsonValue = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        if !status.is_success() {
            let code = payload.get("code").and_then(JsonValue::as_i64).unwrap_or(-1);
            let message = payload
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("backend request failed")
                .to_string();
            return Err(BackendError::Remote { code, message });
        }

        Ok(payload)
    }

    async fn post(&self, method: &str, params: JsonValue) -> Result<JsonValue, BackendError> {
        debug!("Backend call {} on {}", method, self.endpoint);
        RetryIf::start(
            self.retry_strategy(),
            || self.post_once(method, &params),
            |e: &BackendError| {
                let retry = matches!(e, BackendError::ConnectionLost(_));
                if retry {
                    warn!("Backend connection failed, retrying: {}", e);
                }
                retry
            },
        )
        .await
    }

    async fn post_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: JsonValue,
    ) -> Result<T, BackendError> {
        decode(self.post(method, params).await?)
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_connect() {
        BackendError::ConnectionLost(error.to_string())
    } else {
        BackendError::Transport(error.to_string())
    }
}

fn decode<T: DeserializeOwned>(payload: JsonValue) -> Result<T, BackendError> {
    serde_json::from_value(payload).map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl ChannelBackend for HttpBackend {
    async fn register_citizen(
        &self,
        peer_id: &str,
        target: &str,
        connected_time: i64,
    ) -> Result<bool, BackendError> {
        self.post_as(
            "register_citizen",
            json!({"peer_id": peer_id, "target": target, "connected_time": connected_time}),
        )
        .await
    }

    async fn unregister_citizen(&self, peer_id: &str) -> Result<(), BackendError> {
        self.post("unregister_citizen", json!({"peer_id": peer_id}))
            .await
            .map(|_| ())
    }

    async fn wait_for_unregister_signal(&self, peer_id: &str) -> Result<bool, BackendError> {
        decode(
            self.post_once("wait_for_unregister_signal", &json!({"peer_id": peer_id}))
                .await?,
        )
    }

    async fn announce_new_block(&self, height: u64, peer_id: &str) -> Result<NewBlock, BackendError> {
        decode(
            self.post_once(
                "announce_new_block",
                &json!({"subscriber_block_height": height, "subscriber_id": peer_id}),
            )
            .await?,
        )
    }

    async fn create_icx_tx(&self, params: &JsonValue) -> Result<CreateTxResult, BackendError> {
        self.post_as("create_icx_tx", json!({"kwargs": params})).await
    }

    async fn validate_transaction(&self, request: &JsonValue) -> Result<JsonValue, BackendError> {
        self.post("validate_transaction", request.clone()).await
    }

    async fn dos_guard(&self, params: &JsonValue) -> Result<JsonValue, BackendError> {
        self.post("dos_guard", params.clone()).await
    }

    async fn query(&self, request: &JsonValue) -> Result<JsonValue, BackendError> {
        self.post("query", request.clone()).await
    }

    async fn get_block(&self, query: BlockQuery) -> Result<BlockResult, BackendError> {
        let params = match query {
            BlockQuery::Height(height) => json!({"block_height": height}),
            BlockQuery::Hash(hash) => json!({"block_hash": hash}),
            BlockQuery::Latest => json!({}),
        };
        self.post_as("get_block", params).await
    }

    async fn get_invoke_result(&self, tx_hash: &str) -> Result<InvokeResult, BackendError> {
        self.post_as("get_invoke_result", json!({"tx_hash": tx_hash})).await
    }

    async fn get_tx_info(&self, tx_hash: &str) -> Result<TxInfo, BackendError> {
        self.post_as("get_tx_info", json!({"tx_hash": tx_hash})).await
    }

    async fn get_tx_proof(&self, tx_hash: &str) -> Result<JsonValue, BackendError> {
        self.post("get_tx_proof", json!({"tx_hash": tx_hash})).await
    }

    async fn get_receipt_proof(&self, tx_hash: &str) -> Result<JsonValue, BackendError> {
        self.post("get_receipt_proof", json!({"tx_hash": tx_hash})).await
    }

    async fn prove_tx(&self, tx_hash: &str, proof: &JsonValue) -> Result<JsonValue, BackendError> {
        self.post("prove_tx", json!({"tx_hash": tx_hash, "proof": proof}))
            .await
    }

    async fn prove_receipt(
        &self,
        tx_hash: &str,
        proof: &JsonValue,
    ) -> Result<JsonValue, BackendError> {
        self.post("prove_receipt", json!({"tx_hash": tx_hash, "proof": proof}))
            .await
    }

    async fn get_reps_by_hash(&self, reps_hash: &str) -> Result<JsonValue, BackendError> {
        self.post("get_reps_by_hash", json!({"reps_hash": reps_hash}))
            .await
    }

    async fn get_tx_by_address(
        &self,
        address: &str,
        index: i64,
    ) -> Result<AddressTxList, BackendError> {
        self.post_as(
            "get_tx_by_address",
            json!({"address": address, "index": index}),
        )
        .await
    }

    async fn announce_confirmed_block(
        &self,
        block: &str,
        commit_state: &str,
    ) -> Result<ResponseCode, BackendError> {
        self.post_as(
            "announce_confirmed_block",
            json!({"serialized_block": block, "commit_state": commit_state}),
        )
        .await
    }

    async fn get_channel_infos(&self) -> Result<JsonValue, BackendError> {
        self.post("get_channel_infos", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_channel() {
        let backend = HttpBackend::new("http://127.0.0.1:9100/", "icon_dex", 3);
        assert_eq!(backend.endpoint(), "http://127.0.0.1:9100/icon_dex");
    }

    #[test]
    fn test_retry_strategy_is_bounded() {
        let backend = HttpBackend::new("http://127.0.0.1:9100", "icon_dex", 4);
        let delays: Vec<Duration> = backend.retry_strategy().collect();
        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_connection_loss() {
        // Port 9 on loopback is closed in test environments
        let backend = HttpBackend::new("http://127.0.0.1:9", "icon_dex", 0);
        let result = backend.get_channel_infos().await;
        assert!(matches!(
            result,
            Err(BackendError::ConnectionLost(_)) | Err(BackendError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_loss_is_retried_then_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(&format!("http://{}", addr), "icon_dex", 2);
        let result = backend.post("node_getChannelInfos", json!({})).await;
        assert!(matches!(result, Err(BackendError::ConnectionLost(_))), "{:?}", result);
    }
}
