//! End-to-end dispatch through the HTTP router against a spy backend

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use icon_rpc_gateway::backend::{BlockQuery, BlockResult, CreateTxResult, InvokeResult};
use icon_rpc_gateway::{
    router, BackendError, ChannelBackend, GatewayConfig, GatewayState, NodeRole, ResponseCode,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

const CHANNEL: &str = "icon_dex";
const EOA: &str = "hxbe258ceb872e08851f1f59694dac2558708ece11";
const BALANCE: &str = "0xde0b6b3a7640000";
const TOTAL_SUPPLY: &str = "0x2961fff8ca4a62327800000";

#[derive(Default)]
struct SpyBackend {
    calls: AtomicUsize,
    created: AtomicUsize,
    queries: Mutex<Vec<JsonValue>>,
    /// `create_icx_tx` answers `FAIL_NO_PERMISSION` with this target
    no_permission: Option<Option<String>>,
}

impl SpyBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn without_permission(relay_target: Option<String>) -> Self {
        Self {
            no_permission: Some(relay_target),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChannelBackend for SpyBackend {
    async fn query(&self, request: &JsonValue) -> Result<JsonValue, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(request.clone());
        match request["method"].as_str() {
            Some("icx_getBalance") => Ok(json!(BALANCE)),
            Some("icx_getTotalSupply") => Ok(json!(TOTAL_SUPPLY)),
            _ => Ok(json!({"error": {"code": 32602, "message": "unsupported query"}})),
        }
    }

    async fn get_block(&self, query: BlockQuery) -> Result<BlockResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match query {
            BlockQuery::Height(2) => Ok(BlockResult {
                response_code: ResponseCode::SUCCESS,
                block_hash: Some("af5570f5a1810b7af78caf4bc70a660f0df51e42baf91d4de5b2328de0e83dfc".to_string()),
                confirm_info: String::new(),
                block: json!(r#"{"version": "0.3", "height": "0x2", "commit_state": {"icon_dex": "00"}}"#),
            }),
            _ => Ok(BlockResult {
                response_code: ResponseCode::FAIL,
                block_hash: None,
                confirm_info: String::new(),
                block: json!({}),
            }),
        }
    }

    async fn validate_transaction(&self, _request: &JsonValue) -> Result<JsonValue, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({}))
    }

    async fn create_icx_tx(&self, _params: &JsonValue) -> Result<CreateTxResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(relay_target) = &self.no_permission {
            return Ok(CreateTxResult {
                response_code: ResponseCode::FAIL_NO_PERMISSION,
                tx_hash: None,
                relay_target: relay_target.clone(),
            });
        }
        Ok(CreateTxResult {
            response_code: ResponseCode::SUCCESS,
            tx_hash: Some("0x".to_string() + &"ab".repeat(32)),
            relay_target: None,
        })
    }

    async fn get_invoke_result(&self, tx_hash: &str) -> Result<InvokeResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match &tx_hash[..2] {
            "aa" => Some(r#"{"code": 1}"#),
            "bb" => Some(r#"{"code": 0, "failure": {"code": -32600, "message": "Out of step"}}"#),
            "cc" => Some("not json"),
            "dd" => None,
            _ => {
                return Ok(InvokeResult {
                    response_code: ResponseCode::FAIL,
                    result: None,
                })
            }
        };
        Ok(InvokeResult {
            response_code: ResponseCode::SUCCESS,
            result: result.map(str::to_string),
        })
    }

    async fn get_channel_infos(&self) -> Result<JsonValue, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"icon_dex": {"score_package": "loopchain_default"}}))
    }
}

fn app(config: GatewayConfig, backend: Arc<SpyBackend>) -> Router {
    let state = GatewayState::new(config).with_backend(CHANNEL, backend);
    router(Arc::new(state)).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
}

async fn post_json(app: Router, uri: &str, body: &JsonValue) -> (StatusCode, JsonValue) {
    post_raw(app, uri, body.to_string()).await
}

async fn post_raw(app: Router, uri: &str, body: String) -> (StatusCode, JsonValue) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn request(id: i64, method: &str, params: JsonValue) -> JsonValue {
    json!({"jsonrpc": "2.0", "method": method, "id": id, "params": params})
}

/// Upstream node answering every `icx_sendTransaction` with `0xrelayed`.
/// Returns its address and the bodies it received.
async fn spawn_upstream() -> (SocketAddr, Arc<Mutex<Vec<JsonValue>>>) {
    let received: Arc<Mutex<Vec<JsonValue>>> = Arc::default();
    let recorder = Arc::clone(&received);
    let upstream = Router::new().route(
        "/api/v3/icon_dex",
        post(move |Json(body): Json<JsonValue>| {
            let recorder = Arc::clone(&recorder);
            async move {
                let id = body["id"].clone();
                recorder.lock().unwrap().push(body);
                Json(json!({"jsonrpc": "2.0", "result": "0xrelayed", "id": id}))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    (addr, received)
}

fn balance_request(id: i64, address: &str) -> JsonValue {
    json!({"jsonrpc": "2.0", "method": "icx_getBalance", "id": id, "params": {"address": address}})
}

fn send_tx_params() -> JsonValue {
    json!({
        "version": "0x3",
        "from": EOA,
        "to": "hx5bfdb090f43a808005ffc27c25b213145e80b7cd",
        "value": "0xde0b6b3a7640000",
        "stepLimit": "0x12345",
        "timestamp": "0x563a6cf330136",
        "nid": "0x3",
        "nonce": "0x1",
        "signature": "VAia7YZ2Ji6igKWzjR2YsGa2m53nKPrfK7uXYW78QLE+ATehAVZPC40szvAiA6NEU5gCYB4c4qaQzqDh2ugcHgA="
    })
}

#[tokio::test]
async fn test_batch_keeps_request_order() {
    let backend = Arc::new(SpyBackend::default());
    let batch = json!([
        balance_request(1, EOA),
        {"jsonrpc": "2.0", "method": "icx_getTotalSupply", "id": 2},
        {"jsonrpc": "2.0", "method": "icx_notAMethod", "id": 3},
        balance_request(4, "hx1234"),
    ]);

    let (status, body) = post_json(app(GatewayConfig::default(), backend.clone()), "/api/v3", &batch).await;

    assert_eq!(status, StatusCode::OK);
    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"], BALANCE);
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"], TOTAL_SUPPLY);
    assert_eq!(responses[2]["id"], 3);
    assert_eq!(responses[2]["error"]["code"], -32601);
    assert_eq!(responses[3]["id"], 4);
    assert_eq!(responses[3]["error"]["code"], -32602);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_unknown_method_never_reaches_backend() {
    let backend = Arc::new(SpyBackend::default());
    let request = json!({"jsonrpc": "2.0", "method": "icx_getFoo", "id": 7});

    let (status, body) = post_json(app(GatewayConfig::default(), backend.clone()), "/api/v3", &request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], 7);
    assert!(body.get("result").is_none());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_address_boundaries() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig::default();

    let (status, body) = post_json(app(config.clone(), backend.clone()), "/api/v3", &balance_request(1, EOA)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], BALANCE);

    for bad in [
        format!("{}0", EOA),
        EOA[..EOA.len() - 1].to_string(),
        EOA.replacen("hx", "HX", 1),
        EOA.replacen("be", "BE", 1),
    ] {
        let (status, body) = post_json(app(config.clone(), backend.clone()), "/api/v3", &balance_request(1, &bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", bad);
        assert_eq!(body["error"]["code"], -32602, "{}", bad);
    }

    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_get_block_by_height() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig::default();

    let request = json!({"jsonrpc": "2.0", "method": "icx_getBlockByHeight", "id": 1, "params": {"height": "0x2"}});
    let (status, body) = post_json(app(config.clone(), backend.clone()), "/api/v3", &request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["height"], "0x2");
    assert_eq!(body["result"]["version"], "0.3");
    assert!(body["result"].get("commit_state").is_none());

    let request = json!({"jsonrpc": "2.0", "method": "icx_getBlockByHeight", "id": 2, "params": {"height": "0x9"}});
    let (status, body) = post_json(app(config, backend), "/api/v3", &request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["id"], 2);
}

#[tokio::test]
async fn test_community_node_creates_transaction_locally() {
    let backend = Arc::new(SpyBackend::default());
    let request = json!({"jsonrpc": "2.0", "method": "icx_sendTransaction", "id": 11, "params": send_tx_params()});

    let (status, body) = post_json(app(GatewayConfig::default(), backend.clone()), "/api/v3", &request).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["result"], json!(format!("0x{}", "ab".repeat(32))));
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_citizen_relays_transaction_upstream() {
    let (upstream_addr, received) = spawn_upstream().await;

    let config = GatewayConfig {
        node_role: NodeRole::Citizen,
        relay_target: Some(format!("http://{}/", upstream_addr)),
        ..Default::default()
    };
    let backend = Arc::new(SpyBackend::default());
    let request = json!({"jsonrpc": "2.0", "method": "icx_sendTransaction", "id": 12, "params": send_tx_params()});

    let (status, body) = post_json(app(config, backend.clone()), "/api/v3/icon_dex", &request).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["result"], "0xrelayed");
    assert_eq!(body["id"], 12);
    assert_eq!(backend.created.load(Ordering::SeqCst), 0);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["method"], "icx_sendTransaction");
    assert_eq!(received[0]["id"], 12);
    assert_eq!(received[0]["params"], send_tx_params());
}

#[tokio::test]
async fn test_community_node_relays_when_backend_denies_permission() {
    let (upstream_addr, received) = spawn_upstream().await;
    let backend = Arc::new(SpyBackend::without_permission(Some(format!("http://{}", upstream_addr))));
    let body = request(21, "icx_sendTransaction", send_tx_params());

    let (status, reply) = post_json(app(GatewayConfig::default(), backend.clone()), "/api/v3/icon_dex", &body).await;

    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(reply["result"], "0xrelayed");
    assert_eq!(reply["id"], 21);
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], body);
}

#[tokio::test]
async fn test_community_node_without_relay_target() {
    let backend = Arc::new(SpyBackend::without_permission(None));
    let body = request(22, "icx_sendTransaction", send_tx_params());

    let (status, reply) = post_json(app(GatewayConfig::default(), backend.clone()), "/api/v3/icon_dex", &body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", reply);
    assert_eq!(reply["error"]["code"], -32603);
    assert_eq!(reply["error"]["message"], "invalid peer target for relay");
    assert_eq!(reply["id"], 22);
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
}

fn send_tx_v2_params() -> JsonValue {
    json!({
        "from": EOA,
        "to": "hx5bfdb090f43a808005ffc27c25b213145e80b7cd",
        "value": "0xde0b6b3a7640000",
        "fee": "0x2386f26fc10000",
        "timestamp": "1523327456264040",
        "tx_hash": "4c1a".repeat(16),
        "signature": "VAia7YZ2Ji6igKWzjR2YsGa2m53nKPrfK7uXYW78QLE+ATehAVZPC40szvAiA6NEU5gCYB4c4qaQzqDh2ugcHgA="
    })
}

#[tokio::test]
async fn test_v2_send_transaction_bodies() {
    let backend = Arc::new(SpyBackend::default());
    let (status, reply) = post_json(
        app(GatewayConfig::default(), backend),
        "/api/v2",
        &request(1, "icx_sendTransaction", send_tx_v2_params()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(
        reply["result"],
        json!({"response_code": 0, "tx_hash": format!("0x{}", "ab".repeat(32))})
    );

    let backend = Arc::new(SpyBackend::without_permission(None));
    let (status, reply) = post_json(
        app(GatewayConfig::default(), backend),
        "/api/v2",
        &request(2, "icx_sendTransaction", send_tx_v2_params()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(
        reply["result"],
        json!({"response_code": -12, "message": "invalid peer target for relay", "tx_hash": null})
    );
}

#[tokio::test]
async fn test_v2_transaction_result_codes() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig::default();
    let lookup = |prefix: &str| request(1, "icx_getTransactionResult", json!({"tx_hash": prefix.repeat(32)}));

    let (status, reply) = post_json(app(config.clone(), backend.clone()), "/api/v2", &lookup("aa")).await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(reply["result"], json!({"response_code": "0", "response": {"code": 0}}));

    for (prefix, message) in [
        ("bb", "Invalid transaction hash."),
        ("dd", "tx_result is empty"),
        ("ee", "Invalid transaction hash."),
    ] {
        let (status, reply) = post_json(app(config.clone(), backend.clone()), "/api/v2", &lookup(prefix)).await;
        assert_eq!(status, StatusCode::OK, "{}", reply);
        assert_eq!(
            reply["result"],
            json!({"response_code": "-6", "message": message}),
            "{}",
            prefix
        );
    }

    let (_, reply) = post_json(app(config, backend), "/api/v2", &lookup("cc")).await;
    assert_eq!(reply["result"]["response_code"], "-6");
    assert!(reply["result"]["message"]
        .as_str()
        .unwrap()
        .starts_with("your result is not json, result(not json)"));
}

#[tokio::test]
async fn test_v2_block_height_out_of_range() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig::default();

    let body = request(1, "icx_getBlockByHeight", json!({"height": "99999999999999999999"}));
    let (status, reply) = post_json(app(config.clone(), backend.clone()), "/api/v2", &body).await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(reply["result"]["response_code"], -202);
    assert!(reply["result"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid block height. error: "));

    let body = request(2, "icx_getBlockByHeight", json!({"height": "two"}));
    let (status, reply) = post_json(app(config, backend.clone()), "/api/v2", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"]["code"], -32602);

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_v2_balance_and_supply_bodies() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig::default();

    let (status, reply) = post_json(
        app(config.clone(), backend.clone()),
        "/api/v2",
        &request(1, "icx_getBalance", json!({"address": EOA})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(reply["result"], json!({"response": BALANCE, "response_code": 0}));

    let (status, reply) = post_json(
        app(config, backend),
        "/api/v2",
        &json!({"jsonrpc": "2.0", "method": "icx_getTotalSupply", "id": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(reply["result"], json!({"response": TOTAL_SUPPLY, "response_code": 0}));
}

#[tokio::test]
async fn test_node_method_in_upper_camel() {
    let backend = Arc::new(SpyBackend::default());
    let request = json!({"jsonrpc": "2.0", "method": "node_GetChannelInfos", "id": 1, "params": {"message": {}}});

    let (status, body) = post_json(app(GatewayConfig::default(), backend), "/api/node", &request).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(
        body["result"]["channel_infos"]["icon_dex"]["score_package"],
        "loopchain_default"
    );
}

#[tokio::test]
async fn test_malformed_bodies() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig::default();

    let (status, body) = post_raw(app(config.clone(), backend.clone()), "/api/v3", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], JsonValue::Null);

    let (status, body) = post_json(app(config.clone(), backend.clone()), "/api/v3", &json!([])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32600);

    let (status, body) = post_json(app(config, backend.clone()), "/api/v3", &json!([1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["error"]["code"], -32600);
    assert_eq!(body[0]["id"], JsonValue::Null);

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unknown_channel() {
    let backend = Arc::new(SpyBackend::default());
    let (status, body) = post_json(
        app(GatewayConfig::default(), backend),
        "/api/v3/no_such_channel",
        &balance_request(1, EOA),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["error"]["message"], "Invalid channel name");
}

#[tokio::test]
async fn test_rate_limit() {
    let backend = Arc::new(SpyBackend::default());
    let config = GatewayConfig {
        rate_limit_per_ip: 1,
        ..Default::default()
    };
    let state = Arc::new(GatewayState::new(config).with_backend(CHANNEL, backend));
    let app = router(state).layer(MockConnectInfo(SocketAddr::from(([10, 1, 1, 1], 5000))));

    let (status, _) = post_json(app.clone(), "/api/v3", &balance_request(1, EOA)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(app, "/api/v3", &balance_request(2, EOA)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], -32000);
}

#[tokio::test]
async fn test_v1_is_retired() {
    let backend = Arc::new(SpyBackend::default());
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1")
        .body(Body::empty())
        .unwrap();
    let response = app(GatewayConfig::default(), backend).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"This api version not support any more!");
}

#[tokio::test]
async fn test_health() {
    let backend = Arc::new(SpyBackend::default());
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app(GatewayConfig::default(), backend).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["channels"], json!([CHANNEL]));
}
