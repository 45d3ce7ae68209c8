//! Method dispatch
//!
//! One [`MethodTable`] per [`ApiVersion`] maps a method name to its handler
//! and its request/response templates. [`Dispatcher::dispatch`] runs a single
//! request or a batch through validation, request transcoding, the handler and
//! response transcoding, and always produces a JSON-RPC envelope.

mod debug;
mod node;
mod v2;
mod v3;

use std::{collections::HashMap, future::Future, net::IpAddr, panic::AssertUnwindSafe, sync::Arc};

use axum::http::StatusCode;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error, info};

use crate::backend::{
    check_query_response, decode_embedded, BackendError, BlockQuery, ChannelBackend,
};
use crate::error::JsonRpcError;
use crate::response_code::ResponseCode;
use crate::rpc::{BatchResponse, GatewayState, JsonRpcResponse};
use crate::template::convert_params;
use crate::templates::{RequestParamType, ResponseParamType, Templates};

/// Wire protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    /// Legacy protocol with bare-hex hashes
    V2,
    /// Current protocol
    V3,
    /// Debug endpoint of the current protocol
    V3Debug,
    /// Node-to-node endpoint
    Node,
}

impl ApiVersion {
    /// Name used in logs
    pub fn name(self) -> &'static str {
        match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
            ApiVersion::V3Debug => "v3d",
            ApiVersion::Node => "node",
        }
    }
}

/// Per-request facts handlers may need
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Channel the request is served on
    pub channel: String,
    /// Full request URL
    pub url: String,
    /// Request path, used to address relayed requests
    pub path: String,
    /// Caller address
    pub caller_ip: Option<IpAddr>,
    /// Id of the request being handled
    pub id: JsonValue,
}

impl RequestContext {
    /// Context for `channel` reached at `path`
    pub fn new(channel: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            channel: channel.into(),
            url: path.clone(),
            path,
            caller_ip: None,
            id: JsonValue::Null,
        }
    }

    /// Set the full URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the caller address
    pub fn with_caller_ip(mut self, ip: IpAddr) -> Self {
        self.caller_ip = Some(ip);
        self
    }
}

/// Handler result
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Backend shaped value, converted with the method's response template
    Local(JsonValue),
    /// Value already in wire form, returned untouched
    Verbatim(JsonValue),
}

/// Everything a handler is called with
pub struct HandlerInput {
    /// Shared gateway state
    pub state: Arc<GatewayState>,
    /// Request context
    pub ctx: RequestContext,
    /// Params after request transcoding
    pub params: JsonValue,
    /// Params as the client sent them
    pub raw_params: JsonValue,
}

impl HandlerInput {
    /// Backend serving the request's channel
    pub fn backend(&self) -> Result<Arc<dyn ChannelBackend>, JsonRpcError> {
        Ok(self.state.backends.get(&self.ctx.channel)?)
    }

    /// Run a backend call under the configured timeout
    pub async fn call<T, F>(&self, call: F) -> Result<T, JsonRpcError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        Ok(self.state.backends.call(call).await?)
    }

    /// Shared conversion templates
    pub fn templates(&self) -> &Templates {
        &self.state.templates
    }

    /// String param after transcoding
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(JsonValue::as_str)
    }
}

/// Boxed handler future
pub type HandlerFuture = BoxFuture<'static, Result<Reply, JsonRpcError>>;

/// Method handler
pub type Handler = fn(HandlerInput) -> HandlerFuture;

/// Handler and templates registered for one method
#[derive(Clone, Copy)]
pub struct MethodEntry {
    /// Handler
    pub handler: Handler,
    /// Template applied to params before the handler runs
    pub request_template: Option<RequestParamType>,
    /// Template applied to [`Reply::Local`] results
    pub response_template: Option<ResponseParamType>,
}

impl MethodEntry {
    /// Entry without templates
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            request_template: None,
            response_template: None,
        }
    }

    /// Set the request template
    pub fn request(mut self, template: RequestParamType) -> Self {
        self.request_template = Some(template);
        self
    }

    /// Set the response template
    pub fn response(mut self, template: ResponseParamType) -> Self {
        self.response_template = Some(template);
        self
    }
}

/// Method name to entry
#[derive(Clone, Default)]
pub struct MethodTable {
    entries: HashMap<&'static str, MethodEntry>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under `method`
    pub fn insert(&mut self, method: &'static str, entry: MethodEntry) {
        self.entries.insert(method, entry);
    }

    /// Entry for `method`
    pub fn get(&self, method: &str) -> Option<&MethodEntry> {
        self.entries.get(method)
    }

    /// Registered method names
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

/// Dispatch result ready for the transport
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// HTTP status
    pub status: StatusCode,
    /// Response envelope
    pub response: BatchResponse,
}

/// Per-version method tables
#[derive(Clone)]
pub struct Dispatcher {
    v2: MethodTable,
    v3: MethodTable,
    v3_debug: MethodTable,
    node: MethodTable,
}

impl Dispatcher {
    /// Build every table
    pub fn new() -> Self {
        Self {
            v2: v2::table(),
            v3: v3::table(),
            v3_debug: debug::table(),
            node: node::table(),
        }
    }

    /// Table for `version`
    pub fn table(&self, version: ApiVersion) -> &MethodTable {
        match version {
            ApiVersion::V2 => &self.v2,
            ApiVersion::V3 => &self.v3,
            ApiVersion::V3Debug => &self.v3_debug,
            ApiVersion::Node => &self.node,
        }
    }

    /// Dispatch a parsed request body, single or batch.
    ///
    /// Batch elements run concurrently; the response array is aligned with
    /// the request array.
    pub async fn dispatch(
        &self,
        state: &Arc<GatewayState>,
        version: ApiVersion,
        body: JsonValue,
        ctx: RequestContext,
    ) -> DispatchOutcome {
        info!(
            "{} requested {} on {} ({})",
            ctx.caller_ip.map(|ip| ip.to_string()).unwrap_or_default(),
            body,
            ctx.url,
            version.name()
        );

        let outcome = match body {
            JsonValue::Array(batch) => {
                if batch.is_empty() || batch.len() > state.config.max_batch_size {
                    let error = JsonRpcError::invalid_request(format!(
                        "Invalid batch size {} (max {})",
                        batch.len(),
                        state.config.max_batch_size
                    ));
                    DispatchOutcome {
                        status: error.http_status,
                        response: BatchResponse::Single(JsonRpcResponse::failure(
                            JsonValue::Null,
                            error,
                        )),
                    }
                } else {
                    let responses = join_all(
                        batch
                            .into_iter()
                            .map(|request| self.dispatch_one(state, version, request, ctx.clone())),
                    )
                    .await;
                    DispatchOutcome {
                        status: StatusCode::OK,
                        response: BatchResponse::Batch(responses),
                    }
                }
            }
            single => {
                let response = self.dispatch_one(state, version, single, ctx).await;
                let status = response
                    .error
                    .as_ref()
                    .map(|e| e.http_status)
                    .unwrap_or(StatusCode::OK);
                DispatchOutcome {
                    status,
                    response: BatchResponse::Single(response),
                }
            }
        };

        debug!("{} response {:?}", version.name(), outcome.response);
        outcome
    }

    async fn dispatch_one(
        &self,
        state: &Arc<GatewayState>,
        version: ApiVersion,
        mut request: JsonValue,
        mut ctx: RequestContext,
    ) -> JsonRpcResponse {
        if !request.is_object() {
            return JsonRpcResponse::failure(
                JsonValue::Null,
                JsonRpcError::invalid_request("Invalid request"),
            );
        }

        if version == ApiVersion::Node {
            normalise_node_request(&mut request);
        }

        let id = request.get("id").cloned().unwrap_or_else(|| json!(0));
        ctx.id = id.clone();

        if let Err(error) = state.schemas.validate(version, &request) {
            debug!("Request rejected by validation: {}", error);
            return JsonRpcResponse::failure(id, error);
        }

        let method = request
            .get("method")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(entry) = self.table(version).get(&method).copied() else {
            return JsonRpcResponse::failure(id, JsonRpcError::method_not_found("Method not found"));
        };

        let raw_params = request.get("params").cloned().unwrap_or_else(|| json!({}));
        let params = convert_params(
            &raw_params,
            entry
                .request_template
                .and_then(|t| state.templates.request(t)),
        );

        let input = HandlerInput {
            state: Arc::clone(state),
            ctx,
            params,
            raw_params,
        };

        let result = AssertUnwindSafe((entry.handler)(input))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("Handler for {} panicked", method);
                Err(JsonRpcError::internal_error(format!(
                    "Internal error while handling {}",
                    method
                )))
            });

        match result {
            Ok(Reply::Local(value)) => {
                let template = entry
                    .response_template
                    .and_then(|t| state.templates.response(t));
                JsonRpcResponse::success(id, convert_params(&value, template))
            }
            Ok(Reply::Verbatim(value)) => JsonRpcResponse::success(id, value),
            Err(error) => {
                if error.http_status.is_server_error() {
                    error!("{} failed: {}", method, error);
                } else {
                    debug!("{} failed: {}", method, error);
                }
                JsonRpcResponse::failure(id, error)
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Node requests may spell the method `node_GetChannelInfos` and wrap their
/// params in `{"message": {...}}`.
fn normalise_node_request(request: &mut JsonValue) {
    if let Some(method) = request.get("method").and_then(JsonValue::as_str) {
        let normalised = upper_camel_to_lower_camel(method);
        request["method"] = JsonValue::String(normalised);
    }

    let message = request
        .get("params")
        .and_then(|p| p.get("message"))
        .cloned();
    if let Some(message) = message {
        request["params"] = message;
    }
}

fn upper_camel_to_lower_camel(method: &str) -> String {
    match method.split_once('_') {
        Some((prefix, name)) => {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => format!("{}_{}{}", prefix, first.to_ascii_lowercase(), chars.as_str()),
                None => method.to_string(),
            }
        }
        None => method.to_string(),
    }
}

/// `{method, params}` request understood by backend queries
pub(crate) fn make_request(method: &str, params: &JsonValue) -> JsonValue {
    json!({"method": method, "params": params})
}

/// Run a state query and raise its error payload
pub(crate) async fn query_backend(
    input: &HandlerInput,
    method: &str,
    params: &JsonValue,
) -> Result<JsonValue, JsonRpcError> {
    let backend = input.backend()?;
    let request = make_request(method, params);
    let response = input.call(backend.query(&request)).await?;
    check_query_response(response)
}

/// Raise a non-success response code as invalid params
pub(crate) fn check_response_code(response_code: ResponseCode) -> Result<(), JsonRpcError> {
    if response_code.is_success() {
        Ok(())
    } else {
        Err(JsonRpcError::from_response_code(
            crate::error::codes::INVALID_PARAMS,
            response_code,
        ))
    }
}

/// Block lookup shared by every protocol version
pub(crate) struct FetchedBlock {
    pub response_code: ResponseCode,
    pub confirm_info: String,
    pub block: JsonValue,
}

/// Look up a block. The body is an empty object unless the lookup
/// succeeded; `commit_state` is dropped unless asked for.
pub(crate) async fn fetch_block(
    input: &HandlerInput,
    query: BlockQuery,
    with_commit_state: bool,
) -> Result<FetchedBlock, JsonRpcError> {
    let backend = input.backend()?;
    let result = input.call(backend.get_block(query)).await?;
    debug!(
        "get_block answered {} for {}",
        result.response_code,
        result.block_hash.as_deref().unwrap_or("-")
    );

    let mut block = if result.response_code.is_success() {
        decode_embedded(result.block).unwrap_or_else(|e| {
            error!("Block from backend is not JSON: {}", e);
            json!({})
        })
    } else {
        json!({})
    };

    if !with_commit_state {
        if let Some(map) = block.as_object_mut() {
            map.remove("commit_state");
        }
    }

    Ok(FetchedBlock {
        response_code: result.response_code,
        confirm_info: result.confirm_info,
        block,
    })
}
