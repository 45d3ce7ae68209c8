//! v2 method handlers
//!
//! v2 replies keep the legacy `{response_code, ...}` bodies, so most
//! failures are reported inside a successful envelope.

use futures::FutureExt;
use serde_json::{json, Value as JsonValue};
use tracing::warn;

use super::{fetch_block, make_request, query_backend, HandlerInput, MethodEntry, MethodTable, Reply};
use crate::backend::{check_query_response, BlockQuery};
use crate::error::JsonRpcError;
use crate::relay::{RelayDecision, RelayError};
use crate::response_code::ResponseCode;
use crate::template::{convert_params, is_falsy};
use crate::templates::{RequestParamType, ResponseParamType};

/// Build the v2 method table
pub fn table() -> MethodTable {
    let mut table = MethodTable::new();

    table.insert(
        "icx_sendTransaction",
        MethodEntry::new(|i| icx_send_transaction(i).boxed()).request(RequestParamType::SendTx),
    );
    table.insert(
        "icx_getTransactionResult",
        MethodEntry::new(|i| icx_get_transaction_result(i).boxed()),
    );
    table.insert(
        "icx_getBalance",
        MethodEntry::new(|i| icx_get_balance(i).boxed()).request(RequestParamType::GetBalance),
    );
    table.insert(
        "icx_getTotalSupply",
        MethodEntry::new(|i| icx_get_total_supply(i).boxed())
            .request(RequestParamType::GetTotalSupply),
    );
    table.insert(
        "icx_getLastBlock",
        MethodEntry::new(|i| icx_get_last_block(i).boxed()),
    );
    table.insert(
        "icx_getBlockByHash",
        MethodEntry::new(|i| icx_get_block_by_hash(i).boxed()),
    );
    table.insert(
        "icx_getBlockByHeight",
        MethodEntry::new(|i| icx_get_block_by_height(i).boxed()),
    );
    table.insert(
        "icx_getTransactionByAddress",
        MethodEntry::new(|i| icx_get_transaction_by_address(i).boxed()),
    );

    table
}

fn legacy_failure(response_code: ResponseCode, message: impl Into<String>) -> Reply {
    Reply::Verbatim(json!({
        "response_code": response_code,
        "message": message.into(),
    }))
}

async fn icx_send_transaction(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let backend = input.backend()?;

    let request = make_request("icx_sendTransaction", &input.params);
    let response = input.call(backend.validate_transaction(&request)).await?;
    check_query_response(response)?;

    let relay = &input.state.relay;
    let reported_target = match relay.initial_decision() {
        RelayDecision::Relay => None,
        RelayDecision::Local => {
            let created = input.call(backend.create_icx_tx(&input.raw_params)).await?;
            if relay.decide(created.response_code) == RelayDecision::Local {
                let mut body = json!({"response_code": created.response_code});
                if created.response_code.is_success() {
                    body["tx_hash"] = json!(created.tx_hash);
                } else {
                    body["message"] = json!(created.response_code.message());
                }
                return Ok(Reply::Verbatim(body));
            }
            created.relay_target
        }
    };

    let target = match relay.resolve_target(reported_target.as_deref()) {
        Ok(target) => target,
        Err(RelayError::InvalidTarget) => {
            let code = ResponseCode::FAIL_INVALID_PEER_TARGET;
            return Ok(Reply::Verbatim(json!({
                "response_code": code,
                "message": code.message(),
                "tx_hash": null,
            })));
        }
        Err(e) => return Err(e.into()),
    };

    let result = relay
        .relay(&target, &input.ctx.path, &input.ctx.id, &input.raw_params)
        .await?;
    Ok(Reply::Verbatim(result))
}

/// 64 lowercase hex digits, optionally `0x` prefixed
fn is_tx_hash(value: &str) -> bool {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    digits.len() == 64 && digits.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

async fn icx_get_transaction_result(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = input.param_str("tx_hash").unwrap_or_default();

    let (code, message) = if is_tx_hash(tx_hash) {
        let backend = input.backend()?;
        let invoke = input.call(backend.get_invoke_result(tx_hash)).await?;

        if !invoke.response_code.is_success() {
            (ResponseCode::FAIL_VALIDATE_PARAMS, Some("Invalid transaction hash.".to_string()))
        } else {
            match invoke.result.as_deref().filter(|r| !r.is_empty()) {
                None => (ResponseCode::FAIL_VALIDATE_PARAMS, Some("tx_result is empty".to_string())),
                Some(text) => match serde_json::from_str::<JsonValue>(text) {
                    Ok(result) if result.get("failure").is_some_and(|f| !is_falsy(f)) => (
                        ResponseCode::FAIL_VALIDATE_PARAMS,
                        Some("Invalid transaction hash.".to_string()),
                    ),
                    Ok(_) => (ResponseCode::SUCCESS, None),
                    Err(e) => {
                        let message = format!("your result is not json, result({}), {}", text, e);
                        warn!("{}", message);
                        (ResponseCode::FAIL_VALIDATE_PARAMS, Some(message))
                    }
                },
            }
        }
    } else {
        (ResponseCode::FAIL_VALIDATE_PARAMS, Some("response_code is fail".to_string()))
    };

    let mut body = json!({"response_code": code.value().to_string()});
    if code.is_success() {
        body["response"] = json!({"code": code});
    }
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    Ok(Reply::Verbatim(body))
}

async fn icx_get_balance(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "icx_getBalance", &input.params).await?;
    Ok(Reply::Verbatim(json!({"response": response, "response_code": 0})))
}

async fn icx_get_total_supply(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "icx_getTotalSupply", &input.params).await?;
    Ok(Reply::Verbatim(json!({"response": response, "response_code": 0})))
}

async fn block_reply(input: &HandlerInput, query: BlockQuery) -> Result<Reply, JsonRpcError> {
    let fetched = fetch_block(input, query, false).await?;
    let block = convert_params(
        &fetched.block,
        input
            .templates()
            .response(ResponseParamType::GetBlockV0_1aTxV2),
    );
    Ok(Reply::Verbatim(json!({
        "response_code": fetched.response_code,
        "block": block,
    })))
}

async fn icx_get_last_block(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    block_reply(&input, BlockQuery::Latest).await
}

async fn icx_get_block_by_hash(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let hash = input.param_str("hash").unwrap_or_default().to_string();
    block_reply(&input, BlockQuery::Hash(hash)).await
}

async fn icx_get_block_by_height(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let height = match input.params.get("height") {
        Some(JsonValue::String(text)) => text.trim().parse::<i64>().map_err(|e| e.to_string()),
        Some(JsonValue::Number(n)) => n.as_i64().ok_or_else(|| format!("{} is not an integer", n)),
        other => Err(format!("{:?} is not an integer", other)),
    };

    match height {
        Ok(height) => block_reply(&input, BlockQuery::Height(height)).await,
        Err(e) => Ok(legacy_failure(
            ResponseCode::FAIL_WRONG_BLOCK_HEIGHT,
            format!("Invalid block height. error: {}", e),
        )),
    }
}

async fn icx_get_transaction_by_address(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let address = input.param_str("address");
    let index = input.params.get("index").and_then(JsonValue::as_i64);

    let (Some(address), Some(index)) = (address, index) else {
        let code = ResponseCode::FAIL_ILLEGAL_PARAMS;
        return Ok(legacy_failure(code, code.message()));
    };

    let backend = input.backend()?;
    let mut page = input.call(backend.get_tx_by_address(address, index)).await?;
    // the backend terminates the list with a sentinel entry
    page.tx_list.pop();

    Ok(Reply::Verbatim(json!({
        "next_index": page.next_index,
        "response": page.tx_list,
        "response_code": ResponseCode::SUCCESS,
    })))
}
