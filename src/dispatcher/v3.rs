//! v3 method handlers

use futures::FutureExt;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use super::{
    check_response_code, fetch_block, make_request, query_backend, HandlerInput, MethodEntry,
    MethodTable, Reply,
};
use crate::backend::{check_query_response, BlockQuery};
use crate::error::{codes, JsonRpcError};
use crate::relay::RelayDecision;
use crate::response_code::ResponseCode;
use crate::templates::{RequestParamType, ResponseParamType};

const SEND_TRANSACTION: &str = "icx_sendTransaction";

/// Keys whose string values `ise_getStatus` reports as `0x` hashes
const STATUS_HASH_KEYS: [&str; 4] = ["hash", "blockHash", "txHash", "prevBlockHash"];

/// Build the v3 method table
pub fn table() -> MethodTable {
    let mut table = MethodTable::new();

    table.insert(
        "icx_getBlock",
        MethodEntry::new(|i| icx_get_block(i).boxed()).request(RequestParamType::GetBlock),
    );
    table.insert(
        "icx_getLastBlock",
        MethodEntry::new(|i| icx_get_last_block(i).boxed()),
    );
    table.insert(
        "icx_getBlockByHeight",
        MethodEntry::new(|i| icx_get_block_by_height(i).boxed())
            .request(RequestParamType::GetBlockByHeight),
    );
    table.insert(
        "icx_getBlockByHash",
        MethodEntry::new(|i| icx_get_block_by_hash(i).boxed())
            .request(RequestParamType::GetBlockByHash),
    );
    table.insert(
        "icx_call",
        MethodEntry::new(|i| icx_call(i).boxed()).request(RequestParamType::Call),
    );
    table.insert(
        "icx_getBalance",
        MethodEntry::new(|i| icx_get_balance(i).boxed()).request(RequestParamType::GetBalance),
    );
    table.insert(
        "icx_getScoreApi",
        MethodEntry::new(|i| icx_get_score_api(i).boxed()).request(RequestParamType::GetScoreApi),
    );
    table.insert(
        "icx_getTotalSupply",
        MethodEntry::new(|i| icx_get_total_supply(i).boxed())
            .request(RequestParamType::GetTotalSupply),
    );
    table.insert(
        "icx_getTransactionResult",
        MethodEntry::new(|i| icx_get_transaction_result(i).boxed())
            .request(RequestParamType::GetTxResult)
            .response(ResponseParamType::GetTxResult),
    );
    table.insert(
        "icx_getTransactionByHash",
        MethodEntry::new(|i| icx_get_transaction_by_hash(i).boxed())
            .request(RequestParamType::GetTxResult)
            .response(ResponseParamType::GetTxByHash),
    );
    table.insert(
        "icx_getTransactionProof",
        MethodEntry::new(|i| icx_get_transaction_proof(i).boxed()),
    );
    table.insert(
        "icx_getReceiptProof",
        MethodEntry::new(|i| icx_get_receipt_proof(i).boxed()),
    );
    table.insert(
        "icx_proveTransaction",
        MethodEntry::new(|i| icx_prove_transaction(i).boxed()),
    );
    table.insert(
        "icx_proveReceipt",
        MethodEntry::new(|i| icx_prove_receipt(i).boxed()),
    );
    table.insert(
        SEND_TRANSACTION,
        MethodEntry::new(|i| icx_send_transaction(i).boxed()).response(ResponseParamType::SendTx),
    );
    table.insert(
        "ise_getStatus",
        MethodEntry::new(|i| ise_get_status(i).boxed()),
    );
    table.insert(
        "rep_getListByHash",
        MethodEntry::new(|i| rep_get_list_by_hash(i).boxed())
            .request(RequestParamType::GetRepsByHash),
    );

    table
}

fn invalid_tx_hash() -> JsonRpcError {
    JsonRpcError::invalid_params("Invalid params txHash")
}

fn required_str<'a>(params: &'a JsonValue, key: &str) -> Result<&'a str, JsonRpcError> {
    params
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Invalid params {}", key)))
}

async fn block_reply(input: &HandlerInput, query: BlockQuery) -> Result<Reply, JsonRpcError> {
    let fetched = fetch_block(input, query, false).await?;
    check_response_code(fetched.response_code)?;
    Ok(Reply::Verbatim(input.templates().convert_block_v3(&fetched.block)))
}

fn height_param(input: &HandlerInput) -> Result<i64, JsonRpcError> {
    input
        .params
        .get("height")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| JsonRpcError::invalid_params("Invalid params height"))
}

async fn icx_get_block(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let has_hash = input.params.get("hash").is_some();
    let has_height = input.params.get("height").is_some();

    let query = match (has_hash, has_height) {
        (true, true) => {
            return Err(JsonRpcError::invalid_params(
                "Invalid params (only one parameter is allowed)",
            ))
        }
        (true, false) => BlockQuery::Hash(required_str(&input.params, "hash")?.to_string()),
        (false, true) => BlockQuery::Height(height_param(&input)?),
        (false, false) => BlockQuery::Latest,
    };

    block_reply(&input, query).await
}

async fn icx_get_last_block(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    block_reply(&input, BlockQuery::Latest).await
}

async fn icx_get_block_by_height(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let height = height_param(&input)?;
    block_reply(&input, BlockQuery::Height(height)).await
}

async fn icx_get_block_by_hash(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let hash = required_str(&input.params, "hash")?.to_string();
    block_reply(&input, BlockQuery::Hash(hash)).await
}

async fn icx_call(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "icx_call", &input.params).await?;
    Ok(Reply::Verbatim(response))
}

async fn icx_get_balance(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "icx_getBalance", &input.params).await?;
    Ok(Reply::Verbatim(response))
}

async fn icx_get_score_api(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "icx_getScoreApi", &input.params).await?;
    Ok(Reply::Verbatim(response))
}

async fn icx_get_total_supply(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "icx_getTotalSupply", &input.params).await?;
    Ok(Reply::Verbatim(response))
}

async fn icx_get_transaction_result(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = required_str(&input.params, "txHash")?;
    let backend = input.backend()?;
    let invoke = input.call(backend.get_invoke_result(tx_hash)).await?;

    match invoke.response_code {
        ResponseCode::FAIL_TX_NOT_INVOKED => {
            return Err(JsonRpcError::from_response_code(
                codes::INVALID_PARAMS,
                invoke.response_code,
            ))
        }
        ResponseCode::FAIL_INVALID_KEY_ERROR | ResponseCode::FAIL => return Err(invalid_tx_hash()),
        _ => {}
    }

    let result = match invoke.result.as_deref().filter(|r| !r.is_empty()) {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            warn!("Transaction result is not JSON, result({}), {}", text, e);
            json!({})
        }),
        None => json!({}),
    };

    Ok(Reply::Local(result))
}

async fn icx_get_transaction_by_hash(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = required_str(&input.params, "txHash")?;
    let backend = input.backend()?;
    let info = input.call(backend.get_tx_info(tx_hash)).await?;

    if info.response_code == ResponseCode::FAIL_INVALID_KEY_ERROR {
        return Err(invalid_tx_hash());
    }
    check_response_code(info.response_code)?;

    let tx_info = info.tx_info;
    let mut result = match tx_info.get("transaction") {
        Some(JsonValue::Object(transaction)) => transaction.clone(),
        _ => {
            return Err(JsonRpcError::internal_error(
                "Transaction info carries no transaction",
            ))
        }
    };

    result.insert("txHash".to_string(), json!(tx_hash));
    for (from, to) in [
        ("tx_index", "txIndex"),
        ("block_height", "blockHeight"),
        ("block_hash", "blockHash"),
    ] {
        result.insert(
            to.to_string(),
            tx_info.get(from).cloned().unwrap_or(JsonValue::Null),
        );
    }

    Ok(Reply::Local(JsonValue::Object(result)))
}

async fn icx_get_transaction_proof(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = required_str(&input.raw_params, "txHash")?;
    let backend = input.backend()?;
    let response = input.call(backend.get_tx_proof(tx_hash)).await?;
    Ok(Reply::Verbatim(check_query_response(response)?))
}

async fn icx_get_receipt_proof(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = required_str(&input.raw_params, "txHash")?;
    let backend = input.backend()?;
    let response = input.call(backend.get_receipt_proof(tx_hash)).await?;
    Ok(Reply::Verbatim(check_query_response(response)?))
}

async fn icx_prove_transaction(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = required_str(&input.raw_params, "txHash")?;
    let proof = input.raw_params.get("proof").cloned().unwrap_or(JsonValue::Null);
    let backend = input.backend()?;
    let response = input.call(backend.prove_tx(tx_hash, &proof)).await?;
    Ok(Reply::Verbatim(check_query_response(response)?))
}

async fn icx_prove_receipt(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let tx_hash = required_str(&input.raw_params, "txHash")?;
    let proof = input.raw_params.get("proof").cloned().unwrap_or(JsonValue::Null);
    let backend = input.backend()?;
    let response = input.call(backend.prove_receipt(tx_hash, &proof)).await?;
    Ok(Reply::Verbatim(check_query_response(response)?))
}

async fn icx_send_transaction(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let backend = input.backend()?;

    let request = make_request(SEND_TRANSACTION, &input.raw_params);
    let response = input.call(backend.validate_transaction(&request)).await?;
    check_query_response(response)?;

    if input.state.config.dos_guard_enable {
        let response = input.call(backend.dos_guard(&input.raw_params)).await?;
        check_query_response(response)?;
    }

    let relay = &input.state.relay;
    let reported_target = match relay.initial_decision() {
        RelayDecision::Relay => None,
        RelayDecision::Local => {
            let created = input.call(backend.create_icx_tx(&input.raw_params)).await?;
            if relay.decide(created.response_code) == RelayDecision::Local {
                if !created.response_code.is_success() {
                    return Err(JsonRpcError::from_response_code(
                        codes::INVALID_REQUEST,
                        created.response_code,
                    ));
                }
                let tx_hash = created
                    .tx_hash
                    .ok_or_else(|| JsonRpcError::invalid_request("txHash is None"))?;
                return Ok(Reply::Local(JsonValue::String(tx_hash)));
            }
            created.relay_target
        }
    };

    let target = relay.resolve_target(reported_target.as_deref())?;
    let result = relay
        .relay(&target, &input.ctx.path, &input.ctx.id, &input.raw_params)
        .await?;
    Ok(Reply::Verbatim(result))
}

async fn ise_get_status(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let mut response = query_backend(&input, "ise_getStatus", &input.params).await?;
    prefix_status_hashes(&mut response);
    Ok(Reply::Verbatim(response))
}

/// Prefix `0x` onto bare hashes under [`STATUS_HASH_KEYS`], descending into
/// nested objects.
fn prefix_status_hashes(value: &mut JsonValue) {
    let Some(map) = value.as_object_mut() else {
        return;
    };

    for (key, entry) in map.iter_mut() {
        match entry {
            JsonValue::Object(_) => prefix_status_hashes(entry),
            JsonValue::String(text)
                if STATUS_HASH_KEYS.contains(&key.as_str()) && !text.starts_with("0x") =>
            {
                *text = format!("0x{}", text);
            }
            _ => {}
        }
    }
}

async fn rep_get_list_by_hash(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let reps_hash = required_str(&input.params, "repsHash")?;
    let backend = input.backend()?;
    let reps = input.call(backend.get_reps_by_hash(reps_hash)).await?;
    let reps = check_query_response(reps)?;
    debug!("Reps under {}: {}", reps_hash, reps);

    Ok(Reply::Verbatim(json!({
        "repHash": reps_hash,
        "rep": reps,
    })))
}
