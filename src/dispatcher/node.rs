//! Node-to-node handlers

use futures::FutureExt;
use serde_json::{json, Value as JsonValue};

use super::{fetch_block, HandlerInput, MethodEntry, MethodTable, Reply};
use crate::backend::BlockQuery;
use crate::codec::{convert_value, ValueType};
use crate::error::JsonRpcError;

/// Build the node method table
pub fn table() -> MethodTable {
    let mut table = MethodTable::new();

    table.insert(
        "node_getChannelInfos",
        MethodEntry::new(|i| node_get_channel_infos(i).boxed()),
    );
    table.insert(
        "node_getBlockByHeight",
        MethodEntry::new(|i| node_get_block_by_height(i).boxed()),
    );
    table.insert(
        "node_announceConfirmedBlock",
        MethodEntry::new(|i| node_announce_confirmed_block(i).boxed()),
    );

    table
}

async fn node_get_channel_infos(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let backend = input.backend()?;
    let channel_infos = input.call(backend.get_channel_infos()).await?;
    Ok(Reply::Verbatim(json!({"channel_infos": channel_infos})))
}

async fn node_get_block_by_height(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let height = input
        .params
        .get("height")
        .map(|h| convert_value(h, ValueType::Integer))
        .and_then(|h| h.as_i64())
        .ok_or_else(|| JsonRpcError::invalid_params("Invalid params height"))?;

    let fetched = fetch_block(&input, BlockQuery::Height(height), true).await?;
    Ok(Reply::Verbatim(json!({
        "response_code": fetched.response_code,
        "block": fetched.block,
        "confirm_info": fetched.confirm_info,
    })))
}

async fn node_announce_confirmed_block(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let block = input
        .param_str("block")
        .ok_or_else(|| JsonRpcError::invalid_params("Invalid params block"))?;
    let commit_state = input
        .params
        .get("commit_state")
        .and_then(JsonValue::as_str)
        .unwrap_or("{}");

    let backend = input.backend()?;
    let response_code = input
        .call(backend.announce_confirmed_block(block, commit_state))
        .await?;

    Ok(Reply::Verbatim(json!({
        "response_code": response_code,
        "message": response_code.message(),
    })))
}
