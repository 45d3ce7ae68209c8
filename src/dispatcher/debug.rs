//! Debug endpoint handlers

use futures::FutureExt;

use super::{query_backend, HandlerInput, MethodEntry, MethodTable, Reply};
use crate::error::JsonRpcError;

/// Build the debug method table
pub fn table() -> MethodTable {
    let mut table = MethodTable::new();
    table.insert(
        "debug_estimateStep",
        MethodEntry::new(|i| debug_estimate_step(i).boxed()),
    );
    table
}

async fn debug_estimate_step(input: HandlerInput) -> Result<Reply, JsonRpcError> {
    let response = query_backend(&input, "debug_estimateStep", &input.raw_params).await?;
    Ok(Reply::Verbatim(response))
}
