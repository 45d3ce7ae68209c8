//! Schemas for the legacy v2 protocol

use serde_json::json;

use super::{request_schema, SchemaTable};

/// Build the v2 schema table
pub fn table() -> SchemaTable {
    let mut table = SchemaTable::new();

    table.insert(
        "icx_sendTransaction",
        request_schema(
            "icx_sendTransaction",
            json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string", "format": "address_eoa"},
                    "to": {"type": "string", "format": "address_eoa"},
                    "value": {"type": "string", "format": "int_16"},
                    "fee": {"type": "string", "format": "int_16"},
                    "timestamp": {"type": "string", "format": "int_10"},
                    "nonce": {"type": "string", "format": "int_10"},
                    "tx_hash": {"type": "string", "format": "hash_hex_without_0x"},
                    "signature": {"type": "string"}
                },
                "additionalProperties": false,
                "required": ["from", "to", "value", "fee", "timestamp", "tx_hash", "signature"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_getTransactionResult",
        request_schema(
            "icx_getTransactionResult",
            json!({
                "type": "object",
                "properties": {
                    "tx_hash": {"type": "string", "format": "hash_hex_without_0x"}
                },
                "additionalProperties": false,
                "required": ["tx_hash"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_getBalance",
        request_schema(
            "icx_getBalance",
            json!({
                "type": "object",
                "properties": {
                    "address": {"type": "string", "format": "address"}
                },
                "additionalProperties": false,
                "required": ["address"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_getTotalSupply",
        request_schema("icx_getTotalSupply", json!({"type": "object"}), false),
    );
    table.insert(
        "icx_getLastBlock",
        request_schema("icx_getLastBlock", json!({"type": "object"}), false),
    );
    table.insert(
        "icx_getBlockByHash",
        request_schema(
            "icx_getBlockByHash",
            json!({
                "type": "object",
                "properties": {
                    "hash": {"type": "string", "format": "hash_hex_without_0x"}
                },
                "additionalProperties": false,
                "required": ["hash"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_getBlockByHeight",
        request_schema(
            "icx_getBlockByHeight",
            json!({
                "type": "object",
                "properties": {
                    "height": {"type": "string", "format": "int_10"},
                    "channel": {"type": "string"}
                },
                "additionalProperties": false,
                "required": ["height"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_getTransactionByAddress",
        request_schema(
            "icx_getTransactionByAddress",
            json!({
                "type": "object",
                "properties": {
                    "address": {"type": "string", "format": "address_eoa"},
                    "index": {"type": "number"}
                },
                "additionalProperties": false,
                "required": ["address", "index"]
            }),
            false,
        ),
    );

    table
}
