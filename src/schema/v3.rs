//! Schemas for the v3 protocol

use serde_json::{json, Value as JsonValue};

use super::{request_schema, SchemaTable};

fn transaction_properties() -> JsonValue {
    json!({
        "version": {"type": "string", "format": "int_16"},
        "from": {"type": "string", "format": "address_eoa"},
        "to": {"type": "string", "format": "address"},
        "value": {"type": "string", "format": "int_16"},
        "message": {"type": "string"},
        "stepLimit": {"type": "string", "format": "int_16"},
        "timestamp": {"type": "string", "format": "int_16"},
        "nid": {"type": "string", "format": "int_16"},
        "nonce": {"type": "string", "format": "int_16"},
        "signature": {"type": "string"},
        "dataType": {"type": "string", "enum": ["call", "deploy", "message", "deposit"]},
        "data": {
            "oneOf": [
                {
                    "type": "object",
                    "properties": {
                        "method": {"type": "string"},
                        "params": {"type": "object"}
                    },
                    "additionalProperties": false,
                    "required": ["method"]
                },
                {
                    "type": "object",
                    "properties": {
                        "contentType": {"type": "string", "enum": ["application/zip", "application/tbears"]},
                        "content": {"type": "string"},
                        "params": {"type": "object"}
                    },
                    "additionalProperties": false,
                    "required": ["contentType", "content"]
                },
                {"type": "string"},
                {
                    "type": "object",
                    "properties": {
                        "action": {"type": "string", "enum": ["add", "withdraw"]},
                        "id": {"type": "string"}
                    },
                    "additionalProperties": false,
                    "required": ["action"]
                }
            ]
        }
    })
}

fn tx_hash_params() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "txHash": {"type": "string", "format": "hash_hex_0x"}
        },
        "additionalProperties": false,
        "required": ["txHash"]
    })
}

fn proof_params() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "txHash": {"type": "string", "format": "hash_hex_0x"},
            "proof": {
                "type": "array",
                "items": {
                    "type": "object",
                    "oneOf": [
                        {
                            "type": "object",
                            "properties": {"left": {"type": "string", "format": "hash_hex_0x"}},
                            "additionalProperties": false,
                            "required": ["left"]
                        },
                        {
                            "type": "object",
                            "properties": {"right": {"type": "string", "format": "hash_hex_0x"}},
                            "additionalProperties": false,
                            "required": ["right"]
                        }
                    ]
                }
            }
        },
        "additionalProperties": false,
        "required": ["txHash", "proof"]
    })
}

fn address_params(format: &str) -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "address": {"type": "string", "format": format}
        },
        "additionalProperties": false,
        "required": ["address"]
    })
}

/// Build the v3 schema table
pub fn table() -> SchemaTable {
    let mut table = SchemaTable::new();

    table.insert(
        "icx_getBlock",
        request_schema(
            "icx_getBlock",
            json!({
                "type": "object",
                "properties": {
                    "hash": {"type": "string", "format": "hash_hex_0x"},
                    "height": {"type": "string", "format": "int_16"}
                },
                "additionalProperties": false
            }),
            false,
        ),
    );
    table.insert(
        "icx_getLastBlock",
        request_schema("icx_getLastBlock", json!({"type": "object"}), false),
    );
    table.insert(
        "icx_getBlockByHeight",
        request_schema(
            "icx_getBlockByHeight",
            json!({
                "type": "object",
                "properties": {
                    "height": {"type": "string", "format": "int_16"}
                },
                "additionalProperties": false,
                "required": ["height"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_getBlockByHash",
        request_schema(
            "icx_getBlockByHash",
            json!({
                "type": "object",
                "properties": {
                    "hash": {"type": "string", "format": "hash_hex_0x"}
                },
                "additionalProperties": false,
                "required": ["hash"]
            }),
            true,
        ),
    );
    table.insert(
        "icx_call",
        json!({
            "title": "icx_call",
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "enum": ["2.0"]},
                "method": {"type": "string", "enum": ["icx_call"]},
                "id": {"type": ["number", "string"]},
                "params": {
                    "type": "object",
                    "properties": {
                        "from": {"type": "string", "format": "address_eoa"},
                        "to": {"type": "string", "format": "address_score"},
                        "dataType": {"type": "string", "enum": ["call"]},
                        "data": {
                            "type": "object",
                            "properties": {
                                "method": {"type": "string"},
                                "params": {"type": "object"}
                            },
                            "additionalProperties": false,
                            "required": ["method"]
                        }
                    },
                    "additionalProperties": false,
                    "required": ["to", "dataType", "data"]
                }
            },
            "additionalProperties": false,
            "required": ["jsonrpc", "method", "id", "params"]
        }),
    );
    table.insert(
        "icx_getBalance",
        request_schema("icx_getBalance", address_params("address"), true),
    );
    table.insert(
        "icx_getScoreApi",
        request_schema("icx_getScoreApi", address_params("address_score"), true),
    );
    table.insert(
        "icx_getTotalSupply",
        request_schema("icx_getTotalSupply", json!({"type": "object"}), false),
    );
    for method in [
        "icx_getTransactionResult",
        "icx_getTransactionByHash",
        "icx_getTransactionProof",
        "icx_getReceiptProof",
    ] {
        table.insert(method, request_schema(method, tx_hash_params(), true));
    }
    for method in ["icx_proveTransaction", "icx_proveReceipt"] {
        table.insert(method, request_schema(method, proof_params(), true));
    }
    table.insert(
        "ise_getStatus",
        request_schema(
            "ise_getStatus",
            json!({
                "type": "object",
                "properties": {
                    "filter": {"type": "array", "items": {"type": "string"}}
                },
                "additionalProperties": false
            }),
            true,
        ),
    );
    table.insert(
        "icx_sendTransaction",
        request_schema(
            "icx_sendTransaction",
            json!({
                "type": "object",
                "properties": transaction_properties(),
                "additionalProperties": false,
                "required": ["version", "from", "to", "stepLimit", "timestamp", "nid", "signature"]
            }),
            true,
        ),
    );
    table.insert(
        "rep_getListByHash",
        json!({
            "title": "rep_getListByHash",
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "enum": ["2.0"]},
                "method": {"type": "string"},
                "params": {
                    "type": "object",
                    "properties": {
                        "repsHash": {"type": "string", "format": "hash_hex_0x"}
                    },
                    "additionalProperties": false,
                    "required": ["repsHash"]
                },
                "id": {"type": "number"}
            }
        }),
    );

    table
}
