//! Schemas for node-to-node methods and the debug endpoint

use serde_json::json;

use super::{request_schema, SchemaTable};

/// Build the node schema table
pub fn table() -> SchemaTable {
    let mut table = SchemaTable::new();

    table.insert(
        "node_getChannelInfos",
        request_schema("node_getChannelInfos", json!({"type": "object"}), false),
    );
    table.insert(
        "node_getBlockByHeight",
        request_schema(
            "node_getBlockByHeight",
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
        "node_announceConfirmedBlock",
        request_schema(
            "node_announceConfirmedBlock",
            json!({
                "type": "object",
                "properties": {
                    "block": {"type": "string"},
                    "commit_state": {"type": "string"},
                    "channel": {"type": "string"}
                },
                "additionalProperties": false,
                "required": ["block"]
            }),
            true,
        ),
    );

    table
}

/// Build the debug schema table
pub fn debug_table() -> SchemaTable {
    let mut table = SchemaTable::new();

    table.insert(
        "debug_estimateStep",
        json!({
            "title": "debug_estimateStep",
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "enum": ["2.0"]},
                "method": {"type": "string"},
                "id": {"type": "number"},
                "params": {
                    "type": "object",
                    "properties": {
                        "version": {"type": "string", "format": "int_16"},
                        "from": {"type": "string", "format": "address_eoa"},
                        "to": {"type": "string", "format": "address"},
                        "value": {"type": "string", "format": "int_16"},
                        "message": {"type": "string"},
                        "timestamp": {"type": "string", "format": "int_16"},
                        "nid": {"type": "string", "format": "int_16"},
                        "nonce": {"type": "string", "format": "int_16"},
                        "dataType": {"type": "string", "enum": ["call", "deploy", "message"]},
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
                                {"type": "string"}
                            ]
                        }
                    },
                    "additionalProperties": false,
                    "required": ["version", "from", "to", "timestamp"]
                }
            },
            "additionalProperties": false,
            "required": ["jsonrpc", "method", "id", "params"]
        }),
    );

    table
}
