//! Request and response templates for the supported methods
//!
//! Built once at startup and shared read-only by every handler.

use std::collections::HashMap;

use serde_json::{json, Value as JsonValue};

use crate::codec::ValueType;
use crate::template::{KeyChange, Template};

/// Request-side conversions (wire form to backend form)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestParamType {
    /// Transaction submission
    SendTx,
    /// Read-only score call
    Call,
    /// Balance lookup
    GetBalance,
    /// Score API lookup
    GetScoreApi,
    /// Total supply lookup
    GetTotalSupply,
    /// Block by hash or height
    GetBlock,
    /// Block by hash
    GetBlockByHash,
    /// Block by height
    GetBlockByHeight,
    /// Transaction result or transaction lookup
    GetTxResult,
    /// Representative list lookup
    GetRepsByHash,
}

/// Response-side conversions (backend form to wire form)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseParamType {
    /// Transaction hash returned by a submission
    SendTx,
    /// Transaction lookup
    GetTxByHash,
    /// Transaction result
    GetTxResult,
    /// Legacy block with legacy transactions
    GetBlockV0_1aTxV2,
    /// Legacy block with current transactions
    GetBlockV0_1aTxV3,
    /// Current block with current transactions
    GetBlockV0_3TxV3,
}

/// All conversion templates, keyed by purpose
#[derive(Debug, Clone)]
pub struct Templates {
    requests: HashMap<RequestParamType, Template>,
    responses: HashMap<ResponseParamType, Template>,
}

fn leaf(value_type: ValueType) -> Template {
    Template::Leaf(value_type)
}

fn rename(to: &str) -> KeyChange {
    KeyChange::Rename(to.to_string())
}

fn block_v0_1a() -> Template {
    Template::object([
        ("version", leaf(ValueType::Text)),
        ("prev_block_hash", leaf(ValueType::HexHashNumber)),
        ("merkle_tree_root_hash", leaf(ValueType::HexHashNumber)),
        ("time_stamp", leaf(ValueType::Integer)),
        ("block_hash", leaf(ValueType::HexHashNumber)),
        ("height", leaf(ValueType::Integer)),
        ("peer_id", leaf(ValueType::Text)),
        ("signature", leaf(ValueType::Text)),
        ("next_leader", leaf(ValueType::Text)),
    ])
    .with_edits([
        ("prevHash", rename("prev_block_hash")),
        ("transactionsHash", rename("merkle_tree_root_hash")),
        ("timestamp", rename("time_stamp")),
        ("transactions", rename("confirmed_transaction_list")),
        ("hash", rename("block_hash")),
        ("leader", rename("peer_id")),
        ("nextLeader", rename("next_leader")),
        ("stateHash", KeyChange::Remove),
        ("receiptsHash", KeyChange::Remove),
        ("repsHash", KeyChange::Remove),
        ("nextRepsHash", KeyChange::Remove),
        ("leaderVotesHash", KeyChange::Remove),
        ("prevVotesHash", KeyChange::Remove),
        ("logsBloom", KeyChange::Remove),
        ("leaderVotes", KeyChange::Remove),
        ("prevVotes", KeyChange::Remove),
    ])
}

fn tx_v2() -> Template {
    Template::list(
        Template::object([
            ("timestamp", leaf(ValueType::IntegerStr)),
            ("tx_hash", leaf(ValueType::HexHashNumber)),
        ])
        .with_edits([
            ("txHash", rename("tx_hash")),
            ("version", KeyChange::Remove),
            ("stepLimit", KeyChange::Remove),
            ("dataType", KeyChange::Remove),
            ("data", KeyChange::Remove),
            ("nid", KeyChange::Remove),
            ("method", KeyChange::Add(json!("icx_sendTransaction"))),
        ]),
    )
}

fn tx_v3() -> Template {
    Template::list(Template::object([(
        "txHash",
        leaf(ValueType::Hex0xHashNumber),
    )]))
}

impl Templates {
    /// Build every template
    pub fn new() -> Self {
        let mut requests = HashMap::new();

        requests.insert(
            RequestParamType::SendTx,
            Template::object([
                ("version", leaf(ValueType::Text)),
                ("from", leaf(ValueType::None)),
                ("to", leaf(ValueType::None)),
                ("value", leaf(ValueType::Hex0xNumber)),
                ("stepLimit", leaf(ValueType::Hex0xNumber)),
                ("timestamp", leaf(ValueType::Hex0xNumber)),
                ("nonce", leaf(ValueType::Hex0xNumber)),
                ("signature", leaf(ValueType::Text)),
                ("dataType", leaf(ValueType::Text)),
                ("txHash", leaf(ValueType::HexNumber)),
            ])
            .with_edits([
                ("tx_hash", rename("txHash")),
                ("time_stamp", rename("timestamp")),
            ]),
        );
        requests.insert(
            RequestParamType::Call,
            Template::object([
                ("to", leaf(ValueType::None)),
                ("dataType", leaf(ValueType::Text)),
                (
                    "data",
                    Template::object([
                        ("method", leaf(ValueType::Text)),
                        (
                            "params",
                            Template::object([("address", leaf(ValueType::None))]),
                        ),
                    ]),
                ),
            ]),
        );
        let address_only = Template::object([("address", leaf(ValueType::None))]);
        requests.insert(RequestParamType::GetBalance, address_only.clone());
        requests.insert(RequestParamType::GetScoreApi, address_only);
        requests.insert(
            RequestParamType::GetTotalSupply,
            Template::object(Vec::<(String, Template)>::new()),
        );
        requests.insert(
            RequestParamType::GetBlock,
            Template::object([
                ("hash", leaf(ValueType::HexNumber)),
                ("height", leaf(ValueType::Integer)),
            ]),
        );
        requests.insert(
            RequestParamType::GetBlockByHash,
            Template::object([("hash", leaf(ValueType::HexNumber))]),
        );
        requests.insert(
            RequestParamType::GetBlockByHeight,
            Template::object([("height", leaf(ValueType::Integer))]),
        );
        requests.insert(
            RequestParamType::GetTxResult,
            Template::object([("txHash", leaf(ValueType::HexNumber))]),
        );
        requests.insert(
            RequestParamType::GetRepsByHash,
            Template::object([("repsHash", leaf(ValueType::Hex0xHashNumber))]),
        );

        let mut responses = HashMap::new();
        responses.insert(ResponseParamType::SendTx, leaf(ValueType::Hex0xHashNumber));
        responses.insert(
            ResponseParamType::GetTxByHash,
            Template::object([
                ("txHash", leaf(ValueType::Hex0xHashNumber)),
                ("blockHeight", leaf(ValueType::Hex0xNumber)),
                ("blockHash", leaf(ValueType::Hex0xHashNumber)),
            ])
            .with_edits([("tx_hash", rename("txHash"))]),
        );
        responses.insert(
            ResponseParamType::GetTxResult,
            Template::object([
                ("txHash", leaf(ValueType::Hex0xHashNumber)),
                ("blockHash", leaf(ValueType::Hex0xHashNumber)),
            ]),
        );
        responses.insert(
            ResponseParamType::GetBlockV0_1aTxV2,
            block_v0_1a().with_field("confirmed_transaction_list", tx_v2()),
        );
        responses.insert(
            ResponseParamType::GetBlockV0_1aTxV3,
            block_v0_1a().with_field("confirmed_transaction_list", tx_v3()),
        );
        responses.insert(
            ResponseParamType::GetBlockV0_3TxV3,
            Template::object([("transactions", tx_v3())]),
        );

        Self {
            requests,
            responses,
        }
    }

    /// Request template for `param_type`
    pub fn request(&self, param_type: RequestParamType) -> Option<&Template> {
        self.requests.get(&param_type)
    }

    /// Response template for `param_type`
    pub fn response(&self, param_type: ResponseParamType) -> Option<&Template> {
        self.responses.get(&param_type)
    }

    /// Convert a v3 block for the wire, picking the template from its `version`.
    ///
    /// `0.1a` blocks get the legacy layout, `0.3` blocks only have their
    /// transaction hashes normalised and later versions pass through.
    pub fn convert_block_v3(&self, block: &JsonValue) -> JsonValue {
        let template = match block.get("version").and_then(JsonValue::as_str) {
            Some(BLOCK_V0_1A) => self.response(ResponseParamType::GetBlockV0_1aTxV3),
            Some(BLOCK_V0_3) => self.response(ResponseParamType::GetBlockV0_3TxV3),
            _ => None,
        };
        crate::template::convert_params(block, template)
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

/// Legacy block layout version
pub const BLOCK_V0_1A: &str = "0.1a";
/// Current block layout version
pub const BLOCK_V0_3: &str = "0.3";
