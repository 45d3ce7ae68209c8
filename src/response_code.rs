//! Backend response codes
//!
//! The backend answers most calls with a numeric response code next to the
//! payload. Codes not listed here are kept verbatim and reported with a
//! generic message.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Numeric response code reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCode(pub i64);

impl ResponseCode {
    /// Operation succeeded
    pub const SUCCESS: Self = Self(0);
    /// Generic failure
    pub const FAIL: Self = Self(-1);
    /// Parameters failed validation
    pub const FAIL_VALIDATE_PARAMS: Self = Self(-6);
    /// Peer refuses further subscribers
    pub const FAIL_SUBSCRIBE_LIMIT: Self = Self(-11);
    /// Relay target unknown or unusable
    pub const FAIL_INVALID_PEER_TARGET: Self = Self(-12);

    /// Transaction rejected for an unknown reason
    pub const FAIL_TX_INVALID_UNKNOWN: Self = Self(-100);
    /// Transaction hash is malformed
    pub const FAIL_TX_INVALID_HASH_FORMAT: Self = Self(-101);
    /// Transaction hash could not be generated
    pub const FAIL_TX_INVALID_HASH_GENERATION: Self = Self(-102);
    /// Transaction hash does not match its content
    pub const FAIL_TX_INVALID_HASH_NOT_MATCH: Self = Self(-103);
    /// Sender address does not match the signature
    pub const FAIL_TX_INVALID_ADDRESS_NOT_MATCH: Self = Self(-104);
    /// Address is malformed
    pub const FAIL_TX_INVALID_ADDRESS_FORMAT: Self = Self(-105);
    /// Signature is invalid
    pub const FAIL_TX_INVALID_SIGNATURE: Self = Self(-106);
    /// Transaction parameters are invalid
    pub const FAIL_TX_INVALID_PARAMS: Self = Self(-107);
    /// Transaction hash already seen
    pub const FAIL_TX_INVALID_DUPLICATED_HASH: Self = Self(-108);
    /// Timestamp outside the accepted window
    pub const FAIL_TX_INVALID_OUT_OF_TIME_BOUND: Self = Self(-109);
    /// Transaction has not been executed yet
    pub const FAIL_TX_NOT_INVOKED: Self = Self(-110);

    /// Node may not create transactions
    pub const FAIL_NO_PERMISSION: Self = Self(-200);
    /// Lookup key does not exist
    pub const FAIL_INVALID_KEY_ERROR: Self = Self(-201);
    /// Block height is out of range
    pub const FAIL_WRONG_BLOCK_HEIGHT: Self = Self(-202);
    /// Parameters are missing or malformed
    pub const FAIL_ILLEGAL_PARAMS: Self = Self(-203);
    /// Transaction could not be created
    pub const FAIL_CREATE_TX: Self = Self(-204);

    /// Backend is overloaded
    pub const FAIL_SERVER_BUSY: Self = Self(-900);

    /// Raw numeric value
    pub fn value(self) -> i64 {
        self.0
    }

    /// Whether the code reports success
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Human readable message for the code
    pub fn message(self) -> &'static str {
        match self {
            Self::SUCCESS => "success",
            Self::FAIL => "fail",
            Self::FAIL_VALIDATE_PARAMS => "fail validate params",
            Self::FAIL_SUBSCRIBE_LIMIT => "this peer can no longer take more subscribe requests",
            Self::FAIL_INVALID_PEER_TARGET => "invalid peer target for relay",
            Self::FAIL_TX_INVALID_UNKNOWN => "fail tx invalid unknown",
            Self::FAIL_TX_INVALID_HASH_FORMAT => "fail tx invalid hash format",
            Self::FAIL_TX_INVALID_HASH_GENERATION => "fail tx invalid hash generation",
            Self::FAIL_TX_INVALID_HASH_NOT_MATCH => "fail tx invalid hash not match",
            Self::FAIL_TX_INVALID_ADDRESS_NOT_MATCH => "fail tx invalid address not match",
            Self::FAIL_TX_INVALID_ADDRESS_FORMAT => "fail tx invalid address format",
            Self::FAIL_TX_INVALID_SIGNATURE => "fail tx invalid signature",
            Self::FAIL_TX_INVALID_PARAMS => "fail tx invalid params",
            Self::FAIL_TX_INVALID_DUPLICATED_HASH => "fail tx invalid duplicated hash",
            Self::FAIL_TX_INVALID_OUT_OF_TIME_BOUND => "fail tx invalid out of time bound",
            Self::FAIL_TX_NOT_INVOKED => "Pending transaction",
            Self::FAIL_NO_PERMISSION => "no permission",
            Self::FAIL_INVALID_KEY_ERROR => "invalid key error",
            Self::FAIL_WRONG_BLOCK_HEIGHT => "wrong block height",
            Self::FAIL_ILLEGAL_PARAMS => "illegal params",
            Self::FAIL_CREATE_TX => "fail create tx",
            Self::FAIL_SERVER_BUSY => "Server is busy",
            _ => "unknown response code",
        }
    }

    /// HTTP status to answer with, `default` unless the code demands otherwise
    pub fn http_status(self, default: StatusCode) -> StatusCode {
        match self {
            Self::SUCCESS => StatusCode::OK,
            Self::FAIL_SERVER_BUSY => StatusCode::SERVICE_UNAVAILABLE,
            _ => default,
        }
    }
}

impl From<i64> for ResponseCode {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_code_is_preserved() {
        let code = ResponseCode::from(-4242);
        assert_eq!(code.value(), -4242);
        assert_eq!(code.message(), "unknown response code");
        assert_eq!(serde_json::to_value(code).unwrap(), serde_json::json!(-4242));
    }

    #[test]
    fn test_server_busy_maps_to_unavailable() {
        assert_eq!(
            ResponseCode::FAIL_SERVER_BUSY.http_status(StatusCode::BAD_REQUEST),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ResponseCode::FAIL_TX_INVALID_PARAMS.http_status(StatusCode::BAD_REQUEST),
            StatusCode::BAD_REQUEST
        );
    }
}
