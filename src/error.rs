//! JSON-RPC error type
//!
//! Every failure that reaches a client is expressed as a [`JsonRpcError`]. The
//! HTTP status travels with the error but is never serialized into the body.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::response_code::ResponseCode;

/// Standard JSON-RPC 2.0 error codes
pub mod codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist for the active protocol version
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Implementation-defined server error
    pub const SERVER_ERROR: i64 = -32000;
}

fn default_status() -> StatusCode {
    StatusCode::BAD_REQUEST
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,

    /// Error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,

    /// HTTP status the transport answers with
    #[serde(skip, default = "default_status")]
    pub http_status: StatusCode,
}

impl JsonRpcError {
    /// Create a new error
    pub fn new(code: i64, message: impl Into<String>, http_status: StatusCode) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            http_status,
        }
    }

    /// Attach additional data
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error", StatusCode::BAD_REQUEST)
    }

    /// Invalid request (-32600)
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, msg, StatusCode::BAD_REQUEST)
    }

    /// Method not found (-32601)
    pub fn method_not_found(msg: impl Into<String>) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, msg, StatusCode::BAD_REQUEST)
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, msg, StatusCode::BAD_REQUEST)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            msg,
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    /// Rate limit exceeded (-32000)
    pub fn rate_limit_exceeded() -> Self {
        Self::new(
            codes::SERVER_ERROR,
            "Rate limit exceeded",
            StatusCode::TOO_MANY_REQUESTS,
        )
    }

    /// Error raised when the backend answers with a non-success response code.
    ///
    /// The message comes from the response-code table and the HTTP status
    /// from the code's own mapping.
    pub fn from_response_code(code: i64, response_code: ResponseCode) -> Self {
        Self::new(
            code,
            response_code.message(),
            response_code.http_status(StatusCode::BAD_REQUEST),
        )
    }

    /// Error payload returned by a backend query, `{code, message}`.
    ///
    /// Backend codes are positive by convention; the client always sees them
    /// negated.
    pub fn from_query_error(error: &JsonValue) -> Self {
        let code = error.get("code").and_then(JsonValue::as_i64).unwrap_or(codes::SERVER_ERROR);
        let message = error
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or("Unknown backend error");
        Self::new(-code.abs(), message, StatusCode::BAD_REQUEST)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_status_is_not_serialized() {
        let error = JsonRpcError::internal_error("boom");
        let value = serde_json::to_value(&error).unwrap();

        assert_eq!(value, json!({"code": -32603, "message": "boom"}));
        assert_eq!(error.http_status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_query_error_code_is_negated() {
        let error = JsonRpcError::from_query_error(&json!({"code": 32602, "message": "bad"}));
        assert_eq!(error.code, -32602);
        assert_eq!(error.message, "bad");

        let error = JsonRpcError::from_query_error(&json!({"code": -32100, "message": "score"}));
        assert_eq!(error.code, -32100);
    }

    #[test]
    fn test_response_code_error_uses_table_message() {
        let error = JsonRpcError::from_response_code(
            codes::INVALID_REQUEST,
            ResponseCode::FAIL_TX_INVALID_SIGNATURE,
        );
        assert_eq!(error.message, ResponseCode::FAIL_TX_INVALID_SIGNATURE.message());
        assert_eq!(error.http_status, StatusCode::BAD_REQUEST);
    }
}
