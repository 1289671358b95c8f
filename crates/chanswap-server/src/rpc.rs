use chanswap_core::CoordinatorError;
use serde::{Deserialize, Serialize};

/// Inbound request: `{ id?, method, params? }`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Response envelope: `{ id, success, result?, error?: { code, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

// JSON-RPC numeric codes, used internally for routing
pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const DUPLICATE_VOTE: i32 = -32001;
pub const NOT_FOUND: i32 = -32004;

/// Map numeric codes to the string codes clients see.
pub fn error_code_to_string(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        DUPLICATE_VOTE => "DUPLICATE_VOTE",
        NOT_FOUND => "NOT_FOUND",
        _ => "UNKNOWN_ERROR",
    }
}

/// Wire code for a coordinator failure.
pub fn coordinator_error_code(err: &CoordinatorError) -> i32 {
    match err {
        CoordinatorError::DuplicateVote(_) => DUPLICATE_VOTE,
        CoordinatorError::NotFound(_) => NOT_FOUND,
        CoordinatorError::InvalidItem(_) => INVALID_PARAMS,
        CoordinatorError::UnknownSession(_)
        | CoordinatorError::DuplicateId(_)
        | CoordinatorError::DuplicateSession(_) => INTERNAL_ERROR,
    }
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: error_code_to_string(code).to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn from_coordinator_error(id: Option<serde_json::Value>, err: &CoordinatorError) -> Self {
        Self::error(id, coordinator_error_code(err), err.to_string())
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// Extract a required string param.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Extract a required non-negative integer param that fits in `u32`.
pub fn require_u32(params: &serde_json::Value, key: &str) -> Result<u32, String> {
    let value = params
        .get(key)
        .ok_or_else(|| format!("Missing required parameter: {key}"))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| format!("Parameter {key} must be a non-negative integer"))
}
