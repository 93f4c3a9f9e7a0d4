//! JSON-RPC 2.0 envelopes.
//!
//! A [`Request`] without an `id` member is a notification and gets no
//! response. An explicit `"id": null` is kept distinct from an absent id.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Maps a present member (including `null`) to `Some`, so only absence is `None`.
fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Parse one JSON-RPC message. On failure, returns the error response to send.
    pub fn parse(text: &str) -> Result<Self, Response> {
        let value: Value = serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse one raw message off the wire. Bytes that are not UTF-8 are a parse
    /// error like any other malformed input.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, Response> {
        let text = std::str::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
        Self::parse(text)
    }

    /// Validate an already-decoded JSON value as a request.
    pub fn from_value(value: Value) -> Result<Self, Response> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        if !value.is_object() {
            return Err(Response::error(
                Value::Null,
                INVALID_REQUEST,
                "Invalid Request",
                Some(Value::String("request must be a JSON object".to_string())),
            ));
        }
        let request: Request = serde_json::from_value(value).map_err(|e| {
            Response::error(
                id.clone(),
                INVALID_REQUEST,
                "Invalid Request",
                Some(Value::String(e.to_string())),
            )
        })?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(Response::error(
                id,
                INVALID_REQUEST,
                "Invalid Request",
                Some(Value::String(format!(
                    "unsupported jsonrpc version '{}'",
                    request.jsonrpc
                ))),
            ));
        }
        Ok(request)
    }
}

/// `-32700` with a `null` id: the request id is unknowable.
fn parse_error(detail: String) -> Response {
    Response::error(Value::Null, PARSE_ERROR, "Parse error", Some(Value::String(detail)))
}

/// Error object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
