//! JSON-RPC 2.0 envelopes and explicit envelope validation
//!
//! [`JsonRpcMessage`] is the tagged union exchanged with transports. It is
//! discriminated by the presence of `id`, `method`, `result`, and `error`
//! and is only ever constructed from untrusted input through
//! [`JsonRpcMessage::from_value`], which checks the envelope shape field by
//! field and reports violations as [`McpError::Protocol`].
//!
//! ```text
//! id + method            -> Request
//! method (no id)         -> Notification
//! id + result            -> Response
//! id + error{code,msg}   -> Error
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};

/// JSON-RPC protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Identifier correlating a request with its reply.
///
/// Ids issued by this client are always numeric; servers may use strings
/// for their own requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id
    Number(i64),
    /// String id
    String(String),
}

impl RequestId {
    /// Numeric value of the id, accepting numeric strings.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => u64::try_from(*n).ok(),
            Self::String(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value as i64)
    }
}

/// A JSON-RPC 2.0 request object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request being answered.
    pub id: RequestId,
    /// Result payload.
    pub result: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use mcpwire::mcp::message::JsonRpcError;
///
/// let e = JsonRpcError::new(-32600, "Invalid Request");
/// assert_eq!(e.to_string(), "JSON-RPC error -32600: Invalid Request");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Error object without data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl From<JsonRpcError> for McpError {
    fn from(e: JsonRpcError) -> Self {
        McpError::Rpc {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request being answered.
    pub id: RequestId,
    /// Error payload.
    pub error: JsonRpcError,
}

/// A JSON-RPC 2.0 notification (no id, no reply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Any JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request expecting a reply.
    Request(JsonRpcRequest),
    /// Successful reply.
    Response(JsonRpcResponse),
    /// Error reply.
    Error(JsonRpcErrorResponse),
    /// One-way notification.
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Build a request envelope.
    pub fn request(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Build a notification envelope.
    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self::Notification(JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        })
    }

    /// Build a success response envelope.
    pub fn response(id: RequestId, result: serde_json::Value) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }

    /// Build an error response envelope.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self::Error(JsonRpcErrorResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        })
    }

    /// The id of requests and replies; `None` for notifications.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Error(r) => Some(&r.id),
            Self::Notification(_) => None,
        }
    }

    /// The method of requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// Parse and validate a single serialized message.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| McpError::Protocol {
            message: format!("Failed to parse message: {e}"),
            data: None,
        })?;
        Self::from_value(value)
    }

    /// Parse a body that holds either one message or a batch array.
    pub fn parse_batch(raw: &str) -> Result<Vec<Self>> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| McpError::Protocol {
            message: format!("Failed to parse message: {e}"),
            data: None,
        })?;
        match value {
            serde_json::Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Ok(vec![Self::from_value(other)?]),
        }
    }

    /// Validate a decoded JSON value against the JSON-RPC envelope schema.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Protocol`] naming the first violated rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpwire::mcp::message::JsonRpcMessage;
    ///
    /// let msg = JsonRpcMessage::from_value(serde_json::json!({
    ///     "jsonrpc": "2.0", "id": 3, "result": { "tools": [] }
    /// })).unwrap();
    /// assert!(matches!(msg, JsonRpcMessage::Response(_)));
    ///
    /// let bad = JsonRpcMessage::from_value(serde_json::json!({ "jsonrpc": "1.0", "id": 1 }));
    /// assert!(bad.is_err());
    /// ```
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(mut obj) = value else {
            return Err(invalid("message is not a JSON object"));
        };

        match obj.get("jsonrpc").and_then(|v| v.as_str()) {
            Some(JSONRPC_VERSION) => {}
            _ => return Err(invalid("`jsonrpc` must be \"2.0\"")),
        }

        let id = match obj.remove("id") {
            None | Some(serde_json::Value::Null) => None,
            Some(raw) => Some(parse_id(raw)?),
        };
        let method = match obj.remove("method") {
            None => None,
            Some(serde_json::Value::String(m)) => Some(m),
            Some(_) => return Err(invalid("`method` must be a string")),
        };
        let params = match obj.remove("params") {
            None | Some(serde_json::Value::Null) => None,
            Some(p @ serde_json::Value::Object(_)) | Some(p @ serde_json::Value::Array(_)) => {
                Some(p)
            }
            Some(_) => return Err(invalid("`params` must be an object or array")),
        };
        let result = obj.remove("result");
        let error = obj.remove("error");

        match (id, method) {
            (Some(id), Some(method)) => {
                if result.is_some() || error.is_some() {
                    return Err(invalid("request must not carry `result` or `error`"));
                }
                Ok(Self::Request(JsonRpcRequest {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    method,
                    params,
                }))
            }
            (None, Some(method)) => {
                if result.is_some() || error.is_some() {
                    return Err(invalid("notification must not carry `result` or `error`"));
                }
                Ok(Self::Notification(JsonRpcNotification {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    method,
                    params,
                }))
            }
            (Some(id), None) => match (result, error) {
                (Some(result), None) => Ok(Self::Response(JsonRpcResponse {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    result,
                })),
                (None, Some(error)) => Ok(Self::Error(JsonRpcErrorResponse {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    error: parse_error_object(error)?,
                })),
                (Some(_), Some(_)) => Err(invalid("response carries both `result` and `error`")),
                (None, None) => Err(invalid("response carries neither `result` nor `error`")),
            },
            (None, None) => Err(invalid("message has neither `id` nor `method`")),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn invalid(reason: &str) -> McpError {
    McpError::Protocol {
        message: format!("Invalid JSON-RPC message: {reason}"),
        data: None,
    }
}

fn parse_id(raw: serde_json::Value) -> Result<RequestId> {
    match raw {
        serde_json::Value::String(s) => Ok(RequestId::String(s)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| invalid("`id` must be an integer or string")),
        _ => Err(invalid("`id` must be an integer or string")),
    }
}

fn parse_error_object(raw: serde_json::Value) -> Result<JsonRpcError> {
    let serde_json::Value::Object(mut obj) = raw else {
        return Err(invalid("`error` must be an object"));
    };
    let code = obj
        .get("code")
        .and_then(|c| c.as_i64())
        .ok_or_else(|| invalid("`error.code` must be an integer"))?;
    let message = match obj.remove("message") {
        Some(serde_json::Value::String(m)) => m,
        _ => return Err(invalid("`error.message` must be a string")),
    };
    Ok(JsonRpcError {
        code,
        message,
        data: obj.remove("data"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_is_classified_by_id_and_method() {
        let msg = JsonRpcMessage::from_value(json!({
            "jsonrpc": "2.0",
            "id": "srv-1",
            "method": "elicitation/create",
            "params": { "message": "name?" }
        }))
        .unwrap();
        assert_eq!(msg.id(), Some(&RequestId::String("srv-1".into())));
        assert_eq!(msg.method(), Some("elicitation/create"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let msg = JsonRpcMessage::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/tools/list_changed"
        }))
        .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert!(msg.id().is_none());
    }

    #[test]
    fn test_error_response_keeps_code_message_and_data() {
        let msg = JsonRpcMessage::from_value(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "error": { "code": -32602, "message": "bad", "data": { "field": "name" } }
        }))
        .unwrap();
        let JsonRpcMessage::Error(resp) = msg else {
            panic!("expected error response");
        };
        assert_eq!(resp.error.code, -32602);
        assert_eq!(resp.error.data, Some(json!({ "field": "name" })));
    }

    #[test]
    fn test_rejects_wrong_version() {
        let err = JsonRpcMessage::from_value(json!({ "jsonrpc": "1.0", "id": 1, "result": {} }))
            .unwrap_err();
        assert!(err.to_string().contains("jsonrpc"));
    }

    #[test]
    fn test_rejects_result_and_error_together() {
        let err = JsonRpcMessage::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {},
            "error": { "code": 1, "message": "x" }
        }))
        .unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }));
    }

    #[test]
    fn test_rejects_malformed_error_object() {
        let err = JsonRpcMessage::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "message": "missing code" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("error.code"));
    }

    #[test]
    fn test_rejects_fractional_id() {
        assert!(JsonRpcMessage::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1.5,
            "result": {}
        }))
        .is_err());
    }

    #[test]
    fn test_parse_batch_accepts_array() {
        let raw = r#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","method":"n"}]"#;
        let msgs = JsonRpcMessage::parse_batch(raw).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[1], JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn test_notification_serializes_without_id() {
        let msg = JsonRpcMessage::notification("notifications/initialized", None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
        );
    }

    #[test]
    fn test_string_id_parses_as_u64() {
        assert_eq!(RequestId::String("42".into()).as_u64(), Some(42));
        assert_eq!(RequestId::Number(-1).as_u64(), None);
    }
}
