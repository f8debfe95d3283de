//! JSON-RPC 2.0 message types and MCP protocol constants.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::McpError;

/// MCP protocol version we prefer.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Protocol versions we accept from clients during initialization.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes plus the server-defined range MCP uses.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const SERVER_ERROR: i32 = -32000;
    pub const SESSION_NOT_FOUND: i32 = -32001;
}

/// JSON-RPC 2.0 request or notification (a request without an `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Whether this is a well-formed `initialize` request.
    ///
    /// Only these may create a session, so the params are checked against
    /// the shape the protocol requires rather than just the method name.
    pub fn is_initialize(&self) -> bool {
        if self.method != "initialize" || self.id.is_none() {
            return false;
        }
        self.params
            .as_ref()
            .and_then(|p| serde_json::from_value::<InitializeParams>(p.clone()).ok())
            .is_some()
    }
}

/// Params of the `initialize` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// JSON-RPC 2.0 Response.
///
/// `id` is always serialized; it is `null` when the failing request could
/// not be identified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// The generic envelope sent when a handler failed internally.
    pub fn internal_error(id: Option<Value>) -> Self {
        Self::error(id, error_codes::INTERNAL_ERROR, "Internal server error")
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_value(self) -> Value {
        let mut object = Map::new();
        object.insert("jsonrpc".to_string(), Value::String(self.jsonrpc));
        object.insert("id".to_string(), self.id);
        if let Some(result) = self.result {
            object.insert("result".to_string(), result);
        }
        if let Some(error) = self.error {
            object.insert("error".to_string(), error.into_value());
        }
        Value::Object(object)
    }
}

/// JSON-RPC 2.0 Error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn into_value(self) -> Value {
        match self.data {
            Some(data) => json!({"code": self.code, "message": self.message, "data": data}),
            None => json!({"code": self.code, "message": self.message}),
        }
    }
}

/// Server-to-client notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn into_value(self) -> Value {
        match self.params {
            Some(params) => json!({"jsonrpc": self.jsonrpc, "method": self.method, "params": params}),
            None => json!({"jsonrpc": self.jsonrpc, "method": self.method}),
        }
    }
}

/// A single decoded message from a client.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Request(JsonRpcRequest),
    /// A response to a server-initiated request. We never send those, so
    /// they are accepted and dropped.
    Response(Value),
}

/// One POST body or one stdio line: a single message or a batch.
#[derive(Debug, Clone)]
pub struct InboundBatch {
    pub messages: Vec<InboundMessage>,
    pub is_batch: bool,
}

impl InboundBatch {
    /// Decode a raw body, distinguishing malformed JSON from JSON that is not
    /// a valid JSON-RPC message.
    pub fn parse(body: &[u8]) -> Result<Self, McpError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| McpError::ParseError(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, McpError> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(McpError::InvalidRequest("empty batch".to_string()));
                }
                let messages = items
                    .into_iter()
                    .map(decode_message)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self {
                    messages,
                    is_batch: true,
                })
            }
            other => Ok(Self {
                messages: vec![decode_message(other)?],
                is_batch: false,
            }),
        }
    }

    /// Requests and notifications, in arrival order.
    pub fn requests(&self) -> impl Iterator<Item = &JsonRpcRequest> {
        self.messages.iter().filter_map(|m| match m {
            InboundMessage::Request(r) => Some(r),
            InboundMessage::Response(_) => None,
        })
    }

    pub fn into_requests(self) -> Vec<JsonRpcRequest> {
        self.messages
            .into_iter()
            .filter_map(|m| match m {
                InboundMessage::Request(r) => Some(r),
                InboundMessage::Response(_) => None,
            })
            .collect()
    }

    /// Whether any message expects a response.
    pub fn has_requests(&self) -> bool {
        self.requests().any(|r| !r.is_notification())
    }

    pub fn contains_initialize(&self) -> bool {
        self.requests().any(|r| r.method == "initialize")
    }

    /// A session may only be created by a lone, valid `initialize` request.
    pub fn is_initialize(&self) -> bool {
        match self.messages.as_slice() {
            [InboundMessage::Request(request)] => request.is_initialize(),
            _ => false,
        }
    }
}

fn decode_message(value: Value) -> Result<InboundMessage, McpError> {
    let Value::Object(ref object) = value else {
        return Err(McpError::InvalidRequest(
            "message must be a JSON object".to_string(),
        ));
    };
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(McpError::InvalidRequest(
            "jsonrpc must be \"2.0\"".to_string(),
        ));
    }
    if object.contains_key("method") {
        let request = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidRequest(e.to_string()))?;
        return Ok(InboundMessage::Request(request));
    }
    if object.contains_key("id") && (object.contains_key("result") || object.contains_key("error"))
    {
        return Ok(InboundMessage::Response(value));
    }
    Err(McpError::InvalidRequest(
        "message is neither a request nor a response".to_string(),
    ))
}
