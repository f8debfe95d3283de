//! MCP JSON-RPC request handler.
//!
//! Maps protocol methods onto the tool dispatcher. Transport-agnostic: the
//! stdio, SSE and Streamable HTTP transports all funnel decoded requests
//! through [`McpHandler::handle_request`].

use serde_json::{json, Value};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use super::dispatcher::{DispatchError, ToolCall, ToolDescriptor, ToolDispatcher};
use super::protocol::{
    error_codes, InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};

/// The closed set of methods this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpMethod {
    Initialize,
    Initialized,
    Ping,
    ToolsList,
    ToolsCall,
    Cancelled,
}

impl McpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            McpMethod::Initialize => "initialize",
            McpMethod::Initialized => "notifications/initialized",
            McpMethod::Ping => "ping",
            McpMethod::ToolsList => "tools/list",
            McpMethod::ToolsCall => "tools/call",
            McpMethod::Cancelled => "notifications/cancelled",
        }
    }
}

#[derive(Debug, Error)]
#[error("Method not found: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for McpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialize" => Ok(McpMethod::Initialize),
            // Older clients send the bare name
            "notifications/initialized" | "initialized" => Ok(McpMethod::Initialized),
            "ping" => Ok(McpMethod::Ping),
            "tools/list" => Ok(McpMethod::ToolsList),
            "tools/call" => Ok(McpMethod::ToolsCall),
            "notifications/cancelled" => Ok(McpMethod::Cancelled),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// Delivers server notifications emitted while a request is being handled.
pub struct Notifier {
    sink: Box<dyn Fn(JsonRpcNotification) + Send + Sync>,
}

impl Notifier {
    pub fn new(sink: impl Fn(JsonRpcNotification) + Send + Sync + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// A notifier that drops everything.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn notify(&self, notification: JsonRpcNotification) {
        (self.sink)(notification)
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("tool with empty name")]
    EmptyName,
}

/// Name and version reported in the `initialize` result.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: "plane-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: Some(
                "MCP server for the Plane project tracker. \
                 List, create, update and delete projects and issues. \
                 Issues can be addressed by UUID or by display code such as CLT-37."
                    .to_string(),
            ),
        }
    }
}

/// MCP request handler bound to one tool dispatcher.
pub struct McpHandler {
    dispatcher: Arc<dyn ToolDispatcher>,
    tools: Vec<ToolDescriptor>,
    identity: ServerIdentity,
}

impl McpHandler {
    /// Bind a dispatcher, validating its tool set once up front.
    pub fn new(
        dispatcher: Arc<dyn ToolDispatcher>,
        identity: ServerIdentity,
    ) -> Result<Self, RegistrationError> {
        let tools = dispatcher.tools();
        let mut seen = HashSet::new();
        for tool in &tools {
            if tool.name.is_empty() {
                return Err(RegistrationError::EmptyName);
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(RegistrationError::DuplicateTool(tool.name.clone()));
            }
        }
        info!("Registered {} MCP tools", tools.len());
        Ok(Self {
            dispatcher,
            tools,
            identity,
        })
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Handle one request or notification.
    ///
    /// Notifications never produce a response. Protocol errors become
    /// JSON-RPC error responses; `Err` is reserved for internal dispatcher
    /// failures, which each transport reports as a generic internal error.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        notifier: &Notifier,
    ) -> Result<Option<JsonRpcResponse>, DispatchError> {
        let id = request.id.clone();
        debug!("MCP: Handling method: {}", request.method);

        let method = match request.method.parse::<McpMethod>() {
            Ok(method) => method,
            Err(unknown) => {
                if request.is_notification() {
                    debug!("MCP: Ignoring unknown notification {}", unknown.0);
                    return Ok(None);
                }
                return Ok(Some(JsonRpcResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    unknown.to_string(),
                )));
            }
        };

        if request.is_notification() {
            match method {
                McpMethod::Initialized => debug!("MCP: Client finished initialization"),
                McpMethod::Cancelled => debug!("MCP: Client cancelled a request"),
                other => debug!("MCP: Ignoring {} sent as notification", other.as_str()),
            }
            return Ok(None);
        }

        let response = match method {
            McpMethod::Initialize => self.handle_initialize(id, request.params),
            McpMethod::Ping => JsonRpcResponse::success(id, json!({})),
            McpMethod::ToolsList => {
                JsonRpcResponse::success(id, json!({ "tools": self.tools }))
            }
            McpMethod::ToolsCall => {
                self.handle_call_tool(id, request.params.unwrap_or(json!({})), notifier)
                    .await?
            }
            // Notification-only methods sent with an id get an empty ack
            McpMethod::Initialized | McpMethod::Cancelled => {
                JsonRpcResponse::success(id, json!({}))
            }
        };
        Ok(Some(response))
    }

    /// Handle the initialize request, echoing the client's protocol version
    /// when we support it.
    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params = match params.map(serde_json::from_value::<InitializeParams>) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid initialize params: {}", e),
                )
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    "Missing initialize params",
                )
            }
        };

        let version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version.as_str()
        } else {
            PROTOCOL_VERSION
        };
        info!(
            "MCP: Initializing for client {} (protocol {})",
            params.client_info.name, version
        );

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": self.identity.name,
                "version": self.identity.version
            }
        });
        if let Some(instructions) = &self.identity.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }
        JsonRpcResponse::success(id, result)
    }

    async fn handle_call_tool(
        &self,
        id: Option<Value>,
        params: Value,
        notifier: &Notifier,
    ) -> Result<JsonRpcResponse, DispatchError> {
        let progress_token = params
            .get("_meta")
            .and_then(|m| m.get("progressToken"))
            .cloned();
        let call: ToolCall = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(e) => {
                return Ok(JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid tools/call params: {}", e),
                ))
            }
        };
        let tool_name = call.name.clone();

        if let Some(token) = &progress_token {
            notifier.notify(progress(token, 0, format!("Calling {}", tool_name)));
        }

        let result = match self.dispatcher.call(call).await {
            Ok(result) => result,
            Err(DispatchError::UnknownTool(name)) => {
                error!("MCP: Unknown tool: {}", name);
                return Ok(JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", name),
                ));
            }
            Err(e) => return Err(e),
        };

        if let Some(token) = &progress_token {
            notifier.notify(progress(token, 1, format!("Finished {}", tool_name)));
        }

        let value = serde_json::to_value(&result)
            .map_err(|e| DispatchError::Internal(anyhow::Error::new(e)))?;
        Ok(JsonRpcResponse::success(id, value))
    }
}

fn progress(token: &Value, progress: u64, message: String) -> JsonRpcNotification {
    JsonRpcNotification::new(
        "notifications/progress",
        json!({
            "progressToken": token,
            "progress": progress,
            "total": 1,
            "message": message
        }),
    )
}
