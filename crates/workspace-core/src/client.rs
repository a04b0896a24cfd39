//! MCP client implementation
//!
//! Implements the client side of the Model Context Protocol on top of a
//! [`McpTransport`]: handshake, tool listing and tool calls. The client owns
//! its transport exclusively.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorkspaceError};
use crate::transport::{JsonRpcRequest, JsonRpcResponse, McpTransport, TransportError};

/// MCP protocol version
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Upper bound on `tools/list` pages, guards against cursor loops
const MAX_TOOL_PAGES: usize = 100;

/// Client info for initialization
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "tiangong-workspace".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Server info returned during initialization
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Initialize result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: ServerInfo,
}

/// Tool advertised by a service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Tool list result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Tool call result content item
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Remaining fields (`data`, `mimeType`, `resource`, ...) kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ToolResultContent {
    pub fn is_text(&self) -> bool {
        self.content_type == "text"
    }
}

/// Tool call result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolResultContent>,
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenated text content
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// MCP Client
pub struct McpClient {
    service: String,
    transport: Box<dyn McpTransport>,
    request_id: AtomicU64,
}

impl McpClient {
    /// Create a new MCP client for `service` with the given transport
    pub fn new(service: impl Into<String>, transport: Box<dyn McpTransport>) -> Self {
        Self {
            service: service.into(),
            transport,
            request_id: AtomicU64::new(1),
        }
    }

    /// Get the next request ID
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn transport_error(&self, error: TransportError) -> WorkspaceError {
        if error.is_decode() {
            WorkspaceError::protocol(&self.service, error)
        } else {
            WorkspaceError::connection(&self.service, error)
        }
    }

    /// Send a request and return the raw response
    async fn exchange(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        self.transport
            .send_request(request)
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// Decode the result of a response that carries no JSON-RPC error
    fn decode<T: for<'de> Deserialize<'de>>(&self, method: &str, response: JsonRpcResponse) -> Result<T> {
        let result = response.result.ok_or_else(|| {
            WorkspaceError::protocol(&self.service, format!("{} response missing result", method))
        })?;
        serde_json::from_value(result).map_err(|e| {
            WorkspaceError::protocol(&self.service, format!("invalid {} result: {}", method, e))
        })
    }

    /// Send a request and get the result; JSON-RPC errors become connection errors
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T> {
        let response = self.exchange(method, params).await?;
        if let Some(error) = response.error {
            return Err(WorkspaceError::connection(
                &self.service,
                format!("{} rejected: {}", method, error),
            ));
        }
        self.decode(method, response)
    }

    /// Initialize the connection with the MCP server
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": ClientInfo::default()
        });

        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        self.transport
            .send_notification("notifications/initialized", None)
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(result)
    }

    /// List available tools, following pagination
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));

            let result: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(result.tools);

            match result.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(WorkspaceError::protocol(
            &self.service,
            format!("tools/list did not finish within {} pages", MAX_TOOL_PAGES),
        ))
    }

    /// Call a tool; service-reported failures become [`WorkspaceError::RemoteTool`]
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let response = self.exchange("tools/call", Some(params)).await?;
        if let Some(error) = response.error {
            return Err(WorkspaceError::RemoteTool {
                service: self.service.clone(),
                tool: name.to_string(),
                message: error.message,
            });
        }

        let result: CallToolResult = self.decode("tools/call", response)?;
        if result.is_error {
            let text = result.text();
            return Err(WorkspaceError::RemoteTool {
                service: self.service.clone(),
                tool: name.to_string(),
                message: if text.is_empty() {
                    "tool reported an error without details".to_string()
                } else {
                    text
                },
            });
        }

        Ok(result)
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.transport
            .close()
            .await
            .map_err(|e| WorkspaceError::connection(&self.service, e))
    }
}
