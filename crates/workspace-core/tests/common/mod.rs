//! In-process stub MCP service for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use workspace_core::{
    Connector, Credential, JsonRpcRequest, JsonRpcResponse, McpTransport, ServiceConfig,
    TransportError,
};

/// What the stub does with `tools/call`
#[derive(Debug, Clone)]
pub enum CallBehavior {
    /// Return the arguments as structured content
    Echo,
    /// Answer with a JSON-RPC error carrying this message
    RpcError(String),
    /// Return `isError: true` with this text
    ToolError(String),
    /// Never answer
    Hang,
}

/// Counters observed by tests
#[derive(Debug, Default)]
pub struct StubProbe {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub closed: AtomicBool,
    pub last_credential: parking_lot::Mutex<Option<String>>,
}

impl StubProbe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Scripted service behaviour
#[derive(Debug, Clone)]
pub struct StubService {
    /// Successive `tools/list` calls cycle through these snapshots
    pub tool_lists: Vec<Vec<Value>>,
    pub call: CallBehavior,
    pub fail_list: bool,
    pub reject_initialize: bool,
    /// Never answer `initialize`
    pub hang_initialize: bool,
}

impl Default for StubService {
    fn default() -> Self {
        Self {
            tool_lists: vec![vec![forecast_tool()]],
            call: CallBehavior::Echo,
            fail_list: false,
            reject_initialize: false,
            hang_initialize: false,
        }
    }
}

pub fn forecast_tool() -> Value {
    json!({
        "name": "getForecast",
        "description": "Weather forecast for a city",
        "inputSchema": {
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }
    })
}

pub struct StubConnector {
    service: StubService,
    probe: Arc<StubProbe>,
}

impl StubConnector {
    pub fn new(service: StubService) -> (Self, Arc<StubProbe>) {
        let probe = Arc::new(StubProbe::default());
        (
            Self {
                service,
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn connect(
        &self,
        _config: &ServiceConfig,
        credential: &Credential,
    ) -> Result<Box<dyn McpTransport>, TransportError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_credential.lock() = Some(credential.expose().to_string());
        Ok(Box::new(StubTransport {
            service: self.service.clone(),
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct StubTransport {
    service: StubService,
    probe: Arc<StubProbe>,
}

impl StubTransport {
    async fn respond(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        match request.method.as_str() {
            "initialize" if self.service.hang_initialize => std::future::pending().await,
            "initialize" if self.service.reject_initialize => {
                JsonRpcResponse::failure(id, -32600, "client not authorized")
            }
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {"listChanged": true}},
                    "serverInfo": {"name": "stub", "version": "1.0.0"}
                }),
            ),
            "tools/list" if self.service.fail_list => {
                JsonRpcResponse::failure(id, -32603, "tool index unavailable")
            }
            "tools/list" => {
                let n = self.probe.list_calls.fetch_add(1, Ordering::SeqCst);
                let lists = &self.service.tool_lists;
                let tools = lists.get(n % lists.len().max(1)).cloned().unwrap_or_default();
                JsonRpcResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => {
                let params = request.params.unwrap_or_default();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                match &self.service.call {
                    CallBehavior::Echo => JsonRpcResponse::success(
                        id,
                        json!({
                            "content": [{"type": "text", "text": arguments.to_string()}],
                            "structuredContent": arguments
                        }),
                    ),
                    CallBehavior::RpcError(message) => JsonRpcResponse::failure(id, -32000, message.clone()),
                    CallBehavior::ToolError(message) => JsonRpcResponse::success(
                        id,
                        json!({
                            "content": [{"type": "text", "text": message}],
                            "isError": true
                        }),
                    ),
                    CallBehavior::Hang => std::future::pending().await,
                }
            }
            other => JsonRpcResponse::failure(id, -32601, format!("method not found: {}", other)),
        }
    }
}

#[async_trait]
impl McpTransport for StubTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if self.probe.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(self.respond(request).await)
    }

    async fn send_notification(&self, _method: &str, _params: Option<Value>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub const WEATHER_SECRETS: &str = r#"
[openai]
api_key = "sk-primary"

[weather_mcp]
service_name = "weather"
transport = "streamable_http"
url = "https://weather.example/mcp"
api_key = "weather-token"
"#;

/// Write `content` to a secrets file inside a fresh temp dir
pub fn secrets_file(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.toml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
