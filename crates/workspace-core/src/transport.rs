//! MCP transport layer
//!
//! Supports stdio and streamable HTTP transports for MCP server
//! communication. A [`Connector`] opens the right transport for a service.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{ServiceConfig, TransportKind};
use crate::secrets::Credential;

/// Header carrying the streamable HTTP session id
const SESSION_ID_HEADER: &str = "mcp-session-id";

/// How long a stdio server gets to exit after stdin closes
const STDIO_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Failures below the protocol layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Io(String),
    #[error("connection closed by server")]
    Closed,
    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed message: {0}")]
    Decode(String),
}

impl TransportError {
    /// True when the peer sent something we could not understand
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

type TransportResult<T> = std::result::Result<T, TransportError>;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response, used by in-process transports
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Error response, used by in-process transports
    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// Transport trait for MCP communication
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for response
    async fn send_request(&self, request: JsonRpcRequest) -> TransportResult<JsonRpcResponse>;

    /// Send a notification (no response expected)
    async fn send_notification(&self, method: &str, params: Option<Value>) -> TransportResult<()>;

    /// Close the transport; must be safe to call more than once
    async fn close(&mut self) -> TransportResult<()>;
}

/// Opens transports for configured services
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &ServiceConfig,
        credential: &Credential,
    ) -> TransportResult<Box<dyn McpTransport>>;
}

/// Connector backed by the real stdio and HTTP transports
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportConnector;

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(
        &self,
        config: &ServiceConfig,
        credential: &Credential,
    ) -> TransportResult<Box<dyn McpTransport>> {
        match config.transport {
            TransportKind::Stdio => {
                let mut env = config.env.clone();
                env.insert(config.credential_env.clone(), credential.expose().to_string());
                let transport = StdioTransport::spawn(&config.endpoint, &config.args, &env).await?;
                Ok(Box::new(transport))
            }
            TransportKind::Http => {
                let transport = HttpTransport::new(&config.endpoint)?
                    .with_auth(&config.auth_header, credential);
                Ok(Box::new(transport))
            }
        }
    }
}

/// Stdio transport for MCP servers running as child processes
pub struct StdioTransport {
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
}

impl StdioTransport {
    /// Create a new stdio transport from a running process
    pub fn new(mut child: Child) -> TransportResult<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("failed to capture stdin of MCP server".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io("failed to capture stdout of MCP server".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "workspace_core::server_stderr", "{}", line);
                }
            });
        }

        Ok(Self {
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
        })
    }

    /// Spawn a new process and create transport
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> TransportResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| TransportError::Io(format!("failed to spawn {}: {}", command, e)))?;

        debug!("Spawned MCP server process: {}", command);
        Self::new(child)
    }

    /// Read a line from stdout, parsing as JSON
    async fn read_message(&self) -> TransportResult<Value> {
        let mut stdout = self.stdout.lock().await;

        // MCP uses newline-delimited JSON; blank lines are skipped
        loop {
            let mut line = String::new();
            let read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;

            if read == 0 {
                return Err(TransportError::Closed);
            }
            if line.trim().is_empty() {
                continue;
            }

            return serde_json::from_str(&line).map_err(|e| TransportError::Decode(e.to_string()));
        }
    }

    /// Write a message to stdin
    async fn write_message(&self, value: &Value) -> TransportResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::Closed)?;
        let json = serde_json::to_string(value).map_err(|e| TransportError::Decode(e.to_string()))?;

        let io = |e: std::io::Error| TransportError::Io(e.to_string());
        stdin.write_all(json.as_bytes()).await.map_err(io)?;
        stdin.write_all(b"\n").await.map_err(io)?;
        stdin.flush().await.map_err(io)?;

        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> TransportResult<JsonRpcResponse> {
        let request_id = request.id;

        let value = serde_json::to_value(&request).map_err(|e| TransportError::Decode(e.to_string()))?;
        self.write_message(&value).await?;

        // Read responses until we get one matching our ID
        loop {
            let response_value = self.read_message().await?;

            // Server-initiated notifications and requests are not answers
            if let Some(method) = response_value.get("method") {
                let method = method.as_str().unwrap_or("<unknown>");
                debug!("Skipping server message: {}", method);
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(response_value)
                .map_err(|e| TransportError::Decode(e.to_string()))?;

            // A null id answers a request the server could not parse
            if response.id == Some(request_id) || (response.id.is_none() && response.error.is_some()) {
                return Ok(response);
            }
            debug!("Skipping response to request {:?}", response.id);
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> TransportResult<()> {
        let notification = notification_body(method, params);
        self.write_message(&notification).await
    }

    async fn close(&mut self) -> TransportResult<()> {
        // Closing stdin asks the server to exit; kill it if it lingers
        drop(self.stdin.lock().await.take());

        let mut child = self.child.lock().await;
        match tokio::time::timeout(STDIO_EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("MCP server process exited: {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Err(_) => {
                warn!("MCP server did not exit after stdin closed, killing it");
                child
                    .kill()
                    .await
                    .map_err(|e| TransportError::Io(e.to_string()))
            }
        }
    }
}

/// Streamable HTTP transport for remote MCP servers
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    auth: Option<(String, String)>,
    session_id: parking_lot::Mutex<Option<String>>,
    connected: AtomicBool,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(endpoint: impl Into<String>) -> TransportResult<Self> {
        let endpoint = endpoint.into();
        reqwest::Url::parse(&endpoint)
            .map_err(|e| TransportError::Io(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("tiangong/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(Self {
            endpoint,
            client,
            auth: None,
            session_id: parking_lot::Mutex::new(None),
            connected: AtomicBool::new(true),
        })
    }

    /// Send the credential in `header` on every request
    pub fn with_auth(mut self, header: &str, credential: &Credential) -> Self {
        let secret = credential.expose();
        let value = if header.eq_ignore_ascii_case("authorization") && !secret.starts_with("Bearer ")
        {
            format!("Bearer {}", secret)
        } else {
            secret.to_string()
        };
        self.auth = Some((header.to_string(), value));
        self
    }

    /// Session id assigned by the server during initialization, if any
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        self.decorate(builder)
    }

    fn decorate(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((header, value)) = &self.auth {
            builder = builder.header(header.as_str(), value.as_str());
        }
        if let Some(id) = self.session_id.lock().as_deref() {
            builder = builder.header(SESSION_ID_HEADER, id);
        }
        builder
    }

    async fn send(&self, body: &Value) -> TransportResult<reqwest::Response> {
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        if let Some(id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> TransportResult<JsonRpcResponse> {
        let request_id = request.id;
        let body = serde_json::to_value(&request).map_err(|e| TransportError::Decode(e.to_string()))?;
        let response = self.send(&body).await?;

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        if !is_event_stream {
            return serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()));
        }

        for message in parse_sse_messages(&text) {
            if message.get("id").and_then(Value::as_u64) != Some(request_id) {
                continue;
            }
            return serde_json::from_value(message)
                .map_err(|e| TransportError::Decode(e.to_string()));
        }

        Err(TransportError::Decode(format!(
            "event stream ended without a response to request {}",
            request_id
        )))
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> TransportResult<()> {
        let notification = notification_body(method, params);
        self.send(&notification).await?;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        // Explicit session termination is optional for servers; ignore refusals
        if self.session_id.lock().is_some() {
            let request = self.decorate(self.client.delete(&self.endpoint));
            match request.send().await {
                Ok(response) => debug!("HTTP session terminated: {}", response.status()),
                Err(e) => debug!("HTTP session termination failed: {}", e),
            }
        }

        Ok(())
    }
}

fn notification_body(method: &str, params: Option<Value>) -> Value {
    let mut notification = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        notification["params"] = params;
    }
    notification
}

/// Extract the JSON payloads of all `data:` events in an SSE body
pub fn parse_sse_messages(body: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    let mut flush = |data: &mut String| {
        if !data.is_empty() {
            match serde_json::from_str(data) {
                Ok(value) => messages.push(value),
                Err(e) => debug!("Skipping non-JSON SSE event: {}", e),
            }
            data.clear();
        }
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data);

    messages
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
