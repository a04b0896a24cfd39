//! Single-use MCP session
//!
//! A [`Session`] walks one connection through its whole life:
//!
//! ```text
//! Idle -> Connecting -> Ready <-> InFlight
//!                         |          |
//!                         v          v
//!                      Closing -> Closed        (any state) -> Failed
//! ```
//!
//! Operations are only accepted in `Ready`. `close` is accepted in every
//! state, is idempotent and always releases the transport.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{McpClient, ServerInfo, ToolDescriptor};
use crate::config::ServiceConfig;
use crate::error::{Result, WorkspaceError};
use crate::invocation::InvocationResult;
use crate::secrets::Credential;
use crate::transport::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Ready,
    InFlight,
    Closing,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::InFlight => "in flight",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One connection to one service
pub struct Session {
    config: ServiceConfig,
    timeout: Duration,
    state: SessionState,
    client: Option<McpClient>,
    server_info: Option<ServerInfo>,
}

impl Session {
    /// Create an idle session; `timeout` bounds connecting and each request
    pub fn new(config: &ServiceConfig, timeout: Duration) -> Self {
        Self {
            config: config.clone(),
            timeout,
            state: SessionState::Idle,
            client: None,
            server_info: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn service(&self) -> &str {
        &self.config.name
    }

    /// Server identity negotiated during the handshake
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// True while a transport is held
    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn ensure(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkspaceError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    fn timeout_error(&self, operation: &'static str) -> WorkspaceError {
        WorkspaceError::Timeout {
            service: self.config.name.clone(),
            operation,
            after: self.timeout,
        }
    }

    /// Connect and perform the MCP handshake
    ///
    /// On any failure the transport is torn down before returning and the
    /// session is left `Failed`.
    pub async fn open(&mut self, connector: &dyn Connector, credential: &Credential) -> Result<()> {
        self.ensure(SessionState::Idle, "open")?;
        self.state = SessionState::Connecting;
        debug!("Connecting to service {} ({})", self.config.name, self.config.transport);

        let timeout = self.timeout;
        let attempt = tokio::time::timeout(timeout, self.handshake(connector, credential)).await;
        let outcome = match attempt {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error("connect")),
        };

        match outcome {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open session with {}: {}", self.config.name, e);
                self.state = SessionState::Failed;
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, connector: &dyn Connector, credential: &Credential) -> Result<()> {
        let transport = connector
            .connect(&self.config, credential)
            .await
            .map_err(|e| WorkspaceError::connection(&self.config.name, e))?;

        // Stored before the handshake so a failure or timeout still closes it
        let client = self
            .client
            .insert(McpClient::new(self.config.name.clone(), transport));

        let result = client.initialize().await?;
        info!(
            "Connected to {}: {} v{} (protocol {})",
            self.config.name,
            result.server_info.name,
            result.server_info.version.as_deref().unwrap_or("unknown"),
            result.protocol_version
        );
        self.server_info = Some(result.server_info);

        Ok(())
    }

    fn missing_transport(&self, operation: &'static str) -> WorkspaceError {
        WorkspaceError::InvalidState {
            operation,
            state: format!("{} without a transport", self.state),
        }
    }

    /// Query the service for its current tools; never cached
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.ensure(SessionState::Ready, "list tools")?;
        self.state = SessionState::InFlight;

        let timeout = self.timeout;
        let outcome = match self.client.as_ref() {
            Some(client) => tokio::time::timeout(timeout, client.list_tools()).await,
            None => Ok(Err(self.missing_transport("list tools"))),
        };

        match outcome {
            Ok(Ok(tools)) => {
                debug!("Service {} advertised {} tools", self.config.name, tools.len());
                self.state = SessionState::Ready;
                Ok(tools)
            }
            Ok(Err(e)) => {
                self.state = SessionState::Failed;
                Err(e)
            }
            Err(_) => {
                self.state = SessionState::Failed;
                Err(self.timeout_error("tools/list"))
            }
        }
    }

    /// Call a tool with opaque arguments
    pub async fn call_tool(&mut self, tool: &str, arguments: Value) -> Result<InvocationResult> {
        self.ensure(SessionState::Ready, "call tool")?;
        self.state = SessionState::InFlight;
        debug!("Calling {} on service {}", tool, self.config.name);

        let timeout = self.timeout;
        let outcome = match self.client.as_ref() {
            Some(client) => tokio::time::timeout(timeout, client.call_tool(tool, arguments)).await,
            None => Ok(Err(self.missing_transport("call tool"))),
        };

        match outcome {
            Ok(Ok(result)) => {
                self.state = SessionState::Ready;
                Ok(InvocationResult::from_call(result))
            }
            Ok(Err(e)) => {
                self.state = SessionState::Failed;
                Err(e)
            }
            Err(_) => {
                self.state = SessionState::Failed;
                Err(self.timeout_error("tools/call"))
            }
        }
    }

    /// Release the transport; safe to call in any state and more than once
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        self.teardown().await;
        self.state = SessionState::Closed;
        debug!("Session with {} closed", self.config.name);
    }

    async fn teardown(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };

        match tokio::time::timeout(self.timeout, client.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Error closing session with {}: {}", self.config.name, e),
            Err(_) => warn!("Closing session with {} timed out", self.config.name),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Can't do async cleanup in drop; stdio children die via kill_on_drop
        if self.client.is_some() {
            warn!("Session with {} dropped without close", self.config.name);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.config.name)
            .field("state", &self.state)
            .field("open", &self.is_open())
            .finish()
    }
}
