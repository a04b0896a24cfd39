//! Synchronous boundary around MCP sessions
//!
//! [`SessionAdapter`] runs one complete session lifecycle (open, operate,
//! close) inside a single blocking call on a current-thread runtime. The
//! session is closed on every exit path: success, remote error, local error
//! and cancellation. Nothing survives the call.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ToolDescriptor;
use crate::config::ServiceConfig;
use crate::error::{Result, WorkspaceError};
use crate::invocation::InvocationResult;
use crate::secrets::Credential;
use crate::session::Session;
use crate::transport::{Connector, TransportConnector};

/// Blocking, one-session-per-call front end for the async protocol
pub struct SessionAdapter {
    runtime: Runtime,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    watch_interrupts: bool,
    timeout_override: Option<Duration>,
}

impl SessionAdapter {
    /// Adapter using the real stdio and HTTP transports
    pub fn new() -> Result<Self> {
        Self::with_connector(TransportConnector)
    }

    /// Adapter using a custom connector
    pub fn with_connector(connector: impl Connector + 'static) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WorkspaceError::Internal(format!("failed to start runtime: {}", e)))?;

        Ok(Self {
            runtime,
            connector: Arc::new(connector),
            cancel: CancellationToken::new(),
            watch_interrupts: false,
            timeout_override: None,
        })
    }

    /// Treat Ctrl-C as cancellation of the running session
    pub fn watch_interrupts(mut self, enabled: bool) -> Self {
        self.watch_interrupts = enabled;
        self
    }

    /// Override every service's configured timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_override = timeout;
        self
    }

    /// Token that cancels the running session (and any later one)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open a session, run `op` on it and close it, blocking until done
    pub fn with_session<T, F>(&self, config: &ServiceConfig, credential: &Credential, op: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
    {
        let timeout = self.timeout_override.unwrap_or_else(|| config.timeout());

        self.runtime.block_on(async {
            let mut session = Session::new(config, timeout);
            let outcome = self.drive(&mut session, credential, op).await;
            session.close().await;

            if let Err(e) = &outcome {
                debug!("Session with {} ended with {}", config.name, e.kind().tag());
            }
            outcome
        })
    }

    async fn drive<T, F>(&self, session: &mut Session, credential: &Credential, op: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
    {
        let interrupted = self.interrupted();
        tokio::pin!(interrupted);

        tokio::select! {
            biased;
            _ = &mut interrupted => return Err(WorkspaceError::Cancelled),
            opened = session.open(self.connector.as_ref(), credential) => opened?,
        }

        tokio::select! {
            biased;
            _ = &mut interrupted => Err(WorkspaceError::Cancelled),
            result = op(session) => result,
        }
    }

    /// Resolves once the token is cancelled or, if watched, Ctrl-C arrives
    async fn interrupted(&self) {
        if !self.watch_interrupts {
            self.cancel.cancelled().await;
            return;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("Interrupted, closing session");
                    self.cancel.cancel();
                }
                Err(e) => {
                    debug!("Cannot listen for Ctrl-C: {}", e);
                    self.cancel.cancelled().await;
                }
            },
        }
    }

    /// List the tools of one service
    pub fn list_tools(&self, config: &ServiceConfig, credential: &Credential) -> Result<Vec<ToolDescriptor>> {
        self.with_session(config, credential, |session| Box::pin(session.list_tools()))
    }

    /// Call one tool of one service
    pub fn call_tool(
        &self,
        config: &ServiceConfig,
        credential: &Credential,
        tool: &str,
        arguments: Value,
    ) -> Result<InvocationResult> {
        let tool = tool.to_string();
        self.with_session(config, credential, move |session| {
            Box::pin(async move { session.call_tool(&tool, arguments).await })
        })
    }
}

impl std::fmt::Debug for SessionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAdapter")
            .field("watch_interrupts", &self.watch_interrupts)
            .field("timeout_override", &self.timeout_override)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
