//! workspace-core: MCP service access for the tiangong workspace
//!
//! Provides:
//! - Secrets loading (secrets.toml) with typed credential lookup
//! - Service registry with deterministic ordering
//! - MCP transports (stdio, streamable HTTP) and protocol client
//! - Synchronous session adapter with guaranteed teardown

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod invocation;
pub mod registry;
pub mod secrets;
pub mod session;
pub mod transport;
pub mod workspace;

pub use adapter::SessionAdapter;
pub use client::{ServerInfo, ToolDescriptor};
pub use config::{ServiceConfig, TransportKind};
pub use error::{ErrorKind, Result, WorkspaceError};
pub use invocation::{InvocationError, InvocationResult, InvocationStatus};
pub use registry::ServiceRegistry;
pub use secrets::{Credential, SecretsProvider, SecretsStore};
pub use session::{Session, SessionState};
pub use transport::{Connector, JsonRpcRequest, JsonRpcResponse, McpTransport, TransportConnector, TransportError};
pub use workspace::Workspace;
