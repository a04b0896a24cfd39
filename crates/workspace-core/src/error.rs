//! Error taxonomy for the workspace
//!
//! Every failure that can reach the command boundary is a [`WorkspaceError`].
//! Each variant maps to a stable [`ErrorKind`], which carries the tag used in
//! structured output and the process exit code.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Errors surfaced by the secrets provider, registry and session adapter
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Secrets file absent, malformed, or missing required fields
    #[error("configuration error in {}: {message}", path.display())]
    Configuration { path: PathBuf, message: String },

    /// Two service sections resolved to the same name
    #[error("service '{name}' is defined more than once")]
    DuplicateService { name: String },

    #[error("service '{name}' not found. Available: {}", display_names(available))]
    UnknownService { name: String, available: Vec<String> },

    /// Service is configured but its credential entry is missing
    #[error("no credential entry '{name}' in secrets store")]
    CredentialNotFound { name: String },

    #[error("failed to connect to service '{service}': {detail}")]
    Connection { service: String, detail: String },

    #[error("service '{service}' did not respond to {operation} within {after:?}")]
    Timeout {
        service: String,
        operation: &'static str,
        after: Duration,
    },

    /// The service reported a failure for a tool call; `message` is verbatim
    #[error("tool '{tool}' on service '{service}' failed: {message}")]
    RemoteTool {
        service: String,
        tool: String,
        message: String,
    },

    /// The service answered with something that is not valid MCP
    #[error("protocol error from service '{service}': {detail}")]
    Protocol { service: String, detail: String },

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

fn display_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Stable classification of a [`WorkspaceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    DuplicateService,
    UnknownService,
    CredentialNotFound,
    Connection,
    Timeout,
    RemoteTool,
    Protocol,
    InvalidArguments,
    InvalidState,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Machine-readable tag for structured output
    pub fn tag(self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::DuplicateService => "duplicate_service",
            Self::UnknownService => "unknown_service",
            Self::CredentialNotFound => "credential_not_found",
            Self::Connection => "connection_error",
            Self::Timeout => "timeout",
            Self::RemoteTool => "remote_tool_error",
            Self::Protocol => "protocol_error",
            Self::InvalidArguments => "invalid_arguments",
            Self::InvalidState => "invalid_state",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal_error",
        }
    }

    /// Process exit code for this kind; never zero
    pub fn exit_code(self) -> u8 {
        match self {
            Self::InvalidState | Self::Internal => 1,
            Self::Configuration => 2,
            Self::DuplicateService => 3,
            Self::UnknownService => 4,
            Self::CredentialNotFound => 5,
            Self::Connection | Self::Timeout => 6,
            Self::RemoteTool => 7,
            Self::Protocol => 8,
            Self::InvalidArguments => 9,
            Self::Cancelled => 130,
        }
    }
}

impl WorkspaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::DuplicateService { .. } => ErrorKind::DuplicateService,
            Self::UnknownService { .. } => ErrorKind::UnknownService,
            Self::CredentialNotFound { .. } => ErrorKind::CredentialNotFound,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RemoteTool { .. } => ErrorKind::RemoteTool,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn configuration(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn connection(service: &str, detail: impl std::fmt::Display) -> Self {
        Self::Connection {
            service: service.to_string(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn protocol(service: &str, detail: impl std::fmt::Display) -> Self {
        Self::Protocol {
            service: service.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_for_command_failures() {
        let kinds = [
            ErrorKind::Configuration,
            ErrorKind::UnknownService,
            ErrorKind::CredentialNotFound,
            ErrorKind::RemoteTool,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| k.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_precision() {
        let err = WorkspaceError::Timeout {
            service: "weather".into(),
            operation: "connect",
            after: Duration::from_millis(200),
        };
        assert_eq!(err.to_string(), "service 'weather' did not respond to connect within 200ms");

        let err = WorkspaceError::Timeout {
            service: "weather".into(),
            operation: "tools/call",
            after: Duration::from_secs(30),
        };
        assert!(err.to_string().ends_with("within 30s"));
    }

    #[test]
    fn test_unknown_service_lists_available() {
        let err = WorkspaceError::UnknownService {
            name: "nope".into(),
            available: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "service 'nope' not found. Available: a, b");

        let err = WorkspaceError::UnknownService {
            name: "nope".into(),
            available: vec![],
        };
        assert!(err.to_string().ends_with("Available: none"));
    }

    #[test]
    fn test_remote_tool_message_is_verbatim() {
        let err = WorkspaceError::RemoteTool {
            service: "weather".into(),
            tool: "getForecast".into(),
            message: "city not supported: Atlantis".into(),
        };
        assert_eq!(err.kind().tag(), "remote_tool_error");
        assert!(err.to_string().contains("city not supported: Atlantis"));
    }
}
