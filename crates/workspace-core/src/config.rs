//! Service configuration parsing
//!
//! Service sections live in the secrets file next to the credentials they
//! reference. A section is turned into an immutable [`ServiceConfig`] here;
//! credential values themselves stay in the secrets store.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};

/// Suffix marking a top-level table as a service section
pub const SERVICE_SECTION_SUFFIX: &str = "_mcp";

/// Environment variable used to hand the credential to stdio services
pub const DEFAULT_CREDENTIAL_ENV: &str = "MCP_API_KEY";

/// Header used to send the credential to HTTP services
pub const DEFAULT_AUTH_HEADER: &str = "Authorization";

fn default_timeout() -> u64 {
    30
}

/// How the workspace talks to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC
    Stdio,
    /// Streamable HTTP endpoint
    #[serde(rename = "streamable_http")]
    Http,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "streamable_http" | "streamable-http" | "streamablehttp" => Ok(Self::Http),
            other => Err(format!(
                "unsupported transport '{}' (expected stdio or streamable_http)",
                other
            )),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("streamable_http"),
        }
    }
}

/// Connection parameters for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceConfig {
    /// Unique service name
    pub name: String,
    /// URL for HTTP services, executable for stdio services
    pub endpoint: String,
    /// Name of the credential entry in the secrets store
    pub credential: String,
    pub transport: TransportKind,
    /// Extra arguments for stdio services
    pub args: Vec<String>,
    /// Extra environment for stdio services
    pub env: HashMap<String, String>,
    /// Environment variable carrying the credential (stdio)
    pub credential_env: String,
    /// Header carrying the credential (HTTP)
    pub auth_header: String,
    /// Timeout for connecting and for each request
    pub timeout_secs: u64,
}

impl ServiceConfig {
    /// Create a config whose credential entry shares the service name
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        transport: TransportKind,
    ) -> Self {
        let name = name.into();
        Self {
            credential: name.clone(),
            name,
            endpoint: endpoint.into(),
            transport,
            args: Vec::new(),
            env: HashMap::new(),
            credential_env: DEFAULT_CREDENTIAL_ENV.to_string(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            timeout_secs: default_timeout(),
        }
    }

    /// Reference a different credential entry
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A service table as written in the secrets file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceSection {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub auth_header: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ServiceSection {
    /// Service name: explicit `service_name`, else the table key minus `_mcp`
    pub fn resolved_name(&self, key: &str) -> String {
        match &self.service_name {
            Some(name) => name.trim().to_string(),
            None => key
                .strip_suffix(SERVICE_SECTION_SUFFIX)
                .unwrap_or(key)
                .to_string(),
        }
    }

    /// Validate required fields and build the immutable config
    pub fn into_config(self, key: &str, path: &Path) -> Result<ServiceConfig> {
        let name = self.resolved_name(key);
        if name.is_empty() {
            return Err(WorkspaceError::configuration(
                path,
                format!("[{}] has an empty service name", key),
            ));
        }

        let transport_raw = self.transport.as_deref().ok_or_else(|| {
            WorkspaceError::configuration(
                path,
                format!("[{}] is missing required field `transport`", key),
            )
        })?;
        let transport = transport_raw
            .parse::<TransportKind>()
            .map_err(|e| WorkspaceError::configuration(path, format!("[{}] {}", key, e)))?;

        let endpoint = match transport {
            TransportKind::Http => self.url,
            TransportKind::Stdio => self.command.or(self.url),
        };
        let field = match transport {
            TransportKind::Http => "url",
            TransportKind::Stdio => "command",
        };
        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                WorkspaceError::configuration(
                    path,
                    format!("[{}] is missing required field `{}`", key, field),
                )
            })?;

        let expand = |value: &str| {
            expand_env_string(value)
                .map_err(|e| WorkspaceError::configuration(path, format!("[{}] {}", key, e)))
        };

        let mut env = HashMap::with_capacity(self.env.len());
        for (k, v) in &self.env {
            env.insert(k.clone(), expand(v)?);
        }
        let args = self
            .args
            .iter()
            .map(|a| expand(a))
            .collect::<Result<Vec<_>>>()?;

        Ok(ServiceConfig {
            credential: self.credential.unwrap_or_else(|| name.clone()),
            endpoint: expand(&endpoint)?,
            name,
            transport,
            args,
            env,
            credential_env: self
                .credential_env
                .unwrap_or_else(|| DEFAULT_CREDENTIAL_ENV.to_string()),
            auth_header: self
                .auth_header
                .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string()),
            timeout_secs: self.timeout_secs.unwrap_or_else(default_timeout).max(1),
        })
    }
}

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

/// Expand ${VAR} patterns in a string using environment variables
pub fn expand_env_string(s: &str) -> std::result::Result<String, String> {
    let mut result = s.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(s) {
        let var_name = &cap[1];
        let var_value = std::env::var(var_name)
            .map_err(|_| format!("environment variable {} not set", var_name))?;
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
