//! Workspace facade used by the command layer
//!
//! Ties the secrets store, the service registry and the session adapter
//! together. All lookups (service, credential, argument shape) happen before
//! any connection is attempted.

use serde_json::Value;
use tracing::info;

use crate::adapter::SessionAdapter;
use crate::client::ToolDescriptor;
use crate::config::ServiceConfig;
use crate::error::{Result, WorkspaceError};
use crate::invocation::InvocationResult;
use crate::registry::ServiceRegistry;
use crate::secrets::{Credential, SecretsProvider, SecretsStore};

#[derive(Debug)]
pub struct Workspace {
    secrets: SecretsStore,
    registry: ServiceRegistry,
    adapter: SessionAdapter,
}

impl Workspace {
    /// Load secrets and build the registry
    pub fn load(provider: &SecretsProvider, adapter: SessionAdapter) -> Result<Self> {
        let secrets = provider.load()?;
        Self::from_parts(secrets, adapter)
    }

    pub fn from_parts(secrets: SecretsStore, adapter: SessionAdapter) -> Result<Self> {
        let registry = ServiceRegistry::from_configs(secrets.services().iter().cloned())?;
        if registry.is_empty() {
            return Err(WorkspaceError::configuration(
                secrets.path(),
                "no MCP services configured; add a [<name>_mcp] section",
            ));
        }

        Ok(Self {
            secrets,
            registry,
            adapter,
        })
    }

    pub fn secrets(&self) -> &SecretsStore {
        &self.secrets
    }

    /// Configured services in name order
    pub fn list_services(&self) -> Vec<&ServiceConfig> {
        self.registry.iter().collect()
    }

    fn resolve(&self, service: &str) -> Result<(&ServiceConfig, &Credential)> {
        let config = self.registry.resolve(service)?;
        let credential = self.secrets.lookup(&config.credential)?;
        Ok((config, credential))
    }

    /// Enumerate the tools a service currently advertises
    pub fn list_tools(&self, service: &str) -> Result<Vec<ToolDescriptor>> {
        let (config, credential) = self.resolve(service)?;
        info!("Listing tools of {}", config.name);
        self.adapter.list_tools(config, credential)
    }

    /// Invoke a tool; `arguments` must be a JSON object and is passed verbatim
    pub fn invoke(&self, service: &str, tool: &str, arguments: Value) -> Result<InvocationResult> {
        if !arguments.is_object() {
            return Err(WorkspaceError::InvalidArguments(
                "tool arguments must be a JSON object".to_string(),
            ));
        }

        let (config, credential) = self.resolve(service)?;
        info!("Invoking {} on {}", tool, config.name);
        self.adapter.call_tool(config, credential, tool, arguments)
    }
}
