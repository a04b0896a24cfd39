//! Service registry
//!
//! Maps service names to their connection parameters. Built once from the
//! secrets file and immutable afterwards.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::{Result, WorkspaceError};

/// Registry of configured services, ordered by name
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceConfig>,
}

impl ServiceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            services: BTreeMap::new(),
        }
    }

    /// Build a registry, rejecting duplicate names
    ///
    /// On a duplicate the whole batch is rejected and nothing is registered.
    pub fn register_all(&mut self, configs: impl IntoIterator<Item = ServiceConfig>) -> Result<()> {
        let mut staged = self.services.clone();

        for config in configs {
            if staged.contains_key(&config.name) {
                return Err(WorkspaceError::DuplicateService { name: config.name });
            }
            debug!("Registering service: {} ({})", config.name, config.transport);
            staged.insert(config.name.clone(), config);
        }

        self.services = staged;
        Ok(())
    }

    /// Convenience constructor around [`register_all`](Self::register_all)
    pub fn from_configs(configs: impl IntoIterator<Item = ServiceConfig>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register_all(configs)?;
        Ok(registry)
    }

    /// Resolve a service name to its config
    pub fn resolve(&self, name: &str) -> Result<&ServiceConfig> {
        self.services
            .get(name)
            .ok_or_else(|| WorkspaceError::UnknownService {
                name: name.to_string(),
                available: self.list_names(),
            })
    }

    /// Service names in lexicographic order
    pub fn list_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Service configs in lexicographic order of their names
    pub fn iter(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.values()
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;

    fn http(name: &str) -> ServiceConfig {
        ServiceConfig::new(name, format!("https://{}.example/mcp", name), TransportKind::Http)
    }

    #[test]
    fn test_registry_resolve() {
        let registry = ServiceRegistry::from_configs([http("weather"), http("maps")]).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("weather").unwrap(), &http("weather"));
        assert_eq!(registry.resolve("maps").unwrap(), &http("maps"));
    }

    #[test]
    fn test_registry_unknown_service() {
        let registry = ServiceRegistry::from_configs([http("weather")]).unwrap();

        let err = registry.resolve("unknownsvc").unwrap_err();
        match err {
            WorkspaceError::UnknownService { name, available } => {
                assert_eq!(name, "unknownsvc");
                assert_eq!(available, vec!["weather".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ServiceRegistry::new();
        let duplicate = http("weather").with_credential("other");

        let err = registry
            .register_all([http("weather"), http("maps"), duplicate])
            .unwrap_err();

        assert!(matches!(err, WorkspaceError::DuplicateService { ref name } if name == "weather"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_rejects_duplicates_across_batches() {
        let mut registry = ServiceRegistry::from_configs([http("weather")]).unwrap();
        assert!(registry.register_all([http("weather")]).is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("weather").unwrap().credential, "weather");
    }

    #[test]
    fn test_registry_list_names_sorted() {
        let registry =
            ServiceRegistry::from_configs([http("zeta"), http("alpha"), http("mid")]).unwrap();

        assert_eq!(registry.list_names(), vec!["alpha", "mid", "zeta"]);
        let iter_names: Vec<_> = registry.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(iter_names, vec!["alpha", "mid", "zeta"]);
    }
}
