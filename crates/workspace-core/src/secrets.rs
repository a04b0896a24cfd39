//! Secrets provider
//!
//! Loads the workspace secrets file (TOML) once per process. The file holds
//! the primary API key, shared credential entries and the service sections:
//!
//! ```toml
//! [openai]
//! api_key = "sk-..."
//!
//! [credentials]
//! shared = "token"
//!
//! [weather_mcp]
//! service_name = "weather"
//! transport = "streamable_http"
//! url = "https://weather.example/mcp"
//! api_key = "..."
//! ```
//!
//! Credential values never appear in logs or `Debug` output.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ServiceConfig, ServiceSection, SERVICE_SECTION_SUFFIX};
use crate::error::{Result, WorkspaceError};

/// Environment variable that overrides the secrets file location
pub const SECRETS_ENV_VAR: &str = "TIANGONG_SECRETS";

/// Section holding the primary API key
pub const PRIMARY_SECTION: &str = "openai";

const CREDENTIALS_SECTION: &str = "credentials";
const SERVICES_SECTION: &str = "services";

/// Opaque secret material
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value; callers must not log it
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Locates and reads the secrets file
#[derive(Debug, Clone)]
pub struct SecretsProvider {
    path: PathBuf,
}

impl SecretsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the secrets path: explicit path, `TIANGONG_SECRETS`,
    /// `./.secrets/secrets.toml`, then the platform config directory.
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        if let Some(path) = explicit {
            return Self::new(path);
        }
        if let Some(path) = std::env::var_os(SECRETS_ENV_VAR).filter(|v| !v.is_empty()) {
            return Self::new(path);
        }

        let local = PathBuf::from(".secrets").join("secrets.toml");
        if local.exists() {
            return Self::new(local);
        }

        if let Some(global) = dirs::config_dir().map(|d| d.join("tiangong").join("secrets.toml")) {
            if global.exists() {
                return Self::new(global);
            }
        }

        Self::new(local)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the secrets file
    pub fn load(&self) -> Result<SecretsStore> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WorkspaceError::configuration(&self.path, "secrets file not found")
            } else {
                WorkspaceError::configuration(&self.path, format!("failed to read: {}", e))
            }
        })?;

        SecretsStore::parse(&self.path, &content)
    }
}

/// Read-only view of the loaded secrets file
pub struct SecretsStore {
    path: PathBuf,
    primary: Option<Credential>,
    credentials: BTreeMap<String, Credential>,
    services: Vec<ServiceConfig>,
}

impl SecretsStore {
    /// Parse a secrets document; `path` is only used for error messages
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let document: toml::Table = toml::from_str(content)
            .map_err(|e| WorkspaceError::configuration(path, format!("invalid TOML: {}", e)))?;

        let mut primary = None;
        let mut credentials = BTreeMap::new();
        let mut sections: Vec<(String, ServiceSection)> = Vec::new();

        for (key, value) in document {
            if key == PRIMARY_SECTION {
                primary = parse_primary(path, value)?;
            } else if key == CREDENTIALS_SECTION {
                parse_credentials(path, value, &mut credentials)?;
            } else if key == SERVICES_SECTION {
                let table = into_table(path, &key, value)?;
                for (name, section) in table {
                    let section = parse_section(path, &format!("services.{}", name), section)?;
                    sections.push((name, section));
                }
            } else if key.ends_with(SERVICE_SECTION_SUFFIX) {
                let section = parse_section(path, &key, value)?;
                sections.push((key, section));
            } else {
                debug!("Ignoring secrets section [{}]", key);
            }
        }

        let mut services = Vec::with_capacity(sections.len());
        let mut service_keys = HashSet::new();
        for (key, mut section) in sections {
            let name = section.resolved_name(&key);
            if let Some(api_key) = section.api_key.take().filter(|k| !k.trim().is_empty()) {
                if let Some(credential) = section.credential.as_deref().filter(|c| *c != name) {
                    return Err(WorkspaceError::configuration(
                        path,
                        format!(
                            "[{}] sets api_key and also references credential '{}'; use one",
                            key, credential
                        ),
                    ));
                }
                // A second section with the same name is rejected by the registry
                if service_keys.insert(name.clone()) {
                    if credentials.contains_key(&name) {
                        return Err(WorkspaceError::configuration(
                            path,
                            format!(
                                "credential '{}' is set both in [{}] and [{}]",
                                name, CREDENTIALS_SECTION, key
                            ),
                        ));
                    }
                    credentials.insert(name, Credential::new(api_key));
                }
            }
            services.push(section.into_config(&key, path)?);
        }

        debug!(
            "Loaded secrets from {}: {} services, {} credential entries",
            path.display(),
            services.len(),
            credentials.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            primary,
            credentials,
            services,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Primary API key from the `[openai]` section
    pub fn primary_api_key(&self) -> Option<&Credential> {
        self.primary.as_ref()
    }

    /// Look up the credential entry with the given name
    pub fn lookup(&self, name: &str) -> Result<&Credential> {
        self.credentials
            .get(name)
            .ok_or_else(|| WorkspaceError::CredentialNotFound {
                name: name.to_string(),
            })
    }

    /// Service configs ordered by section key
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }
}

impl fmt::Debug for SecretsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsStore")
            .field("path", &self.path)
            .field("primary", &self.primary.is_some())
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .field("services", &self.services.len())
            .finish()
    }
}

fn into_table(path: &Path, key: &str, value: toml::Value) -> Result<toml::Table> {
    match value {
        toml::Value::Table(table) => Ok(table),
        other => Err(WorkspaceError::configuration(
            path,
            format!("[{}] must be a table, found {}", key, other.type_str()),
        )),
    }
}

fn parse_section(path: &Path, key: &str, value: toml::Value) -> Result<ServiceSection> {
    let table = into_table(path, key, value)?;
    toml::Value::Table(table)
        .try_into()
        .map_err(|e| WorkspaceError::configuration(path, format!("[{}] {}", key, e)))
}

fn parse_primary(path: &Path, value: toml::Value) -> Result<Option<Credential>> {
    let table = into_table(path, PRIMARY_SECTION, value)?;
    match table.get("api_key") {
        None => Ok(None),
        Some(toml::Value::String(key)) if key.trim().is_empty() => Ok(None),
        Some(toml::Value::String(key)) => Ok(Some(Credential::new(key.clone()))),
        Some(_) => Err(WorkspaceError::configuration(
            path,
            format!("[{}] api_key must be a string", PRIMARY_SECTION),
        )),
    }
}

fn parse_credentials(
    path: &Path,
    value: toml::Value,
    credentials: &mut BTreeMap<String, Credential>,
) -> Result<()> {
    let table = into_table(path, CREDENTIALS_SECTION, value)?;
    for (name, entry) in table {
        match entry {
            toml::Value::String(secret) if secret.trim().is_empty() => {
                debug!("Skipping empty credential entry '{}'", name);
            }
            toml::Value::String(secret) => {
                credentials.insert(name, Credential::new(secret));
            }
            _ => {
                return Err(WorkspaceError::configuration(
                    path,
                    format!("[{}] entry '{}' must be a string", CREDENTIALS_SECTION, name),
                ))
            }
        }
    }
    Ok(())
}
