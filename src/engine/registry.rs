//! Endpoint registration table
//!
//! Built once at startup and then only read. Shared between request tasks
//! through an `Arc`, so no lock is needed.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

use crate::config::{CommandFile, CommandFileLoader, CommandSpec, ConfigError};

/// A registered endpoint: one URL path and its ordered command chain
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub path: String,
    pub chain: Vec<CommandSpec>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to register command, {0} is already mapped")]
    DuplicateEndpoint(String),

    #[error("Invalid endpoint path '{0}'")]
    InvalidPath(String),
}

/// Immutable-after-startup map from URL path to command chain
#[derive(Debug, Default)]
pub struct EndpointTable {
    endpoints: BTreeMap<String, Endpoint>,
}

/// Paths are stored with exactly one leading slash.
///
/// `:` and `*` are route captures to the router, so paths containing them
/// are rejected rather than registered as wildcards.
pub fn normalize_path(path: &str) -> Result<String, RegistryError> {
    let trimmed = path.trim();
    let stripped = trimmed.trim_start_matches('/');
    if stripped.is_empty() || stripped.contains([':', '*']) {
        return Err(RegistryError::InvalidPath(path.to_string()));
    }
    Ok(format!("/{stripped}"))
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain under `path`. An existing registration is never replaced.
    pub fn register(&mut self, path: &str, chain: Vec<CommandSpec>) -> Result<(), RegistryError> {
        let path = normalize_path(path)?;

        if self.endpoints.contains_key(&path) {
            return Err(RegistryError::DuplicateEndpoint(path));
        }

        info!(endpoint = %path, steps = chain.len(), "Registering endpoint");
        self.endpoints.insert(path.clone(), Endpoint { path, chain });
        Ok(())
    }

    /// Build the table from a parsed command file.
    ///
    /// Shape and content errors abort the load. Duplicate paths (e.g. `run`
    /// and `/run`) are logged and the first registration is kept.
    pub fn from_config(file: CommandFile) -> Result<Self, ConfigError> {
        let mut table = Self::new();

        for (path, entry) in file {
            let chain = entry.into_chain(&path)?;
            match table.register(&path, chain) {
                Ok(()) => {}
                Err(RegistryError::DuplicateEndpoint(existing)) => {
                    error!(
                        endpoint = %existing,
                        "Failed to register command, endpoint already mapped"
                    );
                }
                Err(RegistryError::InvalidPath(bad)) => {
                    return Err(ConfigError::InvalidCommand(format!(
                        "endpoint path '{bad}' is not a usable URL path"
                    )));
                }
            }
        }

        Ok(table)
    }

    /// Read the command file at `path` and build the table from it
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = CommandFileLoader::load(path)?;
        Ok(Self::from_config(file)?)
    }

    pub fn get(&self, path: &str) -> Option<&Endpoint> {
        self.endpoints.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
