use std::path::Path;
use tracing::{debug, info};

use super::types::CommandFile;
use super::ConfigError;

/// Loader for the YAML command file
pub struct CommandFileLoader;

impl CommandFileLoader {
    /// Read and parse the command file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<CommandFile, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        if !path.is_file() {
            return Err(ConfigError::NotFound(path_str));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path_str.clone(),
            source: e,
        })?;

        let file = Self::parse(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path_str.clone(),
                message,
            },
            other => other,
        })?;

        info!("Loaded {} endpoint(s) from {}", file.len(), path_str);
        Ok(file)
    }

    /// Parse command file contents that did not come from disk.
    pub fn parse(contents: &str) -> Result<CommandFile, ConfigError> {
        // An empty document is an empty mapping, not an error
        if contents.trim().is_empty() {
            debug!("Command file is empty");
            return Ok(CommandFile::new());
        }

        serde_yaml_ng::from_str(contents).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }
}
