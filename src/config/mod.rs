//! Command file configuration
//!
//! The YAML file maps URL paths to a single command or a chain of commands.
//! Both shapes are normalized into `Vec<CommandSpec>` here so the engine
//! only ever sees one representation.

pub mod loader;
pub mod types;

pub use loader::CommandFileLoader;
pub use types::{CommandConfig, CommandFile, CommandLine, CommandSpec, EndpointConfig};

/// Errors raised while reading or normalizing the command file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Commands file does not exist at {0}")]
    NotFound(String),

    #[error("Failed to read command file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse command file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Endpoint '{0}' has an empty command chain")]
    EmptyChain(String),
}
