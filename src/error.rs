use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ShellApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShellApiError>;
