use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::ConfigError;

/// Root of the command file: URL path -> one command or a chain of them.
pub type CommandFile = BTreeMap<String, EndpointConfig>;

/// An endpoint entry as written in YAML.
///
/// Resolved once at load time by [`EndpointConfig::into_chain`]; nothing
/// downstream looks at the shape again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointConfig {
    Chain(Vec<CommandConfig>),
    Single(CommandConfig),
}

/// The `command` key accepts either a whitespace/shell-quoted string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Words(Vec<String>),
    Line(String),
}

/// A single command entry as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Executable plus fixed arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandLine>,

    /// Directory the process is spawned in, and where `files` are written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub prepend_args: Vec<String>,

    #[serde(default)]
    pub append_args: Vec<String>,

    /// Ignore request arguments entirely
    #[serde(default, rename = "static")]
    pub is_static: bool,

    /// Whether stdout of this step is part of the returned report
    #[serde(default = "default_capture")]
    pub capture_output: bool,

    /// Filenames filled from the leading request arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

fn default_capture() -> bool {
    true
}

/// Normalized command step. Immutable once the endpoint table is built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandSpec {
    /// Executable and fixed arguments; empty for a file-write-only step
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub prepend_args: Vec<String>,
    pub append_args: Vec<String>,
    pub is_static: bool,
    pub captures_output: bool,
    pub file_targets: Vec<String>,
}

impl CommandSpec {
    /// A plain command with output capture on, as a single-entry config would produce.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            captures_output: true,
            ..Self::default()
        }
    }

    pub fn is_file_write(&self) -> bool {
        !self.file_targets.is_empty()
    }

    /// True when the step only materializes files and has no process to run.
    pub fn is_file_write_only(&self) -> bool {
        self.command.is_empty()
    }
}

impl CommandLine {
    fn into_words(self) -> Result<Vec<String>, ConfigError> {
        match self {
            CommandLine::Words(words) => Ok(words),
            CommandLine::Line(line) => shell_words::split(&line).map_err(|e| {
                ConfigError::InvalidCommand(format!("cannot split '{line}': {e}"))
            }),
        }
    }
}

impl CommandConfig {
    /// Validate and normalize one entry. `index` is only used in messages.
    pub fn into_spec(self, path: &str, index: usize) -> Result<CommandSpec, ConfigError> {
        let command = match self.command {
            Some(line) => line.into_words()?,
            None => Vec::new(),
        };
        let file_targets = self.files.unwrap_or_default();

        if command.is_empty() && file_targets.is_empty() {
            return Err(ConfigError::InvalidCommand(format!(
                "step {index} of endpoint '{path}' has neither a command nor files"
            )));
        }

        if let Some(name) = file_targets.iter().find(|name| name.trim().is_empty()) {
            return Err(ConfigError::InvalidCommand(format!(
                "step {index} of endpoint '{path}' has an empty file name '{name}'"
            )));
        }

        Ok(CommandSpec {
            command,
            working_dir: self.working_dir.map(PathBuf::from),
            prepend_args: self.prepend_args,
            append_args: self.append_args,
            is_static: self.is_static,
            captures_output: self.capture_output,
            file_targets,
        })
    }
}

impl EndpointConfig {
    /// Resolve either shape into an ordered chain of normalized steps.
    pub fn into_chain(self, path: &str) -> Result<Vec<CommandSpec>, ConfigError> {
        let entries = match self {
            EndpointConfig::Single(entry) => vec![entry],
            EndpointConfig::Chain(entries) => entries,
        };

        if entries.is_empty() {
            return Err(ConfigError::EmptyChain(path.to_string()));
        }

        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry.into_spec(path, index))
            .collect()
    }
}
