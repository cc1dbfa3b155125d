//! Command Chain Executor
//!
//! Runs an endpoint's steps strictly in order. The first failing step ends
//! the chain; capturing steps contribute their stdout to the report and
//! every step's stderr goes to the error trace.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::arguments::{self, MergeError};
use super::runner::{
    ExecutionResult, Invocation, ProcessRunner, TokioProcessRunner, DEFAULT_TIMEOUT_SECS,
};
use crate::config::CommandSpec;

/// Per-call request body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub args: Vec<String>,

    /// Seconds allowed for each process run
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Base64-decode file contents before writing them
    #[serde(default, alias = "decode_base64")]
    pub decode64: bool,

    /// Reparse the report as JSON and return it as the body
    #[serde(default)]
    pub return_json: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ExecutionRequest {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            decode64: false,
            return_json: false,
        }
    }
}

impl ExecutionRequest {
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Errors caused by the shape of the request; these never reach a process
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("timeout must be a positive number of seconds")]
    InvalidTimeout,

    #[error(transparent)]
    Arguments(#[from] MergeError),
}

/// Details of the step that stopped the chain
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    /// Full argv of the failing step
    pub command: Vec<String>,
    pub error: Option<String>,
    /// Stdout of the failing step, if it produced any
    pub report: Option<String>,
    /// Report accumulated from earlier capturing steps
    pub previous: String,
    pub exit_code: i32,
}

/// Terminal state of one chain run
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub report: String,
    pub errors: String,
    /// Argv of the last step that ran a process
    pub last_command: Vec<String>,
    pub last_result: Option<ExecutionResult>,
    pub failure: Option<StepFailure>,
}

impl ChainOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Default)]
struct ChainState {
    report: Vec<String>,
    errors: Vec<String>,
    last_command: Vec<String>,
    last_result: Option<ExecutionResult>,
}

impl ChainState {
    fn record_stderr(&mut self, stderr: Option<&str>) {
        if let Some(stderr) = stderr.filter(|s| !s.is_empty()) {
            self.errors.push(stderr.to_string());
        }
    }

    fn fail(self, failure: StepFailure) -> ChainOutcome {
        ChainOutcome {
            report: self.report.join("\n"),
            errors: self.errors.join("\n"),
            last_command: self.last_command,
            last_result: self.last_result,
            failure: Some(failure),
        }
    }

    fn finish(self) -> ChainOutcome {
        ChainOutcome {
            report: self.report.join("\n"),
            errors: self.errors.join("\n"),
            last_command: self.last_command,
            last_result: self.last_result,
            failure: None,
        }
    }
}

/// Sequences the steps of one endpoint
#[derive(Clone)]
pub struct ChainExecutor {
    runner: Arc<dyn ProcessRunner>,
}

impl Default for ChainExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TokioProcessRunner))
    }
}

impl ChainExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub async fn execute(
        &self,
        chain: &[CommandSpec],
        request: &ExecutionRequest,
    ) -> Result<ChainOutcome, ChainError> {
        if request.timeout == 0 {
            return Err(ChainError::InvalidTimeout);
        }

        let mut state = ChainState::default();
        let mut remaining: &[String] = &request.args;

        for (index, step) in chain.iter().enumerate() {
            let merged = match arguments::merge(step, remaining, request.decode64).await {
                Ok(merged) => merged,
                Err(e) if e.is_request_error() => return Err(e.into()),
                Err(e) => {
                    warn!("Step {} failed before running: {}", index, e);
                    let message = e.to_string();
                    state.errors.push(message.clone());
                    let previous = state.report.join("\n");
                    return Ok(state.fail(StepFailure {
                        command: step.command.clone(),
                        error: Some(message),
                        report: None,
                        previous,
                        exit_code: super::runner::RUNNER_FAILURE_EXIT_CODE,
                    }));
                }
            };
            remaining = &remaining[merged.consumed..];

            if step.is_file_write_only() {
                debug!("Step {} wrote {} file(s), nothing to run", index, merged.consumed);
                continue;
            }

            let invocation = Invocation {
                program: step.command[0].clone(),
                args: step.command[1..]
                    .iter()
                    .cloned()
                    .chain(merged.args)
                    .collect(),
                working_dir: step.working_dir.clone(),
            };
            let argv = invocation.argv();

            let result = self.runner.run(&invocation, request.timeout).await;
            state.record_stderr(result.stderr.as_deref());

            if !result.succeeded() {
                info!(
                    step = index,
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    "Chain stopped at failing step"
                );
                let previous = state.report.join("\n");
                let failure = StepFailure {
                    command: argv.clone(),
                    error: result.stderr.clone(),
                    report: result.stdout.clone(),
                    previous,
                    exit_code: result.exit_code,
                };
                state.last_command = argv;
                state.last_result = Some(result);
                return Ok(state.fail(failure));
            }

            if step.captures_output {
                state.report.push(result.stdout.clone().unwrap_or_default());
            }
            state.last_command = argv;
            state.last_result = Some(result);
        }

        Ok(state.finish())
    }
}
