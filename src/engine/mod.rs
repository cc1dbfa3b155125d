//! Command execution pipeline
//!
//! request args -> [`arguments::merge`] -> [`runner::ProcessRunner`] ->
//! [`chain::ChainExecutor`] -> [`response::assemble`]

pub mod arguments;
pub mod chain;
pub mod registry;
pub mod response;
pub mod runner;

pub use arguments::{merge, MergeError, MergedArgs};
pub use chain::{ChainError, ChainExecutor, ChainOutcome, ExecutionRequest, StepFailure};
pub use registry::{Endpoint, EndpointTable, RegistryError};
pub use response::{assemble, from_chain_result, AssembledResponse};
pub use runner::{
    ExecutionResult, Invocation, ProcessRunner, TokioProcessRunner, DEFAULT_TIMEOUT_SECS,
    RUNNER_FAILURE_EXIT_CODE,
};
