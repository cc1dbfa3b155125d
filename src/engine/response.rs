use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use tracing::{debug, error};

use super::chain::{ChainError, ChainOutcome};

/// Body returned when a step fails
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureBody {
    pub command: Vec<String>,
    pub error: Option<String>,
    pub report: Option<String>,
    pub previous: String,
}

/// Body returned for a successful raw-text run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBody {
    pub command: Vec<String>,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Status code plus JSON body, ready to hand to axum
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl AssembledResponse {
    fn new(status: StatusCode, body: impl Serialize) -> Self {
        let body = serde_json::to_value(body).unwrap_or_else(|e| {
            error!("Failed to serialize response body: {}", e);
            Value::Null
        });
        Self { status, body }
    }

    /// 400 with `{error}`
    pub fn request_error(message: impl Display) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: message.to_string(),
            },
        )
    }
}

impl IntoResponse for AssembledResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Turn a finished chain into the HTTP response.
///
/// With `return_structured` the report must be a JSON object; its keys
/// become the top-level keys of the response body.
pub fn assemble(outcome: &ChainOutcome, return_structured: bool) -> AssembledResponse {
    if let Some(failure) = &outcome.failure {
        return AssembledResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            FailureBody {
                command: failure.command.clone(),
                error: failure.error.clone(),
                report: failure.report.clone(),
                previous: failure.previous.clone(),
            },
        );
    }

    if !return_structured {
        return AssembledResponse::new(
            StatusCode::OK,
            ReportBody {
                command: outcome.last_command.clone(),
                report: outcome.report.clone(),
            },
        );
    }

    match serde_json::from_str::<Value>(&outcome.report) {
        Ok(Value::Object(map)) => {
            debug!("Returning structured report with {} key(s)", map.len());
            AssembledResponse {
                status: StatusCode::OK,
                body: Value::Object(map),
            }
        }
        Ok(other) => AssembledResponse::request_error(format!(
            "Command report is not a JSON object (got {})",
            json_kind(&other)
        )),
        Err(e) => {
            error!("Command report is not a json string: {}", e);
            AssembledResponse::request_error(format!("Command report is not valid JSON: {e}"))
        }
    }
}

/// Full translation from a chain run (or its request error) to a response
pub fn from_chain_result(
    result: Result<ChainOutcome, ChainError>,
    return_structured: bool,
) -> AssembledResponse {
    match result {
        Ok(outcome) => assemble(&outcome, return_structured),
        Err(e) => AssembledResponse::request_error(e),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
