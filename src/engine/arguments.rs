//! Argument Merger
//!
//! Turns a configured step plus the request's arguments into the final
//! argument list. File-write steps first consume leading request arguments
//! and write them to disk; whatever remains is used for substitution.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use tracing::debug;

use crate::config::CommandSpec;

/// Result of merging one step's arguments
#[derive(Debug, Clone, PartialEq)]
pub struct MergedArgs {
    /// Arguments that follow the configured executable and fixed args
    pub args: Vec<String>,
    /// How many request arguments were used up as file contents
    pub consumed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error(
        "missing content for file '{filename}': expected {expected} argument(s), got {provided}"
    )]
    MissingFileContent {
        filename: String,
        expected: usize,
        provided: usize,
    },

    #[error("content for file '{filename}' is not valid base64: {reason}")]
    InvalidBase64 { filename: String, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    /// Errors caused by what the caller sent, as opposed to the host
    pub fn is_request_error(&self) -> bool {
        !matches!(self, MergeError::Io { .. })
    }
}

/// Merge `request_args` into `spec`, writing any file targets first.
///
/// The writes are performed unconditionally; there is no dry-run.
pub async fn merge(
    spec: &CommandSpec,
    request_args: &[String],
    decode_base64: bool,
) -> Result<MergedArgs, MergeError> {
    let consumed = spec.file_targets.len();

    if consumed > 0 {
        if request_args.len() < consumed {
            return Err(MergeError::MissingFileContent {
                filename: spec.file_targets[request_args.len()].clone(),
                expected: consumed,
                provided: request_args.len(),
            });
        }

        // Decode everything before touching the disk so a bad payload
        // doesn't leave a half-written set of files behind.
        let mut contents = Vec::with_capacity(consumed);
        for (filename, raw) in spec.file_targets.iter().zip(request_args) {
            contents.push(decode_content(filename, raw, decode_base64)?);
        }

        for (filename, bytes) in spec.file_targets.iter().zip(contents) {
            let path = target_path(spec, filename);
            debug!("Writing {} bytes to {}", bytes.len(), path.display());
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|source| MergeError::Io { path, source })?;
        }
    }

    let remaining = &request_args[consumed..];

    let mut args =
        Vec::with_capacity(spec.prepend_args.len() + remaining.len() + spec.append_args.len());
    args.extend(spec.prepend_args.iter().cloned());
    if !spec.is_static {
        args.extend(remaining.iter().cloned());
    }
    args.extend(spec.append_args.iter().cloned());

    Ok(MergedArgs { args, consumed })
}

fn decode_content(filename: &str, raw: &str, decode_base64: bool) -> Result<Vec<u8>, MergeError> {
    if !decode_base64 {
        return Ok(raw.as_bytes().to_vec());
    }

    STANDARD
        .decode(raw.trim())
        .map_err(|e| MergeError::InvalidBase64 {
            filename: filename.to_string(),
            reason: e.to_string(),
        })
}

fn target_path(spec: &CommandSpec, filename: &str) -> PathBuf {
    match &spec.working_dir {
        Some(dir) => dir.join(filename),
        None => PathBuf::from(filename),
    }
}
