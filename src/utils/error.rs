//! Error types and handling
//!
//! Closed error kinds for the session control surface, so callers can branch
//! on cause without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recorder::state::StopReport;

/// Failure to bring up one capture process
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The OS could not start the process at all
    #[error("failed to spawn capture process: {0}")]
    Spawn(#[from] std::io::Error),

    /// The process started but was already dead when first observed
    #[error("capture process exited immediately with {status}: {stderr}")]
    ImmediateExit {
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Errors returned by `SessionController::start`
#[derive(Error, Debug)]
pub enum StartError {
    #[error("a recording session is already active")]
    AlreadyActive,

    #[error("another session operation is in progress")]
    OperationInProgress,

    /// Single-stream launch failure; carries the underlying process error
    #[error("failed to launch capture stream: {0}")]
    Launch(#[source] SpawnError),

    /// Every configured stream failed to launch
    #[error("all configured streams failed to launch")]
    AllStreamsFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StartError {
    pub fn code(&self) -> &'static str {
        match self {
            StartError::AlreadyActive => "ALREADY_ACTIVE",
            StartError::OperationInProgress => "OPERATION_IN_PROGRESS",
            StartError::Launch(_) => "LAUNCH_FAILURE",
            StartError::AllStreamsFailed => "ALL_STREAMS_FAILED",
            StartError::Io(_) => "IO_ERROR",
        }
    }
}

/// Errors returned by `SessionController::stop`
///
/// Stop never fails because a stream needed the forced-kill path; escalations
/// are reported in [`StopReport`] instead.
#[derive(Error, Debug)]
pub enum StopError {
    #[error("another session operation is in progress")]
    OperationInProgress,
}

impl StopError {
    pub fn code(&self) -> &'static str {
        match self {
            StopError::OperationInProgress => "OPERATION_IN_PROGRESS",
        }
    }
}

/// Transport-independent operation response for the HTTP layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ControlResponse {
    pub fn success() -> Self {
        Self {
            ok: true,
            code: None,
            reason: None,
        }
    }

    fn failure(code: &str, reason: String) -> Self {
        Self {
            ok: false,
            code: Some(code.to_string()),
            reason: Some(reason),
        }
    }
}

impl From<Result<(), StartError>> for ControlResponse {
    fn from(result: Result<(), StartError>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e.code(), e.to_string()),
        }
    }
}

impl From<Result<StopReport, StopError>> for ControlResponse {
    fn from(result: Result<StopReport, StopError>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(e) => Self::failure(e.code(), e.to_string()),
        }
    }
}
