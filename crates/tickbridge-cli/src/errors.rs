//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use tickbridge::ClientError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("--params must be a JSON object: {0}")]
    InvalidParams(String),
    #[error("--param expects KEY=VALUE, got '{0}'")]
    InvalidParam(String),
    #[error("--timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error(transparent)]
    Exchange(#[from] ClientError),
    #[error("failed to serialise response: {0}")]
    SerialiseResponse(serde_json::Error),
    #[error("failed to write response: {0}")]
    WriteResponse(io::Error),
}
