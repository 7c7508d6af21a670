//! Error types for argus

use crate::config::ConfigError;
use thiserror::Error;

/// Failure categories surfaced by the analytics pipeline.
///
/// Detector faults are normally absorbed by the fan-out stage and never
/// reach a caller; the variant exists so detector backends have a typed
/// way to report what went wrong.
#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Detector error ({stream}): {message}")]
    Detector { stream: String, message: String },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session limit reached: {0} sessions active")]
    SessionLimit(usize),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProctorError {
    pub fn detector(stream: impl Into<String>, message: impl Into<String>) -> Self {
        ProctorError::Detector {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code used in transport error messages.
    pub fn code(&self) -> &'static str {
        match self {
            ProctorError::Decode(_) => "decode_error",
            ProctorError::Detector { .. } => "detector_error",
            ProctorError::Pipeline(_) => "pipeline_error",
            ProctorError::Image(_) => "image_error",
            ProctorError::SessionNotFound(_) => "session_not_found",
            ProctorError::SessionLimit(_) => "session_limit",
            ProctorError::Config(_) => "config_error",
            ProctorError::Io(_) => "io_error",
            ProctorError::Json(_) => "serialization_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProctorError>;
