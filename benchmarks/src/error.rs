//! Error handling for the TTS comparison harness
//!
//! Only configuration problems, report I/O and user interrupts are fatal to a
//! run. Service and request failures are recorded in the report instead of
//! being raised, so most of these variants end up as log lines.

use std::io;

use thiserror::Error;

/// The main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Service lifecycle errors (start/stop/health)
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A synthesis or health request answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A request exceeded its deadline
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Report template errors
    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Report template registration errors
    #[error("Template registration error: {0}")]
    TemplateRegistration(#[from] Box<handlebars::TemplateError>),

    /// WAV decoding errors during audio analysis
    #[error("Audio analysis error: {0}")]
    Audio(#[from] hound::Error),

    /// Chart drawing errors
    #[error("Chart rendering error: {reason}")]
    Chart { reason: String },

    /// The run was interrupted by the user
    #[error("Run interrupted by user")]
    Interrupted,
}

/// Errors raised while driving an external service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to launch `{command}`: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("`{command}` exited with status {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Service {service} did not become healthy within {waited_secs}s")]
    HealthTimeout { service: String, waited_secs: u64 },

    #[error("Working directory not found: {path}")]
    MissingDirectory { path: String },

    #[error("Illegal state transition for {service}: {from} -> {to}")]
    IllegalTransition {
        service: String,
        from: String,
        to: String,
    },
}

/// Configuration related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Unknown {kind} in filter: {name}")]
    UnknownSelection { kind: &'static str, name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl HarnessError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Config(_) => 2,
            HarnessError::Io(_) => 3,
            HarnessError::Interrupted => 130,
            _ => 1,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HarnessError::Config(_) => "config",
            HarnessError::Service(_) => "service",
            HarnessError::Http(_) | HarnessError::Status { .. } | HarnessError::Timeout { .. } => {
                "request"
            }
            HarnessError::Io(_) => "io",
            HarnessError::Serialization(_) => "serialization",
            HarnessError::Template(_) | HarnessError::TemplateRegistration(_) => "template",
            HarnessError::Audio(_) => "audio",
            HarnessError::Chart { .. } => "chart",
            HarnessError::Interrupted => "interrupted",
        }
    }
}

impl From<handlebars::TemplateError> for HarnessError {
    fn from(err: handlebars::TemplateError) -> Self {
        HarnessError::TemplateRegistration(Box::new(err))
    }
}
