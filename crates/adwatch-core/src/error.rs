//! Error types for Adwatch Core

use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Tracker error types
#[derive(Error, Debug)]
pub enum Error {
    // Playback source errors
    #[error("Playback source not ready: {0}")]
    SourceNotReady(String),

    #[error("Playback source command failed: {command}")]
    SourceCommand { command: &'static str, reason: String },

    // Sink errors
    #[error("Event sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Event sink rejected event {event}: {reason}")]
    SinkRejected { event: String, reason: String },

    // Metadata errors
    #[error("Malformed duration: {0}")]
    MalformedDuration(f64),

    // State errors
    #[error("Invalid tracker state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Scenario errors
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a source-not-ready error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Error::SourceNotReady(msg.into())
    }

    /// Returns true if this error is recoverable
    ///
    /// Recoverable errors are retried on the next tick (source) or after the
    /// retry delay (sink); everything else is logged and dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SourceNotReady(_) | Error::SinkUnavailable(_) | Error::MalformedDuration(_)
        )
    }

    /// Returns the error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::SourceNotReady(_) => "SOURCE_NOT_READY",
            Error::SourceCommand { .. } => "SOURCE_COMMAND",
            Error::SinkUnavailable(_) => "SINK_UNAVAILABLE",
            Error::SinkRejected { .. } => "SINK_REJECTED",
            Error::MalformedDuration(_) => "MALFORMED_DURATION",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigParse(_) => "CONFIG_PARSE",
            Error::InvalidScenario(_) => "INVALID_SCENARIO",
            Error::Internal(_) => "INTERNAL",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}
