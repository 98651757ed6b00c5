//! Error types for litexplore.
//!
//! Defines the closed set of error kinds the engine can raise. Rendering
//! them (pages, status codes, retry links) is left to whoever drives the
//! engine.

use crate::types::ResultRow;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The remote setup cannot work (binary lacks `-json`, ssh missing, session closed).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote process exited non-zero for a reason we could not classify.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The remote engine rejected the SQL. `query` is the text the caller submitted.
    #[error("Syntax error: {message}")]
    Syntax { message: String, query: String },

    /// The time budget ran out. Carries every row read before the deadline.
    #[error("Query timed out after {} rows", rows.len())]
    Timeout { rows: Vec<ResultRow> },

    /// A line of remote output was not a JSON row object.
    #[error("Decode error: {reason} (line: {line})")]
    Decode { line: String, reason: String },

    /// Input rejected before anything was sent to the remote host.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal failures (task panics, unexpected states).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a configuration error with the given message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connectivity error with the given message.
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Creates a syntax error carrying the submitted query text.
    pub fn syntax(msg: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Syntax {
            message: msg.into(),
            query: query.into(),
        }
    }

    /// Creates a decode error for the offending line.
    pub fn decode(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration Error",
            Self::Connectivity(_) => "Connectivity Error",
            Self::Syntax { .. } => "Syntax Error",
            Self::Timeout { .. } => "Timeout",
            Self::Decode { .. } => "Decode Error",
            Self::Validation(_) => "Validation Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true if the session state for the target should be dropped.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Connectivity(_))
    }
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;
