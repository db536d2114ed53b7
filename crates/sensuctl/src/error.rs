//! Error types for sensuctl operations.
//!
//! Errors are categorized so callers can give the operator appropriate
//! feedback. Nothing here is retried: every failure is surfaced as-is
//! with the tool's captured output.

use thiserror::Error;

/// Categories of sensuctl errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The referenced object does not exist on the backend
    NotFound,
    /// Credentials are missing, expired, or lack permission
    Unauthorized,
    /// The Sensu backend could not be reached
    Connection,
    /// The backend rejected the submitted object
    Invalid,
    /// sensuctl is not installed or not on PATH
    SensuctlNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Object not found",
            Self::Unauthorized => "Not authorized",
            Self::Connection => "Backend unreachable",
            Self::Invalid => "Object rejected by backend",
            Self::SensuctlNotFound => "sensuctl not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the object name and namespace",
            Self::Unauthorized => "Run 'sensuctl configure' or check the configured credentials",
            Self::Connection => "Check that sensu-backend is running and the API URL is correct",
            Self::Invalid => "Check the resource attributes against the Sensu API reference",
            Self::SensuctlNotFound => "Install the sensu-go-cli package or set sensuctl.path",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while invoking sensuctl.
#[derive(Debug, Error)]
pub enum Error {
    /// sensuctl executable could not be located
    #[error("sensuctl not found. Install sensu-go-cli or set sensuctl.path")]
    SensuctlNotFound,

    /// sensuctl exited with a non-zero status
    #[error("{message}: {output}")]
    CommandFailed {
        /// Which invocation failed
        message: String,
        /// Captured stderr (or stdout when stderr was empty)
        output: String,
        /// Category derived from the captured output
        category: ErrorCategory,
    },

    /// sensuctl output could not be decoded
    #[error("unexpected sensuctl output for '{command}': {source}")]
    Decode {
        /// The invocation whose output was malformed
        command: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// IO error while spawning or talking to the process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SensuctlNotFound => ErrorCategory::SensuctlNotFound,
            Error::CommandFailed { category, .. } => *category,
            _ => ErrorCategory::Other,
        }
    }

    /// Create an error from the output of a failed sensuctl invocation.
    ///
    /// Analyzes the captured text to categorize the error.
    pub fn from_sensuctl_output(command: &str, stderr: &str, stdout: &str) -> Self {
        let output = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        let lower = output.to_lowercase();

        let category = if lower.contains("connection refused")
            || lower.contains("no such host")
            || lower.contains("timeout")
            || lower.contains("dial tcp")
        {
            ErrorCategory::Connection
        } else if lower.contains("unauthorized")
            || lower.contains("permission denied")
            || lower.contains("forbidden")
            || lower.contains("access token")
            || lower.contains("expired")
        {
            ErrorCategory::Unauthorized
        } else if lower.contains("not found") || lower.contains("no such") {
            ErrorCategory::NotFound
        } else if lower.contains("invalid")
            || lower.contains("validation")
            || lower.contains("must be")
            || lower.contains("bad request")
        {
            ErrorCategory::Invalid
        } else {
            ErrorCategory::Other
        };

        Error::CommandFailed {
            message: format!("sensuctl {command} failed"),
            output: output.to_string(),
            category,
        }
    }
}

/// Result type for sensuctl operations.
pub type Result<T> = std::result::Result<T, Error>;
