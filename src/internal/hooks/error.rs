//! Error types for the hook dispatch pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while ingesting, resolving or dispatching a hook event.
///
/// Argument, event and config errors are fatal for an invocation. Adapter failures and
/// timeouts are recorded per handler and never abort sibling handlers.
#[derive(Debug, Error)]
pub enum HookcastError {
    /// Command-line arguments could not be parsed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Standard input was empty, malformed, or not a JSON object.
    #[error("Failed to parse event: {0}")]
    ParseError(String),

    /// No configuration file could be found.
    #[error("Config not found: {0}")]
    ConfigNotFound(String),

    /// A configuration file exists but is not valid.
    #[error("Invalid config {path}: {reason}")]
    ConfigParseError { path: PathBuf, reason: String },

    /// A backend adapter failed while delivering.
    #[error("Handler failed: {0}")]
    HandlerAdapterError(String),

    /// A handler did not finish before its deadline.
    #[error("Handler timed out after {0}ms")]
    TimeoutError(u128),

    /// IO error while reading input or configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HookcastError {
    /// Returns `true` for errors that stop the invocation before dispatch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::ParseError(_)
                | Self::ConfigNotFound(_)
                | Self::ConfigParseError { .. }
                | Self::Io(_)
        )
    }

    pub(crate) fn config_parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for hook pipeline operations.
pub type Result<T> = std::result::Result<T, HookcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HookcastError::config_parse("/tmp/hookcast.json", "missing field `name`");
        assert_eq!(
            err.to_string(),
            "Invalid config /tmp/hookcast.json: missing field `name`"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_adapter_errors_are_not_fatal() {
        assert!(!HookcastError::HandlerAdapterError("HTTP 500".to_string()).is_fatal());
        assert!(!HookcastError::TimeoutError(100).is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HookcastError = io_err.into();
        assert!(matches!(err, HookcastError::Io(_)));
        assert_eq!(err.to_string(), "IO error: file not found");
    }
}
