//! Error types for the API catalog.
//!
//! Library crates use [`CatalogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Configuration error (unknown layer, unsupported export format, bad config file).
    /// Fatal: raised before any work starts.
    #[error("config error: {message}")]
    Config { message: String },

    /// An external catalog could not be reached or parsed as a whole.
    #[error("source '{source_name}' unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    /// Network/HTTP error for a single request.
    #[error("network error: {0}")]
    Network(String),

    /// Payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A record is missing a required field or violates a bound.
    #[error("invalid record: {message}")]
    RecordInvalid { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a source-unavailable error for the named adapter.
    pub fn source_unavailable(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a record validation error.
    pub fn record_invalid(msg: impl Into<String>) -> Self {
        Self::RecordInvalid {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is fatal for a whole run (as opposed to record- or layer-local).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CatalogError::config("unknown layer 13");
        assert_eq!(err.to_string(), "config error: unknown layer 13");

        let err = CatalogError::source_unavailable("apis.guru", "HTTP 503");
        assert_eq!(err.to_string(), "source 'apis.guru' unavailable: HTTP 503");

        let err = CatalogError::record_invalid("empty url");
        assert!(err.to_string().contains("empty url"));
    }

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(CatalogError::config("x").is_fatal());
        assert!(!CatalogError::Storage("disk full".into()).is_fatal());
        assert!(!CatalogError::source_unavailable("github", "403").is_fatal());
    }
}
