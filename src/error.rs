//! Error types for contact resolution
//!
//! This module defines the error type shared by the cache, the lookup
//! boundary and the resolver lifecycle. None of these errors reach the
//! rendering path: the worker logs and swallows lookup failures.

use thiserror::Error;

/// Main error type for the resolver
#[derive(Error, Debug)]
pub enum ResolverError {
    /// The lookup source was unreachable or rejected the query
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The resolver was created outside of a tokio runtime
    #[error("No tokio runtime available to host the resolver worker")]
    NoRuntime,

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

impl From<String> for ResolverError {
    fn from(s: String) -> Self {
        ResolverError::Other(s)
    }
}

impl From<&str> for ResolverError {
    fn from(s: &str) -> Self {
        ResolverError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(e: serde_json::Error) -> Self {
        ResolverError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ResolverError::LookupFailed("provider unavailable".to_string());
        assert_eq!(error.to_string(), "Lookup failed: provider unavailable");

        let config_error = ResolverError::ConfigError("cache_capacity must be greater than 0".to_string());
        assert!(config_error.to_string().contains("cache_capacity"));

        assert!(ResolverError::NoRuntime.to_string().contains("tokio runtime"));
    }

    #[test]
    fn test_error_conversion() {
        let error: ResolverError = "test error".into();
        assert!(matches!(error, ResolverError::Other(_)));

        let error: ResolverError = "test error".to_string().into();
        assert!(matches!(error, ResolverError::Other(_)));

        let json_error = serde_json::from_str::<u32>("not json").unwrap_err();
        let error: ResolverError = json_error.into();
        assert!(matches!(error, ResolverError::SerializationError(_)));
    }
}
