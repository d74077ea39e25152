//! Error types for greydns
//!
//! This module defines all error types used throughout the crate.
//!
//! Ownership conflicts are deliberately absent: a duplicate claim is an
//! outcome surfaced through a [`crate::traits::Notifier`], not a failure.

use std::fmt;
use thiserror::Error;

/// Result type alias for greydns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The zone or record does not exist at the provider
    NotFound,
    /// The request was rejected before or by the provider as malformed
    InvalidInput,
    /// Transport, authentication, rate limiting or any other API failure
    Backend,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::NotFound => "not found",
            ProviderErrorKind::InvalidInput => "invalid input",
            ProviderErrorKind::Backend => "backend failure",
        };
        f.write_str(s)
    }
}

/// Core error type for greydns
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration value or credential
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested zone name is not in the zone table
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// A DNS provider call failed
    #[error("Provider error ({provider}, {operation}): {kind}: {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Operation that failed (e.g. "create_record")
        operation: String,
        /// Failure classification
        kind: ProviderErrorKind,
        /// Error message
        message: String,
    },

    /// An outbound notification could not be delivered
    #[error("Notification error: {0}")]
    Notify(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a zone-not-found error
    pub fn zone_not_found(zone: impl Into<String>) -> Self {
        Self::ZoneNotFound(zone.into())
    }

    /// Create a provider error of the given kind
    pub fn provider(
        provider: impl Into<String>,
        operation: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }

    /// Create a provider "not found" error
    pub fn not_found(
        provider: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::provider(provider, operation, ProviderErrorKind::NotFound, message)
    }

    /// Create a provider "invalid input" error
    pub fn invalid_input(
        provider: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::provider(provider, operation, ProviderErrorKind::InvalidInput, message)
    }

    /// Create a provider backend error
    pub fn backend(
        provider: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::provider(provider, operation, ProviderErrorKind::Backend, message)
    }

    /// Create a notification error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    /// The provider error kind, if this is a provider error
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_carries_context() {
        let err = Error::backend("cloudflare", "create_record", "HTTP 500");
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Backend));
        let msg = err.to_string();
        assert!(msg.contains("cloudflare"));
        assert!(msg.contains("create_record"));
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn test_non_provider_errors_have_no_kind() {
        assert_eq!(Error::zone_not_found("example.com").provider_kind(), None);
        assert_eq!(Error::config("record-ttl").provider_kind(), None);
    }
}
