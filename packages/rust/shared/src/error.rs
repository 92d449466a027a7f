//! Error types for Voice Bolt.
//!
//! Library crates use [`VoiceBoltError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Voice Bolt operations.
#[derive(Debug, thiserror::Error)]
pub enum VoiceBoltError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Missing or rejected API key. Always fatal.
    #[error("authentication failed for {service}: {message}")]
    Auth { service: String, message: String },

    /// Input rejected locally or by the remote service (HTTP 422).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The remote service answered HTTP 429.
    #[error("rate limited by {service}, try again later")]
    RateLimited { service: String },

    /// Any other non-2xx response from a remote service.
    #[error("{service} error (HTTP {status}): {message}")]
    Platform {
        service: String,
        status: u16,
        message: String,
    },

    /// Crawl job failed, was cancelled, or produced no content.
    #[error("crawl failed: {message}")]
    Crawl { message: String },

    /// A polling budget was exhausted.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A cancellation token fired while waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// A successful response was missing a field we cannot proceed without.
    #[error("unexpected response: {message}")]
    Contract { message: String },

    /// Transport-level HTTP failure.
    #[error("network error: {0}")]
    Network(String),

    /// Local ledger error.
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
pub type Result<T> = std::result::Result<T, VoiceBoltError>;

impl VoiceBoltError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an authentication error for `service`.
    pub fn auth(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Auth {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a crawl error from any displayable message.
    pub fn crawl(msg: impl Into<String>) -> Self {
        Self::Crawl {
            message: msg.into(),
        }
    }

    /// Create a contract error from any displayable message.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract {
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

    /// True for errors that must stop the whole workflow.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = VoiceBoltError::config("missing base_url");
        assert_eq!(err.to_string(), "config error: missing base_url");

        let err = VoiceBoltError::auth("voice platform", "check your API key/subscription");
        assert!(err.to_string().contains("authentication failed"));
        assert!(err.to_string().contains("subscription"));

        let err = VoiceBoltError::Platform {
            service: "voice platform".into(),
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(
            err.to_string(),
            "voice platform error (HTTP 500): Internal Server Error"
        );
    }

    #[test]
    fn only_auth_is_fatal() {
        assert!(VoiceBoltError::auth("firecrawl", "no key").is_fatal_auth());
        assert!(!VoiceBoltError::validation("bad").is_fatal_auth());
        assert!(
            !VoiceBoltError::RateLimited {
                service: "x".into()
            }
            .is_fatal_auth()
        );
    }
}
