//! Error types for Confluent Cloud operations

use thiserror::Error;

/// Main error type for control-plane, data-plane and reconciler operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection, DNS or timeout failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote API answered with an unexpected status
    #[error("HTTP {code} while {operation}: {body}")]
    HttpStatus {
        operation: String,
        code: u16,
        body: String,
    },

    /// Remote resource does not exist
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Response body did not match the expected schema
    #[error("failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    /// Login rejected or access token could not be minted
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Desired-state attribute missing or of the wrong type
    #[error("invalid attribute '{name}': {message}")]
    InvalidAttribute { name: String, message: String },

    /// Operation not supported for this resource kind
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The caller cancelled the call
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the call completed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn http_status(operation: impl Into<String>, code: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            operation: operation.into(),
            code,
            body: body.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn decode(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn invalid_attribute(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Status code carried by an `HttpStatus` error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display_and_code() {
        let err = Error::http_status("creating topic", 400, "cluster not ready");
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(
            err.to_string(),
            "HTTP 400 while creating topic: cluster not ready"
        );
    }

    #[test]
    fn test_not_found_is_distinct() {
        let err = Error::not_found("cluster", "lkc-123");
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), None);
        assert!(!Error::transport("connection reset").is_not_found());
    }

    #[test]
    fn test_decode_keeps_context() {
        let err = Error::decode("topic config", "missing field `isReadOnly`");
        assert!(err.to_string().contains("topic config"));
        assert!(err.to_string().contains("isReadOnly"));
    }
}
