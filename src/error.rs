//! Error types for the script bridge.
//!
//! This module defines error codes, the construction/registration error type
//! used on the host side, and the rejection reasons a client-side call can
//! settle with.

use serde::{Deserialize, Serialize};

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Pending call received no reply in time
    Timeout,
    /// Pending call was cancelled by the client
    Cancelled,
    /// The named member is not exposed by the proxy
    NotExposed,
    /// Handler arity does not match the declared selector
    ArityMismatch,
    /// Selector text is not a valid operation identifier
    InvalidSelector,
    /// Namespace is not a valid script identifier
    InvalidNamespace,
    /// Invalid argument
    InvalidArgument,
    /// Serialization/deserialization error
    SerializationError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::Cancelled => write!(f, "CANCELLED"),
            ErrorCode::NotExposed => write!(f, "NOT_EXPOSED"),
            ErrorCode::ArityMismatch => write!(f, "ARITY_MISMATCH"),
            ErrorCode::InvalidSelector => write!(f, "INVALID_SELECTOR"),
            ErrorCode::InvalidNamespace => write!(f, "INVALID_NAMESPACE"),
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::SerializationError => write!(f, "SERIALIZATION_ERROR"),
        }
    }
}

/// Main error type for building and configuring a bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Namespace cannot be used as a script identifier
    #[error("Invalid namespace '{0}': must be a script identifier")]
    InvalidNamespace(String),

    /// Selector text could not be parsed
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// The offending selector text
        selector: String,
        /// Why it was rejected
        reason: String,
    },

    /// A handler was registered with the wrong number of parameters
    #[error("Handler for '{selector}' takes {handler} arguments, selector declares {declared}")]
    ArityMismatch {
        /// The selector the handler was registered under
        selector: String,
        /// Arity implied by the selector
        declared: usize,
        /// Arity of the registered closure
        handler: usize,
    },

    /// Bridge was built without a capability target
    #[error("No capability target was supplied")]
    MissingTarget,

    /// Bridge was built outside of a tokio runtime and no handle was given
    #[error("No tokio runtime available for dispatching invocations")]
    NoRuntime,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BridgeError {
    /// Map to the error code reported in diagnostics
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Config(_) => ErrorCode::InvalidArgument,
            BridgeError::InvalidNamespace(_) => ErrorCode::InvalidNamespace,
            BridgeError::InvalidSelector { .. } => ErrorCode::InvalidSelector,
            BridgeError::ArityMismatch { .. } => ErrorCode::ArityMismatch,
            BridgeError::MissingTarget | BridgeError::NoRuntime => ErrorCode::InvalidArgument,
            BridgeError::Serialization(_) => ErrorCode::SerializationError,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Reason a client-side pending call was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// No reply arrived before the call's timer fired
    #[error("Callback timeout. (id: {callback_id})")]
    Timeout {
        /// Correlation id of the expired call
        callback_id: String,
    },

    /// The call was cancelled explicitly
    #[error("{reason}")]
    Cancelled {
        /// Correlation id of the cancelled call
        callback_id: String,
        /// Supplied or default cancellation reason
        reason: String,
    },

    /// The proxy has no member with this name (or not of this shape)
    #[error("'{0}' is not exposed by the proxy")]
    NotExposed(String),
}

impl CallError {
    /// Build the default cancellation reason for a call
    pub fn cancelled(callback_id: impl Into<String>, reason: Option<String>) -> Self {
        let callback_id = callback_id.into();
        let reason = reason.unwrap_or_else(|| format!("Callback cancelled. (id: {})", callback_id));
        CallError::Cancelled {
            callback_id,
            reason,
        }
    }

    /// Map to an error code
    pub fn code(&self) -> ErrorCode {
        match self {
            CallError::Timeout { .. } => ErrorCode::Timeout,
            CallError::Cancelled { .. } => ErrorCode::Cancelled,
            CallError::NotExposed(_) => ErrorCode::NotExposed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorCode::ArityMismatch.to_string(), "ARITY_MISMATCH");
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InvalidSelector).unwrap();
        assert_eq!(json, "\"INVALID_SELECTOR\"");
    }

    #[test]
    fn test_call_error_messages() {
        let timeout = CallError::Timeout {
            callback_id: "abc".into(),
        };
        assert_eq!(timeout.to_string(), "Callback timeout. (id: abc)");
        assert_eq!(timeout.code(), ErrorCode::Timeout);

        let cancelled = CallError::cancelled("abc", None);
        assert_eq!(cancelled.to_string(), "Callback cancelled. (id: abc)");

        let custom = CallError::cancelled("abc", Some("page closed".into()));
        assert_eq!(custom.to_string(), "page closed");
    }

    #[test]
    fn test_bridge_error_code() {
        let err = BridgeError::ArityMismatch {
            selector: "onSubmit:".into(),
            declared: 1,
            handler: 2,
        };
        assert_eq!(err.code(), ErrorCode::ArityMismatch);
        assert!(err.to_string().contains("onSubmit:"));

        let err: BridgeError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::SerializationError);
    }

    #[test]
    fn test_construction_errors_have_specific_codes() {
        assert_eq!(BridgeError::MissingTarget.code(), ErrorCode::InvalidArgument);
        assert_eq!(BridgeError::NoRuntime.code(), ErrorCode::InvalidArgument);
        assert_eq!(
            BridgeError::InvalidNamespace("1ns".into()).code(),
            ErrorCode::InvalidNamespace
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::InvalidNamespace).unwrap(),
            "\"INVALID_NAMESPACE\""
        );
    }
}
