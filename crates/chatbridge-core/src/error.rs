//! Unified error types for the chatbridge core.
//!
//! Two layers exist:
//!
//! - [`GatewayError`] is what the external gateway collaborator reports.
//! - [`BridgeError`] is the taxonomy this crate surfaces to its owner. Session-level
//!   variants (authentication, reconnect exhaustion, configuration) propagate out of
//!   [`ConnectionManager::run`](crate::ConnectionManager::run); per-message variants
//!   (send, handler) are contained by the dispatch layer.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Gateway Errors
// =============================================================================

/// Errors reported by a [`Gateway`](crate::Gateway) implementation.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The credential was rejected.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Connecting or reading from the session failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The session ended without an error while no shutdown was requested.
    #[error("session closed by remote")]
    SessionClosed,

    /// An outbound send failed.
    #[error("send failed ({}): {message}", status_label(.status))]
    Send {
        /// Status code reported by the platform, if any.
        status: Option<u16>,
        /// Platform-provided failure text.
        message: String,
    },

    /// The gateway does not implement the requested capability.
    #[error("operation '{0}' not supported by this gateway")]
    Unsupported(&'static str),
}

impl GatewayError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a send error.
    pub fn send(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Send {
            status,
            message: message.into(),
        }
    }

    /// Returns `true` if this error must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

// =============================================================================
// Bridge Errors
// =============================================================================

/// Errors surfaced by the bridge core.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Bad or missing configuration. Always raised before any connection attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The gateway rejected the credential. Never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A retryable connect/read failure.
    #[error("transient connection error: {0}")]
    TransientConnection(GatewayError),

    /// Reconnect attempts were exhausted.
    #[error("reconnect attempts exhausted after {attempts} attempt(s): {last_error}")]
    ReconnectExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// The failure that ended the last attempt.
        last_error: GatewayError,
    },

    /// Outbound delivery failed.
    #[error("failed to send message: {} {message}", status_label(.status))]
    Send {
        /// Status code reported by the platform, if any.
        status: Option<u16>,
        /// Failure text.
        message: String,
    },

    /// A command handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// The session reached a terminal state before becoming ready.
    #[error("bridge is not running")]
    NotRunning,

    /// `run()` was called while a session loop is already active.
    #[error("bridge is already running")]
    AlreadyRunning,

    /// A file attachment does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl BridgeError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a handler error.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Returns `true` for errors that end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Authentication(_) | Self::ReconnectExhausted { .. }
        )
    }
}

impl From<GatewayError> for BridgeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Authentication(reason) => Self::Authentication(reason),
            GatewayError::Send { status, message } => Self::Send { status, message },
            other => Self::TransientConnection(other),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "no status".to_string(), |s| s.to_string())
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_mapping() {
        let auth: BridgeError = GatewayError::Authentication("bad token".into()).into();
        assert!(matches!(auth, BridgeError::Authentication(_)));
        assert!(auth.is_fatal());

        let send: BridgeError = GatewayError::send(Some(403), "Missing Permissions").into();
        assert!(matches!(
            send,
            BridgeError::Send {
                status: Some(403),
                ..
            }
        ));
        assert!(!send.is_fatal());

        let transient: BridgeError = GatewayError::connection("reset").into();
        assert!(matches!(transient, BridgeError::TransientConnection(_)));
    }

    #[test]
    fn test_send_error_display_includes_status() {
        let err = BridgeError::Send {
            status: Some(403),
            message: "Missing Permissions".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to send message: 403 Missing Permissions"
        );
    }

    #[test]
    fn test_exhausted_display() {
        let err = BridgeError::ReconnectExhausted {
            attempts: 5,
            last_error: GatewayError::connection("timed out"),
        };
        let text = err.to_string();
        assert!(text.contains("5 attempt(s)"));
        assert!(text.contains("timed out"));
    }
}
