//! Error types for command handlers.

use chatbridge_core::BridgeError;
use thiserror::Error;

/// Errors a command handler may return.
///
/// Handlers are free to return any error convertible into
/// [`tower::BoxError`]; this enum covers the common cases.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A required argument is missing.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// An argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Replying to the user failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl CommandError {
    /// Creates an invalid argument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result type returned by command handlers.
pub type HandlerResult = Result<(), tower::BoxError>;
