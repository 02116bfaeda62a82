//! Runtime error types.

use chatbridge_core::BridgeError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that end a [`BridgeRuntime`](crate::BridgeRuntime) run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The connection session failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The connection task panicked or was aborted.
    #[error("connection task failed: {0}")]
    Join(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
