//! chatbridge runtime: configuration, logging and the run loop.
//!
//! - Layered configuration with figment ([`ConfigLoader`])
//! - `tracing` subscriber setup ([`LoggingBuilder`])
//! - [`BridgeRuntime`], which runs the connection manager and feeds every
//!   inbound message through the middleware chain into the command router
//!
//! ```ignore
//! use chatbridge_runtime::BridgeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = BridgeRuntime::builder().build(gateway)?;
//!     runtime.router_mut().register("hello", hello, "Say hello", "");
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BridgeConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BridgeRuntime, RuntimeBuilder, shutdown_signal};

pub use tracing;

/// Logging macros for bridge applications.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
