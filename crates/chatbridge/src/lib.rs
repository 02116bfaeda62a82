//! # chatbridge
//!
//! Connects to a real-time chat gateway, filters and normalizes inbound
//! messages, and dispatches them through a middleware chain into a command
//! router. Replies go back to the channel they came from, split into chunks
//! when they exceed the platform limit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐  on_message  ┌───────────────────┐  listen()  ┌─────────────────┐     ┌───────────────┐
//! │ Gateway │─────────────▶│ ConnectionManager │───────────▶│ MiddlewareChain │────▶│ CommandRouter │
//! │         │◀─────────────│ filter + queue    │            └─────────────────┘     └───────────────┘
//! └─────────┘  send_text   └───────────────────┘                     ▲                     │
//!      ▲                                                              └── DeliveryChannel ◀┘
//! ```
//!
//! - **Runtime**: loads configuration, sets up logging and drives the session
//! - **Gateway**: the wire protocol, supplied by the application
//! - **Middleware**: ordered interceptors that may rewrite or reject a message
//! - **Router**: case-insensitive commands, a default handler and generated help
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatbridge::prelude::*;
//!
//! async fn hello(msg: Envelope, _args: String) -> HandlerResult {
//!     msg.reply(&format!("Hello, {}!", msg.author_name)).await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = BridgeRuntime::builder().build(Arc::new(MyGateway::new()))?;
//!     runtime.router_mut().register("hello", hello, "Say hello", "");
//!     runtime.middleware_mut().register(Arc::new(LoggingMiddleware));
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `yaml-config` *(default)*: YAML configuration files
//! - `toml-config`: TOML configuration files
//! - `json-log`: JSON log output
//! - `testing`: scripted in-memory gateway for tests

pub use chatbridge_core as core;
pub use chatbridge_framework as framework;
pub use chatbridge_runtime as runtime;

/// Commonly used types for building a bridge application.
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use chatbridge_runtime::{BridgeConfig, BridgeRuntime, RuntimeError};

    // Gateway contract, for implementing a platform
    pub use chatbridge_core::{
        FileAttachment, Gateway, GatewayError, GatewayEvents, GatewayResult, Outbound, RawMessage,
    };

    // Messages and replies
    pub use chatbridge_core::{BridgeError, Embed, Envelope};

    // Dispatch
    pub use chatbridge_framework::{
        AdminOnlyMiddleware, CommandError, CommandRouter, DispatchContext, DmOnlyMiddleware,
        HandlerResult, LoggingMiddleware, Middleware, MiddlewareChain, Next, RateLimitMiddleware,
        RateLimiter,
    };
    pub use chatbridge_framework::prelude::async_trait;
}
