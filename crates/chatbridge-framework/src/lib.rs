//! # chatbridge framework
//!
//! The dispatch layer that sits on top of [`chatbridge_core`]:
//!
//! - **Middleware chain**: ordered interceptors with a single-use `next`
//!   continuation and explicit cancellation ([`MiddlewareChain`])
//! - **Command router**: prefix-free command parsing, case-insensitive
//!   lookup, default handler and built-in help ([`CommandRouter`])
//!
//! ```text
//! Envelope ──▶ MiddlewareChain ──▶ CommandRouter ──▶ CommandHandler
//!                 │ cancel()
//!                 ▼
//!              dropped
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatbridge_framework::prelude::*;
//!
//! let mut router = CommandRouter::new();
//! router.register("hello", |msg: Envelope, _args: String| async move {
//!     msg.reply(&format!("Hello, {}!", msg.author_name)).await?;
//!     Ok(())
//! }, "Say hello", "");
//!
//! let chain = MiddlewareChain::new().with(LoggingMiddleware);
//! chain.execute(envelope, &router).await;
//! ```

pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod router;

pub use context::DispatchContext;
pub use error::{CommandError, HandlerResult};
pub use handler::{BoxedCommandHandler, CommandHandler, Terminal};
pub use middleware::{
    AdminOnlyMiddleware, BoxedMiddleware, Dispatched, DmOnlyMiddleware, LoggingMiddleware,
    Middleware, MiddlewareChain, Next, RateLimitMiddleware, RateLimiter,
};
pub use router::{CommandInfo, CommandRouter, HANDLER_ERROR_NOTICE, RouteOutcome, parse_command};

/// Common imports for writing commands and middleware.
pub mod prelude {
    pub use crate::{
        CommandError, CommandHandler, CommandRouter, DispatchContext, HandlerResult,
        LoggingMiddleware, Middleware, MiddlewareChain, Next, RouteOutcome,
    };
    pub use async_trait::async_trait;
    pub use chatbridge_core::{Embed, Envelope};
}
