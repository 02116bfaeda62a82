//! Handler traits for commands and for the end of the middleware chain.
//!
//! Both traits have blanket implementations for async closures, so plain
//! functions can be registered directly:
//!
//! ```rust,ignore
//! async fn echo(msg: Envelope, args: String) -> HandlerResult {
//!     msg.reply(&args).await?;
//!     Ok(())
//! }
//!
//! router.register("echo", echo, "Echo back your message", "<message>");
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chatbridge_core::{BridgeResult, Envelope};

use crate::error::HandlerResult;

/// A command implementation invoked with the message and its argument string.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, message: &Envelope, args: &str) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(Envelope, String) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn call(&self, message: &Envelope, args: &str) -> HandlerResult {
        (self)(message.clone(), args.to_string()).await
    }
}

/// Type-erased command handler.
pub type BoxedCommandHandler = Arc<dyn CommandHandler>;

/// Receives a message once every middleware has passed it on.
///
/// An error is recorded on the dispatch context, where middleware can see it
/// after `next.run()` returns.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn call(&self, message: &Envelope) -> BridgeResult<()>;
}

#[async_trait]
impl<F, Fut> Terminal for F
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn call(&self, message: &Envelope) -> BridgeResult<()> {
        (self)(message.clone()).await;
        Ok(())
    }
}
