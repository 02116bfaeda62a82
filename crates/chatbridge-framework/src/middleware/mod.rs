//! Ordered, short-circuiting middleware chain.
//!
//! Every middleware receives the [`DispatchContext`] and a single-use [`Next`]
//! continuation. It proceeds by calling `next.run(ctx).await`. Returning without
//! calling it halts the chain silently; calling [`DispatchContext::cancel`]
//! before returning marks the message as deliberately rejected, which
//! [`MiddlewareChain::execute`] reports as `false`. A terminal error is kept on
//! the context and returned by [`MiddlewareChain::dispatch`].
//!
//! ```text
//! execute(msg) ─▶ mw[0] ─next─▶ mw[1] ─next─▶ ... ─next─▶ terminal(msg)
//! ```

mod builtin;

pub use builtin::{
    AdminOnlyMiddleware, DmOnlyMiddleware, LoggingMiddleware, RateLimitMiddleware, RateLimiter,
};

use std::sync::Arc;

use async_trait::async_trait;
use chatbridge_core::{BridgeError, Envelope};
use tracing::{debug, trace};

use crate::context::DispatchContext;
use crate::handler::Terminal;

/// A step in the middleware chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Inspects the context and decides whether to continue.
    async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>);
}

/// Shared middleware handle.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Continuation into the rest of the chain.
pub struct Next<'a> {
    remaining: &'a [BoxedMiddleware],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    /// Runs the remaining middleware and then the terminal.
    ///
    /// Does nothing if the context has already been cancelled.
    pub async fn run(self, ctx: &mut DispatchContext) {
        if ctx.is_cancelled() {
            trace!("Context cancelled, not continuing");
            return;
        }
        match self.remaining.split_first() {
            Some((current, rest)) => {
                trace!(middleware = current.name(), "Entering middleware");
                let next = Next {
                    remaining: rest,
                    terminal: self.terminal,
                };
                current.handle(ctx, next).await;
            }
            None => {
                let result = self.terminal.call(ctx.message()).await;
                if let Err(e) = result {
                    ctx.set_error(e);
                }
            }
        }
    }
}

/// Result of one pass through the chain.
#[derive(Debug)]
pub struct Dispatched {
    /// `false` when a middleware cancelled the message.
    pub passed: bool,
    /// Error reported by the terminal, e.g. [`BridgeError::Handler`].
    pub error: Option<BridgeError>,
}

/// Registration-ordered list of middleware.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<BoxedMiddleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` and hands it back, so the caller can keep a handle
    /// for [`remove`](Self::remove). Duplicates are not filtered.
    pub fn register(&mut self, middleware: BoxedMiddleware) -> BoxedMiddleware {
        debug!(middleware = middleware.name(), "Registered middleware");
        self.middleware.push(middleware.clone());
        middleware
    }

    /// Convenience wrapper around [`register`](Self::register).
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.register(Arc::new(middleware));
        self
    }

    /// Removes the first entry that is the same instance as `middleware`.
    pub fn remove(&mut self, middleware: &BoxedMiddleware) -> bool {
        let target = Arc::as_ptr(middleware) as *const ();
        match self
            .middleware
            .iter()
            .position(|m| Arc::as_ptr(m) as *const () == target)
        {
            Some(idx) => {
                self.middleware.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes everything. Returns whether anything was registered.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.middleware.is_empty();
        self.middleware.clear();
        had_any
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Passes `message` through every middleware and then to `terminal`.
    ///
    /// Returns `false` if any middleware cancelled the message.
    pub async fn execute(&self, message: Envelope, terminal: &dyn Terminal) -> bool {
        self.dispatch(message, terminal).await.passed
    }

    /// Like [`execute`](Self::execute), also returning the terminal's error.
    pub async fn dispatch(&self, message: Envelope, terminal: &dyn Terminal) -> Dispatched {
        let mut ctx = DispatchContext::new(message);
        let next = Next {
            remaining: &self.middleware,
            terminal,
        };
        next.run(&mut ctx).await;

        let passed = !ctx.is_cancelled();
        let error = ctx.take_error();
        if !passed {
            debug!(content = %ctx.into_message().content, "Message cancelled by middleware");
        }
        Dispatched { passed, error }
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.middleware.iter().map(|m| m.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_core::testing::RecordingOutbound;
    use chatbridge_core::{DeliveryChannel, RawMessage};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn message(text: &str) -> Envelope {
        let delivery = DeliveryChannel::new(1, Arc::new(RecordingOutbound::default()));
        Envelope::from_raw(RawMessage::new(2, 1, format!("!{text}")), "!", delivery)
    }

    struct Record {
        label: &'static str,
        log: Log,
    }

    #[async_trait]
    impl Middleware for Record {
        async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
            self.log.lock().push(format!("{}:before", self.label));
            next.run(ctx).await;
            self.log.lock().push(format!("{}:after", self.label));
        }
    }

    struct Cancel;

    #[async_trait]
    impl Middleware for Cancel {
        async fn handle(&self, ctx: &mut DispatchContext, _next: Next<'_>) {
            ctx.cancel();
        }
    }

    struct Swallow;

    #[async_trait]
    impl Middleware for Swallow {
        async fn handle(&self, _ctx: &mut DispatchContext, _next: Next<'_>) {}
    }

    struct Upper;

    #[async_trait]
    impl Middleware for Upper {
        async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
            let content = ctx.message().content.to_uppercase();
            ctx.set_content(content);
            ctx.insert("rewritten", true);
            next.run(ctx).await;
        }
    }

    fn terminal(log: &Log) -> impl Terminal {
        let log = log.clone();
        move |msg: Envelope| {
            let log = log.clone();
            async move {
                log.lock().push(format!("terminal:{}", msg.content));
            }
        }
    }

    fn record(label: &'static str, log: &Log) -> BoxedMiddleware {
        Arc::new(Record {
            label,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_empty_chain_calls_terminal_once() {
        let log = Log::default();
        let chain = MiddlewareChain::new();

        assert!(chain.execute(message("ping"), &terminal(&log)).await);
        assert_eq!(*log.lock(), vec!["terminal:ping"]);
    }

    #[tokio::test]
    async fn test_registration_order() {
        let log = Log::default();
        let mut chain = MiddlewareChain::new();
        chain.register(record("a", &log));
        chain.register(record("b", &log));

        assert!(chain.execute(message("ping"), &terminal(&log)).await);
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "terminal:ping", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_chain() {
        let log = Log::default();
        let mut chain = MiddlewareChain::new();
        chain.register(record("a", &log));
        chain.register(Arc::new(Cancel));
        chain.register(record("never", &log));

        assert!(!chain.execute(message("ping"), &terminal(&log)).await);
        assert_eq!(*log.lock(), vec!["a:before", "a:after"]);
    }

    #[tokio::test]
    async fn test_not_calling_next_halts_silently() {
        let log = Log::default();
        let mut chain = MiddlewareChain::new();
        chain.register(Arc::new(Swallow));
        chain.register(record("never", &log));

        assert!(chain.execute(message("ping"), &terminal(&log)).await);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rewritten_content_reaches_terminal() {
        let log = Log::default();
        let chain = MiddlewareChain::new().with(Upper);

        assert!(chain.execute(message("ping"), &terminal(&log)).await);
        assert_eq!(*log.lock(), vec!["terminal:PING"]);
    }

    struct FailingTerminal;

    #[async_trait]
    impl Terminal for FailingTerminal {
        async fn call(&self, message: &Envelope) -> chatbridge_core::BridgeResult<()> {
            Err(BridgeError::handler(format!("{} failed", message.content)))
        }
    }

    struct SeesError {
        log: Log,
    }

    #[async_trait]
    impl Middleware for SeesError {
        async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
            next.run(ctx).await;
            if let Some(e) = ctx.error() {
                self.log.lock().push(e.to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_terminal_error_is_returned_by_dispatch() {
        let log = Log::default();
        let mut chain = MiddlewareChain::new();
        chain.register(Arc::new(SeesError { log: log.clone() }));

        let dispatched = chain.dispatch(message("kick"), &FailingTerminal).await;
        assert!(dispatched.passed);
        assert!(matches!(dispatched.error, Some(BridgeError::Handler(ref m)) if m == "kick failed"));
        assert_eq!(*log.lock(), vec!["handler error: kick failed"]);

        let clean = chain.dispatch(message("ping"), &terminal(&log)).await;
        assert!(clean.passed && clean.error.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_message_never_reaches_failing_terminal() {
        let chain = MiddlewareChain::new().with(Cancel);
        let dispatched = chain.dispatch(message("kick"), &FailingTerminal).await;
        assert!(!dispatched.passed);
        assert!(dispatched.error.is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let log = Log::default();
        let mut chain = MiddlewareChain::new();
        let a = chain.register(record("a", &log));
        let b = chain.register(record("b", &log));
        chain.register(a.clone());
        assert_eq!(chain.len(), 3);

        assert!(chain.remove(&a));
        assert_eq!(chain.len(), 2);
        assert!(chain.remove(&a));
        assert!(!chain.remove(&a));
        assert!(chain.remove(&b));

        assert!(!chain.clear());
        chain.register(b);
        assert!(chain.clear());
        assert!(chain.is_empty());
    }
}
