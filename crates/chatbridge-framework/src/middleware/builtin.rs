//! Built-in interceptors.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Middleware, Next};
use crate::context::DispatchContext;

/// Replies with `notice` and cancels the context. A failed notice is only logged.
async fn reject(ctx: &mut DispatchContext, notice: &str) {
    if let Err(e) = ctx.message().reply(notice).await {
        warn!(error = %e, "Failed to send rejection notice");
    }
    ctx.cancel();
}

// =============================================================================
// Logging
// =============================================================================

/// Logs the start and end of every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
        let author = ctx.message().author_name.clone();
        let started = Instant::now();
        info!(author = %author, content = %ctx.message().content, "[START] Processing command");
        next.run(ctx).await;
        info!(
            author = %author,
            elapsed = ?started.elapsed(),
            cancelled = ctx.is_cancelled(),
            failed = ctx.error().is_some(),
            "[END] Finished processing command"
        );
    }
}

// =============================================================================
// Rate limiting
// =============================================================================

/// Per-user sliding-window request counter.
///
/// State lives only in memory and is lost on restart.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    history: Mutex<HashMap<u64, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a request for `user_id` if it is within the limit.
    ///
    /// Returns `false` without recording when the user already made
    /// `max_requests` requests inside the window.
    pub fn try_acquire(&self, user_id: u64) -> bool {
        let now = Instant::now();
        let mut history = self.history.lock();
        let requests = history.entry(user_id).or_default();

        while let Some(&oldest) = requests.front() {
            if now.duration_since(oldest) < self.window {
                break;
            }
            requests.pop_front();
        }

        if requests.len() >= self.max_requests {
            return false;
        }
        requests.push_back(now);
        true
    }

    /// Forgets all recorded requests.
    pub fn reset(&self) {
        self.history.lock().clear();
    }
}

/// Rejects users that exceed their [`RateLimiter`] budget.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    fn notice(&self) -> String {
        let window = self.limiter.window();
        let secs = if window.subsec_nanos() == 0 {
            window.as_secs().to_string()
        } else {
            window.as_secs_f64().to_string()
        };
        format!("You're sending commands too fast! Please wait {secs} seconds.")
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
        let user_id = ctx.message().author_id;
        if !self.limiter.try_acquire(user_id) {
            warn!(user_id, "Rate limit exceeded");
            reject(ctx, &self.notice()).await;
            return;
        }
        next.run(ctx).await;
    }
}

// =============================================================================
// Gating
// =============================================================================

/// Only lets direct messages through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DmOnlyMiddleware;

#[async_trait]
impl Middleware for DmOnlyMiddleware {
    fn name(&self) -> &str {
        "dm_only"
    }

    async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
        if !ctx.message().is_dm {
            debug!(author = %ctx.message().author_name, "Ignoring non-DM message");
            reject(ctx, "This command only works in direct messages!").await;
            return;
        }
        next.run(ctx).await;
    }
}

/// Only lets listed users through.
#[derive(Debug, Clone, Default)]
pub struct AdminOnlyMiddleware {
    admins: HashSet<u64>,
}

impl AdminOnlyMiddleware {
    pub fn new(admins: impl IntoIterator<Item = u64>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Middleware for AdminOnlyMiddleware {
    fn name(&self) -> &str {
        "admin_only"
    }

    async fn handle(&self, ctx: &mut DispatchContext, next: Next<'_>) {
        let user_id = ctx.message().author_id;
        if !self.admins.contains(&user_id) {
            warn!(user_id, "Non-admin user tried an admin command");
            reject(ctx, "You don't have permission to use this command.").await;
            return;
        }
        next.run(ctx).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use chatbridge_core::testing::RecordingOutbound;
    use chatbridge_core::{DeliveryChannel, Envelope, GatewayError, RawMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(outbound: &Arc<RecordingOutbound>, raw: RawMessage) -> Envelope {
        let delivery = DeliveryChannel::new(raw.channel_id, outbound.clone());
        Envelope::from_raw(raw, "!", delivery)
    }

    fn counter() -> (Arc<AtomicUsize>, impl crate::handler::Terminal) {
        let calls = Arc::new(AtomicUsize::new(0));
        let terminal = {
            let calls = calls.clone();
            move |_msg: Envelope| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            }
        };
        (calls, terminal)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
        assert!(limiter.try_acquire(2), "users are tracked separately");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.try_acquire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_middleware_rejects_sixth_request() {
        let outbound = Arc::new(RecordingOutbound::default());
        let chain = MiddlewareChain::new()
            .with(RateLimitMiddleware::new(Arc::new(RateLimiter::default())));
        let (calls, terminal) = counter();

        for _ in 0..5 {
            assert!(chain.execute(message(&outbound, RawMessage::new(7, 1, "!hi")), &terminal).await);
        }
        let handled = chain
            .execute(message(&outbound, RawMessage::new(7, 1, "!hi")), &terminal)
            .await;

        assert!(!handled);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            outbound.texts(),
            vec!["You're sending commands too fast! Please wait 60 seconds."]
        );
    }

    #[tokio::test]
    async fn test_dm_only() {
        let outbound = Arc::new(RecordingOutbound::default());
        let chain = MiddlewareChain::new().with(DmOnlyMiddleware);
        let (calls, terminal) = counter();

        assert!(chain.execute(message(&outbound, RawMessage::new(1, 2, "!x").direct()), &terminal).await);
        assert!(!chain.execute(message(&outbound, RawMessage::new(1, 2, "!x")), &terminal).await);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outbound.texts(), vec!["This command only works in direct messages!"]);
    }

    #[tokio::test]
    async fn test_admin_only() {
        let outbound = Arc::new(RecordingOutbound::default());
        let chain = MiddlewareChain::new().with(AdminOnlyMiddleware::new([100, 200]));
        let (calls, terminal) = counter();

        assert!(chain.execute(message(&outbound, RawMessage::new(200, 2, "!ban")), &terminal).await);
        assert!(!chain.execute(message(&outbound, RawMessage::new(300, 2, "!ban")), &terminal).await);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outbound.texts(), vec!["You don't have permission to use this command."]);
    }

    #[tokio::test]
    async fn test_failed_notice_still_cancels() {
        let outbound = Arc::new(RecordingOutbound::failing(GatewayError::send(
            Some(403),
            "Missing Permissions",
        )));
        let chain = MiddlewareChain::new().with(DmOnlyMiddleware);
        let (calls, terminal) = counter();

        assert!(!chain.execute(message(&outbound, RawMessage::new(1, 2, "!x")), &terminal).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logging_passes_through() {
        let outbound = Arc::new(RecordingOutbound::default());
        let chain = MiddlewareChain::new().with(LoggingMiddleware);
        let (calls, terminal) = counter();

        assert!(chain.execute(message(&outbound, RawMessage::new(1, 2, "!x")), &terminal).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
