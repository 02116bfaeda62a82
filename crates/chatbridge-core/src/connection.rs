//! Connection lifecycle: login, readiness, reconnect and drain-based shutdown.
//!
//! ```text
//! Disconnected ─▶ Connecting ─▶ Ready ─(drop)─▶ Reconnecting ─▶ Connecting ─▶ ...
//!                      │                              │
//!                      └──(auth / exhausted)──▶ Failed ◀┘
//!
//! any state but Failed ──stop()──▶ ShutDown
//! ```
//!
//! The [`ConnectionManager`] owns the gateway session. It implements
//! [`GatewayEvents`] so the gateway can report readiness and raw messages; the
//! messages that pass the filter are queued and surfaced through
//! [`ConnectionManager::listen`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::delivery::{DeliveryChannel, DeliverySettings};
use crate::envelope::{Envelope, RawMessage, preview};
use crate::error::{BridgeError, BridgeResult, GatewayError};
use crate::gateway::{BoxedGateway, BoxedOutbound, Gateway, GatewayEvents};
use crate::queue::InboundQueue;

/// Credential value shipped in sample configuration files.
pub const PLACEHOLDER_CREDENTIAL: &str = "YOUR_DISCORD_BOT_TOKEN_HERE";

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

const DRAIN_POLL: Duration = Duration::from_millis(100);

// =============================================================================
// Settings
// =============================================================================

/// Validated settings consumed by the [`ConnectionManager`].
#[derive(Clone)]
pub struct BridgeSettings {
    /// Gateway login credential.
    pub credential: String,
    /// Prefix that marks a message as a command.
    pub command_prefix: String,
    /// Channels messages are accepted from. Empty means all channels.
    pub allowed_channel_ids: HashSet<u64>,
    /// Consecutive failed attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay: Duration,
    /// How long `stop()` waits for the queue to empty.
    pub drain_timeout: Duration,
    /// Poll timeout used by `listen()`.
    pub poll_interval: Duration,
    /// Chunking parameters for replies.
    pub delivery: DeliverySettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            credential: String::new(),
            command_prefix: "!".to_string(),
            allowed_channel_ids: HashSet::new(),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            delivery: DeliverySettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Creates default settings with the given credential.
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            ..Self::default()
        }
    }

    /// Checks the settings before any connection attempt.
    pub fn validate(&self) -> BridgeResult<()> {
        let credential = self.credential.trim();
        if credential.is_empty() {
            return Err(BridgeError::configuration("credential is required"));
        }
        if credential == PLACEHOLDER_CREDENTIAL {
            return Err(BridgeError::configuration(
                "credential is still the placeholder value, set a real token",
            ));
        }
        if self.command_prefix.is_empty() {
            return Err(BridgeError::configuration("command prefix must not be empty"));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(BridgeError::configuration(
                "max_reconnect_attempts must be at least 1",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(BridgeError::configuration("poll interval must be positive"));
        }
        Ok(())
    }
}

impl fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("credential", &"<redacted>")
            .field("command_prefix", &self.command_prefix)
            .field("allowed_channel_ids", &self.allowed_channel_ids)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_base_delay", &self.reconnect_base_delay)
            .field("drain_timeout", &self.drain_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("delivery", &self.delivery)
            .finish()
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `min(base * 2^(attempt-1), 60s)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp).min(MAX_BACKOFF)
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle status of the gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    Failed,
    ShutDown,
}

impl ConnectionStatus {
    /// Returns `true` for states the session loop never leaves on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::ShutDown)
    }
}

/// Snapshot of the connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub is_ready: bool,
    /// The bridge's own user id, known once a session became ready.
    pub bot_identity: Option<u64>,
    /// Consecutive failed attempts since the last ready session.
    pub reconnect_attempt: u32,
    pub shutdown_requested: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            is_ready: false,
            bot_identity: None,
            reconnect_attempt: 0,
            shutdown_requested: false,
        }
    }
}

/// Outcome of the drain phase of [`ConnectionManager::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Whether the queue emptied before the drain timeout.
    pub drained: bool,
    /// Messages still queued when the gateway was closed.
    pub remaining: usize,
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Owns one gateway session and the inbound queue fed by it.
///
/// Cloning is cheap; all clones share the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: BridgeSettings,
    gateway: BoxedGateway,
    outbound: BoxedOutbound,
    queue: InboundQueue,
    state: watch::Sender<ConnectionState>,
    running: AtomicBool,
    shutdown: CancellationToken,
    /// Cancelled by `stop()` once draining is over and the gateway is closed.
    closed: CancellationToken,
}

impl ConnectionManager {
    /// Creates a manager for `gateway`. Settings are validated by [`run`](Self::run).
    pub fn new<G: Gateway + 'static>(settings: BridgeSettings, gateway: Arc<G>) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        let outbound: BoxedOutbound = gateway.clone();
        Self {
            inner: Arc::new(Inner {
                settings,
                gateway,
                outbound,
                queue: InboundQueue::new(),
                state,
                running: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.inner.settings
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().is_ready
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of queued envelopes not yet consumed.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Callback handle the gateway reports into.
    pub fn events(&self) -> Arc<dyn GatewayEvents> {
        self.inner.clone()
    }

    /// Drives the gateway session until shutdown or a fatal error.
    ///
    /// Returns `Ok(())` after [`stop`](Self::stop). Fails with
    /// [`BridgeError::Configuration`] before any attempt if the settings are
    /// invalid, [`BridgeError::Authentication`] as soon as the gateway rejects
    /// the credential, and [`BridgeError::ReconnectExhausted`] once
    /// `max_reconnect_attempts` consecutive attempts have failed.
    pub async fn run(&self) -> BridgeResult<()> {
        self.inner.settings.validate()?;
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyRunning);
        }
        let result = self.session_loop().await;
        self.inner.running.store(false, Ordering::SeqCst);
        result
    }

    async fn session_loop(&self) -> BridgeResult<()> {
        let settings = &self.inner.settings;
        let max = settings.max_reconnect_attempts;

        loop {
            if self.is_shutdown_requested() {
                self.inner.set_status(ConnectionStatus::ShutDown);
                return Ok(());
            }

            self.inner.set_status(ConnectionStatus::Connecting);
            info!(
                attempt = self.inner.state.borrow().reconnect_attempt,
                "Connecting to gateway"
            );

            let events: Arc<dyn GatewayEvents> = self.inner.clone();
            let outcome = self.inner.gateway.connect(&settings.credential, events).await;

            if self.is_shutdown_requested() {
                debug!("Session ended after shutdown request");
                self.inner.set_status(ConnectionStatus::ShutDown);
                return Ok(());
            }

            let err = match outcome {
                Ok(()) => GatewayError::SessionClosed,
                Err(e) => e,
            };

            if err.is_fatal() {
                error!(error = %err, "Gateway rejected the credential");
                self.inner.state.send_modify(|s| {
                    s.status = ConnectionStatus::Failed;
                    s.is_ready = false;
                });
                return Err(err.into());
            }

            let mut attempt = 0;
            self.inner.state.send_modify(|s| {
                s.is_ready = false;
                s.reconnect_attempt += 1;
                attempt = s.reconnect_attempt;
            });

            if attempt >= max {
                error!(attempts = attempt, error = %err, "Max reconnection attempts reached");
                self.inner.set_status(ConnectionStatus::Failed);
                return Err(BridgeError::ReconnectExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = backoff_delay(settings.reconnect_base_delay, attempt);
            self.inner.set_status(ConnectionStatus::Reconnecting);
            warn!(
                attempt,
                max,
                delay = ?delay,
                error = %BridgeError::TransientConnection(err),
                "Connection lost, reconnecting"
            );

            tokio::select! {
                _ = self.inner.shutdown.cancelled() => {
                    debug!("Backoff interrupted by shutdown");
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Waits until the session is ready.
    ///
    /// Returns immediately when already ready. Fails with
    /// [`BridgeError::NotRunning`] if the manager fails or shuts down first.
    pub async fn wait_for_ready(&self) -> BridgeResult<()> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| s.is_ready || s.status.is_terminal())
            .await
            .map_err(|_| BridgeError::NotRunning)?;
        if state.is_ready {
            Ok(())
        } else {
            Err(BridgeError::NotRunning)
        }
    }

    /// Yields queued envelopes in arrival order.
    ///
    /// Messages accepted while [`stop`](Self::stop) is draining are still
    /// yielded. The stream ends once `stop()` has closed the gateway and the
    /// queue is empty.
    pub fn listen(&self) -> impl Stream<Item = Envelope> + Send + 'static {
        futures::stream::unfold(self.clone(), |manager| async move {
            let inner = &manager.inner;
            let poll = inner.settings.poll_interval;
            loop {
                if let Some(env) = inner.queue.try_pop() {
                    return Some((env, manager));
                }
                if inner.closed.is_cancelled() {
                    debug!("Inbound queue drained, listener finished");
                    return None;
                }
                let next = tokio::select! {
                    env = inner.queue.recv_timeout(poll) => env,
                    _ = inner.closed.cancelled() => None,
                };
                if let Some(env) = next {
                    return Some((env, manager));
                }
            }
        })
        .fuse()
    }

    /// Requests shutdown, drains the queue and closes the gateway.
    ///
    /// Any pending backoff sleep is cut short. A drain timeout is reported in
    /// the returned [`DrainReport`] and logged, never raised. A manager that
    /// already `Failed` keeps that status.
    pub async fn stop(&self) -> DrainReport {
        info!("Shutdown requested");
        self.inner.shutdown.cancel();
        self.inner.state.send_modify(|s| s.shutdown_requested = true);

        let timeout = self.inner.settings.drain_timeout;
        let queue = &self.inner.queue;
        let drained = tokio::time::timeout(timeout, async {
            while !queue.is_empty() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
        .await
        .is_ok();

        let remaining = queue.len();
        if !drained {
            warn!(
                remaining,
                timeout = ?timeout,
                "Drain timeout reached, closing with undrained messages"
            );
        }

        self.inner.gateway.close().await;
        self.inner.state.send_modify(|s| {
            s.is_ready = false;
            if s.status != ConnectionStatus::Failed {
                s.status = ConnectionStatus::ShutDown;
            }
        });
        self.inner.closed.cancel();
        info!("Connection closed");

        DrainReport { drained, remaining }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.inner.settings)
            .field("state", &*self.inner.state.borrow())
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

impl Inner {
    fn set_status(&self, status: ConnectionStatus) {
        self.state.send_modify(|s| s.status = status);
    }

    /// Applies the inbound filter, returning the reason a message is dropped.
    fn reject_reason(&self, raw: &RawMessage) -> Option<&'static str> {
        let (ready, identity) = {
            let state = self.state.borrow();
            (state.is_ready, state.bot_identity)
        };
        if !ready {
            return Some("not ready");
        }
        if identity == Some(raw.author_id) {
            return Some("own message");
        }
        if !raw.content.starts_with(&self.settings.command_prefix) {
            return Some("no command prefix");
        }
        let allowed = &self.settings.allowed_channel_ids;
        if !allowed.is_empty() && !allowed.contains(&raw.channel_id) {
            return Some("channel not allowed");
        }
        None
    }
}

#[async_trait]
impl GatewayEvents for Inner {
    async fn on_ready(&self, identity: u64) {
        self.state.send_modify(|s| {
            s.status = ConnectionStatus::Ready;
            s.is_ready = true;
            s.bot_identity = Some(identity);
            s.reconnect_attempt = 0;
        });
        info!(identity, "Gateway session ready");
    }

    async fn on_message(&self, raw: RawMessage) {
        if let Some(reason) = self.reject_reason(&raw) {
            trace!(channel_id = raw.channel_id, reason, "Dropping message");
            return;
        }

        debug!(
            author = %raw.author_name,
            channel_id = raw.channel_id,
            content = %preview(&raw.content),
            "Command received"
        );
        let delivery = DeliveryChannel::with_settings(
            raw.channel_id,
            self.outbound.clone(),
            self.settings.delivery,
        );
        let envelope = Envelope::from_raw(raw, &self.settings.command_prefix, delivery);
        self.queue.push(envelope);
    }
}
