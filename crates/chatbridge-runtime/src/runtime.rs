//! Bridge orchestration: connection task, dispatch loop and shutdown.
//!
//! ```rust,ignore
//! use chatbridge_runtime::BridgeRuntime;
//!
//! let mut runtime = BridgeRuntime::builder()
//!     .config_file("config.yaml")
//!     .build(gateway)?;
//!
//! runtime.router_mut().register("ping", ping, "Check the bot is alive", "");
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chatbridge_core::{BridgeResult, ConnectionManager, DrainReport, Envelope, Gateway};
use chatbridge_framework::{CommandRouter, Dispatched, MiddlewareChain};
use futures::StreamExt;
use tokio::signal;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Owns the configuration, the connection manager and the dispatch pipeline.
///
/// Register commands through [`router_mut`](Self::router_mut) and middleware
/// through [`middleware_mut`](Self::middleware_mut) before calling
/// [`run`](Self::run).
pub struct BridgeRuntime {
    config: BridgeConfig,
    manager: ConnectionManager,
    chain: MiddlewareChain,
    router: CommandRouter,
}

impl BridgeRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Validates `config`, initializes logging and wires up `gateway`.
    pub fn from_config<G: Gateway + 'static>(
        config: BridgeConfig,
        gateway: Arc<G>,
    ) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let manager = ConnectionManager::new(config.to_settings(), gateway);
        let router = CommandRouter::new().with_prefix(config.command_prefix.clone());

        info!(
            command_prefix = %config.command_prefix,
            channels = config.allowed_channel_ids.len(),
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            manager,
            chain: MiddlewareChain::new(),
            router,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut CommandRouter {
        &mut self.router
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.chain
    }

    pub fn middleware_mut(&mut self) -> &mut MiddlewareChain {
        &mut self.chain
    }

    /// Runs until Ctrl+C, SIGTERM or a fatal session error.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Bridge runtime starting. Press Ctrl+C to stop.");
        self.run_until(shutdown_signal()).await
    }

    /// Runs until `shutdown` completes or the session fails.
    ///
    /// Messages already queued when shutdown starts are still dispatched,
    /// within the configured drain timeout. Returns the session error, if any.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let manager = self.manager.clone();
        let mut session = tokio::spawn(async move { manager.run().await });

        let mut shutdown = std::pin::pin!(shutdown);
        let mut messages = std::pin::pin!(self.manager.listen());
        let mut stopping: Option<JoinHandle<DrainReport>> = None;
        let mut outcome: Option<RuntimeResult<()>> = None;
        let mut ready_seen = false;

        loop {
            tokio::select! {
                result = &mut session, if outcome.is_none() => {
                    let result = session_result(result);
                    if let Err(e) = &result {
                        error!(error = %e, "Bridge session ended with an error");
                    }
                    outcome = Some(result);
                    if stopping.is_none() {
                        stopping = Some(self.spawn_stop());
                    }
                }
                _ = &mut shutdown, if stopping.is_none() => {
                    info!("Shutdown signal received, draining");
                    stopping = Some(self.spawn_stop());
                }
                ready = self.manager.wait_for_ready(), if !ready_seen => {
                    ready_seen = true;
                    if ready.is_ok() {
                        info!("Bridge is ready, dispatching commands");
                    }
                }
                next = messages.next() => match next {
                    Some(envelope) => {
                        self.dispatch(envelope).await;
                    }
                    None => break,
                },
            }
        }

        if let Some(stop) = stopping {
            match stop.await {
                Ok(report) if report.drained => debug!("Inbound queue fully drained"),
                Ok(report) => warn!(remaining = report.remaining, "Stopped with undrained messages"),
                Err(e) => warn!(error = %e, "Stop task failed"),
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => session_result(session.await),
        };
        info!("Bridge runtime stopped");
        outcome
    }

    /// Runs one message through the middleware chain into the router.
    ///
    /// Handler failures are contained here: they are logged and returned as
    /// [`BridgeError::Handler`](chatbridge_core::BridgeError::Handler), never
    /// raised out of [`run`](Self::run).
    pub async fn dispatch(&self, envelope: Envelope) -> Dispatched {
        let dispatched = self.chain.dispatch(envelope, &self.router).await;
        match &dispatched.error {
            Some(e) => warn!(error = %e, passed = dispatched.passed, "Dispatch failed"),
            None => debug!(passed = dispatched.passed, "Dispatched message"),
        }
        dispatched
    }

    fn spawn_stop(&self) -> JoinHandle<DrainReport> {
        let manager = self.manager.clone();
        tokio::spawn(async move { manager.stop().await })
    }
}

fn session_result(result: Result<BridgeResult<()>, JoinError>) -> RuntimeResult<()> {
    match result {
        Ok(result) => result.map_err(RuntimeError::from),
        Err(e) => Err(RuntimeError::Join(e.to_string())),
    }
}

/// Completes on Ctrl+C or, on Unix, SIGTERM.
///
/// If no handler can be installed this never completes and only a session
/// error ends the run.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration and builds a [`BridgeRuntime`].
///
/// ```rust,ignore
/// let runtime = BridgeRuntime::builder()
///     .config_file("config/production.yaml")
///     .profile("production")
///     .build(gateway)?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: BridgeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build<G: Gateway + 'static>(self, gateway: Arc<G>) -> RuntimeResult<BridgeRuntime> {
        let config = self.config_loader.load()?;
        BridgeRuntime::from_config(config, gateway)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
