//! Command routing.
//!
//! The router splits an envelope's content into a command name and an
//! argument string, then calls the handler registered under that name:
//!
//! ```text
//! "echo   hello world" ──▶ ("echo", "hello world") ──▶ handlers["echo"]
//! ```
//!
//! `help` is answered by the router itself with a listing of every registered
//! command. Unknown names go to the default handler when one is set.
//!
//! A failing command is answered with [`HANDLER_ERROR_NOTICE`] and still counts
//! as handled. A failing default handler is only logged and counts as
//! unhandled.
//!
//! # Tower Service Integration
//!
//! `CommandRouter` implements `tower::Service<Envelope>`, so tower middleware
//! can wrap it directly:
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .concurrency_limit(1)
//!     .service(router.clone());
//! ```

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chatbridge_core::{BridgeError, BridgeResult, Envelope};
use tower::Service;
use tracing::{debug, error, trace, warn};

use crate::handler::{BoxedCommandHandler, CommandHandler, Terminal};

/// Reply sent when a handler fails.
pub const HANDLER_ERROR_NOTICE: &str = "An error occurred while executing this command.";

const HELP_COMMAND: &str = "help";

/// Splits `content` into a lower-cased command name and its arguments.
///
/// The name ends at the first whitespace run; leading whitespace is removed
/// from the arguments. Empty content yields an empty name.
pub fn parse_command(content: &str) -> (String, &str) {
    let content = content.trim_start();
    match content.split_once(char::is_whitespace) {
        Some((name, args)) => (name.to_lowercase(), args.trim_start()),
        None => (content.to_lowercase(), ""),
    }
}

/// Result of routing one message.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    /// A handler (or the built-in help) ran successfully.
    Handled,
    /// A registered command failed; the user was sent an error notice.
    Failed(BridgeError),
    /// The default handler failed. Nothing was sent to the user.
    DefaultFailed(BridgeError),
    /// No command matched and no default handler is set.
    Unmatched,
}

impl RouteOutcome {
    /// `true` for [`Handled`](Self::Handled) and [`Failed`](Self::Failed).
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled | Self::Failed(_))
    }

    /// The handler error, if a handler failed.
    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            Self::Failed(e) | Self::DefaultFailed(e) => Some(e),
            Self::Handled | Self::Unmatched => None,
        }
    }

    pub fn into_result(self) -> BridgeResult<()> {
        match self {
            Self::Failed(e) | Self::DefaultFailed(e) => Err(e),
            Self::Handled | Self::Unmatched => Ok(()),
        }
    }
}

/// A registered command.
#[derive(Clone)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub usage: String,
    handler: BoxedCommandHandler,
}

impl fmt::Debug for CommandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInfo")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct RouterInner {
    commands: BTreeMap<String, CommandInfo>,
    default: Option<BoxedCommandHandler>,
    prefix: String,
    reserve_help: bool,
}

/// Maps command names to handlers.
///
/// Cloning is cheap; modifying a clone copies the table first.
#[derive(Clone)]
pub struct CommandRouter {
    inner: Arc<RouterInner>,
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRouter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RouterInner {
                commands: BTreeMap::new(),
                default: None,
                prefix: "!".to_string(),
                reserve_help: true,
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut RouterInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Sets the prefix shown in help text.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.set_prefix(prefix);
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.inner_mut().prefix = prefix.into();
    }

    /// Controls whether `help` is answered before user commands are consulted.
    ///
    /// With `false`, a user-registered `help` command takes precedence and the
    /// built-in listing is only used when none is registered.
    pub fn reserve_help(mut self, reserve: bool) -> Self {
        self.inner_mut().reserve_help = reserve;
        self
    }

    /// Registers `handler` under `name` (case-insensitive), replacing any
    /// previous registration.
    pub fn register<H>(
        &mut self,
        name: &str,
        handler: H,
        description: impl Into<String>,
        usage: impl Into<String>,
    ) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        let name = name.to_lowercase();
        if self.inner.reserve_help && name == HELP_COMMAND {
            warn!("A 'help' command is shadowed by the built-in help");
        }
        debug!(command = %name, "Registered command");
        let info = CommandInfo {
            name: name.clone(),
            description: description.into(),
            usage: usage.into(),
            handler: Arc::new(handler),
        };
        self.inner_mut().commands.insert(name, info);
        self
    }

    /// Sets the handler for unrecognized commands.
    pub fn set_default<H>(&mut self, handler: H) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        debug!("Default handler registered");
        self.inner_mut().default = Some(Arc::new(handler));
        self
    }

    /// Unregisters `name`. Returns whether it was registered.
    pub fn remove(&mut self, name: &str) -> bool {
        self.inner_mut().commands.remove(&name.to_lowercase()).is_some()
    }

    /// Removes every command and the default handler.
    pub fn clear(&mut self) {
        let inner = self.inner_mut();
        inner.commands.clear();
        inner.default = None;
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.inner.commands.contains_key(&name.to_lowercase())
    }

    /// Snapshot of the registered commands, sorted by name.
    pub fn get_commands(&self) -> BTreeMap<String, CommandInfo> {
        self.inner.commands.clone()
    }

    /// Renders the help listing.
    pub fn help_text(&self) -> String {
        let prefix = &self.inner.prefix;
        let mut lines = vec!["**Available Commands:**\n".to_string()];
        for (name, info) in &self.inner.commands {
            let mut line = format!("`{prefix}{name}`");
            if !info.description.is_empty() {
                line.push_str(&format!(" - {}", info.description));
            }
            if !info.usage.is_empty() {
                line.push_str(&format!("\n  Usage: `{prefix}{name} {}`", info.usage));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Routes `message` to its handler.
    pub async fn handle(&self, message: &Envelope) -> RouteOutcome {
        let (command, args) = parse_command(&message.content);
        trace!(command = %command, args_len = args.len(), "Routing command");

        let registered = self.inner.commands.get(&command);
        let is_help = command == HELP_COMMAND && (self.inner.reserve_help || registered.is_none());
        if is_help {
            if let Err(e) = message.reply(&self.help_text()).await {
                error!(error = %e, "Failed to send help text");
            }
            debug!("Help command executed");
            return RouteOutcome::Handled;
        }

        if let Some(info) = registered {
            return match invoke(&info.handler, message, args).await {
                Ok(()) => {
                    debug!(command = %command, "Command handled");
                    RouteOutcome::Handled
                }
                Err(e) => {
                    error!(command = %command, error = %e, "Error handling command");
                    if let Err(send_err) = message.reply(HANDLER_ERROR_NOTICE).await {
                        warn!(error = %send_err, "Failed to send error notice");
                    }
                    RouteOutcome::Failed(e)
                }
            };
        }

        if let Some(default) = &self.inner.default {
            return match invoke(default, message, args).await {
                Ok(()) => {
                    debug!("Default handler executed");
                    RouteOutcome::Handled
                }
                Err(e) => {
                    error!(command = %command, error = %e, "Error in default handler");
                    RouteOutcome::DefaultFailed(e)
                }
            };
        }

        debug!(command = %command, "No handler found");
        RouteOutcome::Unmatched
    }
}

async fn invoke(handler: &BoxedCommandHandler, message: &Envelope, args: &str) -> BridgeResult<()> {
    handler
        .call(message, args)
        .await
        .map_err(|e| BridgeError::handler(e.to_string()))
}

impl fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRouter")
            .field("commands", &self.inner.commands.keys().collect::<Vec<_>>())
            .field("has_default", &self.inner.default.is_some())
            .field("prefix", &self.inner.prefix)
            .field("reserve_help", &self.inner.reserve_help)
            .finish()
    }
}

#[async_trait]
impl Terminal for CommandRouter {
    async fn call(&self, message: &Envelope) -> BridgeResult<()> {
        let outcome = self.handle(message).await;
        if !outcome.is_handled() {
            trace!(content = %message.content, "Message left unhandled");
        }
        outcome.into_result()
    }
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

impl Service<Envelope> for CommandRouter {
    type Response = RouteOutcome;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Envelope) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.handle(&message).await) })
    }
}
