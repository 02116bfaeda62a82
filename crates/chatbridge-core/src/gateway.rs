//! Contracts for the external gateway collaborator.
//!
//! The wire protocol (handshake, heartbeats, event decoding) lives outside this
//! crate. A platform client plugs in by implementing [`Gateway`]; the
//! [`ConnectionManager`](crate::ConnectionManager) hands it an
//! [`Arc<dyn GatewayEvents>`] to call back into when the session becomes ready
//! or a message arrives.
//!
//! ```text
//! Gateway (platform client) ──on_ready / on_message──▶ GatewayEvents
//!                                                      (ConnectionManager)
//! DeliveryChannel ──send_text / send_embed / send_file──▶ Outbound
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::delivery::{Embed, FileAttachment};
use crate::envelope::RawMessage;
use crate::error::{GatewayError, GatewayResult};

/// Outbound half of a gateway: the only primitives a reply may use.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Sends a single text unit to `channel_id`.
    async fn send_text(&self, channel_id: u64, text: &str) -> GatewayResult<()>;

    /// Sends a rich embed to `channel_id`.
    async fn send_embed(&self, _channel_id: u64, _embed: &Embed) -> GatewayResult<()> {
        Err(GatewayError::Unsupported("send_embed"))
    }

    /// Sends a file, optionally with accompanying text.
    async fn send_file(
        &self,
        _channel_id: u64,
        _content: Option<&str>,
        _file: &FileAttachment,
    ) -> GatewayResult<()> {
        Err(GatewayError::Unsupported("send_file"))
    }
}

/// A real-time messaging gateway session.
#[async_trait]
pub trait Gateway: Outbound {
    /// Logs in with `credential` and drives the session.
    ///
    /// Blocks until the session closes (`Ok`) or fails. A rejected credential
    /// must be reported as [`GatewayError::Authentication`].
    async fn connect(
        &self,
        credential: &str,
        events: Arc<dyn GatewayEvents>,
    ) -> GatewayResult<()>;

    /// Tears down the current session, making a pending `connect` return.
    async fn close(&self);
}

/// Callbacks a gateway invokes during a session.
#[async_trait]
pub trait GatewayEvents: Send + Sync {
    /// The session is fully established; `identity` is the bridge's own user id.
    async fn on_ready(&self, identity: u64);

    /// A raw message event arrived.
    async fn on_message(&self, message: RawMessage);
}

/// Shared gateway handle.
pub type BoxedGateway = Arc<dyn Gateway>;

/// Shared outbound handle.
pub type BoxedOutbound = Arc<dyn Outbound>;
