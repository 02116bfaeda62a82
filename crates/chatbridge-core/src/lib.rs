//! # chatbridge core
//!
//! Session and message plumbing for a chat-platform bridge.
//!
//! The gateway protocol itself is an external collaborator reached through the
//! [`Gateway`] trait. This crate owns everything between that collaborator and
//! the dispatch layer:
//!
//! - **Connection lifecycle**: login, readiness, reconnect with exponential
//!   backoff and drain-based shutdown ([`ConnectionManager`])
//! - **Inbound pipeline**: self/prefix/whitelist filtering and an ordered
//!   queue of normalized [`Envelope`]s ([`InboundQueue`])
//! - **Outbound delivery**: chunked, rate-limit-aware replies bound to the
//!   origin channel ([`DeliveryChannel`])
//!
//! ```text
//! Gateway ──on_message──▶ filter ──▶ InboundQueue ──listen()──▶ dispatch
//!    ▲                                                            │
//!    └──────────────── DeliveryChannel::reply ◀───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatbridge_core::{BridgeSettings, ConnectionManager};
//! use futures::StreamExt;
//!
//! let manager = ConnectionManager::new(BridgeSettings::new(token), gateway);
//! tokio::spawn({
//!     let manager = manager.clone();
//!     async move { manager.run().await }
//! });
//! manager.wait_for_ready().await?;
//!
//! let mut messages = std::pin::pin!(manager.listen());
//! while let Some(env) = messages.next().await {
//!     env.reply(&format!("you said: {}", env.content)).await?;
//! }
//! ```

pub mod connection;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod queue;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::{
    BridgeSettings, ConnectionManager, ConnectionState, ConnectionStatus, DrainReport,
    MAX_BACKOFF, PLACEHOLDER_CREDENTIAL, backoff_delay,
};
pub use delivery::{
    CHUNK_DELAY, DEFAULT_EMBED_COLOR, DeliveryChannel, DeliverySettings, Embed, EmbedField,
    FileAttachment, MAX_MESSAGE_LENGTH, split_message,
};
pub use envelope::{Envelope, RawMessage};
pub use error::{BridgeError, BridgeResult, GatewayError, GatewayResult};
pub use gateway::{BoxedGateway, BoxedOutbound, Gateway, GatewayEvents, Outbound};
pub use queue::InboundQueue;
