//! Normalized inbound messages.

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::delivery::{DeliveryChannel, Embed};
use crate::error::BridgeResult;

/// A raw message event as delivered by the gateway, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Author's user id.
    pub author_id: u64,
    /// Author's display name.
    pub author_name: String,
    /// Channel the message was posted in.
    pub channel_id: u64,
    /// Full message text, prefix included.
    pub content: String,
    /// Whether the channel is a direct-message channel.
    pub is_dm: bool,
}

impl RawMessage {
    /// Creates a raw message in a guild channel.
    pub fn new(author_id: u64, channel_id: u64, content: impl Into<String>) -> Self {
        Self {
            author_id,
            author_name: String::new(),
            channel_id,
            content: content.into(),
            is_dm: false,
        }
    }

    /// Sets the author's display name.
    pub fn with_author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = name.into();
        self
    }

    /// Marks the message as a direct message.
    pub fn direct(mut self) -> Self {
        self.is_dm = true;
        self
    }
}

/// The normalized view of one inbound command message.
///
/// `content` has the command prefix removed and surrounding whitespace
/// trimmed. Replies go through the [`DeliveryChannel`] bound to the origin
/// channel; cloning an envelope is cheap.
#[derive(Clone)]
pub struct Envelope {
    /// Prefix-stripped, trimmed content.
    pub content: String,
    /// Author's user id.
    pub author_id: u64,
    /// Author's display name.
    pub author_name: String,
    /// Origin channel id.
    pub channel_id: u64,
    /// Whether the message came from a direct-message channel.
    pub is_dm: bool,
    delivery: DeliveryChannel,
}

impl Envelope {
    /// Normalizes `raw`, stripping `prefix` once and trimming the remainder.
    pub fn from_raw(raw: RawMessage, prefix: &str, delivery: DeliveryChannel) -> Self {
        let content = raw
            .content
            .strip_prefix(prefix)
            .unwrap_or(&raw.content)
            .trim()
            .to_string();

        debug!(
            author = %raw.author_name,
            channel_id = raw.channel_id,
            is_dm = raw.is_dm,
            content = %preview(&content),
            "Envelope created"
        );

        Self {
            content,
            author_id: raw.author_id,
            author_name: raw.author_name,
            channel_id: raw.channel_id,
            is_dm: raw.is_dm,
            delivery,
        }
    }

    /// Returns the delivery channel bound to this message's origin.
    pub fn delivery(&self) -> &DeliveryChannel {
        &self.delivery
    }

    /// Replies in the origin channel, chunking long text.
    pub async fn reply(&self, text: &str) -> BridgeResult<()> {
        self.delivery.reply(text).await
    }

    /// Replies with a rich embed.
    pub async fn reply_with_embed(&self, embed: &Embed) -> BridgeResult<()> {
        self.delivery.reply_with_embed(embed).await
    }

    /// Replies with a file attachment.
    pub async fn reply_with_file(
        &self,
        content: Option<&str>,
        path: impl AsRef<Path>,
        filename: Option<&str>,
    ) -> BridgeResult<()> {
        self.delivery.reply_with_file(content, path, filename).await
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("content", &self.content)
            .field("author_id", &self.author_id)
            .field("author_name", &self.author_name)
            .field("channel_id", &self.channel_id)
            .field("is_dm", &self.is_dm)
            .finish_non_exhaustive()
    }
}

/// First 50 characters of `text`, for log lines.
pub(crate) fn preview(text: &str) -> String {
    const MAX: usize = 50;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOutbound;
    use std::sync::Arc;

    fn delivery(channel_id: u64) -> DeliveryChannel {
        DeliveryChannel::new(channel_id, Arc::new(RecordingOutbound::default()))
    }

    #[test]
    fn test_envelope_strips_prefix_and_trims() {
        let raw = RawMessage::new(123, 456, "!  hello world  ").with_author_name("TestUser");
        let env = Envelope::from_raw(raw, "!", delivery(456));

        assert_eq!(env.content, "hello world");
        assert_eq!(env.author_id, 123);
        assert_eq!(env.author_name, "TestUser");
        assert_eq!(env.channel_id, 456);
        assert!(!env.is_dm);
    }

    #[test]
    fn test_envelope_multi_char_prefix() {
        let raw = RawMessage::new(1, 2, "?!ping").direct();
        let env = Envelope::from_raw(raw, "?!", delivery(2));
        assert_eq!(env.content, "ping");
        assert!(env.is_dm);
    }

    #[test]
    fn test_envelope_strips_prefix_only_once() {
        let raw = RawMessage::new(1, 2, "!!echo");
        let env = Envelope::from_raw(raw, "!", delivery(2));
        assert_eq!(env.content, "!echo");
    }

    #[test]
    fn test_prefixed_text_round_trips_for_assorted_inputs() {
        for text in ["time", " echo hi ", "\tmulti\nline\t", "", "ünïcödé"] {
            let raw = RawMessage::new(1, 2, format!("!{text}"));
            let env = Envelope::from_raw(raw, "!", delivery(2));
            assert_eq!(env.content, text.trim());
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(60);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 53);
        assert_eq!(preview("short"), "short");
    }
}
