//! Outbound replies bound to a single channel.
//!
//! A [`DeliveryChannel`] is the only way handlers reach the gateway's send
//! primitives. Long text is split into fixed-size chunks that are sent one by
//! one with a pause in between, keeping well under the platform's per-channel
//! rate limit (roughly five messages per five seconds).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{BridgeError, BridgeResult, GatewayError};
use crate::gateway::BoxedOutbound;

/// Maximum characters per message unit.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Pause between consecutive chunks of one reply.
pub const CHUNK_DELAY: Duration = Duration::from_millis(1200);

/// Default embed colour (blue).
pub const DEFAULT_EMBED_COLOR: u32 = 0x3498db;

/// Chunking parameters for replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Maximum characters per sent unit.
    pub max_message_len: usize,
    /// Delay inserted between chunks.
    pub chunk_delay: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LENGTH,
            chunk_delay: CHUNK_DELAY,
        }
    }
}

/// Splits `text` into consecutive slices of at most `max` characters.
///
/// Slicing is on character boundaries with no awareness of words or lines.
/// Empty input yields no chunks.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Reply capability bound to one origin channel.
#[derive(Clone)]
pub struct DeliveryChannel {
    channel_id: u64,
    outbound: BoxedOutbound,
    settings: DeliverySettings,
}

impl DeliveryChannel {
    /// Creates a delivery channel with default chunking.
    pub fn new(channel_id: u64, outbound: BoxedOutbound) -> Self {
        Self::with_settings(channel_id, outbound, DeliverySettings::default())
    }

    /// Creates a delivery channel with explicit chunking parameters.
    pub fn with_settings(
        channel_id: u64,
        outbound: BoxedOutbound,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            channel_id,
            outbound,
            settings,
        }
    }

    /// Returns the bound channel id.
    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    /// Sends `text`, splitting it when it exceeds the message limit.
    ///
    /// The first failing chunk aborts the reply and is reported as
    /// [`BridgeError::Send`]; chunks already sent stay sent.
    pub async fn reply(&self, text: &str) -> BridgeResult<()> {
        let len = text.chars().count();
        if len <= self.settings.max_message_len {
            debug!(channel_id = self.channel_id, len, "Sending single message");
            return self.send_unit(text).await;
        }

        let chunks = split_message(text, self.settings.max_message_len);
        info!(
            channel_id = self.channel_id,
            len,
            chunks = chunks.len(),
            "Message too long, splitting into chunks"
        );

        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            self.send_unit(chunk).await?;
            debug!(
                chunk = i + 1,
                total = chunks.len(),
                len = chunk.chars().count(),
                "Sent chunk"
            );
            if i < last {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
        }
        Ok(())
    }

    /// Sends a rich embed.
    pub async fn reply_with_embed(&self, embed: &Embed) -> BridgeResult<()> {
        self.outbound
            .send_embed(self.channel_id, embed)
            .await
            .map_err(|e| send_failure("embed", e))?;
        debug!(channel_id = self.channel_id, title = ?embed.title, "Sent embed reply");
        Ok(())
    }

    /// Sends a file located at `path`, optionally renamed to `filename`.
    ///
    /// Fails with [`BridgeError::FileNotFound`] before contacting the gateway
    /// if the file does not exist.
    pub async fn reply_with_file(
        &self,
        content: Option<&str>,
        path: impl AsRef<Path>,
        filename: Option<&str>,
    ) -> BridgeResult<()> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(BridgeError::FileNotFound(path.to_path_buf()));
        }

        let file = FileAttachment::new(path, filename);
        self.outbound
            .send_file(self.channel_id, content, &file)
            .await
            .map_err(|e| send_failure("file", e))?;
        debug!(channel_id = self.channel_id, file = %file.filename, "Sent file reply");
        Ok(())
    }

    async fn send_unit(&self, text: &str) -> BridgeResult<()> {
        self.outbound
            .send_text(self.channel_id, text)
            .await
            .map_err(|e| send_failure("message", e))
    }
}

impl fmt::Debug for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryChannel")
            .field("channel_id", &self.channel_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn send_failure(what: &str, err: GatewayError) -> BridgeError {
    let bridged = match err {
        GatewayError::Send { status, message } => BridgeError::Send { status, message },
        other => BridgeError::Send {
            status: None,
            message: other.to_string(),
        },
    };
    error!(kind = what, error = %bridged, "Failed to send reply");
    bridged
}

// =============================================================================
// Rich content
// =============================================================================

/// A single embed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich embed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Default for Embed {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            color: DEFAULT_EMBED_COLOR,
            fields: Vec::new(),
            footer: None,
            image_url: None,
            thumbnail_url: None,
        }
    }
}

impl Embed {
    /// Creates an empty embed with the default colour.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    /// Serializes the embed to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A file to upload alongside a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    /// Local path of the file.
    pub path: PathBuf,
    /// Name shown to recipients.
    pub filename: String,
}

impl FileAttachment {
    /// Creates an attachment, defaulting the display name to the path's basename.
    pub fn new(path: impl AsRef<Path>, filename: Option<&str>) -> Self {
        let path = path.as_ref().to_path_buf();
        let filename = filename.map(str::to_string).unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Self { path, filename }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOutbound;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn channel(outbound: &Arc<RecordingOutbound>) -> DeliveryChannel {
        DeliveryChannel::new(7, outbound.clone())
    }

    #[test]
    fn test_split_message_fixed_slices() {
        let chunks = split_message(&"a".repeat(4500), 2000);
        let lens: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![2000, 2000, 500]);
        assert!(split_message("", 2000).is_empty());
    }

    #[test]
    fn test_split_message_counts_characters() {
        let chunks = split_message(&"é".repeat(3), 2);
        assert_eq!(chunks, vec!["éé".to_string(), "é".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_short_message_single_send() {
        let outbound = Arc::new(RecordingOutbound::default());
        channel(&outbound).reply("This is a short reply.").await.unwrap();

        assert_eq!(outbound.sent(), vec![(7, "This is a short reply.".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_exactly_limit_is_one_chunk() {
        let outbound = Arc::new(RecordingOutbound::default());
        let start = Instant::now();
        channel(&outbound).reply(&"a".repeat(2000)).await.unwrap();

        assert_eq!(outbound.sent().len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_splits_long_message_with_delay() {
        let outbound = Arc::new(RecordingOutbound::default());
        let start = Instant::now();
        channel(&outbound).reply(&"a".repeat(2001)).await.unwrap();

        let sent = outbound.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "a".repeat(2000));
        assert_eq!(sent[1].1, "a");
        assert_eq!(start.elapsed(), CHUNK_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_wraps_gateway_failure() {
        let outbound = Arc::new(RecordingOutbound::failing(GatewayError::send(
            Some(403),
            "Missing Permissions",
        )));
        let err = channel(&outbound).reply("This will fail.").await.unwrap_err();

        match err {
            BridgeError::Send { status, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(message, "Missing Permissions");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_stops_at_first_failing_chunk() {
        let outbound = Arc::new(RecordingOutbound::failing_after(
            1,
            GatewayError::connection("reset"),
        ));
        let err = channel(&outbound).reply(&"b".repeat(4500)).await.unwrap_err();

        assert!(matches!(err, BridgeError::Send { status: None, .. }));
        assert_eq!(outbound.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_with_file_missing_path() {
        let outbound = Arc::new(RecordingOutbound::default());
        let err = channel(&outbound)
            .reply_with_file(Some("here"), "/nonexistent/path/report.pdf", None)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::FileNotFound(_)));
        assert!(outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reply_with_file_uploads_to_origin_channel() {
        let dir = std::env::temp_dir().join("chatbridge-delivery-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.txt");
        std::fs::write(&path, "uptime: 3d").unwrap();

        let outbound = Arc::new(RecordingOutbound::default());
        channel(&outbound)
            .reply_with_file(Some("Weekly report"), &path, Some("weekly.txt"))
            .await
            .unwrap();

        let files = outbound.files();
        assert_eq!(files.len(), 1);
        let (channel_id, content, file) = &files[0];
        assert_eq!(*channel_id, 7);
        assert_eq!(content.as_deref(), Some("Weekly report"));
        assert_eq!(file.path, path);
        assert_eq!(file.filename, "weekly.txt");
        assert!(outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reply_with_embed_unsupported_is_send_error() {
        let outbound = Arc::new(RecordingOutbound::default());
        let embed = Embed::new().title("Status").field("Uptime", "3d", true);
        let err = channel(&outbound).reply_with_embed(&embed).await.unwrap_err();
        assert!(matches!(err, BridgeError::Send { .. }));
    }

    #[test]
    fn test_embed_builder_and_json() {
        let embed = Embed::new()
            .title("My Response")
            .description("Here's some information")
            .color(0x00ff00)
            .field("Field 1", "Value 1", true)
            .footer("Powered by chatbridge");

        let json = embed.to_json();
        assert_eq!(json["title"], "My Response");
        assert_eq!(json["color"], 0x00ff00);
        assert_eq!(json["fields"][0]["inline"], true);
        assert!(json.get("image_url").is_none());
        assert_eq!(Embed::new().color, DEFAULT_EMBED_COLOR);
    }

    #[test]
    fn test_file_attachment_default_name() {
        let file = FileAttachment::new("/tmp/docs/report.pdf", None);
        assert_eq!(file.filename, "report.pdf");
        let renamed = FileAttachment::new("/tmp/docs/report.pdf", Some("q3.pdf"));
        assert_eq!(renamed.filename, "q3.pdf");
    }
}
