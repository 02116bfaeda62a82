//! Configuration schema definitions.
//!
//! Keys are flat so existing `config.yaml` files keep working:
//!
//! ```yaml
//! discord_token: "..."
//! command_prefix: "!"
//! allowed_channel_ids: [123456789, "987654321"]
//! max_reconnect_attempts: 5
//! reconnect_base_delay: 1.0
//! logging:
//!   level: debug
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chatbridge_core::{BridgeSettings, DeliverySettings, MAX_BACKOFF};
use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Gateway login credential.
    #[serde(
        default,
        alias = "discord_token",
        alias = "token",
        skip_serializing_if = "String::is_empty"
    )]
    pub credential: String,

    /// Prefix that marks a message as a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Channels to accept commands from. Empty accepts every channel.
    #[serde(default, deserialize_with = "deserialize_channel_ids")]
    pub allowed_channel_ids: Vec<u64>,

    /// Consecutive failed connection attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base backoff delay in seconds.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay: f64,

    /// Seconds to wait for queued messages on shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Poll timeout of the inbound listener in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum characters per outbound message.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Pause between chunks of a long reply, in milliseconds.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            credential: String::new(),
            command_prefix: default_command_prefix(),
            allowed_channel_ids: Vec::new(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay: default_reconnect_base_delay(),
            drain_timeout_secs: default_drain_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_message_length: default_max_message_length(),
            chunk_delay_ms: default_chunk_delay_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("credential", &"<redacted>")
            .field("command_prefix", &self.command_prefix)
            .field("allowed_channel_ids", &self.allowed_channel_ids)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_base_delay", &self.reconnect_base_delay)
            .field("drain_timeout_secs", &self.drain_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_message_length", &self.max_message_length)
            .field("chunk_delay_ms", &self.chunk_delay_ms)
            .field("logging", &self.logging)
            .finish()
    }
}

impl BridgeConfig {
    /// Converts to core connection settings.
    ///
    /// Call [`validate_config`](super::validate_config) first. Without it an
    /// unrepresentable base delay becomes zero when negative or NaN and
    /// [`MAX_BACKOFF`] when too large.
    pub fn to_settings(&self) -> BridgeSettings {
        BridgeSettings {
            credential: self.credential.clone(),
            command_prefix: self.command_prefix.clone(),
            allowed_channel_ids: self.allowed_channel_ids.iter().copied().collect::<HashSet<_>>(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_base_delay: base_delay(self.reconnect_base_delay),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            delivery: DeliverySettings {
                max_message_len: self.max_message_length,
                chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            },
        }
    }
}

fn base_delay(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        MAX_BACKOFF
    } else {
        Duration::ZERO
    })
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay() -> f64 {
    1.0
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_message_length() -> usize {
    chatbridge_core::MAX_MESSAGE_LENGTH
}

fn default_chunk_delay_ms() -> u64 {
    chatbridge_core::CHUNK_DELAY.as_millis() as u64
}

/// Accepts channel ids as integers or numeric strings.
fn deserialize_channel_ids<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChannelId {
        Int(u64),
        Str(String),
    }

    Vec::<ChannelId>::deserialize(deserializer)?
        .into_iter()
        .map(|id| match id {
            ChannelId::Int(n) => Ok(n),
            ChannelId::Str(s) => s.trim().parse().map_err(|_| {
                serde::de::Error::custom(format!("invalid channel id '{s}'"))
            }),
        })
        .collect()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation policy for file output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used with `output: file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep. Zero keeps everything.
    #[serde(default)]
    pub max_files: usize,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `chatbridge_core: debug`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: 0,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;
    use figment::providers::{Format, Serialized, Yaml};

    fn parse(yaml: &str) -> Result<BridgeConfig, figment::Error> {
        Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    #[test]
    fn test_defaults() {
        let config = parse("discord_token: abc").unwrap();
        assert_eq!(config.credential, "abc");
        assert_eq!(config.command_prefix, "!");
        assert!(config.allowed_channel_ids.is_empty());
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay, 1.0);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_channel_ids_accept_strings() {
        let config = parse("token: abc\nallowed_channel_ids: [123, \"456\"]").unwrap();
        assert_eq!(config.allowed_channel_ids, vec![123, 456]);

        assert!(parse("token: abc\nallowed_channel_ids: [\"general\"]").is_err());
    }

    #[test]
    fn test_to_settings() {
        let config = parse(
            "credential: abc\ncommand_prefix: \"?\"\nallowed_channel_ids: [1, 2]\n\
             reconnect_base_delay: 0.5\ndrain_timeout_secs: 5",
        )
        .unwrap();
        let settings = config.to_settings();

        assert_eq!(settings.credential, "abc");
        assert_eq!(settings.command_prefix, "?");
        assert_eq!(settings.allowed_channel_ids, HashSet::from([1, 2]));
        assert_eq!(settings.reconnect_base_delay, Duration::from_millis(500));
        assert_eq!(settings.drain_timeout, Duration::from_secs(5));
        assert_eq!(settings.delivery, DeliverySettings::default());
    }

    #[test]
    fn test_to_settings_out_of_range_delay() {
        let mut config = parse("credential: abc").unwrap();
        config.reconnect_base_delay = f64::INFINITY;
        assert_eq!(config.to_settings().reconnect_base_delay, MAX_BACKOFF);

        config.reconnect_base_delay = -2.0;
        assert_eq!(config.to_settings().reconnect_base_delay, Duration::ZERO);

        config.reconnect_base_delay = f64::NAN;
        assert_eq!(config.to_settings().reconnect_base_delay, Duration::ZERO);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let config = parse("credential: super-secret").unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
