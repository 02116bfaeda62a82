//! Configuration validation.

use chatbridge_core::PLACEHOLDER_CREDENTIAL;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BridgeConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BridgeConfig) -> ConfigResult<()> {
    validate_credential(&config.credential)?;
    validate_connection(config)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_credential(credential: &str) -> ConfigResult<()> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(ConfigError::missing_field("credential"));
    }
    if credential == PLACEHOLDER_CREDENTIAL {
        return Err(ConfigError::validation(
            "replace the placeholder credential with your actual bot token",
        ));
    }
    Ok(())
}

fn validate_connection(config: &BridgeConfig) -> ConfigResult<()> {
    let prefix_len = config.command_prefix.chars().count();
    if !(1..=10).contains(&prefix_len) {
        return Err(ConfigError::validation(format!(
            "command_prefix must be 1 to 10 characters, got {prefix_len}"
        )));
    }

    if !(1..=20).contains(&config.max_reconnect_attempts) {
        return Err(ConfigError::validation(format!(
            "max_reconnect_attempts must be between 1 and 20, got {}",
            config.max_reconnect_attempts
        )));
    }

    if !(0.1..=60.0).contains(&config.reconnect_base_delay) {
        return Err(ConfigError::validation(format!(
            "reconnect_base_delay must be between 0.1 and 60 seconds, got {}",
            config.reconnect_base_delay
        )));
    }

    if config.poll_interval_ms == 0 || config.poll_interval_ms > 1000 {
        return Err(ConfigError::validation(
            "poll_interval_ms must be between 1 and 1000",
        ));
    }

    if config.max_message_length == 0 {
        return Err(ConfigError::validation(
            "max_message_length must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "invalid logging filter module '{module}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BridgeConfig {
        BridgeConfig {
            credential: "token".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_credential_rules() {
        let missing = BridgeConfig::default();
        assert!(matches!(
            validate_config(&missing),
            Err(ConfigError::MissingField { .. })
        ));

        let placeholder = BridgeConfig {
            credential: PLACEHOLDER_CREDENTIAL.into(),
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&placeholder),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_ranges() {
        let cases = [
            BridgeConfig { command_prefix: String::new(), ..valid() },
            BridgeConfig { command_prefix: "x".repeat(11), ..valid() },
            BridgeConfig { max_reconnect_attempts: 0, ..valid() },
            BridgeConfig { max_reconnect_attempts: 21, ..valid() },
            BridgeConfig { reconnect_base_delay: 0.05, ..valid() },
            BridgeConfig { reconnect_base_delay: 61.0, ..valid() },
        ];
        for config in cases {
            assert!(validate_config(&config).is_err(), "{config:?} should be rejected");
        }

        let edges = [
            BridgeConfig { command_prefix: "x".repeat(10), ..valid() },
            BridgeConfig { max_reconnect_attempts: 20, ..valid() },
            BridgeConfig { reconnect_base_delay: 0.1, ..valid() },
        ];
        for config in edges {
            assert!(validate_config(&config).is_ok(), "{config:?} should be accepted");
        }
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("bridge.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
