//! Layered configuration loading with figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Values passed to [`ConfigLoader::merge`]
//! 3. Profile-specific file (`chatbridge.{profile}.yaml`)
//! 4. Main file (`chatbridge.yaml`, `config.yaml`, ...)
//! 5. Environment variables (`CHATBRIDGE_*`)
//!
//! # Environment Variable Mapping
//!
//! Variables use the `CHATBRIDGE_` prefix with `__` as the nesting separator:
//!
//! - `CHATBRIDGE_CREDENTIAL=xxx` → `credential = "xxx"`
//! - `CHATBRIDGE_COMMAND_PREFIX=?` → `command_prefix = "?"`
//! - `CHATBRIDGE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Feature Flags
//!
//! - `yaml-config` *(default)*: `chatbridge.yaml`, `chatbridge.yml`, `config.yaml`, `config.yml`
//! - `toml-config`: `chatbridge.toml`, `config.toml`

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BridgeConfig;
use super::validation::validate_config;

/// Environment variable that selects the profile.
pub const PROFILE_ENV: &str = "CHATBRIDGE_PROFILE";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "CHATBRIDGE_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads [`PROFILE_ENV`], defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            _ => Self::Custom(name.to_string()),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a [`BridgeConfig`] from files, environment and overrides.
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .file("bot/config.yaml")
///     .without_env()
///     .load()?;
/// ```
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search. Without any, the current directory and
    /// the user config directory are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` over the defaults, below any file or environment value.
    ///
    /// A non-empty `credential` here clashes with a file that still uses the
    /// `discord_token` or `token` key.
    pub fn merge(mut self, config: BridgeConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads the configuration without validating it.
    pub fn load(self) -> ConfigResult<BridgeConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: BridgeConfig = figment.extract()?;

        debug!(
            profile = %profile,
            command_prefix = %config.command_prefix,
            channels = config.allowed_channel_ids.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BridgeConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::Parse(format!(
                "unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("chatbridge"));
        }
        paths
    }

    /// Finds the first base file among `search_paths × base_names`, merging
    /// its profile variant underneath it.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["chatbridge.yaml", "chatbridge.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["chatbridge.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads from the default locations and validates the result.
pub fn load_config() -> ConfigResult<BridgeConfig> {
    let config = ConfigLoader::new().load()?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads `path` (plus environment overrides) and validates the result.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BridgeConfig> {
    let config = ConfigLoader::new().file(path).load()?;
    validate_config(&config)?;
    Ok(config)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use figment::Jail;

    fn jailed<T>(result: ConfigResult<T>) -> figment::error::Result<T> {
        result.map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = jailed(
                ConfigLoader::new()
                    .search_path(jail.directory())
                    .without_env()
                    .load(),
            )?;
            assert_eq!(config.command_prefix, "!");
            assert_eq!(config.max_reconnect_attempts, 5);
            assert_eq!(config.logging.level, LogLevel::Info);
            Ok(())
        });
    }

    #[test]
    fn test_load_file_with_legacy_keys() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                "discord_token: \"abc.def\"\n\
                 command_prefix: \"?\"\n\
                 allowed_channel_ids: [\"123\", 456]\n\
                 max_reconnect_attempts: 3\n\
                 reconnect_base_delay: 0.5\n",
            )?;

            let config = jailed(load_config_from_file("config.yaml"))?;
            assert_eq!(config.credential, "abc.def");
            assert_eq!(config.command_prefix, "?");
            assert_eq!(config.allowed_channel_ids, vec![123, 456]);
            assert_eq!(config.max_reconnect_attempts, 3);
            assert_eq!(config.reconnect_base_delay, 0.5);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("chatbridge.yaml", "credential: from-file\ncommand_prefix: \"!\"")?;
            jail.set_env("CHATBRIDGE_COMMAND_PREFIX", "$");
            jail.set_env("CHATBRIDGE_LOGGING__LEVEL", "debug");

            let config = jailed(ConfigLoader::new().search_path(jail.directory()).load())?;
            assert_eq!(config.credential, "from-file");
            assert_eq!(config.command_prefix, "$");
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_is_overridden_by_main_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "chatbridge.production.yaml",
                "credential: prod\nmax_reconnect_attempts: 9",
            )?;
            jail.create_file("chatbridge.yaml", "credential: main")?;

            let config = jailed(
                ConfigLoader::new()
                    .profile("prod")
                    .search_path(jail.directory())
                    .without_env()
                    .load(),
            )?;
            assert_eq!(config.credential, "main");
            assert_eq!(config.max_reconnect_attempts, 9);
            Ok(())
        });
    }

    #[test]
    fn test_merge_sits_below_files() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "command_prefix: \"%\"")?;

            let config = jailed(
                ConfigLoader::new()
                    .merge(BridgeConfig {
                        credential: "merged".into(),
                        command_prefix: "#".into(),
                        ..Default::default()
                    })
                    .search_path(jail.directory())
                    .without_env()
                    .load(),
            )?;
            assert_eq!(config.credential, "merged");
            assert_eq!(config.command_prefix, "%");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        Jail::expect_with(|_jail| {
            let err = ConfigLoader::new().file("nope.yaml").load().unwrap_err();
            assert!(matches!(err, ConfigError::FileNotFound(path) if path.ends_with("nope.yaml")));
            Ok(())
        });
    }

    #[test]
    fn test_placeholder_rejected_on_load() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "discord_token: YOUR_DISCORD_BOT_TOKEN_HERE")?;
            let err = load_config_from_file("config.yaml").unwrap_err();
            assert!(matches!(err, ConfigError::Validation { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "max_reconnect_attempts: lots")?;
            let err = ConfigLoader::new().file("config.yaml").without_env().load().unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)));
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
