//! Configuration module for the greeter plugin
//!
//! Precedence, lowest first: built-in defaults, the TOML file, the
//! `DF_PLUGIN_*` environment, then command-line arguments.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, GreeterSettings, LoggingSettings};

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Load configuration from file or create default configuration
///
/// # Arguments
/// * `path` - Path of the TOML configuration file
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
pub async fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let config_str = tokio::fs::read_to_string(path).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    } else {
        warn!("Configuration file not found: {}, using defaults", path.display());

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(path, config_str).await?;
        info!("Created default configuration file: {}", path.display());

        Ok(default_config)
    }
}

/// Applies environment then command-line overrides.
pub fn apply_overrides<F>(config: &mut Config, args: &Args, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    config.plugin.apply_env_from(env);

    if let Some(address) = &args.address {
        config.plugin.server_address = Some(address.clone());
    }
    if let Some(plugin_id) = &args.plugin_id {
        config.plugin.plugin_id = plugin_id.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

/// Validates the configuration for consistency and correctness.
pub fn validate(config: &Config) -> Result<()> {
    config.plugin.validate()?;

    if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
        anyhow::bail!(
            "Invalid log level: {}. Must be one of: {:?}",
            config.logging.level,
            VALID_LOG_LEVELS
        );
    }
    if config.greeter.world.trim().is_empty() {
        anyhow::bail!("greeter.world must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn test_load_config_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("greeter.toml");

        let config = load_config(&path).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // The written file must load back to the same values.
        let reloaded = load_config(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_config_existing() {
        let temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[plugin]
plugin_id = "greeter-eu"
server_address = "tcp://10.0.0.5:50051"

[plugin.batching]
max_batch_size = 64

[greeter]
filtered_word = "creeper"

[logging]
level = "debug"
"#;
        tokio::fs::write(temp_file.path(), config_content).await.unwrap();

        let config = load_config(temp_file.path()).await.unwrap();
        assert_eq!(config.plugin.plugin_id, "greeter-eu");
        assert_eq!(config.plugin.batching.max_batch_size, 64);
        assert_eq!(config.plugin.batching.flush_window_us, 1_000);
        assert_eq!(config.greeter.filtered_word, "creeper");
        assert_eq!(config.greeter.replacement, "***");
        assert_eq!(config.logging.level, "debug");
        assert!(validate(&config).is_ok());
    }

    #[tokio::test]
    async fn test_load_config_rejects_bad_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "[plugin\nplugin_id = ").await.unwrap();
        assert!(load_config(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_cli_overrides_environment() {
        let env: HashMap<&str, &str> = [
            ("DF_PLUGIN_ID", "from-env"),
            ("DF_PLUGIN_SERVER_ADDRESS", "127.0.0.1:6000"),
        ]
        .into_iter()
        .collect();
        let args = Args {
            plugin_id: Some("from-cli".to_string()),
            log_level: Some("warn".to_string()),
            json_logs: true,
            ..Default::default()
        };

        let mut config = Config::default();
        apply_overrides(&mut config, &args, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.plugin.plugin_id, "from-cli");
        assert_eq!(config.plugin.server_address.as_deref(), Some("127.0.0.1:6000"));
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_validation_rejects_runtime_settings() {
        let mut config = Config::default();
        config.plugin.batching.max_batch_size = 0;
        assert!(validate(&config).is_err());
    }
}
