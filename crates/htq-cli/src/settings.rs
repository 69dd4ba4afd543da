//! Settings - defaults, then `htq.toml` (or `--config`), then `HTQ_*` env vars.
//!
//! Nested keys use `__` in the environment: `HTQ_REDIS__URL`,
//! `HTQ_BROKER__CANCEL_MAX_ATTEMPTS`, `HTQ_LOG__JSON`.

use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use htq_core::app::BrokerConfig;
use htq_core::store::KeySpace;
use serde::Deserialize;

const DEFAULT_FILE: &str = "htq.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub redis: RedisSettings,
    pub worker: WorkerSettings,
    pub broker: BrokerConfig,
    pub keys: KeySpace,
    pub log: LogSettings,
}

impl Settings {
    /// Load from `path`, or from `htq.toml` in the working directory if it
    /// exists. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::new(DEFAULT_FILE, FileFormat::Toml).required(false),
        };
        Self::from_builder(Config::builder().add_source(file))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("HTQ")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        Settings::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(settings.worker.concurrency, 4);
        assert_eq!(settings.broker, BrokerConfig::default());
        assert_eq!(settings.keys, KeySpace::default());
        assert_eq!(settings.log, LogSettings::default());
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let settings = from_toml(
            r#"
            [redis]
            url = "redis://cache:6380/2"

            [broker]
            cancel_max_attempts = 3

            [keys]
            send_queue = "staging:send"

            [log]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.redis.url, "redis://cache:6380/2");
        assert_eq!(settings.broker.cancel_max_attempts, 3);
        assert_eq!(
            settings.broker.wait_poll_interval_ms,
            BrokerConfig::default().wait_poll_interval_ms
        );
        assert_eq!(settings.keys.send_queue, "staging:send");
        assert_eq!(settings.keys.task_prefix, "htq:requests:");
        assert!(settings.log.json);
        assert_eq!(settings.log.level, "info");
    }

    #[rstest]
    #[case("[worker]\nconcurrency = \"many\"")]
    #[case("[broker]\ncancel_max_attempts = -1")]
    fn bad_values_are_rejected(#[case] toml: &str) {
        assert!(from_toml(toml).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("definitely/not/here.toml"))).is_err());
    }
}
