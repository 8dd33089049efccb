//! Configuration for the revalidating document client.
//!
//! Values are layered with [`figment`], later sources winning:
//!
//! 1. Built-in defaults.
//! 2. A config file (TOML, YAML or JSON, chosen by extension). Either the
//!    path given explicitly, or `config.toml` in the platform config
//!    directory when it exists.
//! 3. Environment variables prefixed with `REVALIDATE_`, using `__` to reach
//!    nested keys (e.g. `REVALIDATE_STORE__ENDPOINT`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "REVALIDATE_";
const TOKEN_ENV: &str = "REVALIDATE_STORE__TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Where the remote document service lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Used in log output only.
    #[serde(default = "StoreConfig::default_name")]
    pub name: String,
    pub endpoint: String,
    #[serde(default, deserialize_with = "deserialize_opt_text")]
    pub token: Option<String>,
    #[serde(default = "StoreConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}
impl StoreConfig {
    fn default_name() -> String {
        "default".to_string()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry behaviour for reads against the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per read, including the first.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub attempt_timeout_ms: Option<u64>,
}
impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 100,
            max_backoff_ms: 5000,
            attempt_timeout_ms: None,
        }
    }
}
impl RetryConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from defaults, a file and the environment.
    ///
    /// An explicit `path` that doesn't exist is an error; the default location
    /// is simply skipped when there's nothing there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => figment = merge_file(figment, path)?,
            None => {
                if let Some(path) = default_path().filter(|p| p.exists()) {
                    tracing::debug!(path = %path.display(), "Using default config file");
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        let mut config: Config =
            figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Parse)?;
        // Env values are parsed as numbers where possible, dropping leading zeros.
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.store.token = Some(token);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.endpoint.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("store.endpoint must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            exn::bail!(ErrorKind::Invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            exn::bail!(ErrorKind::Invalid("retry.base_backoff_ms exceeds retry.max_backoff_ms".to_string()));
        }
        Ok(())
    }
}

/// Environment values that look like numbers or booleans are handed over
/// typed. A secret made only of digits is still text.
fn deserialize_opt_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, number or boolean")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_char<E: de::Error>(self, v: char) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(self, deserializer: D2) -> std::result::Result<Self::Value, D2::Error> {
            deserializer.deserialize_any(TextVisitor)
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

/// `config.toml` in the platform-specific config directory, if the platform
/// has one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "revalidate").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
