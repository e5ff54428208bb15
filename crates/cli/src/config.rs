// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `§10.3` configuration surface: a TOML file resolved from `--config`, the
//! platform config directory (via `dirs`), or environment variables,
//! validated eagerly so a bad deployment fails at startup rather than on
//! first use.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },

    #[error("no config file found; pass --config or set CROND_CONFIG")]
    NotFound,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Deserialized shape of the TOML config file. Every field is optional here
/// so environment variables and defaults can fill in what the file omits;
/// [`Config::validate`] is what actually enforces presence.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    app: Option<String>,
    topic_prefix: Option<String>,
    catalog: Option<PathBuf>,
    timer_queue_name: Option<String>,
    timer_queue_path: Option<String>,
    invocations_queue_name: Option<String>,
    invocations_queue_path: Option<String>,
    notification_push_path: Option<String>,
    notification_bind_addr: Option<String>,
    hmac_secret: Option<String>,
    hmac_secret_file: Option<PathBuf>,
}

/// Validated, fully-resolved configuration. `hmac_secret` is intentionally
/// excluded from `Debug` (see the manual impl below) so it never ends up in
/// a log line.
#[derive(Clone)]
pub struct Config {
    pub app: String,
    pub topic_prefix: &'static str,
    pub catalog: Option<PathBuf>,
    pub timer_queue_name: String,
    pub timer_queue_path: String,
    pub invocations_queue_name: String,
    pub invocations_queue_path: String,
    pub notification_push_path: String,
    pub notification_bind_addr: String,
    pub hmac_secret: Vec<u8>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app", &self.app)
            .field("topic_prefix", &self.topic_prefix)
            .field("catalog", &self.catalog)
            .field("timer_queue_name", &self.timer_queue_name)
            .field("invocations_queue_name", &self.invocations_queue_name)
            .field("notification_push_path", &self.notification_push_path)
            .field("notification_bind_addr", &self.notification_bind_addr)
            .field("hmac_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Resolve and load config: an explicit path, else `$CROND_CONFIG`, else
    /// `<platform config dir>/crond/config.toml`. Individual fields are then
    /// overridden by `CROND_*` environment variables, matching the way the
    /// source pack's own CLI lets env vars win over the file for container
    /// deployment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("CROND_CONFIG").map(PathBuf::from))
            .or_else(default_config_path)
            .ok_or(ConfigError::NotFound)?;

        let raw: RawConfig = if path.exists() {
            let text =
                std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.clone(), source })?
        } else if explicit_path.is_some() {
            return Err(ConfigError::Read {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file does not exist"),
            });
        } else {
            RawConfig::default()
        };

        let config = Self {
            app: env_override("CROND_APP", raw.app).unwrap_or_else(|| "crond".to_string()),
            topic_prefix: if is_dev_env() { "dev-cron" } else { "cron" },
            catalog: env_override("CROND_CATALOG", raw.catalog.and_then(|p| p.to_str().map(str::to_string)))
                .map(PathBuf::from)
                .or(raw.catalog),
            timer_queue_name: env_override("CROND_TIMER_QUEUE_NAME", raw.timer_queue_name)
                .unwrap_or_else(|| "timer".to_string()),
            timer_queue_path: env_override("CROND_TIMER_QUEUE_PATH", raw.timer_queue_path)
                .unwrap_or_else(|| "/tasks/timer".to_string()),
            invocations_queue_name: env_override("CROND_INVOCATIONS_QUEUE_NAME", raw.invocations_queue_name)
                .unwrap_or_else(|| "invocations".to_string()),
            invocations_queue_path: env_override("CROND_INVOCATIONS_QUEUE_PATH", raw.invocations_queue_path)
                .unwrap_or_else(|| "/tasks/invocations".to_string()),
            notification_push_path: env_override("CROND_NOTIFICATION_PUSH_PATH", raw.notification_push_path)
                .unwrap_or_else(|| "/notify".to_string()),
            notification_bind_addr: env_override("CROND_NOTIFICATION_BIND_ADDR", raw.notification_bind_addr)
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            hmac_secret: resolve_secret(raw.hmac_secret, raw.hmac_secret_file)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.trim().is_empty() {
            return Err(ConfigError::Invalid("app name must not be empty".into()));
        }
        if self.hmac_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "hmac secret must be set via CROND_HMAC_SECRET, CROND_HMAC_SECRET_FILE, or the config file".into(),
            ));
        }
        if self.notification_bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "notification_bind_addr {:?} is not a valid socket address",
                self.notification_bind_addr
            )));
        }
        Ok(())
    }
}

fn env_override(key: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).or(fallback)
}

fn is_dev_env() -> bool {
    std::env::var("CROND_ENV").map(|v| v != "production").unwrap_or(true)
}

fn resolve_secret(inline: Option<String>, file: Option<PathBuf>) -> Result<Vec<u8>, ConfigError> {
    if let Ok(v) = std::env::var("CROND_HMAC_SECRET") {
        if !v.is_empty() {
            return Ok(v.into_bytes());
        }
    }
    if let Ok(path) = std::env::var("CROND_HMAC_SECRET_FILE") {
        return std::fs::read(&path)
            .map(|bytes| trim_secret(bytes))
            .map_err(|source| ConfigError::Read { path: PathBuf::from(path), source });
    }
    if let Some(path) = file {
        return std::fs::read(&path).map(trim_secret).map_err(|source| ConfigError::Read { path, source });
    }
    Ok(inline.unwrap_or_default().into_bytes())
}

fn trim_secret(mut bytes: Vec<u8>) -> Vec<u8> {
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
    bytes
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crond").join("config.toml"))
}
