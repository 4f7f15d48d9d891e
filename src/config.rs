use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::client::DEFAULT_TELEGRAM_API_URL;
use crate::fetch::{DEFAULT_USER_AGENT, RetryPolicy};
use crate::serde_utils::deserialize_optional_duration;
use crate::transfer::TransferSettings;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub telegram_api_url: Option<Url>,
    pub listen_addr: Option<SocketAddr>,
    pub max_file_size: Option<u64>,
    pub chunk_size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub chunk_delay: Option<Duration>,
    pub chunking_enabled: Option<bool>,
    pub progress_updates: Option<bool>,
    pub fetch_user_agent: Option<String>,
    pub fetch_max_retries: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub fetch_retry_base_delay: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub fetch_timeout: Option<Duration>,
}

/// Environment overrides. Secrets are only read from here.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigEnv {
    pub telegram_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub telegram_api_url: Option<Url>,
    pub listen_addr: Option<SocketAddr>,
    pub max_file_size: Option<u64>,
    pub chunk_size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub chunk_delay: Option<Duration>,
    pub chunking_enabled: Option<bool>,
    pub progress_updates: Option<bool>,
    pub fetch_user_agent: Option<String>,
    pub fetch_max_retries: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub fetch_retry_base_delay: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub fetch_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub telegram_api_url: Url,
    pub listen_addr: SocketAddr,
    pub transfer: TransferSettings,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub fetch_timeout: Option<Duration>,
}

impl Config {
    pub fn telegram_token(&self) -> Result<&str> {
        self.telegram_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(anyhow!("TELEGRAM_TOKEN is not configured"))
    }
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Result<Config> {
    let defaults = TransferSettings::default();
    let default_retry = RetryPolicy::default();

    let telegram_api_url = match override_config.telegram_api_url.or(base.telegram_api_url) {
        Some(url) => url,
        None => Url::parse(DEFAULT_TELEGRAM_API_URL)?,
    };

    let listen_addr = match override_config.listen_addr.or(base.listen_addr) {
        Some(addr) => addr,
        None => DEFAULT_LISTEN_ADDR.parse()?,
    };

    let transfer = TransferSettings {
        max_file_size: override_config
            .max_file_size
            .or(base.max_file_size)
            .unwrap_or(defaults.max_file_size),
        chunk_size: override_config
            .chunk_size
            .or(base.chunk_size)
            .unwrap_or(defaults.chunk_size),
        chunk_delay: override_config
            .chunk_delay
            .or(base.chunk_delay)
            .unwrap_or(defaults.chunk_delay),
        chunking_enabled: override_config
            .chunking_enabled
            .or(base.chunking_enabled)
            .unwrap_or(defaults.chunking_enabled),
        progress_updates: override_config
            .progress_updates
            .or(base.progress_updates)
            .unwrap_or(defaults.progress_updates),
    };

    if transfer.chunk_size == 0 {
        bail!("chunk_size must be greater than zero");
    }
    if transfer.max_file_size == 0 {
        bail!("max_file_size must be greater than zero");
    }

    let retry = RetryPolicy {
        max_retries: override_config
            .fetch_max_retries
            .or(base.fetch_max_retries)
            .unwrap_or(default_retry.max_retries),
        base_delay: override_config
            .fetch_retry_base_delay
            .or(base.fetch_retry_base_delay)
            .unwrap_or(default_retry.base_delay),
    };

    Ok(Config {
        telegram_token: override_config.telegram_token,
        webhook_secret: override_config.webhook_secret.filter(|s| !s.is_empty()),
        telegram_api_url,
        listen_addr,
        transfer,
        user_agent: override_config
            .fetch_user_agent
            .or(base.fetch_user_agent)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        retry,
        fetch_timeout: override_config.fetch_timeout.or(base.fetch_timeout),
    })
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "file-relay", "file-relay")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Read configuration from `.env`, the environment and a TOML file.
///
/// An explicit `path` must exist; the default location is optional.
pub fn read_config(path: Option<&Path>) -> Result<Config> {
    let _ = dotenv();
    let env_config =
        envy::from_env::<ConfigEnv>().context("Invalid configuration in environment")?;

    let file_config = match path {
        Some(path) => read_config_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => ConfigFile::default(),
        },
    };

    merge_config(file_config, env_config)
}
