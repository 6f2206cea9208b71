//! Configuration types and loading
//!
//! Key precedence: KEY_POOL_KEYS env var > keys_file > inline keys.
//! Keys stay wrapped in `Secret` until they are handed to the pool so they
//! never show up in Debug output or logs.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding a comma-separated key list.
pub const KEYS_ENV: &str = "KEY_POOL_KEYS";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub pool: PoolConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Key pool settings
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub keys: Vec<Secret<String>>,
    /// Newline-separated key file; blank lines and `#` comments are skipped
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    /// Zero or absent disables TTL expiry
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub auto_remove_expired: bool,
}

/// Retry wrapper settings
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    key_pool::retry::DEFAULT_MAX_RETRIES
}

impl PoolConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Plain key strings for `KeyPool` construction.
    pub fn key_strings(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.expose().clone()).collect()
    }
}

impl Config {
    /// Load configuration from a TOML file, then resolve keys from the
    /// environment or the keys file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(raw) = std::env::var(KEYS_ENV) {
            config.pool.keys = parse_env_keys(&raw);
        } else if let Some(ref keys_file) = config.pool.keys_file {
            let raw =
                std::fs::read_to_string(keys_file).map_err(|source| common::Error::KeysFile {
                    path: keys_file.clone(),
                    source,
                })?;
            config.pool.keys = parse_keys_file(&raw);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.pool.keys.is_empty() {
            return Err(common::Error::Config(format!(
                "no API keys configured; set pool.keys, pool.keys_file or {KEYS_ENV}"
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(common::Error::Config(
                "max_retries must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("key-rotator.toml")
    }
}

/// Comma-separated keys from the environment. Keys are opaque, so a leading
/// `#` is part of the key.
fn parse_env_keys(raw: &str) -> Vec<Secret<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| Secret::new(k.to_owned()))
        .collect()
}

/// One key per line; blank lines and `#` comment lines are skipped.
fn parse_keys_file(raw: &str) -> Vec<Secret<String>> {
    raw.lines()
        .map(str::trim)
        .filter(|k| !k.is_empty() && !k.starts_with('#'))
        .map(|k| Secret::new(k.to_owned()))
        .collect()
}
