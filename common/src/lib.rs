/*!
common/src/lib.rs

Shared configuration types for updeck.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default file with an optional override file
- Environment overrides and validation applied once at start-up
*/

use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HTTP server section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (e.g. "0.0.0.0")
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Update feed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// RSS/XML feed listing the product updates
    pub url: String,
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

/// Blob storage target for generated decks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Full connection string ("AccountName=...;AccountKey=...;...")
    pub connection_string: Option<String>,
    /// Name of an env var holding the connection string (preferred over inline secrets)
    pub connection_string_env: Option<String>,
    /// Overrides the account name found in the connection string
    pub account_name: Option<String>,
    /// Name of an env var holding the base64 account key used for signing
    pub account_key_env: Option<String>,
    pub container: String,
}

/// Purge job settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Path prepended to the purge name prefix
    pub path_prefix: Option<String>,
    pub enabled: Option<bool>,
}

/// Scheduler (purge times) configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// List of wall-clock times in "HH:MM" 24h UTC format when the purge should run
    #[serde(default)]
    pub times: Vec<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub feed: FeedConfig,
    pub storage: StorageConfig,
    pub purge: Option<PurgeConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Environment variables that override file settings.
pub const ENV_FEED_URL: &str = "UPDECK_FEED_URL";
pub const ENV_STORAGE_CONNECTION: &str = "UPDECK_STORAGE_CONNECTION";
pub const ENV_STORAGE_ACCOUNT: &str = "UPDECK_STORAGE_ACCOUNT";
pub const ENV_STORAGE_CONTAINER: &str = "UPDECK_STORAGE_CONTAINER";
pub const ENV_PURGE_PATH: &str = "UPDECK_PURGE_PATH";

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply the `UPDECK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_FEED_URL) {
            self.feed.url = url;
        }
        if let Some(conn) = get(ENV_STORAGE_CONNECTION) {
            // the inline value must win over any file-level env indirection
            self.storage.connection_string = Some(conn);
            self.storage.connection_string_env = None;
        }
        if let Some(account) = get(ENV_STORAGE_ACCOUNT) {
            self.storage.account_name = Some(account);
        }
        if let Some(container) = get(ENV_STORAGE_CONTAINER) {
            self.storage.container = container;
        }
        if let Some(path) = get(ENV_PURGE_PATH) {
            self.purge.get_or_insert_with(PurgeConfig::default).path_prefix = Some(path);
        }
    }

    /// Reject settings that would only fail later, mid-request.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.feed.url)
            .with_context(|| format!("feed.url is not a valid URL: '{}'", self.feed.url))?;

        if self.storage.container.trim().is_empty() {
            return Err(anyhow!("storage.container must not be empty"));
        }

        self.scheduler.parsed_times()?;
        Ok(())
    }

    pub fn purge_enabled(&self) -> bool {
        self.purge.as_ref().and_then(|p| p.enabled).unwrap_or(true)
    }

    /// Path component of the purge prefix (empty when unset).
    pub fn purge_path(&self) -> &str {
        self.purge
            .as_ref()
            .and_then(|p| p.path_prefix.as_deref())
            .unwrap_or("")
    }
}

impl StorageConfig {
    /// Connection string from the named env var, falling back to the inline value.
    pub fn resolve_connection_string(&self) -> Option<String> {
        self.connection_string_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .or_else(|| self.connection_string.clone())
    }

    /// Account key from the env var named by `account_key_env`.
    pub fn resolve_account_key(&self) -> Result<Option<String>> {
        match self.account_key_env.as_deref() {
            Some(name) => std::env::var(name)
                .map(Some)
                .with_context(|| format!("storage key env var '{}' not set", name)),
            None => Ok(None),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured "HH:MM" times, sorted and deduplicated.
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>> {
        let mut times = self
            .times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M")
                    .with_context(|| format!("invalid scheduler time '{}', expected HH:MM", t))
            })
            .collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();
        Ok(times)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    const MINIMAL: &str = r#"
        [feed]
        url = "https://example.com/updates/rss"

        [storage]
        connection_string = "AccountName=acct;AccountKey=a2V5"
        container = "decks"

        [scheduler]
        times = ["05:00", "01:30"]
    "#;

    #[test]
    fn config_from_string() {
        let cfg: Config = toml::from_str(MINIMAL).expect("parse config");
        assert_eq!(cfg.feed.url, "https://example.com/updates/rss");
        assert_eq!(cfg.storage.container, "decks");
        assert!(cfg.purge_enabled());
        assert_eq!(cfg.purge_path(), "");
        cfg.validate().expect("valid config");

        let times = cfg.scheduler.parsed_times().expect("times");
        assert_eq!(times[0], NaiveTime::from_hms_opt(1, 30, 0).unwrap());
        assert_eq!(times[1], NaiveTime::from_hms_opt(5, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        fs::write(&default_path, MINIMAL).unwrap();
        fs::write(
            &override_path,
            r#"
            [storage]
            container = "other"

            [purge]
            path_prefix = "tmp/"
            "#,
        )
        .unwrap();

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load");

        assert_eq!(cfg.storage.container, "other");
        // untouched keys of a merged table survive
        assert_eq!(
            cfg.storage.connection_string.as_deref(),
            Some("AccountName=acct;AccountKey=a2V5")
        );
        assert_eq!(cfg.purge_path(), "tmp/");
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_FEED_URL, "https://feeds.example.org/rss"),
            (ENV_STORAGE_CONTAINER, "ppt"),
            (ENV_STORAGE_ACCOUNT, ""),
            (ENV_PURGE_PATH, "out/"),
        ]
        .into_iter()
        .collect();

        cfg.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.feed.url, "https://feeds.example.org/rss");
        assert_eq!(cfg.storage.container, "ppt");
        assert!(cfg.storage.account_name.is_none());
        assert_eq!(cfg.purge_path(), "out/");
    }

    #[test]
    fn connection_override_beats_file_env_indirection() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.storage.connection_string_env = Some("UPDECK_TEST_FILE_CONNECTION".into());
        std::env::set_var("UPDECK_TEST_FILE_CONNECTION", "AccountName=fromfile;AccountKey=a2V5");
        assert_eq!(
            cfg.storage.resolve_connection_string().as_deref(),
            Some("AccountName=fromfile;AccountKey=a2V5")
        );

        cfg.apply_overrides_from(|k| {
            (k == ENV_STORAGE_CONNECTION).then(|| "AccountName=fromenv;AccountKey=a2V5".to_string())
        });

        assert!(cfg.storage.connection_string_env.is_none());
        assert_eq!(
            cfg.storage.resolve_connection_string().as_deref(),
            Some("AccountName=fromenv;AccountKey=a2V5")
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.scheduler.times.push("25:99".into());
        assert!(cfg.validate().is_err());

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.storage.container = "  ".into();
        assert!(cfg.validate().is_err());

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.feed.url = "not a url".into();
        assert!(cfg.validate().is_err());
    }
}
