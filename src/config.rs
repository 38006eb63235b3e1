//! Configuration module for feedrelay.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::{RelayError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/feedrelay.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path. Empty for console only.
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Level overrides per component, e.g. `fetcher = "debug"`.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            components: BTreeMap::new(),
        }
    }
}

/// Polling cadence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Cadence for feeds without an override, in seconds.
    #[serde(default = "default_refresh_rate")]
    pub default_refresh_rate_secs: u64,
    /// How often the scheduler wakes up to check which cadences are due.
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
}

fn default_refresh_rate() -> u64 {
    600
}

fn default_tick() -> u64 {
    60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_refresh_rate_secs: default_refresh_rate(),
            tick_secs: default_tick(),
        }
    }
}

/// Feed fetcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// User agent sent by the standard fetch strategy.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum response body size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Hours a URL may keep failing before its feeds are disabled.
    #[serde(default = "default_failed_threshold")]
    pub failed_duration_threshold_hours: u64,
    /// Substring of the `server` header that marks an anti-bot gateway.
    #[serde(default = "default_anti_block_signature")]
    pub anti_block_server_signature: String,
    /// Status codes that make the fetcher retry with the next strategy.
    #[serde(default = "default_fallback_statuses")]
    pub fallback_statuses: Vec<u16>,
    /// Allow loopback and private network hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
    /// Number of concurrent fetch workers.
    #[serde(default = "default_fetch_workers")]
    pub workers: usize,
}

fn default_user_agent() -> String {
    concat!("feedrelay/", env!("CARGO_PKG_VERSION"), " (feed reader)").to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    15
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024
}

fn default_failed_threshold() -> u64 {
    18
}

fn default_anti_block_signature() -> String {
    "cloudflare".to_string()
}

fn default_fallback_statuses() -> Vec<u16> {
    vec![400, 403]
}

fn default_fetch_workers() -> usize {
    8
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            failed_duration_threshold_hours: default_failed_threshold(),
            anti_block_server_signature: default_anti_block_signature(),
            fallback_statuses: default_fallback_statuses(),
            allow_private_hosts: false,
            workers: default_fetch_workers(),
        }
    }
}

/// Delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Base URL of the chat platform REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Bot token used for channel sends.
    #[serde(default)]
    pub bot_token: String,
    /// Timeout for a single platform send, in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub request_timeout_secs: u64,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_delivery_workers")]
    pub workers: usize,
    /// Ranked article identifier schemes.
    #[serde(default = "default_id_type_names")]
    pub id_type_names: Vec<String>,
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_delivery_workers() -> usize {
    4
}

fn default_id_type_names() -> Vec<String> {
    vec!["guid".to_string(), "pubdate".to_string(), "title".to_string()]
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            bot_token: String::new(),
            request_timeout_secs: default_delivery_timeout(),
            workers: default_delivery_workers(),
            id_type_names: default_id_type_names(),
        }
    }
}

/// Entitlements of one account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntitlement {
    /// Owning account id.
    pub user_id: String,
    /// Maximum number of feeds; falls back to the default.
    pub max_feeds: Option<u32>,
    /// Maximum delivered articles per day per feed; falls back to the default.
    pub max_daily_articles: Option<u32>,
    /// Refresh rate override in minutes.
    pub refresh_rate_minutes: Option<u32>,
}

/// Entitlement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementsConfig {
    /// Feed count ceiling for accounts without an entry.
    #[serde(default = "default_max_feeds")]
    pub default_max_feeds: u32,
    /// Daily article ceiling for accounts without an entry.
    #[serde(default = "default_max_daily_articles")]
    pub default_max_daily_articles: u32,
    /// Per-account entitlements.
    #[serde(default)]
    pub accounts: Vec<AccountEntitlement>,
}

fn default_max_feeds() -> u32 {
    5
}

fn default_max_daily_articles() -> u32 {
    50
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            default_max_feeds: default_max_feeds(),
            default_max_daily_articles: default_max_daily_articles(),
            accounts: Vec::new(),
        }
    }
}

/// Message broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Capacity of each topic queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Operations API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Enable the operations API.
    #[serde(default)]
    pub enabled: bool,
    /// Host address to bind.
    #[serde(default = "default_api_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Schedule configuration.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Fetcher configuration.
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Delivery configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Entitlement configuration.
    #[serde(default)]
    pub entitlements: EntitlementsConfig,
    /// Broker configuration.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Operations API configuration.
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDRELAY_DATABASE_PATH`
    /// - `FEEDRELAY_BOT_TOKEN`
    /// - `FEEDRELAY_FEED_USER_AGENT`
    /// - `FEEDRELAY_DEFAULT_REFRESH_RATE_SECS`
    /// - `FEEDRELAY_DEFAULT_MAX_FEEDS`
    /// - `FEEDRELAY_FAILED_DURATION_THRESHOLD_HOURS`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = var("FEEDRELAY_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(token) = var("FEEDRELAY_BOT_TOKEN") {
            self.delivery.bot_token = token;
        }
        if let Some(agent) = var("FEEDRELAY_FEED_USER_AGENT") {
            self.fetcher.user_agent = agent;
        }
        if let Some(rate) = var("FEEDRELAY_DEFAULT_REFRESH_RATE_SECS").and_then(|v| v.parse().ok())
        {
            self.schedule.default_refresh_rate_secs = rate;
        }
        if let Some(max) = var("FEEDRELAY_DEFAULT_MAX_FEEDS").and_then(|v| v.parse().ok()) {
            self.entitlements.default_max_feeds = max;
        }
        if let Some(hours) =
            var("FEEDRELAY_FAILED_DURATION_THRESHOLD_HOURS").and_then(|v| v.parse().ok())
        {
            self.fetcher.failed_duration_threshold_hours = hours;
        }
    }

    /// Validate the configuration.
    ///
    /// The process must not start when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.delivery.bot_token.is_empty() {
            return Err(RelayError::Config(
                "delivery.bot_token is not set. \
                 Set it in config.toml or via FEEDRELAY_BOT_TOKEN environment variable."
                    .to_string(),
            ));
        }
        if self.schedule.default_refresh_rate_secs == 0 {
            return Err(RelayError::Config(
                "schedule.default_refresh_rate_secs must be greater than zero".to_string(),
            ));
        }
        if self.schedule.tick_secs == 0 {
            return Err(RelayError::Config(
                "schedule.tick_secs must be greater than zero".to_string(),
            ));
        }
        if self.fetcher.failed_duration_threshold_hours == 0 {
            return Err(RelayError::Config(
                "fetcher.failed_duration_threshold_hours must be greater than zero".to_string(),
            ));
        }
        if self.delivery.id_type_names.is_empty() {
            return Err(RelayError::Config(
                "delivery.id_type_names must list at least one identifier".to_string(),
            ));
        }
        if self.fetcher.workers == 0 || self.delivery.workers == 0 {
            return Err(RelayError::Config(
                "worker counts must be greater than zero".to_string(),
            ));
        }
        if let Some(unknown) = self
            .logging
            .components
            .keys()
            .find(|c| !crate::logging::COMPONENTS.contains(&c.as_str()))
        {
            return Err(RelayError::Config(format!(
                "logging.components: unknown component '{}' (expected one of {})",
                unknown,
                crate::logging::COMPONENTS.join(", ")
            )));
        }
        Ok(())
    }
}
