//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section is optional; missing values fall back to the scanner's
//! built-in defaults. Secrets (the webhook URL) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fs;

use crate::signal::SignalConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub signal: SignalConfig,
    pub schedule: ScheduleConfig,
    pub registry: RegistryConfig,
    pub market_data: MarketDataConfig,
    pub notify: NotifyConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// Seconds between the end of one scan cycle and the start of the next.
    pub interval_secs: u64,
    /// Lookback window for the signal series (Yahoo `range`).
    pub history_range: String,
    /// Bar size for the signal series (Yahoo `interval`).
    pub history_interval: String,
    pub chart_range: String,
    pub chart_interval: String,
    /// Max tickers fetched at once. 1 = strictly sequential.
    pub fetch_concurrency: usize,
    /// Start scanning as soon as the process is up.
    pub autostart: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            history_range: "1mo".to_string(),
            history_interval: "30m".to_string(),
            chart_range: "1mo".to_string(),
            chart_interval: "1d".to_string(),
            fetch_concurrency: 1,
            autostart: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wall-clock time of the daily ledger reset, "HH:MM".
    pub reset_time: String,
    /// IANA zone name ("America/New_York"). Process local time when absent.
    pub timezone: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reset_time: "09:30".to_string(),
            timezone: None,
        }
    }
}

impl ScheduleConfig {
    /// Parse `reset_time` into a `NaiveTime`.
    pub fn reset_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.reset_time, "%H:%M")
            .with_context(|| format!("Invalid schedule.reset_time: {}", self.reset_time))
    }

    /// Parse `timezone`, if configured.
    pub fn timezone(&self) -> Result<Option<chrono_tz::Tz>> {
        match &self.timezone {
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid schedule.timezone '{name}': {e}")),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    pub database_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://tickers.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Window of daily bars averaged into `LiveQuote::average_volume`.
    pub quote_range: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            timeout_secs: 30,
            quote_range: "3mo".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    /// Name of the env var holding the Discord webhook URL.
    pub discord_webhook_env: Option<String>,
    /// Prefix mention placed in every alert message.
    pub mention: String,
    pub queue_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            discord_webhook_env: Some("DISCORD_WEBHOOK_URL".to_string()),
            mention: "@everyone".to_string(),
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    fn validate(&self) -> Result<()> {
        if self.scanner.interval_secs == 0 {
            anyhow::bail!("scanner.interval_secs must be greater than zero");
        }
        if self.scanner.fetch_concurrency == 0 {
            anyhow::bail!("scanner.fetch_concurrency must be at least 1");
        }
        if self.notify.queue_capacity == 0 {
            anyhow::bail!("notify.queue_capacity must be at least 1");
        }
        self.signal.validate()?;
        self.schedule.reset_time()?;
        self.schedule.timezone()?;
        Ok(())
    }
}
