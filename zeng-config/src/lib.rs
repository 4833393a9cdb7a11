//! Layered configuration loading utilities.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use zeng_core::{FeedKind, FeedSpec};

mod deserializer;

/// Root application configuration deserialized from layered sources.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON log file written alongside console output when set.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub ticker: TickerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TickerConfig {
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_lag_threshold_ms")]
    pub lag_threshold_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    /// Prefix for path-only push-stream URLs such as `/api/ws/stream`.
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    #[serde(default = "default_max_loss")]
    pub max_loss: Decimal,
    #[serde(default = "default_max_trades")]
    pub max_trades: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BacktestSettings {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    #[serde(default = "default_period")]
    pub default_period: usize,
}

/// A feed opened automatically when the ticker starts.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: FeedKind,
    #[serde(default, with = "deserializer::uppercase")]
    pub broker: Option<String>,
}

impl FeedConfig {
    pub fn to_spec(&self) -> FeedSpec {
        let broker = self
            .broker
            .clone()
            .unwrap_or_else(|| self.kind.default_broker().to_string());
        FeedSpec::new(self.url.clone(), self.kind, broker)
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: default_reconnect_interval_ms(),
            lag_threshold_ms: default_lag_threshold_ms(),
            history_capacity: default_history_capacity(),
            metrics_interval_secs: default_metrics_interval_secs(),
            metrics_addr: default_metrics_addr(),
            origin: None,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_loss: default_max_loss(),
            max_trades: default_max_trades(),
        }
    }
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            default_period: default_period(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    5_000
}

fn default_lag_threshold_ms() -> u64 {
    3_000
}

fn default_history_capacity() -> usize {
    500
}

fn default_metrics_interval_secs() -> u64 {
    5
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9200".into()
}

fn default_max_loss() -> Decimal {
    Decimal::new(-10_000, 0)
}

fn default_max_trades() -> u32 {
    50
}

fn default_initial_capital() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_period() -> usize {
    14
}

/// Loads configuration from `./config` merged with the environment.
///
/// Sources (lowest to highest precedence):
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (if `environment` is Some)
/// 3. `config/local.toml` (optional, ignored in git)
/// 4. Environment variables prefixed with `ZENG_`, nested with `__`
///    (e.g. `ZENG_RISK__MAX_LOSS=-5000`)
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    load_config_from(Path::new("config"), env)
}

/// Same as [`load_config`] with an explicit configuration directory.
pub fn load_config_from(base_path: &Path, env: Option<&str>) -> Result<AppConfig> {
    let mut builder =
        Config::builder().add_source(File::from(base_path.join("default.toml")).required(true));
    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(base_path.join(format!("{env_name}.toml"))).required(false));
    }

    builder = builder.add_source(File::from(base_path.join("local.toml")).required(false));

    builder = builder.add_source(
        Environment::with_prefix("ZENG")
            .prefix_separator("_")
            .separator("__")
            .ignore_empty(true),
    );

    let config = builder
        .build()
        .with_context(|| format!("failed to read configuration from {}", base_path.display()))?;
    config
        .try_deserialize()
        .context("invalid configuration values")
}
