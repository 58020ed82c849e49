//! Configuration management for the grid market maker.
//!
//! Loads settings from environment variables and config files.

use crate::exchange::Instrument;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Exchange endpoint and credentials
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Grid shape and sizing
    #[serde(default)]
    pub grid: GridConfig,
    /// Reference price selection
    #[serde(default)]
    pub price: PriceConfig,
    /// Rebalance cadence
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Retry policy for idempotent requests
    #[serde(default)]
    pub retry: RetryConfig,
    /// Notification and command transport
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST host, without the `/v2` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Streaming endpoint used by the order-book viewer
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret for signing requests
    #[serde(default)]
    pub api_secret: String,
    /// Base asset of the traded instrument (e.g. "usdt")
    #[serde(default = "default_base_asset")]
    pub base_asset: String,
    /// Quote asset of the traded instrument (e.g. "dop")
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// Transport timeout for a single HTTP call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Which sizing policy the grid planner uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingKind {
    /// Equal share of the budget at every level
    Proportional,
    /// Random draws renormalised to the budget
    RandomWeighted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of levels per side
    #[serde(default = "default_levels")]
    pub levels: u32,
    /// Proportional distance between consecutive levels (0.09 = 9%)
    #[serde(default = "default_spread_per_level")]
    pub spread_per_level: Decimal,
    /// Portion of each side's balance committed per cycle (0.0-1.0)
    #[serde(default = "default_allocation_fraction")]
    pub allocation_fraction: Decimal,
    /// Sizing policy
    #[serde(default = "default_sizing")]
    pub sizing: SizingKind,
}

/// Where the reference price comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Operator-controlled override, seeded with `default_mid_price`
    FixedOverride,
    /// Mid of the exchange's best bid/ask
    BookMid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_price_source")]
    pub source: PriceSource,
    /// Initial value of the override cell
    #[serde(default = "default_mid_price")]
    pub default_mid_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Sleep between rebalance cycles
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Pause after a failed cancel-all before placing anyway
    #[serde(default = "default_cancel_failure_delay")]
    pub cancel_failure_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for an idempotent request (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; empty disables Telegram entirely
    #[serde(default)]
    pub bot_token: String,
    /// Chat that receives notifications and may issue commands
    #[serde(default)]
    pub chat_id: String,
    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

// Default value functions
fn default_base_url() -> String {
    "https://api.bitcoinrd.do".to_string()
}

fn default_stream_url() -> String {
    "wss://api.bitcoinrd.do/stream".to_string()
}

fn default_base_asset() -> String {
    "usdt".to_string()
}

fn default_quote_asset() -> String {
    "dop".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_levels() -> u32 {
    5
}

fn default_spread_per_level() -> Decimal {
    Decimal::new(9, 2) // 0.09
}

fn default_allocation_fraction() -> Decimal {
    Decimal::new(99, 2) // 0.99
}

fn default_sizing() -> SizingKind {
    SizingKind::Proportional
}

fn default_price_source() -> PriceSource {
    PriceSource::FixedOverride
}

fn default_mid_price() -> Decimal {
    Decimal::new(58, 0)
}

fn default_update_interval() -> u64 {
    600
}

fn default_cancel_failure_delay() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_poll_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("GMM"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.grid.levels >= 1, "grid.levels must be at least 1");

        anyhow::ensure!(
            self.grid.spread_per_level > Decimal::ZERO,
            "grid.spread_per_level must be positive"
        );

        anyhow::ensure!(
            self.grid.allocation_fraction > Decimal::ZERO
                && self.grid.allocation_fraction <= Decimal::ONE,
            "grid.allocation_fraction must be between 0 and 1"
        );

        anyhow::ensure!(
            self.schedule.update_interval_secs > 0,
            "schedule.update_interval_secs must be positive"
        );

        anyhow::ensure!(
            self.retry.max_attempts >= 1,
            "retry.max_attempts must be at least 1"
        );

        Ok(())
    }
}

impl ExchangeConfig {
    /// Instrument identifier as the exchange spells it (e.g. "usdt-dop").
    pub fn symbol(&self) -> String {
        format!("{}-{}", self.base_asset, self.quote_asset)
    }

    pub fn instrument(&self) -> Instrument {
        Instrument::new(&self.base_asset, &self.quote_asset)
    }
}

impl TelegramConfig {
    pub fn is_enabled(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_url: default_stream_url(),
            api_key: String::new(),
            api_secret: String::new(),
            base_asset: default_base_asset(),
            quote_asset: default_quote_asset(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            spread_per_level: default_spread_per_level(),
            allocation_fraction: default_allocation_fraction(),
            sizing: default_sizing(),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            source: default_price_source(),
            default_mid_price: default_mid_price(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            cancel_failure_delay_secs: default_cancel_failure_delay(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.exchange.symbol(), "usdt-dop");
        assert_eq!(config.grid.levels, 5);
        assert_eq!(config.grid.spread_per_level, dec!(0.09));
        assert_eq!(config.grid.allocation_fraction, dec!(0.99));
        assert_eq!(config.price.default_mid_price, dec!(58));
        assert_eq!(config.schedule.update_interval_secs, 600);
        assert_eq!(config.schedule.cancel_failure_delay_secs, 10);
        assert!(!config.telegram.is_enabled());
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let mut config = Config::default();
        config.grid.allocation_fraction = dec!(1.5);
        assert!(config.validate().is_err());

        config.grid.allocation_fraction = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_levels() {
        let mut config = Config::default();
        config.grid.levels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_names_deserialize_from_snake_case() {
        let sizing: SizingKind = serde_json::from_str("\"random_weighted\"").unwrap();
        assert_eq!(sizing, SizingKind::RandomWeighted);

        let source: PriceSource = serde_json::from_str("\"book_mid\"").unwrap();
        assert_eq!(source, PriceSource::BookMid);
    }
}
