use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// REST endpoint of the exchange
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Route orders to the paper exchange instead of a live venue
    #[serde(default = "default_true")]
    pub test_mode: bool,
    /// Starting balance of the paper account in quote currency
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
    /// Symbols the paper exchange lists
    #[serde(default = "default_tradable_pairs")]
    pub tradable_pairs: Vec<String>,
    /// Last prices quoted by the paper exchange
    #[serde(default = "default_reference_prices")]
    pub reference_prices: HashMap<String, Decimal>,
    /// Simulated round trip for paper orders
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_base_url() -> String {
    "https://api.example.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_paper_balance() -> Decimal {
    dec!(1000)
}

fn default_tradable_pairs() -> Vec<String> {
    ["BTC/USDT", "ETH/USDT", "XRP/USDT", "ADA/USDT", "DOT/USDT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reference_prices() -> HashMap<String, Decimal> {
    HashMap::from([("BTC/USDT".to_string(), dec!(50000))])
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            base_url: default_base_url(),
            test_mode: true,
            paper_balance: default_paper_balance(),
            tradable_pairs: default_tradable_pairs(),
            reference_prices: default_reference_prices(),
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Default percentage of the balance put at risk per trade (e.g., 1 = 1%)
    #[serde(default = "default_risk_percentage")]
    pub risk_percentage: Decimal,
    /// Default leverage when the trade does not specify one
    #[serde(default = "default_leverage")]
    pub default_leverage: Decimal,
}

fn default_risk_percentage() -> Decimal {
    dec!(1)
}

fn default_leverage() -> Decimal {
    dec!(1)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percentage: default_risk_percentage(),
            default_leverage: default_leverage(),
        }
    }
}

/// Limits enforced by the order validator
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_quantity")]
    pub min_quantity: Decimal,
    #[serde(default = "default_max_quantity")]
    pub max_quantity: Decimal,
    #[serde(default = "default_min_price")]
    pub min_price: Decimal,
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,
    #[serde(default = "default_max_risk_percent")]
    pub max_risk_percent: Decimal,
}

fn default_min_quantity() -> Decimal {
    dec!(0.00001)
}

fn default_max_quantity() -> Decimal {
    dec!(1000000)
}

fn default_min_price() -> Decimal {
    dec!(0.00001)
}

fn default_max_price() -> Decimal {
    dec!(1000000)
}

fn default_max_leverage() -> Decimal {
    dec!(100)
}

fn default_max_risk_percent() -> Decimal {
    dec!(5)
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_quantity: default_min_quantity(),
            max_quantity: default_max_quantity(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            max_leverage: default_max_leverage(),
            max_risk_percent: default_max_risk_percent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Command queue buffer size
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Status polls before an order is declared timed out
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Delay between status polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long the compensating cancel may wait for queue capacity
    #[serde(default = "default_compensation_timeout")]
    pub compensation_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_poll_attempts() -> u32 {
    30
}

fn default_poll_interval() -> u64 {
    200
}

fn default_compensation_timeout() -> u64 {
    1000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval(),
            compensation_timeout_ms: default_compensation_timeout(),
        }
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn compensation_timeout(&self) -> Duration {
        Duration::from_millis(self.compensation_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files (console only when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("execution.poll_interval_ms", 200)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADEDESK_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADEDESK_EXCHANGE__API_KEY, etc.)
            .add_source(
                Environment::with_prefix("TRADEDESK")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
