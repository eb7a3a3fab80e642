use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{DeskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Paper,
    Live,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paper" | "test" | "sim" => Ok(Self::Paper),
            "live" => Ok(Self::Live),
            _ => Err("invalid exchange; expected paper|live"),
        }
    }
}

pub fn parse_exchange_kind(raw: &str) -> Result<ExchangeKind> {
    ExchangeKind::from_str(raw).map_err(|e| DeskError::InvalidInput(e.to_string()))
}

/// Order routing capability consumed by the command queue.
///
/// Quantities and prices arrive as fixed-point decimal text; any further
/// encoding is the implementation's job.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Returns the exchange's reference for the new order
    async fn place_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: &str,
        price: &str,
    ) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn modify_order(&self, order_id: &str, quantity: &str, price: &str) -> Result<()>;
}

/// Account queries used before a trade is sized
#[async_trait]
pub trait AccountClient: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    async fn balance(&self) -> Result<Decimal>;

    async fn tradable_pairs(&self) -> Result<Vec<String>>;

    async fn market_price(&self, _symbol: &str) -> Result<Decimal> {
        Err(DeskError::InvalidInput(format!(
            "market_price is not implemented for exchange '{}'",
            self.kind()
        )))
    }
}
