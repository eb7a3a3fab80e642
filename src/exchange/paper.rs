//! Simulated exchange used in test mode.
//!
//! Accepts every well-formed order for a listed pair, answers balance and
//! price queries from configuration and keeps an in-memory ledger of what
//! it was asked to do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::ExchangeConfig;
use crate::error::{DeskError, Result};

use super::{AccountClient, ExchangeKind, OrderExecutor};

/// One request the paper exchange accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaperEvent {
    Placed {
        exchange_ref: String,
        symbol: String,
        side: String,
        quantity: String,
        price: String,
        at: DateTime<Utc>,
    },
    Canceled {
        order_id: String,
        at: DateTime<Utc>,
    },
    Modified {
        order_id: String,
        quantity: String,
        price: String,
        at: DateTime<Utc>,
    },
}

pub struct PaperExchange {
    balance: Decimal,
    tradable_pairs: Vec<String>,
    reference_prices: HashMap<String, Decimal>,
    latency: Duration,
    next_ref: AtomicU64,
    ledger: Mutex<Vec<PaperEvent>>,
}

impl PaperExchange {
    pub fn new(balance: Decimal, tradable_pairs: Vec<String>) -> Self {
        Self {
            balance,
            tradable_pairs,
            reference_prices: HashMap::new(),
            latency: Duration::ZERO,
            next_ref: AtomicU64::new(1),
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self::new(config.paper_balance, config.tradable_pairs.clone())
            .with_reference_prices(config.reference_prices.clone())
            .with_latency(Duration::from_millis(config.latency_ms))
    }

    pub fn with_reference_prices(mut self, prices: HashMap<String, Decimal>) -> Self {
        self.reference_prices = prices;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Everything accepted so far, oldest first
    pub fn ledger(&self) -> Vec<PaperEvent> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: PaperEvent) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn is_listed(&self, symbol: &str) -> bool {
        self.tradable_pairs.iter().any(|p| p == symbol)
    }
}

fn require(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DeskError::Execution(format!("{} is required", name)));
    }
    Ok(())
}

#[async_trait]
impl OrderExecutor for PaperExchange {
    #[instrument(skip(self))]
    async fn place_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: &str,
        price: &str,
    ) -> Result<String> {
        require(symbol, "symbol")?;
        require(side, "side")?;
        require(quantity, "quantity")?;
        require(price, "price")?;

        if !self.is_listed(symbol) {
            return Err(DeskError::Execution(format!(
                "symbol {} is not tradable",
                symbol
            )));
        }

        self.simulate_latency().await;

        let exchange_ref = format!("paper-{}", self.next_ref.fetch_add(1, Ordering::SeqCst));
        info!(
            "PAPER: placed {} {} {} @ {} as {}",
            side, quantity, symbol, price, exchange_ref
        );

        self.record(PaperEvent::Placed {
            exchange_ref: exchange_ref.clone(),
            symbol: symbol.to_string(),
            side: side.to_string(),
            quantity: quantity.to_string(),
            price: price.to_string(),
            at: Utc::now(),
        });

        Ok(exchange_ref)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        require(order_id, "order id")?;
        self.simulate_latency().await;

        info!("PAPER: canceled order {}", order_id);
        self.record(PaperEvent::Canceled {
            order_id: order_id.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    async fn modify_order(&self, order_id: &str, quantity: &str, price: &str) -> Result<()> {
        require(order_id, "order id")?;
        require(quantity, "quantity")?;
        require(price, "price")?;
        self.simulate_latency().await;

        info!(
            "PAPER: modified order {} to {} @ {}",
            order_id, quantity, price
        );
        self.record(PaperEvent::Modified {
            order_id: order_id.to_string(),
            quantity: quantity.to_string(),
            price: price.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl AccountClient for PaperExchange {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Paper
    }

    async fn balance(&self) -> Result<Decimal> {
        Ok(self.balance)
    }

    async fn tradable_pairs(&self) -> Result<Vec<String>> {
        Ok(self.tradable_pairs.clone())
    }

    async fn market_price(&self, symbol: &str) -> Result<Decimal> {
        if symbol.trim().is_empty() {
            return Err(DeskError::InvalidInput("symbol is required".to_string()));
        }
        // Keys loaded through the config layer may arrive lowercased
        self.reference_prices
            .iter()
            .find(|(pair, _)| pair.eq_ignore_ascii_case(symbol))
            .map(|(_, price)| *price)
            .ok_or_else(|| DeskError::InvalidInput(format!("no reference price for {}", symbol)))
    }
}
