use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::OrderState;

/// Fractional digits used for quantities and prices sent to the exchange
pub const ORDER_DECIMALS: u32 = 8;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Side that closes a position opened on this side
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(OrderSide::Buy),
            "SELL" | "SHORT" => Ok(OrderSide::Sell),
            _ => Err(format!("invalid side '{}'; expected buy|sell", raw)),
        }
    }
}

/// Command kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    PlaceOrder,
    CancelOrder,
    ModifyOrder,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::PlaceOrder => "PLACE_ORDER",
            CommandType::CancelOrder => "CANCEL_ORDER",
            CommandType::ModifyOrder => "MODIFY_ORDER",
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generate an order id: millisecond timestamp plus a random v4 suffix
pub fn new_order_id() -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Fixed-point text with exactly 8 fractional digits, truncated toward zero
pub fn format_fixed(value: Decimal) -> String {
    let truncated = value.round_dp_with_strategy(ORDER_DECIMALS, RoundingStrategy::ToZero);
    format!("{:.8}", truncated)
}

/// A unit of work for the command queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommand {
    pub kind: CommandType,
    /// Registry key of the record tracking this command
    pub command_id: String,
    /// Order this command places, cancels or modifies
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
    pub timestamp: DateTime<Utc>,
    pub leverage: Decimal,
    pub risk_percentage: Decimal,
    /// Balance the buying-power check runs against
    pub account_balance: Decimal,
}

impl OrderCommand {
    pub fn place(
        symbol: impl Into<String>,
        side: impl Into<String>,
        quantity: impl Into<String>,
        price: impl Into<String>,
    ) -> Self {
        let order_id = new_order_id();
        Self {
            kind: CommandType::PlaceOrder,
            command_id: order_id.clone(),
            order_id,
            symbol: symbol.into(),
            side: side.into(),
            quantity: quantity.into(),
            price: price.into(),
            timestamp: Utc::now(),
            leverage: Decimal::ONE,
            risk_percentage: Decimal::ZERO,
            account_balance: Decimal::ZERO,
        }
    }

    pub fn cancel(order_id: impl Into<String>) -> Self {
        Self {
            kind: CommandType::CancelOrder,
            command_id: new_order_id(),
            order_id: order_id.into(),
            symbol: String::new(),
            side: String::new(),
            quantity: String::new(),
            price: String::new(),
            timestamp: Utc::now(),
            leverage: Decimal::ONE,
            risk_percentage: Decimal::ZERO,
            account_balance: Decimal::ZERO,
        }
    }

    pub fn modify(
        order_id: impl Into<String>,
        quantity: impl Into<String>,
        price: impl Into<String>,
    ) -> Self {
        Self {
            kind: CommandType::ModifyOrder,
            command_id: new_order_id(),
            order_id: order_id.into(),
            symbol: String::new(),
            side: String::new(),
            quantity: quantity.into(),
            price: price.into(),
            timestamp: Utc::now(),
            leverage: Decimal::ONE,
            risk_percentage: Decimal::ZERO,
            account_balance: Decimal::ZERO,
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        let order_id = order_id.into();
        if self.kind == CommandType::PlaceOrder {
            self.command_id = order_id.clone();
        }
        self.order_id = order_id;
        self
    }

    pub fn with_leverage(mut self, leverage: Decimal) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_risk_percentage(mut self, risk_percentage: Decimal) -> Self {
        self.risk_percentage = risk_percentage;
        self
    }

    pub fn with_account_balance(mut self, account_balance: Decimal) -> Self {
        self.account_balance = account_balance;
        self
    }
}

/// Partial or complete execution of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn new(quantity: Decimal, price: Decimal) -> Self {
        Self {
            quantity,
            price,
            timestamp: Utc::now(),
        }
    }
}

/// Point-in-time view of an order for status queries and rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub order_id: String,
    pub kind: CommandType,
    pub state: OrderState,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
    pub leverage: Decimal,
    pub risk_percentage: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub exchange_ref: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
