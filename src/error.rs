use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::OrderState;

/// Main error type for the trading desk
#[derive(Error, Debug)]
pub enum DeskError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Input errors (risk calculator preconditions)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid trade parameters: {0}")]
    InvalidTrade(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: OrderState, to: OrderState },

    #[error("State update lost to a concurrent writer: order {order_id} expected {expected}, found {actual}")]
    TransitionConflict {
        order_id: String,
        expected: OrderState,
        actual: OrderState,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // Queue errors
    #[error("Command queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Command queue worker is already running")]
    QueueRunning,

    // Order execution errors
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Order timeout: {0}")]
    OrderTimeout(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for DeskError
pub type Result<T> = std::result::Result<T, DeskError>;

/// Numeric order field named in validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Quantity,
    Price,
}

impl std::fmt::Display for OrderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderField::Quantity => write!(f, "quantity"),
            OrderField::Price => write!(f, "price"),
        }
    }
}

/// Order parameter validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid trading symbol '{symbol}': {reason}")]
    InvalidSymbol { symbol: String, reason: &'static str },

    #[error("invalid order side '{0}': must be BUY or SELL")]
    InvalidSide(String),

    #[error("invalid order {field}: cannot parse '{raw}'")]
    Unparseable { field: OrderField, raw: String },

    #[error("invalid order {field}: {value} must be between {min} and {max}")]
    OutOfRange {
        field: OrderField,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("invalid order {field}: '{raw}' has more than {max_places} decimal places")]
    TooPrecise {
        field: OrderField,
        raw: String,
        max_places: u32,
    },

    #[error("invalid risk percentage {value}: must be between 0 and {max}%")]
    InvalidRisk { value: Decimal, max: Decimal },

    #[error("invalid leverage {value}: must be between 1 and {max}x")]
    InvalidLeverage { value: Decimal, max: Decimal },

    #[error("insufficient funds for order: position size {notional} exceeds available margin {buying_power}")]
    InsufficientFunds {
        notional: Decimal,
        buying_power: Decimal,
    },

    #[error("invalid stop loss: {0}")]
    InvalidStopLoss(String),

    #[error("missing target order id")]
    MissingOrderId,
}

/// Errors recorded on an individual order
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderState, to: OrderState },

    #[error("rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("executor error: {0}")]
    Execution(String),

    #[error("cannot add fill: order is {0}")]
    NotActive(OrderState),

    #[error("fill of {fill} would exceed order quantity {quantity} (already filled {filled})")]
    Overfill {
        fill: Decimal,
        filled: Decimal,
        quantity: Decimal,
    },

    #[error("order quantity '{0}' is not a decimal")]
    BadQuantity(String),
}
