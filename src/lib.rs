pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod risk;
pub mod validation;

pub use config::AppConfig;
pub use domain::{
    CommandType, Fill, OrderCommand, OrderSide, OrderSnapshot, OrderState,
};
pub use error::{DeskError, OrderError, Result, ValidationError};
pub use exchange::{AccountClient, OrderExecutor, PaperExchange};
pub use execution::{
    AtomicOrder, CommandQueue, OrderStateManager, TradeExecutor, TradeIntent, TradeReport,
};
pub use risk::{AccountRiskSizer, PositionSizer, RiskCalculator, TradePlan};
pub use validation::{OrderParams, OrderValidator};
