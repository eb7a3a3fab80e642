//! Order execution engine
//!
//! - [`AtomicOrder`]: lock-free lifecycle record for one command
//! - [`OrderStateManager`]: concurrent registry of records
//! - [`CommandQueue`]: bounded buffer plus the single dispatch worker
//! - [`TradeExecutor`]: entry order, protective stop and compensation

pub mod manager;
pub mod order;
pub mod queue;
pub mod trade;

pub use manager::OrderStateManager;
pub use order::AtomicOrder;
pub use queue::CommandQueue;
pub use trade::{TradeExecutor, TradeIntent, TradeReport};
