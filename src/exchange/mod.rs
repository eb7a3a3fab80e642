pub mod factory;
pub mod paper;
mod traits;

pub use factory::{build_exchange_client, build_exchange_client_for, configured_exchange_kind};
pub use paper::{PaperEvent, PaperExchange};
pub use traits::{parse_exchange_kind, AccountClient, ExchangeKind, OrderExecutor};
