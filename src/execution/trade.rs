//! One complete manual trade: size, enter, protect.
//!
//! The executor owns the queue worker for the duration of a trade. It
//! enqueues the entry order, polls its record until it reaches a terminal
//! state, then places the opposite-side stop order for the same quantity.
//! If the stop cannot even be queued, a single cancel for the entry is
//! attempted before the error is returned.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::ExecutionConfig;
use crate::domain::{format_fixed, OrderCommand, OrderSide, OrderSnapshot, OrderState};
use crate::error::{DeskError, Result};
use crate::exchange::OrderExecutor;
use crate::risk::PositionSizer;

use super::CommandQueue;

/// What the trader asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub leverage: Decimal,
    pub risk_percentage: Decimal,
}

impl TradeIntent {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        entry_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            stop_loss_price,
            leverage: Decimal::ONE,
            risk_percentage: Decimal::ONE,
        }
    }

    pub fn with_leverage(mut self, leverage: Decimal) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_risk_percentage(mut self, risk_percentage: Decimal) -> Self {
        self.risk_percentage = risk_percentage;
        self
    }
}

/// Outcome of a trade whose entry order filled
#[derive(Debug, Clone, Serialize)]
pub struct TradeReport {
    pub position_size: Decimal,
    pub main: OrderSnapshot,
    pub stop_loss: OrderSnapshot,
}

impl TradeReport {
    /// Whether the protective stop reached the exchange
    pub fn is_protected(&self) -> bool {
        self.stop_loss.state == OrderState::Filled
    }
}

pub struct TradeExecutor {
    queue: Arc<CommandQueue>,
    executor: Arc<dyn OrderExecutor>,
    sizer: Arc<dyn PositionSizer>,
    account_balance: Decimal,
    config: ExecutionConfig,
}

impl TradeExecutor {
    pub fn new(
        queue: Arc<CommandQueue>,
        executor: Arc<dyn OrderExecutor>,
        sizer: Arc<dyn PositionSizer>,
        account_balance: Decimal,
    ) -> Self {
        Self {
            queue,
            executor,
            sizer,
            account_balance,
            config: ExecutionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn account_balance(&self) -> Decimal {
        self.account_balance
    }

    pub fn queue(&self) -> Arc<CommandQueue> {
        self.queue.clone()
    }

    /// Run the trade end to end.
    ///
    /// The queue worker is started here and always stopped before
    /// returning, whatever the outcome.
    pub async fn execute(&self, intent: &TradeIntent) -> Result<TradeReport> {
        self.preflight(intent)?;
        self.queue.validator().validate_stop_loss(
            intent.entry_price,
            intent.stop_loss_price,
            intent.side.as_str(),
        )?;

        let position_size = self.sizer.calculate_position_size(
            intent.risk_percentage,
            intent.entry_price,
            intent.stop_loss_price,
        )?;

        info!(
            "Trade {} {}: size {} entry {} stop {} ({}x, {}% risk)",
            intent.side,
            intent.symbol,
            position_size,
            intent.entry_price,
            intent.stop_loss_price,
            intent.leverage,
            intent.risk_percentage
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.queue.start(shutdown_rx, self.executor.clone())?;

        let result = self.run(intent, position_size).await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = self.queue.stop().await {
            warn!("Failed to stop command queue cleanly: {}", e);
        }

        result
    }

    fn preflight(&self, intent: &TradeIntent) -> Result<()> {
        if intent.symbol.trim().is_empty() {
            return Err(DeskError::InvalidTrade("symbol is required".to_string()));
        }
        if intent.entry_price <= Decimal::ZERO {
            return Err(DeskError::InvalidTrade(format!(
                "entry price must be positive, got {}",
                intent.entry_price
            )));
        }
        if intent.stop_loss_price <= Decimal::ZERO {
            return Err(DeskError::InvalidTrade(format!(
                "stop loss price must be positive, got {}",
                intent.stop_loss_price
            )));
        }
        if intent.leverage <= Decimal::ZERO {
            return Err(DeskError::InvalidTrade(format!(
                "leverage must be positive, got {}",
                intent.leverage
            )));
        }
        if intent.risk_percentage <= Decimal::ZERO || intent.risk_percentage > Decimal::ONE_HUNDRED
        {
            return Err(DeskError::InvalidTrade(format!(
                "risk percentage must be in (0, 100], got {}",
                intent.risk_percentage
            )));
        }
        Ok(())
    }

    async fn run(&self, intent: &TradeIntent, position_size: Decimal) -> Result<TradeReport> {
        let quantity = format_fixed(position_size);

        let main = self.order_command(
            intent,
            intent.side,
            quantity.clone(),
            intent.entry_price,
        );
        let main_id = main.command_id.clone();
        self.queue.enqueue(main)?;

        let main_snapshot = self.wait_for_order_completion(&main_id).await?;
        if main_snapshot.state != OrderState::Filled {
            return Err(DeskError::OrderRejected(format!(
                "main order {} ended {}: {}",
                main_id,
                main_snapshot.state,
                main_snapshot
                    .error
                    .as_deref()
                    .unwrap_or("no error recorded")
            )));
        }
        info!("Main order {} filled", main_id);

        let stop = self.order_command(
            intent,
            intent.side.opposite(),
            quantity,
            intent.stop_loss_price,
        );
        let stop_id = stop.command_id.clone();
        if let Err(e) = self.queue.enqueue(stop) {
            error!("Stop-loss for {} could not be queued: {}", main_id, e);
            self.compensate(&main_id).await;
            return Err(e);
        }

        let stop_snapshot = match self.wait_for_order_completion(&stop_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Stop-loss order {} still open: {}", stop_id, e);
                self.queue.get_status(&stop_id)?
            }
        };

        match stop_snapshot.state {
            OrderState::Filled => info!("Stop-loss order {} placed", stop_id),
            OrderState::Failed | OrderState::Canceled => error!(
                "Stop-loss order {} ended {}: {}; position {} is unprotected",
                stop_id,
                stop_snapshot.state,
                stop_snapshot.error.as_deref().unwrap_or("no error recorded"),
                main_id
            ),
            _ => {}
        }

        Ok(TradeReport {
            position_size,
            main: main_snapshot,
            stop_loss: stop_snapshot,
        })
    }

    fn order_command(
        &self,
        intent: &TradeIntent,
        side: OrderSide,
        quantity: String,
        price: Decimal,
    ) -> OrderCommand {
        OrderCommand::place(
            intent.symbol.clone(),
            side.as_str(),
            quantity,
            format_fixed(price),
        )
        .with_leverage(intent.leverage)
        .with_risk_percentage(intent.risk_percentage)
        .with_account_balance(self.account_balance)
    }

    /// Poll a record until it is terminal or the polling budget runs out
    pub async fn wait_for_order_completion(&self, id: &str) -> Result<OrderSnapshot> {
        for _ in 0..self.config.poll_attempts {
            let snapshot = self.queue.get_status(id)?;
            if snapshot.state.is_terminal() {
                return Ok(snapshot);
            }
            sleep(self.config.poll_interval()).await;
        }

        Err(DeskError::OrderTimeout(format!(
            "order {} not completed after {} polls of {}ms",
            id, self.config.poll_attempts, self.config.poll_interval_ms
        )))
    }

    /// Best-effort cancel of the entry order; one attempt, outcome logged
    async fn compensate(&self, order_id: &str) {
        warn!("Canceling main order {} after stop-loss failure", order_id);

        let cancel = OrderCommand::cancel(order_id).with_account_balance(self.account_balance);
        let cancel_id = cancel.command_id.clone();

        if let Err(e) = self
            .queue
            .enqueue_timeout(cancel, self.config.compensation_timeout())
            .await
        {
            error!(
                "Compensating cancel for {} could not be queued: {}; manual intervention required",
                order_id, e
            );
            return;
        }

        match self.wait_for_order_completion(&cancel_id).await {
            Ok(snapshot) if snapshot.state == OrderState::Filled => {
                info!("Compensating cancel for {} dispatched", order_id)
            }
            Ok(snapshot) => error!(
                "Compensating cancel for {} ended {}: {}",
                order_id,
                snapshot.state,
                snapshot.error.as_deref().unwrap_or("no error recorded")
            ),
            Err(e) => error!("Compensating cancel for {} unresolved: {}", order_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::AccountRiskSizer;
    use crate::validation::OrderValidator;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct Unreachable;

    #[async_trait]
    impl OrderExecutor for Unreachable {
        async fn place_order(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String> {
            panic!("no order should reach the exchange");
        }

        async fn cancel_order(&self, _: &str) -> Result<()> {
            panic!("no order should reach the exchange");
        }

        async fn modify_order(&self, _: &str, _: &str, _: &str) -> Result<()> {
            panic!("no order should reach the exchange");
        }
    }

    fn trade_executor() -> TradeExecutor {
        TradeExecutor::new(
            Arc::new(CommandQueue::new(4, Arc::new(OrderValidator::default()))),
            Arc::new(Unreachable),
            Arc::new(AccountRiskSizer::new(dec!(10000))),
            dec!(10000),
        )
    }

    #[tokio::test]
    async fn test_preflight_rejects_bad_intents() {
        let executor = trade_executor();
        let base = TradeIntent::new("BTC/USDT", OrderSide::Buy, dec!(50000), dec!(49000));

        let cases = [
            TradeIntent {
                symbol: " ".to_string(),
                ..base.clone()
            },
            TradeIntent {
                entry_price: dec!(0),
                ..base.clone()
            },
            TradeIntent {
                stop_loss_price: dec!(-1),
                ..base.clone()
            },
            base.clone().with_leverage(dec!(0)),
            base.clone().with_risk_percentage(dec!(0)),
            base.clone().with_risk_percentage(dec!(101)),
        ];

        for intent in cases {
            assert!(matches!(
                executor.execute(&intent).await,
                Err(DeskError::InvalidTrade(_))
            ));
        }
        assert!(executor.queue().state_manager().is_empty());
        assert!(!executor.queue().is_running());
    }

    #[tokio::test]
    async fn test_stop_on_wrong_side_is_rejected_before_sizing() {
        let executor = trade_executor();
        let intent = TradeIntent::new("BTC/USDT", OrderSide::Buy, dec!(50000), dec!(51000));

        assert!(matches!(
            executor.execute(&intent).await,
            Err(DeskError::Validation(_))
        ));
        assert!(executor.queue().state_manager().is_empty());
    }

    #[test]
    fn test_intent_defaults() {
        let intent = TradeIntent::new("ETH/USDT", OrderSide::Sell, dec!(3000), dec!(3100));
        assert_eq!(intent.leverage, dec!(1));
        assert_eq!(intent.risk_percentage, dec!(1));
    }
}
