use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tradedesk::config::ExecutionConfig;
use tradedesk::domain::{CommandType, OrderCommand, OrderSide, OrderState};
use tradedesk::error::{DeskError, Result};
use tradedesk::exchange::{OrderExecutor, PaperEvent, PaperExchange};
use tradedesk::execution::{CommandQueue, TradeExecutor, TradeIntent};
use tradedesk::risk::AccountRiskSizer;
use tradedesk::validation::OrderValidator;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Place {
        side: String,
        quantity: String,
        price: String,
    },
    Cancel(String),
}

/// Records every call; optionally fails or stalls placements per side
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<Call>>,
    fail_side: Option<&'static str>,
    place_delay: Option<Duration>,
}

impl RecordingExecutor {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn places(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Place { .. }))
            .collect()
    }
}

#[async_trait]
impl OrderExecutor for RecordingExecutor {
    async fn place_order(
        &self,
        _symbol: &str,
        side: &str,
        quantity: &str,
        price: &str,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(Call::Place {
            side: side.to_string(),
            quantity: quantity.to_string(),
            price: price.to_string(),
        });

        if let Some(delay) = self.place_delay {
            tokio::time::sleep(delay).await;
        }
        if matches!(self.fail_side, Some(failing) if failing == side) {
            return Err(DeskError::Execution(format!("{} rejected by exchange", side)));
        }
        Ok(format!("ex-{}", side.to_lowercase()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Cancel(order_id.to_string()));
        Ok(())
    }

    async fn modify_order(&self, _order_id: &str, _quantity: &str, _price: &str) -> Result<()> {
        Ok(())
    }
}

fn fast_config(queue_capacity: usize) -> ExecutionConfig {
    ExecutionConfig {
        queue_capacity,
        poll_attempts: 100,
        poll_interval_ms: 10,
        compensation_timeout_ms: 1000,
    }
}

fn trade_executor(
    executor: Arc<dyn OrderExecutor>,
    config: ExecutionConfig,
) -> (TradeExecutor, Arc<CommandQueue>) {
    let queue = Arc::new(CommandQueue::new(
        config.queue_capacity,
        Arc::new(OrderValidator::default()),
    ));
    let trade = TradeExecutor::new(
        queue.clone(),
        executor,
        Arc::new(AccountRiskSizer::new(dec!(10000))),
        dec!(10000),
    )
    .with_config(config);
    (trade, queue)
}

fn long_btc() -> TradeIntent {
    TradeIntent::new("BTC/USDT", OrderSide::Buy, dec!(50000), dec!(49000))
        .with_risk_percentage(dec!(2))
}

#[tokio::test]
async fn trade_places_entry_then_opposite_stop() {
    let exchange = Arc::new(RecordingExecutor::default());
    let (trade, queue) = trade_executor(exchange.clone(), fast_config(8));

    let report = trade.execute(&long_btc()).await.unwrap();

    assert_eq!(report.position_size, dec!(0.2));
    assert_eq!(report.main.state, OrderState::Filled);
    assert_eq!(report.main.exchange_ref.as_deref(), Some("ex-buy"));
    assert_eq!(report.stop_loss.state, OrderState::Filled);
    assert!(report.is_protected());

    assert_eq!(
        exchange.places(),
        vec![
            Call::Place {
                side: "BUY".to_string(),
                quantity: "0.20000000".to_string(),
                price: "50000.00000000".to_string(),
            },
            Call::Place {
                side: "SELL".to_string(),
                quantity: "0.20000000".to_string(),
                price: "49000.00000000".to_string(),
            },
        ]
    );
    assert!(!queue.is_running());
}

#[tokio::test]
async fn short_trade_protects_with_a_buy_stop() {
    let exchange = Arc::new(RecordingExecutor::default());
    let (trade, _queue) = trade_executor(exchange.clone(), fast_config(8));

    let intent = TradeIntent::new("ETH/USDT", OrderSide::Sell, dec!(3000), dec!(3100));
    let report = trade.execute(&intent).await.unwrap();

    assert_eq!(report.main.side, "SELL");
    assert_eq!(report.stop_loss.side, "BUY");
    assert_eq!(report.stop_loss.price, "3100.00000000");
    assert_eq!(report.stop_loss.quantity, report.main.quantity);
}

#[tokio::test]
async fn failed_entry_never_places_stop() {
    let exchange = Arc::new(RecordingExecutor {
        fail_side: Some("BUY"),
        ..Default::default()
    });
    let (trade, queue) = trade_executor(exchange.clone(), fast_config(8));

    let err = trade.execute(&long_btc()).await.unwrap_err();

    match err {
        DeskError::OrderRejected(msg) => assert!(msg.contains("rejected by exchange"), "{msg}"),
        other => panic!("expected OrderRejected, got {other:?}"),
    }
    assert_eq!(exchange.places().len(), 1);
    assert!(queue.has_failed());
}

#[tokio::test]
async fn entry_failing_validation_never_reaches_exchange() {
    let exchange = Arc::new(RecordingExecutor::default());
    let (trade, queue) = trade_executor(exchange.clone(), fast_config(8));

    // Above the default 5% ceiling but inside the pre-flight bound
    let intent = long_btc().with_risk_percentage(dec!(10));
    let err = trade.execute(&intent).await.unwrap_err();

    assert!(matches!(err, DeskError::OrderRejected(_)));
    assert!(exchange.calls().is_empty());
    assert_eq!(queue.get_failed_orders().len(), 1);
}

#[tokio::test]
async fn slow_entry_times_out_without_stop() {
    let exchange = Arc::new(RecordingExecutor {
        place_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    });
    let config = ExecutionConfig {
        poll_attempts: 5,
        ..fast_config(8)
    };
    let (trade, queue) = trade_executor(exchange.clone(), config);

    let err = trade.execute(&long_btc()).await.unwrap_err();

    assert!(matches!(err, DeskError::OrderTimeout(_)));
    assert_eq!(exchange.places().len(), 1);
    assert!(!queue.is_running());
}

#[tokio::test]
async fn failed_stop_is_reported_not_raised() {
    let exchange = Arc::new(RecordingExecutor {
        fail_side: Some("SELL"),
        ..Default::default()
    });
    let (trade, _queue) = trade_executor(exchange.clone(), fast_config(8));

    let report = trade.execute(&long_btc()).await.unwrap();

    assert_eq!(report.main.state, OrderState::Filled);
    assert_eq!(report.stop_loss.state, OrderState::Failed);
    assert!(!report.is_protected());
    assert!(report.stop_loss.error.is_some());
}

#[tokio::test]
async fn executor_can_run_consecutive_trades() {
    let exchange = Arc::new(RecordingExecutor::default());
    let (trade, queue) = trade_executor(exchange.clone(), fast_config(8));

    trade.execute(&long_btc()).await.unwrap();
    trade.execute(&long_btc()).await.unwrap();

    assert_eq!(exchange.places().len(), 4);
    assert_eq!(queue.get_filled_orders().len(), 4);
    assert_eq!(queue.clear_terminal_orders(), 4);
    assert!(queue.state_manager().is_empty());
}

#[tokio::test]
async fn paper_exchange_round_trip() {
    let paper = Arc::new(PaperExchange::new(
        dec!(10000),
        vec!["BTC/USDT".to_string()],
    ));
    let (trade, _queue) = trade_executor(paper.clone(), fast_config(8));

    let report = trade.execute(&long_btc()).await.unwrap();
    assert_eq!(report.main.exchange_ref.as_deref(), Some("paper-1"));
    assert_eq!(report.stop_loss.exchange_ref.as_deref(), Some("paper-2"));

    let ledger = paper.ledger();
    assert_eq!(ledger.len(), 2);
    assert!(matches!(&ledger[1], PaperEvent::Placed { side, .. } if side == "SELL"));
}

/// Keeps the queue congested so the stop-loss cannot be enqueued.
///
/// The entry placement leaves `filler-1` in the single buffer slot. The
/// worker then picks it up and, while handling it, refills the slot with
/// `filler-2` and stalls long enough for the stop-loss enqueue to fail.
struct CongestingExecutor {
    queue: Arc<CommandQueue>,
    cancels: Mutex<Vec<String>>,
}

#[async_trait]
impl OrderExecutor for CongestingExecutor {
    async fn place_order(
        &self,
        _symbol: &str,
        side: &str,
        _quantity: &str,
        _price: &str,
    ) -> Result<String> {
        if side == "BUY" {
            self.queue.enqueue(OrderCommand::cancel("filler-1"))?;
        }
        Ok("ex-main".to_string())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.cancels.lock().unwrap().push(order_id.to_string());
        if order_id == "filler-1" {
            self.queue.enqueue(OrderCommand::cancel("filler-2"))?;
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(())
    }

    async fn modify_order(&self, _order_id: &str, _quantity: &str, _price: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn unqueueable_stop_triggers_one_compensating_cancel() {
    let config = fast_config(1);
    let queue = Arc::new(CommandQueue::new(
        config.queue_capacity,
        Arc::new(OrderValidator::default()),
    ));
    let exchange = Arc::new(CongestingExecutor {
        queue: queue.clone(),
        cancels: Mutex::new(Vec::new()),
    });
    let trade = TradeExecutor::new(
        queue.clone(),
        exchange.clone(),
        Arc::new(AccountRiskSizer::new(dec!(10000))),
        dec!(10000),
    )
    .with_config(config);

    let err = trade.execute(&long_btc()).await.unwrap_err();
    assert!(matches!(err, DeskError::QueueFull { capacity: 1 }));

    let orders = queue.state_manager().get_all_orders();
    let main = orders
        .iter()
        .find(|o| o.kind() == CommandType::PlaceOrder && o.side() == "BUY")
        .expect("entry order should be registered");
    assert_eq!(main.state(), OrderState::Filled);

    // No stop-loss record survives the failed enqueue
    assert!(!orders
        .iter()
        .any(|o| o.kind() == CommandType::PlaceOrder && o.side() == "SELL"));

    let compensating: Vec<_> = orders
        .iter()
        .filter(|o| o.kind() == CommandType::CancelOrder && o.order_id() == main.order_id())
        .collect();
    assert_eq!(compensating.len(), 1);
    assert_eq!(compensating[0].state(), OrderState::Filled);

    let cancels = exchange.cancels.lock().unwrap().clone();
    assert_eq!(
        cancels.iter().filter(|id| *id == main.order_id()).count(),
        1,
        "cancels seen: {cancels:?}"
    );
}
