use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use tradedesk::domain::{Fill, OrderCommand, OrderState};
use tradedesk::error::{DeskError, OrderError, Result};
use tradedesk::exchange::OrderExecutor;
use tradedesk::execution::{AtomicOrder, CommandQueue, OrderStateManager};
use tradedesk::validation::OrderValidator;

/// Counts placements and remembers their prices in arrival order
#[derive(Default)]
struct CountingExecutor {
    prices: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl CountingExecutor {
    fn count(&self) -> usize {
        self.prices.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderExecutor for CountingExecutor {
    async fn place_order(
        &self,
        _symbol: &str,
        _side: &str,
        _quantity: &str,
        price: &str,
    ) -> Result<String> {
        self.prices.lock().unwrap().push(price.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok("ok".to_string())
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<()> {
        Ok(())
    }

    async fn modify_order(&self, _order_id: &str, _quantity: &str, _price: &str) -> Result<()> {
        Ok(())
    }
}

fn queue(capacity: usize) -> Arc<CommandQueue> {
    Arc::new(CommandQueue::new(
        capacity,
        Arc::new(OrderValidator::default()),
    ))
}

fn place_at(price: u32) -> OrderCommand {
    OrderCommand::place("BTC/USDT", "BUY", "0.01", price.to_string())
        .with_risk_percentage(dec!(1))
        .with_account_balance(dec!(100000))
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[test]
fn concurrent_enqueue_never_exceeds_capacity() {
    let queue = queue(10);
    let barrier = Arc::new(Barrier::new(4));
    let full = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            let full = full.clone();
            std::thread::spawn(move || {
                barrier.wait();
                for i in 0..10 {
                    match queue.enqueue(place_at(100 + i)) {
                        Ok(()) => {}
                        Err(DeskError::QueueFull { capacity: 10 }) => {
                            full.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(full.load(Ordering::SeqCst), 30);
    assert_eq!(queue.len(), 10);
    // Rejected commands leave nothing behind in the registry
    assert_eq!(queue.state_manager().len(), 10);
}

#[tokio::test]
async fn single_producer_commands_run_in_fifo_order() {
    let queue = queue(32);
    let executor = Arc::new(CountingExecutor::default());
    let (tx, rx) = watch::channel(false);

    for i in 0..20 {
        queue.enqueue(place_at(1000 + i)).unwrap();
    }
    queue.start(rx, executor.clone()).unwrap();

    wait_until(|| executor.count() == 20).await;
    let expected: Vec<String> = (0..20).map(|i| (1000 + i).to_string()).collect();
    assert_eq!(*executor.prices.lock().unwrap(), expected);

    tx.send(true).unwrap();
    queue.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_producers_every_command_runs_once() {
    let queue = queue(256);
    let executor = Arc::new(CountingExecutor::default());
    let (tx, rx) = watch::channel(false);
    queue.start(rx, executor.clone()).unwrap();

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let queue = queue.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    queue.enqueue(place_at(p * 100 + i + 1)).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    wait_until(|| queue.get_filled_orders().len() == 200).await;
    assert_eq!(executor.count(), 200);
    assert!(!queue.has_failed());

    tx.send(true).unwrap();
    queue.stop().await.unwrap();
}

#[tokio::test]
async fn nothing_runs_after_shutdown() {
    let queue = queue(8);
    let executor = Arc::new(CountingExecutor {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    });
    let (tx, rx) = watch::channel(false);

    let ids: Vec<String> = (0..5)
        .map(|i| {
            let cmd = place_at(500 + i);
            let id = cmd.command_id.clone();
            queue.enqueue(cmd).unwrap();
            id
        })
        .collect();
    queue.start(rx, executor.clone()).unwrap();

    wait_until(|| executor.count() == 1).await;
    tx.send(true).unwrap();
    queue.stop().await.unwrap();

    assert_eq!(executor.count(), 1);
    assert_eq!(queue.get_status(&ids[0]).unwrap().state, OrderState::Filled);
    for id in &ids[1..] {
        assert_eq!(queue.get_status(id).unwrap().state, OrderState::Validating);
    }
    assert!(queue.is_empty());
}

#[test]
fn racing_registry_updates_have_one_winner() {
    for _ in 0..50 {
        let manager = Arc::new(OrderStateManager::new());
        let order = Arc::new(AtomicOrder::new(&place_at(100)));
        let id = order.id().to_string();
        manager.add_order(order.clone());
        manager.update_order_state(&id, OrderState::Pending).unwrap();
        manager.update_order_state(&id, OrderState::Active).unwrap();

        let targets = [OrderState::Filled, OrderState::Canceled, OrderState::Failed];
        let barrier = Arc::new(Barrier::new(targets.len()));
        let handles: Vec<_> = targets
            .into_iter()
            .map(|to| {
                let manager = manager.clone();
                let barrier = barrier.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    manager.update_order_state(&id, to).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(order.is_terminal());
        // The loser never records an error on the winner's record
        if order.state() != OrderState::Failed {
            assert!(order.error().is_none());
        }
    }
}

#[test]
fn concurrent_fills_stop_exactly_at_quantity() {
    let order = Arc::new(AtomicOrder::new(
        &OrderCommand::place("BTC/USDT", "BUY", "1.0", "100").with_account_balance(dec!(1000)),
    ));
    order.set_state(OrderState::Pending).unwrap();
    order.set_state(OrderState::Active).unwrap();

    let barrier = Arc::new(Barrier::new(20));
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let order = order.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                order.add_fill(Fill::new(dec!(0.1), dec!(100)))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(accepted, 10);
    assert!(results.iter().all(|r| match r {
        Ok(()) => true,
        Err(DeskError::Order(OrderError::NotActive(OrderState::Filled))) => true,
        Err(_) => false,
    }));
    assert_eq!(order.state(), OrderState::Filled);
    assert_eq!(order.filled_quantity(), dec!(1.0));
}
