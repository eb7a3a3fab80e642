//! Bounded command queue with a single dispatch worker.
//!
//! Producers register a record and hand the command to a tokio channel
//! without ever waiting. One worker task drains the channel in FIFO order,
//! validates each command, moves it through the state machine and calls
//! the exchange. Executor failures are recorded on the order and never stop
//! the worker.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{CommandType, OrderCommand, OrderSnapshot, OrderState};
use crate::error::{DeskError, OrderError, Result};
use crate::exchange::OrderExecutor;
use crate::validation::OrderValidator;

use super::{AtomicOrder, OrderStateManager};

type CommandReceiver = mpsc::Receiver<OrderCommand>;

pub struct CommandQueue {
    tx: mpsc::Sender<OrderCommand>,
    /// Present while no worker owns it
    rx: Mutex<Option<CommandReceiver>>,
    worker: Mutex<Option<JoinHandle<CommandReceiver>>>,
    capacity: usize,
    state_manager: Arc<OrderStateManager>,
    validator: Arc<OrderValidator>,
}

impl CommandQueue {
    pub fn new(capacity: usize, validator: Arc<OrderValidator>) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            capacity,
            state_manager: Arc::new(OrderStateManager::new()),
            validator,
        }
    }

    /// Register the command's record and buffer it for the worker.
    ///
    /// Never waits: a full buffer unregisters the record again and fails
    /// with `QueueFull`.
    pub fn enqueue(&self, cmd: OrderCommand) -> Result<()> {
        let (order, displaced) = self.register(&cmd);
        let id = order.id();

        match self.tx.try_send(cmd) {
            Ok(()) => {
                debug!("Enqueued command {}", id);
                Ok(())
            }
            Err(TrySendError::Full(cmd)) => {
                self.unregister(&order, displaced);
                warn!(
                    "Command queue full ({}), dropped {} for {}",
                    self.capacity, cmd.kind, cmd.order_id
                );
                Err(DeskError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister(&order, displaced);
                Err(DeskError::Internal("command queue closed".to_string()))
            }
        }
    }

    /// Like `enqueue`, but waits up to `timeout` for buffer space
    pub async fn enqueue_timeout(&self, cmd: OrderCommand, timeout: Duration) -> Result<()> {
        let (order, displaced) = self.register(&cmd);
        let id = order.id();

        match self.tx.send_timeout(cmd, timeout).await {
            Ok(()) => {
                debug!("Enqueued command {} after waiting for capacity", id);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(cmd)) => {
                self.unregister(&order, displaced);
                warn!(
                    "No queue capacity within {:?} for {} on {}",
                    timeout, cmd.kind, cmd.order_id
                );
                Err(DeskError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.unregister(&order, displaced);
                Err(DeskError::Internal("command queue closed".to_string()))
            }
        }
    }

    fn register(&self, cmd: &OrderCommand) -> (Arc<AtomicOrder>, Option<Arc<AtomicOrder>>) {
        let order = Arc::new(AtomicOrder::new(cmd));
        let displaced = self.state_manager.add_order(order.clone());
        (order, displaced)
    }

    /// Undo `register` for a command that never reached the buffer.
    ///
    /// A record the command displaced belongs to an accepted command that
    /// may still be buffered, so it goes back in place.
    fn unregister(&self, order: &Arc<AtomicOrder>, displaced: Option<Arc<AtomicOrder>>) {
        match displaced {
            Some(previous) => {
                self.state_manager.restore_if_current(order, previous);
            }
            None => {
                self.state_manager.remove_if_current(order);
            }
        }
    }

    /// Spawn the dispatch worker.
    ///
    /// The worker runs until `shutdown` turns true or its sender is dropped.
    /// Commands still buffered at that point are never executed.
    pub fn start(
        &self,
        shutdown: watch::Receiver<bool>,
        executor: Arc<dyn OrderExecutor>,
    ) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DeskError::QueueRunning)?;

        info!("Starting command queue worker (capacity {})", self.capacity);
        *worker = Some(tokio::spawn(run_worker(
            rx,
            shutdown,
            executor,
            self.state_manager.clone(),
            self.validator.clone(),
        )));
        Ok(())
    }

    /// Wait for the worker to exit, then discard anything still buffered so
    /// the queue can be started again.
    ///
    /// Signal shutdown on the watch channel before calling this.
    pub async fn stop(&self) -> Result<()> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let mut rx = handle
            .await
            .map_err(|e| DeskError::Internal(format!("command queue worker panicked: {}", e)))?;

        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!("Discarded {} buffered commands at shutdown", discarded);
        }

        *self.rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        info!("Command queue worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn get_status(&self, id: &str) -> Result<OrderSnapshot> {
        self.state_manager
            .get_order(id)
            .map(|order| order.snapshot())
            .ok_or_else(|| DeskError::OrderNotFound(id.to_string()))
    }

    /// Orders the worker has not dispatched yet
    pub fn get_pending_orders(&self) -> Vec<OrderSnapshot> {
        self.snapshots(|state| matches!(state, OrderState::Validating | OrderState::Pending))
    }

    pub fn get_active_orders(&self) -> Vec<OrderSnapshot> {
        self.snapshots(|state| state == OrderState::Active)
    }

    pub fn get_filled_orders(&self) -> Vec<OrderSnapshot> {
        self.snapshots(|state| state == OrderState::Filled)
    }

    pub fn get_failed_orders(&self) -> Vec<OrderSnapshot> {
        self.snapshots(|state| state == OrderState::Failed)
    }

    pub fn has_failed(&self) -> bool {
        !self
            .state_manager
            .get_orders_by_state(OrderState::Failed)
            .is_empty()
    }

    /// Sweep finished records out of the registry
    pub fn clear_terminal_orders(&self) -> usize {
        let removed = self.state_manager.remove_terminal();
        debug!("Cleared {} terminal orders", removed);
        removed
    }

    pub fn state_manager(&self) -> Arc<OrderStateManager> {
        self.state_manager.clone()
    }

    pub fn validator(&self) -> Arc<OrderValidator> {
        self.validator.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commands currently buffered
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshots(&self, keep: impl Fn(OrderState) -> bool) -> Vec<OrderSnapshot> {
        let mut orders: Vec<OrderSnapshot> = self
            .state_manager
            .get_all_orders()
            .into_iter()
            .filter(|order| keep(order.state()))
            .map(|order| order.snapshot())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }
}

async fn run_worker(
    mut rx: CommandReceiver,
    mut shutdown: watch::Receiver<bool>,
    executor: Arc<dyn OrderExecutor>,
    state_manager: Arc<OrderStateManager>,
    validator: Arc<OrderValidator>,
) -> CommandReceiver {
    if *shutdown.borrow_and_update() {
        return rx;
    }

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow_and_update() {
                    info!("Command queue worker received shutdown");
                    break;
                }
            }

            cmd = rx.recv() => match cmd {
                Some(cmd) => {
                    process_command(cmd, executor.as_ref(), &state_manager, &validator).await
                }
                None => break,
            },
        }
    }

    rx
}

async fn process_command(
    cmd: OrderCommand,
    executor: &dyn OrderExecutor,
    state_manager: &OrderStateManager,
    validator: &OrderValidator,
) {
    let Some(order) = state_manager.get_order(&cmd.command_id) else {
        warn!("Skipping {}: record {} was removed", cmd.kind, cmd.command_id);
        return;
    };

    if order.state() == OrderState::Validating {
        if let Err(e) = order.validate(validator, cmd.account_balance) {
            warn!("Rejected {} for {}: {}", cmd.kind, cmd.order_id, e);
            return;
        }
    }

    if let Err(e) = order.transition(OrderState::Pending, OrderState::Active) {
        warn!("Cannot activate {}: {}", order.id(), e);
        return;
    }

    info!(
        "Dispatching {} for {} {} {} @ {}",
        cmd.kind, cmd.order_id, cmd.side, cmd.quantity, cmd.price
    );

    let result = match cmd.kind {
        CommandType::PlaceOrder => executor
            .place_order(&cmd.symbol, &cmd.side, &cmd.quantity, &cmd.price)
            .await
            .map(Some),
        CommandType::CancelOrder => executor.cancel_order(&cmd.order_id).await.map(|_| None),
        CommandType::ModifyOrder => executor
            .modify_order(&cmd.order_id, &cmd.quantity, &cmd.price)
            .await
            .map(|_| None),
    };

    match result {
        Ok(exchange_ref) => {
            if let Some(exchange_ref) = exchange_ref {
                order.set_exchange_ref(exchange_ref);
            }
            if let Err(e) = order.transition(OrderState::Active, OrderState::Filled) {
                warn!("Order {} completed but state moved on: {}", order.id(), e);
            }
            if cmd.kind == CommandType::CancelOrder {
                mark_target_canceled(state_manager, &cmd.order_id);
            }
        }
        Err(e) => {
            error!("{} for {} failed: {}", cmd.kind, cmd.order_id, e);
            order.set_error(OrderError::Execution(e.to_string()));
        }
    }
}

/// A target still working at the exchange is now canceled
fn mark_target_canceled(state_manager: &OrderStateManager, target: &str) {
    if let Some(target_order) = state_manager.get_order(target) {
        if target_order
            .transition(OrderState::Active, OrderState::Canceled)
            .is_ok()
        {
            info!("Order {} canceled", target);
        }
    }
}
