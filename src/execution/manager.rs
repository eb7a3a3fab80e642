use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::OrderState;
use crate::error::{DeskError, Result};

use super::AtomicOrder;

/// Concurrent registry of order records keyed by tracking id.
///
/// Scans walk the map shard by shard, so they see a weakly consistent
/// view while other tasks insert or transition orders.
#[derive(Debug, Default)]
pub struct OrderStateManager {
    orders: DashMap<String, Arc<AtomicOrder>>,
}

impl OrderStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an order, replacing (and returning) any record with the same id
    pub fn add_order(&self, order: Arc<AtomicOrder>) -> Option<Arc<AtomicOrder>> {
        debug!("Registering order {}", order.id());
        self.orders.insert(order.id().to_string(), order)
    }

    pub fn get_order(&self, id: &str) -> Option<Arc<AtomicOrder>> {
        self.orders.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove_order(&self, id: &str) -> Option<Arc<AtomicOrder>> {
        self.orders.remove(id).map(|(_, order)| order)
    }

    /// Remove `order` only while it is still the record stored under its id
    pub fn remove_if_current(&self, order: &Arc<AtomicOrder>) -> bool {
        self.orders
            .remove_if(order.id(), |_, stored| Arc::ptr_eq(stored, order))
            .is_some()
    }

    /// Swap `previous` back in while `current` is still the stored record
    pub fn restore_if_current(
        &self,
        current: &Arc<AtomicOrder>,
        previous: Arc<AtomicOrder>,
    ) -> bool {
        match self.orders.get_mut(current.id()) {
            Some(mut entry) if Arc::ptr_eq(entry.value(), current) => {
                *entry.value_mut() = previous;
                true
            }
            _ => false,
        }
    }

    pub fn update_order_state(&self, id: &str, to: OrderState) -> Result<()> {
        let order = self
            .get_order(id)
            .ok_or_else(|| DeskError::OrderNotFound(id.to_string()))?;
        order.set_state(to)
    }

    pub fn get_all_orders(&self) -> Vec<Arc<AtomicOrder>> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get_orders_by_state(&self, state: OrderState) -> Vec<Arc<AtomicOrder>> {
        self.orders
            .iter()
            .filter(|entry| entry.value().state() == state)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drop every record in a terminal state, returning how many went
    pub fn remove_terminal(&self) -> usize {
        let before = self.orders.len();
        self.orders.retain(|_, order| !order.is_terminal());
        before.saturating_sub(self.orders.len())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
