//! Per-command lifecycle record.
//!
//! The state lives in an `AtomicU8` and only ever changes by
//! compare-and-swap. Fills, the recorded error and the exchange reference
//! sit behind a separate `RwLock`; writers that touch both take the lock
//! first and CAS while holding it, so a reader never sees `Failed` without
//! its error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::domain::{CommandType, Fill, OrderCommand, OrderSnapshot, OrderState};
use crate::error::{DeskError, OrderError, Result, ValidationError};
use crate::validation::{OrderParams, OrderValidator};

#[derive(Debug, Default)]
struct OrderDetails {
    fills: Vec<Fill>,
    error: Option<OrderError>,
    exchange_ref: Option<String>,
}

#[derive(Debug)]
pub struct AtomicOrder {
    id: String,
    kind: CommandType,
    order_id: String,
    symbol: String,
    side: String,
    quantity: String,
    price: String,
    leverage: Decimal,
    risk_percentage: Decimal,
    state: AtomicU8,
    details: RwLock<OrderDetails>,
    created_at: DateTime<Utc>,
}

impl AtomicOrder {
    /// New record in `Validating`, keyed by the command's tracking id
    pub fn new(cmd: &OrderCommand) -> Self {
        Self {
            id: cmd.command_id.clone(),
            kind: cmd.kind,
            order_id: cmd.order_id.clone(),
            symbol: cmd.symbol.clone(),
            side: cmd.side.clone(),
            quantity: cmd.quantity.clone(),
            price: cmd.price.clone(),
            leverage: cmd.leverage,
            risk_percentage: cmd.risk_percentage,
            state: AtomicU8::new(OrderState::Validating as u8),
            details: RwLock::new(OrderDetails::default()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CommandType {
        self.kind
    }

    /// Order this record places, cancels or modifies
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> &str {
        &self.side
    }

    pub fn quantity(&self) -> &str {
        &self.quantity
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn leverage(&self) -> Decimal {
        self.leverage
    }

    pub fn risk_percentage(&self) -> Decimal {
        self.risk_percentage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> OrderState {
        decode(self.state.load(Ordering::SeqCst))
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn error(&self) -> Option<OrderError> {
        self.read_details().error.clone()
    }

    pub fn exchange_ref(&self) -> Option<String> {
        self.read_details().exchange_ref.clone()
    }

    pub fn set_exchange_ref(&self, exchange_ref: impl Into<String>) {
        self.write_details().exchange_ref = Some(exchange_ref.into());
    }

    pub fn fills(&self) -> Vec<Fill> {
        self.read_details().fills.clone()
    }

    pub fn filled_quantity(&self) -> Decimal {
        self.read_details().fills.iter().map(|f| f.quantity).sum()
    }

    /// Volume-weighted price over all fills
    pub fn average_fill_price(&self) -> Option<Decimal> {
        let details = self.read_details();
        let filled: Decimal = details.fills.iter().map(|f| f.quantity).sum();
        if filled.is_zero() {
            return None;
        }
        let cost: Decimal = details.fills.iter().map(|f| f.quantity * f.price).sum();
        Some(cost / filled)
    }

    /// Move `from -> to` atomically.
    ///
    /// A pair outside the transition table forces the order to `Failed`
    /// (when it still holds `from`) and records the attempted move. The CAS
    /// runs under the details lock, so a transition never lands between the
    /// state check and the write of a fill.
    pub fn transition(&self, from: OrderState, to: OrderState) -> Result<()> {
        if !from.can_transition_to(to) {
            if !from.is_terminal() {
                let mut details = self.write_details();
                if self.cas(from, OrderState::Failed).is_ok() {
                    details.error = Some(OrderError::InvalidTransition { from, to });
                    warn!(
                        "Order {} forced to FAILED by invalid transition {} -> {}",
                        self.id, from, to
                    );
                }
            }
            return Err(DeskError::InvalidStateTransition { from, to });
        }

        let _details = self.write_details();
        self.cas(from, to)?;
        debug!("Order {} {} -> {}", self.id, from, to);
        Ok(())
    }

    /// Move from whatever the order currently holds to `to`
    pub fn set_state(&self, to: OrderState) -> Result<()> {
        let current = self.state();

        // Another writer got there first
        if current == to {
            return Err(DeskError::TransitionConflict {
                order_id: self.id.clone(),
                expected: current,
                actual: current,
            });
        }

        if current.is_terminal() {
            return Err(DeskError::InvalidStateTransition { from: current, to });
        }

        self.transition(current, to)
    }

    /// Record an execution; completes the order on an exact total.
    ///
    /// Holds the details lock throughout, so the `Active` check stays valid
    /// until the fill is stored.
    pub fn add_fill(&self, fill: Fill) -> Result<()> {
        let mut details = self.write_details();

        let state = self.state();
        if state != OrderState::Active {
            return Err(OrderError::NotActive(state).into());
        }

        if fill.quantity <= Decimal::ZERO {
            return Err(DeskError::InvalidInput(format!(
                "fill quantity must be positive, got {}",
                fill.quantity
            )));
        }

        let quantity = Decimal::from_str(&self.quantity)
            .map_err(|_| OrderError::BadQuantity(self.quantity.clone()))?;
        let filled: Decimal = details.fills.iter().map(|f| f.quantity).sum();
        let total = filled + fill.quantity;

        if total > quantity {
            return Err(OrderError::Overfill {
                fill: fill.quantity,
                filled,
                quantity,
            }
            .into());
        }

        details.fills.push(fill);

        if total == quantity {
            match self.cas(OrderState::Active, OrderState::Filled) {
                Ok(()) => debug!("Order {} completely filled at {}", self.id, total),
                Err(e) => warn!("Order {} filled but state moved on: {}", self.id, e),
            }
        }

        Ok(())
    }

    /// Record `error` and force the order to `Failed`.
    ///
    /// Returns false when the order had already reached a terminal state,
    /// in which case nothing is recorded.
    pub fn set_error(&self, error: OrderError) -> bool {
        let mut details = self.write_details();
        loop {
            let current = self.state();
            if current.is_terminal() {
                return false;
            }
            if self.cas(current, OrderState::Failed).is_ok() {
                warn!("Order {} failed from {}: {}", self.id, current, error);
                details.error = Some(error);
                return true;
            }
        }
    }

    /// Check the command's parameters and move `Validating -> Pending`.
    ///
    /// A rejected command is failed with the validation error recorded.
    pub fn validate(&self, validator: &OrderValidator, account_balance: Decimal) -> Result<()> {
        let outcome = match self.kind {
            CommandType::PlaceOrder => validator.validate_order(&OrderParams {
                symbol: &self.symbol,
                side: &self.side,
                quantity: &self.quantity,
                price: &self.price,
                risk_percentage: self.risk_percentage,
                leverage: self.leverage,
                account_balance,
            }),
            CommandType::ModifyOrder => self
                .require_target()
                .and_then(|_| validator.validate_quantity(&self.quantity))
                .and_then(|_| validator.validate_price(&self.price)),
            CommandType::CancelOrder => self.require_target(),
        };

        if let Err(e) = outcome {
            self.set_error(OrderError::Rejected(e.clone()));
            return Err(e.into());
        }

        self.transition(OrderState::Validating, OrderState::Pending)
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        let details = self.read_details();
        let filled_quantity: Decimal = details.fills.iter().map(|f| f.quantity).sum();
        let average_fill_price = if filled_quantity.is_zero() {
            None
        } else {
            let cost: Decimal = details.fills.iter().map(|f| f.quantity * f.price).sum();
            Some(cost / filled_quantity)
        };

        OrderSnapshot {
            id: self.id.clone(),
            order_id: self.order_id.clone(),
            kind: self.kind,
            state: self.state(),
            symbol: self.symbol.clone(),
            side: self.side.clone(),
            quantity: self.quantity.clone(),
            price: self.price.clone(),
            leverage: self.leverage,
            risk_percentage: self.risk_percentage,
            filled_quantity,
            average_fill_price,
            exchange_ref: details.exchange_ref.clone(),
            error: details.error.as_ref().map(|e| e.to_string()),
            created_at: self.created_at,
        }
    }

    fn require_target(&self) -> std::result::Result<(), ValidationError> {
        if self.order_id.trim().is_empty() {
            return Err(ValidationError::MissingOrderId);
        }
        Ok(())
    }

    fn cas(&self, from: OrderState, to: OrderState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| DeskError::TransitionConflict {
                order_id: self.id.clone(),
                expected: from,
                actual: decode(actual),
            })
    }

    fn read_details(&self) -> RwLockReadGuard<'_, OrderDetails> {
        self.details.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_details(&self) -> RwLockWriteGuard<'_, OrderDetails> {
        self.details.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// Only values written through `OrderState as u8` ever reach the atomic
fn decode(raw: u8) -> OrderState {
    OrderState::from_u8(raw).unwrap_or(OrderState::Failed)
}
