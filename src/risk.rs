//! Risk-based position sizing
//!
//! Position size is chosen so that a stop-out loses exactly the configured
//! share of the account:
//!
//! ```text
//! risk_amount   = balance * risk_pct / 100
//! risk_per_unit = |entry - stop|
//! size          = risk_amount / risk_per_unit
//! ```
//!
//! Leverage only changes the margin a position ties up, never its size.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DeskError, Result};

/// Position-sizing capability consumed by the trade executor
pub trait PositionSizer: Send + Sync {
    fn calculate_position_size(
        &self,
        risk_percentage: Decimal,
        entry_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Result<Decimal>;
}

/// Stateless risk calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskCalculator;

/// Summary of a sized trade before submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub risk_amount: Decimal,
    pub position_size: Decimal,
    pub notional: Decimal,
    pub margin_required: Decimal,
    pub leverage: Decimal,
    pub risk_ratio: Decimal,
}

impl RiskCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate_position_size(
        &self,
        account_balance: Decimal,
        risk_percentage: Decimal,
        entry_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(&[
            account_balance,
            risk_percentage,
            entry_price,
            stop_loss_price,
        ])?;

        if entry_price == stop_loss_price {
            return Err(DeskError::InvalidInput(
                "entry price cannot be equal to stop loss price".to_string(),
            ));
        }

        let risk_amount = risk_amount(account_balance, risk_percentage)?;
        let risk_per_unit = (entry_price - stop_loss_price).abs();
        risk_amount
            .checked_div(risk_per_unit)
            .ok_or_else(|| overflow("position size"))
    }

    /// Ratio of the risk a position actually carries to the intended budget
    pub fn calculate_risk(
        &self,
        account_balance: Decimal,
        risk_percentage: Decimal,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(&[account_balance, risk_percentage, quantity, price])?;

        let risk_amount = risk_amount(account_balance, risk_percentage)?;
        let actual_risk = quantity
            .checked_mul(price)
            .and_then(|notional| notional.checked_div(account_balance))
            .and_then(|share| share.checked_mul(dec!(100)))
            .ok_or_else(|| overflow("position risk"))?;
        actual_risk
            .checked_div(risk_amount)
            .ok_or_else(|| overflow("risk ratio"))
    }

    /// Size a trade and derive the notional and margin it needs
    pub fn plan(
        &self,
        account_balance: Decimal,
        risk_percentage: Decimal,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        leverage: Decimal,
    ) -> Result<TradePlan> {
        if leverage <= Decimal::ZERO {
            return Err(DeskError::InvalidInput(
                "leverage must be positive".to_string(),
            ));
        }

        let position_size = self.calculate_position_size(
            account_balance,
            risk_percentage,
            entry_price,
            stop_loss_price,
        )?;
        let notional = position_size
            .checked_mul(entry_price)
            .ok_or_else(|| overflow("notional"))?;
        let risk_ratio =
            self.calculate_risk(account_balance, risk_percentage, position_size, entry_price)?;

        let plan = TradePlan {
            risk_amount: risk_amount(account_balance, risk_percentage)?,
            position_size,
            notional,
            margin_required: notional
                .checked_div(leverage)
                .ok_or_else(|| overflow("margin"))?,
            leverage,
            risk_ratio,
        };

        debug!(
            "Trade plan: size={} notional={} margin={} ({}x)",
            plan.position_size, plan.notional, plan.margin_required, leverage
        );

        Ok(plan)
    }
}

fn risk_amount(account_balance: Decimal, risk_percentage: Decimal) -> Result<Decimal> {
    (risk_percentage / dec!(100))
        .checked_mul(account_balance)
        .ok_or_else(|| overflow("risk amount"))
}

fn overflow(what: &str) -> DeskError {
    DeskError::InvalidInput(format!("{} overflows", what))
}

fn ensure_positive(values: &[Decimal]) -> Result<()> {
    if values.iter().any(|v| *v <= Decimal::ZERO) {
        return Err(DeskError::InvalidInput(
            "all input values must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Sizes positions against a fixed account balance
#[derive(Debug, Clone)]
pub struct AccountRiskSizer {
    account_balance: Decimal,
    calculator: RiskCalculator,
}

impl AccountRiskSizer {
    pub fn new(account_balance: Decimal) -> Self {
        Self {
            account_balance,
            calculator: RiskCalculator::new(),
        }
    }

    pub fn account_balance(&self) -> Decimal {
        self.account_balance
    }
}

impl PositionSizer for AccountRiskSizer {
    fn calculate_position_size(
        &self,
        risk_percentage: Decimal,
        entry_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Result<Decimal> {
        self.calculator.calculate_position_size(
            self.account_balance,
            risk_percentage,
            entry_price,
            stop_loss_price,
        )
    }
}
