//! Order parameter validation
//!
//! Checks a proposed order against the configured exchange and account
//! limits before anything reaches the executor. Field validators can be
//! called individually; `validate_order` runs them in a fixed order and
//! stops at the first violation.
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

use crate::config::ValidationConfig;
use crate::error::{OrderField, ValidationError};

/// Maximum fractional digits accepted for quantities and prices
pub const MAX_DECIMAL_PLACES: u32 = 8;

/// Maximum stop distance as a percentage of the entry price
pub const MAX_STOP_LOSS_PCT: Decimal = dec!(50);

type ValidationResult = std::result::Result<(), ValidationError>;

/// Order parameters as submitted for validation
#[derive(Debug, Clone)]
pub struct OrderParams<'a> {
    pub symbol: &'a str,
    pub side: &'a str,
    pub quantity: &'a str,
    pub price: &'a str,
    pub risk_percentage: Decimal,
    pub leverage: Decimal,
    pub account_balance: Decimal,
}

/// Validator holding the quantity, price, leverage and risk limits
#[derive(Debug, Clone, PartialEq)]
pub struct OrderValidator {
    min_quantity: Decimal,
    max_quantity: Decimal,
    min_price: Decimal,
    max_price: Decimal,
    max_leverage: Decimal,
    max_risk_percent: Decimal,
}

impl Default for OrderValidator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl OrderValidator {
    pub fn new(
        min_quantity: Decimal,
        max_quantity: Decimal,
        min_price: Decimal,
        max_price: Decimal,
        max_leverage: Decimal,
        max_risk_percent: Decimal,
    ) -> Self {
        Self {
            min_quantity,
            max_quantity,
            min_price,
            max_price,
            max_leverage,
            max_risk_percent,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(
            config.min_quantity,
            config.max_quantity,
            config.min_price,
            config.max_price,
            config.max_leverage,
            config.max_risk_percent,
        )
    }

    /// Symbol must look like BASE/QUOTE
    pub fn validate_symbol(&self, symbol: &str) -> ValidationResult {
        let invalid = |reason| ValidationError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason,
        };

        if symbol.is_empty() {
            return Err(invalid("symbol is empty"));
        }

        let mut parts = symbol.split('/');
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => (base, quote),
            _ => return Err(invalid("expected BASE/QUOTE format")),
        };

        if base.is_empty() || quote.is_empty() {
            return Err(invalid("empty base or quote currency"));
        }

        Ok(())
    }

    pub fn validate_side(&self, side: &str) -> ValidationResult {
        match side.to_ascii_uppercase().as_str() {
            "BUY" | "SELL" => Ok(()),
            _ => Err(ValidationError::InvalidSide(side.to_string())),
        }
    }

    pub fn validate_quantity(&self, quantity: &str) -> ValidationResult {
        check_decimal_field(
            OrderField::Quantity,
            quantity,
            self.min_quantity,
            self.max_quantity,
        )
    }

    pub fn validate_price(&self, price: &str) -> ValidationResult {
        check_decimal_field(OrderField::Price, price, self.min_price, self.max_price)
    }

    pub fn validate_risk(&self, risk_percentage: Decimal) -> ValidationResult {
        if risk_percentage <= Decimal::ZERO || risk_percentage > self.max_risk_percent {
            return Err(ValidationError::InvalidRisk {
                value: risk_percentage,
                max: self.max_risk_percent,
            });
        }
        Ok(())
    }

    pub fn validate_leverage(&self, leverage: Decimal) -> ValidationResult {
        if leverage < Decimal::ONE || leverage > self.max_leverage {
            return Err(ValidationError::InvalidLeverage {
                value: leverage,
                max: self.max_leverage,
            });
        }
        Ok(())
    }

    /// Run every field check, then the buying-power check
    pub fn validate_order(&self, order: &OrderParams<'_>) -> ValidationResult {
        self.validate_symbol(order.symbol)?;
        self.validate_side(order.side)?;
        self.validate_quantity(order.quantity)?;
        self.validate_price(order.price)?;
        self.validate_risk(order.risk_percentage)?;
        self.validate_leverage(order.leverage)?;

        // Both parsed successfully above
        let quantity = parse_field(OrderField::Quantity, order.quantity)?;
        let price = parse_field(OrderField::Price, order.price)?;

        // Saturate so extreme balances compare instead of overflowing
        let notional = quantity.saturating_mul(price);
        let buying_power = order.account_balance.saturating_mul(order.leverage);
        if notional > buying_power {
            return Err(ValidationError::InsufficientFunds {
                notional,
                buying_power,
            });
        }

        Ok(())
    }

    /// Stop must sit on the losing side of entry and within 50% of it
    pub fn validate_stop_loss(
        &self,
        entry_price: Decimal,
        stop_loss: Decimal,
        side: &str,
    ) -> ValidationResult {
        if stop_loss <= Decimal::ZERO {
            return Err(ValidationError::InvalidStopLoss(
                "stop loss must be greater than 0".to_string(),
            ));
        }
        if entry_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidStopLoss(
                "entry price must be greater than 0".to_string(),
            ));
        }

        match side.to_ascii_uppercase().as_str() {
            "BUY" if stop_loss >= entry_price => {
                return Err(ValidationError::InvalidStopLoss(format!(
                    "stop loss {} must be below entry price {} for long positions",
                    stop_loss, entry_price
                )));
            }
            "SELL" if stop_loss <= entry_price => {
                return Err(ValidationError::InvalidStopLoss(format!(
                    "stop loss {} must be above entry price {} for short positions",
                    stop_loss, entry_price
                )));
            }
            "BUY" | "SELL" => {}
            _ => return Err(ValidationError::InvalidSide(side.to_string())),
        }

        let distance_pct = (entry_price - stop_loss)
            .abs()
            .checked_div(entry_price)
            .and_then(|ratio| ratio.checked_mul(dec!(100)));
        match distance_pct {
            Some(pct) if pct <= MAX_STOP_LOSS_PCT => Ok(()),
            Some(pct) => Err(ValidationError::InvalidStopLoss(format!(
                "stop loss distance {:.2}% exceeds maximum {}%",
                pct, MAX_STOP_LOSS_PCT
            ))),
            None => Err(ValidationError::InvalidStopLoss(format!(
                "stop loss distance exceeds maximum {}%",
                MAX_STOP_LOSS_PCT
            ))),
        }
    }
}

fn parse_field(field: OrderField, raw: &str) -> std::result::Result<Decimal, ValidationError> {
    Decimal::from_str(raw).map_err(|_| ValidationError::Unparseable {
        field,
        raw: raw.to_string(),
    })
}

/// Parse, then range, then precision
fn check_decimal_field(field: OrderField, raw: &str, min: Decimal, max: Decimal) -> ValidationResult {
    let value = parse_field(field, raw)?;

    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }

    if value.scale() > MAX_DECIMAL_PLACES {
        return Err(ValidationError::TooPrecise {
            field,
            raw: raw.to_string(),
            max_places: MAX_DECIMAL_PLACES,
        });
    }

    Ok(())
}
