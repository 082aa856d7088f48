//! # Money
//!
//! Decimal monetary amounts. Budgets, bid amounts, escrowed payments and
//! account balances all flow through [`Money`]; floats never appear in the
//! ledger.
//!
//! Amounts are non-negative and carry at most [`Money::SCALE`] fractional
//! digits, matching the `NUMERIC(18, 2)` columns of the ledger schema.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A non-negative decimal amount with at most two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Maximum number of fractional digits.
    pub const SCALE: u32 = 2;

    /// The zero amount.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Validate and wrap a decimal amount.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::NonPositiveAmount(value.to_string()));
        }
        let normalized = value.normalize();
        if normalized.scale() > Self::SCALE {
            return Err(ValidationError::TooPrecise(value.to_string(), Self::SCALE));
        }
        Ok(Self(normalized))
    }

    /// Validate a strictly positive amount (budgets, bids, payments).
    pub fn positive(value: Decimal) -> Result<Self, ValidationError> {
        let money = Self::new(value)?;
        if money.is_zero() {
            return Err(ValidationError::NonPositiveAmount(value.to_string()));
        }
        Ok(money)
    }

    /// Parse a decimal string such as `"80"` or `"80.50"`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| ValidationError::InvalidAmount(s.to_string()))?;
        Self::new(value)
    }

    /// Whole-unit constructor, mostly for tests and fixtures.
    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Fixed two-decimal rendering used in payment-processor forms.
    pub fn to_fixed(&self) -> String {
        format!("{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
