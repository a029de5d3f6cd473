use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits carried by every amount.
pub const MINOR_DIGITS: u32 = 2;
const MINOR_PER_MAJOR: i64 = 100;

/// Currency amount held as integer minor units so the database can add it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    /// Largest amount a single pledge or payment may carry: one trillion major units.
    pub const MAX: Money = Money(1_000_000_000_000 * MINOR_PER_MAJOR);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Saturates at the `i64` bounds.
    pub const fn from_major(major: i64) -> Self {
        Money(major.saturating_mul(MINOR_PER_MAJOR))
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True when the magnitude fits under [`Money::MAX`].
    pub fn within_limit(self) -> bool {
        self.0.unsigned_abs() <= Money::MAX.0.unsigned_abs()
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_DIGITS)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        if value.normalize().scale() > MINOR_DIGITS {
            return Err(MoneyError::TooPrecise(value.to_string()));
        }
        let money = value
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .and_then(|minor| minor.to_i64())
            .map(Money)
            .filter(|money| money.within_limit())
            .ok_or_else(|| MoneyError::OutOfRange(value.to_string()))?;
        Ok(money)
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Adds up a sequence of amounts, failing instead of wrapping.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Difference floored at zero.
    pub fn saturating_remaining(self, paid: Money) -> Money {
        Money(self.0.saturating_sub(paid.0).max(0))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("amount {0} has more than two decimal places")]
    TooPrecise(String),
    #[error("amount {0} is out of range")]
    OutOfRange(String),
    #[error("amount total overflowed")]
    Overflow,
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
        let value =
            Decimal::from_str(&cleaned).map_err(|_| MoneyError::Invalid(s.trim().to_string()))?;
        Money::from_decimal(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_decimal())
    }
}
