//! Discount sub-document and the derived final price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rawsy_core::{DomainError, DomainResult, ValueObject};

/// A discount percentage in `[0, 100]`.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(f64);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);

    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(DomainError::invalid_argument(format!(
                "percentage must be between 0 and 100 (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0.0
    }
}

impl ValueObject for Percentage {}

/// Supplier-controlled discount.
///
/// Invariant: `active` implies a positive percentage. `expires_at` is stored
/// as given; expiry is evaluated at read time by [`Discount::is_live`] and
/// never rewrites `active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub percentage: Percentage,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for Discount {
    fn default() -> Self {
        Self {
            percentage: Percentage::ZERO,
            active: false,
            expires_at: None,
        }
    }
}

impl ValueObject for Discount {}

impl Discount {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Whether the discount reduces the price at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.percentage.is_positive() && !self.is_expired(now)
    }

    /// Price after this discount at `now` (pure, never persisted).
    pub fn final_price(&self, price: u64, now: DateTime<Utc>) -> u64 {
        if self.is_live(now) {
            discounted_price(price, self.percentage)
        } else {
            price
        }
    }
}

/// `price * (1 - pct/100)`, rounded half-up to the smallest currency unit.
pub fn discounted_price(price: u64, pct: Percentage) -> u64 {
    let discounted = (price as f64) * (100.0 - pct.value()) / 100.0;
    discounted.round().max(0.0) as u64
}
