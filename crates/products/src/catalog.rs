//! Catalog fields: raw input, validated details and partial updates.

use serde::{Deserialize, Serialize};

use rawsy_core::error::require_text;
use rawsy_core::{DomainError, DomainResult, ValueObject};

/// Unit price in the smallest currency unit. Always positive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    /// Placeholder for a not-yet-created product; never exposed on a live document.
    pub(crate) const UNSET: Price = Price(0);

    pub fn new(amount: i64) -> DomainResult<Self> {
        if amount <= 0 {
            return Err(DomainError::invalid_argument(format!(
                "price must be a positive integer (got {amount})"
            )));
        }
        Ok(Self(amount as u64))
    }

    pub fn amount(&self) -> u64 {
        self.0
    }
}

impl ValueObject for Price {}

fn stock_from(value: i64) -> DomainResult<u64> {
    u64::try_from(value).map_err(|_| {
        DomainError::invalid_argument(format!("stock must be non-negative (got {value})"))
    })
}

fn description_from(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Validated catalog fields as stored on the product document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDetails {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Price,
    pub unit: String,
    pub stock: u64,
    pub negotiable: bool,
}

impl ValueObject for CatalogDetails {}

impl CatalogDetails {
    pub(crate) fn blank() -> Self {
        Self {
            name: String::new(),
            description: None,
            category: String::new(),
            price: Price::UNSET,
            unit: String::new(),
            stock: 0,
            negotiable: false,
        }
    }
}

/// Unvalidated catalog fields as submitted by a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCatalogDetails {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: i64,
    pub unit: String,
    pub stock: i64,
    pub negotiable: bool,
}

impl NewCatalogDetails {
    pub fn validate(&self) -> DomainResult<CatalogDetails> {
        Ok(CatalogDetails {
            name: require_text("name", &self.name)?,
            description: description_from(self.description.as_deref()),
            category: require_text("category", &self.category)?,
            price: Price::new(self.price)?,
            unit: require_text("unit", &self.unit)?,
            stock: stock_from(self.stock)?,
            negotiable: self.negotiable,
        })
    }
}

/// Partial update of catalog fields. `None` leaves a field untouched; an
/// empty description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub unit: Option<String>,
    pub stock: Option<i64>,
    pub negotiable: Option<bool>,
}

impl CatalogPatch {
    pub fn is_empty(&self) -> bool {
        self == &CatalogPatch::default()
    }

    /// Resolve the patch against `current`, validating every provided field.
    pub fn apply_to(&self, current: &CatalogDetails) -> DomainResult<CatalogDetails> {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = require_text("name", name)?;
        }
        if let Some(description) = &self.description {
            next.description = description_from(Some(description));
        }
        if let Some(category) = &self.category {
            next.category = require_text("category", category)?;
        }
        if let Some(price) = self.price {
            next.price = Price::new(price)?;
        }
        if let Some(unit) = &self.unit {
            next.unit = require_text("unit", unit)?;
        }
        if let Some(stock) = self.stock {
            next.stock = stock_from(stock)?;
        }
        if let Some(negotiable) = self.negotiable {
            next.negotiable = negotiable;
        }
        Ok(next)
    }
}
