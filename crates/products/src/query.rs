//! Catalog read paths over product documents.

use core::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::moderation::ModerationStatus;
use crate::product::Product;

pub const DEFAULT_TOP_RATED_LIMIT: usize = 10;
pub const MAX_TOP_RATED_LIMIT: usize = 100;

/// Public search filter. Price bounds are inclusive and compare against the
/// final price at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub text: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
}

impl SearchFilter {
    pub fn matches(&self, product: &Product, now: DateTime<Utc>) -> bool {
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            let in_name = product.name().to_lowercase().contains(&needle);
            let in_description = product
                .description()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        if let Some(category) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            if !product.category().eq_ignore_ascii_case(category) {
                return false;
            }
        }
        let price = product.final_price(now);
        if self.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| price > max) {
            return false;
        }
        true
    }
}

/// Newest first; ids are time-ordered so they break ties.
pub fn newest_first(mut products: Vec<Product>) -> Vec<Product> {
    products.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id_typed().cmp(&a.id_typed()))
    });
    products
}

/// Approved products only, newest first.
pub fn public_listing(products: Vec<Product>) -> Vec<Product> {
    newest_first(products.into_iter().filter(Product::is_public).collect())
}

pub fn search(products: Vec<Product>, filter: &SearchFilter, now: DateTime<Utc>) -> Vec<Product> {
    public_listing(products)
        .into_iter()
        .filter(|p| filter.matches(p, now))
        .collect()
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_TOP_RATED_LIMIT)
        .clamp(1, MAX_TOP_RATED_LIMIT)
}

/// Approved products by rating average, then rating count, both descending.
pub fn top_rated(products: Vec<Product>, limit: usize) -> Vec<Product> {
    let mut public = public_listing(products);
    public.sort_by(|a, b| {
        let (ra, rb) = (a.rating(), b.rating());
        rb.average
            .partial_cmp(&ra.average)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rb.count.cmp(&ra.count))
    });
    public.truncate(limit);
    public
}

/// Moderation dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub flagged: u64,
    pub discounted: u64,
}

impl CatalogStats {
    pub fn collect<'a>(products: impl IntoIterator<Item = &'a Product>, now: DateTime<Utc>) -> Self {
        let mut stats = CatalogStats::default();
        for product in products.into_iter().filter(|p| p.exists()) {
            stats.total += 1;
            match product.status() {
                ModerationStatus::Pending => stats.pending += 1,
                ModerationStatus::Approved => stats.approved += 1,
                ModerationStatus::Rejected => stats.rejected += 1,
            }
            if product.flagged() {
                stats.flagged += 1;
            }
            if product.discount().is_live(now) {
                stats.discounted += 1;
            }
        }
        stats
    }
}
