//! Request/response DTOs (camelCase JSON) and mapping from read models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rawsy_core::AggregateRoot;
use rawsy_products::{CatalogPatch, FlagRecord, NewCatalogDetails, Product, SearchFilter};
use rawsy_support::Faq;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

// Text fields default to empty so missing values surface as domain
// `invalid_argument` errors rather than body rejections.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    pub price: i64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub negotiable: bool,
}

impl CreateProductRequest {
    pub fn into_details(self) -> NewCatalogDetails {
        NewCatalogDetails {
            name: self.name,
            description: self.description,
            category: self.category,
            price: self.price,
            unit: self.unit,
            stock: self.stock,
            negotiable: self.negotiable,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub unit: Option<String>,
    pub stock: Option<i64>,
    pub negotiable: Option<bool>,
}

impl UpdateProductRequest {
    pub fn into_patch(self) -> CatalogPatch {
        CatalogPatch {
            name: self.name,
            description: self.description,
            category: self.category,
            price: self.price,
            unit: self.unit,
            stock: self.stock,
            negotiable: self.negotiable,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDiscountRequest {
    pub product_id: String,
    pub percentage: f64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
}

impl SearchQuery {
    pub fn into_filter(self) -> SearchFilter {
        SearchFilter {
            text: self.q.filter(|q| !q.trim().is_empty()),
            category: self.category.filter(|c| !c.trim().is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TopRatedQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFaqRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountResponse {
    pub percentage: f64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub average: f64,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct FlagResponse {
    pub reason: String,
    pub date: DateTime<Utc>,
    pub user: String,
}

impl From<&FlagRecord> for FlagResponse {
    fn from(flag: &FlagRecord) -> Self {
        Self {
            reason: flag.reason.clone(),
            date: flag.date,
            user: flag.user.to_string(),
        }
    }
}

/// Product document as served over HTTP.
///
/// `finalPrice` and `discountLive` are computed at response time. Flag
/// history and the last flagging admin are only included on owner/admin views.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub supplier: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: u64,
    pub unit: String,
    pub stock: u64,
    pub negotiable: bool,
    pub discount: DiscountResponse,
    pub discount_live: bool,
    pub final_price: u64,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub status: &'static str,
    pub rejection_reason: Option<String>,
    pub rating: RatingResponse,
    pub flagged: bool,
    pub flag_count: u64,
    pub flag_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<FlagResponse>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl ProductResponse {
    /// Public view (no moderation history).
    pub fn public(product: &Product, now: DateTime<Utc>) -> Self {
        let details = product.details();
        let discount = product.discount();
        Self {
            id: product.id_typed().to_string(),
            supplier: product.supplier().map(|s| s.to_string()),
            name: details.name.clone(),
            description: details.description.clone(),
            category: details.category.clone(),
            price: product.price(),
            unit: details.unit.clone(),
            stock: details.stock,
            negotiable: details.negotiable,
            discount: DiscountResponse {
                percentage: discount.percentage.value(),
                active: discount.active,
                expires_at: discount.expires_at,
            },
            discount_live: discount.is_live(now),
            final_price: product.final_price(now),
            image: product.image().map(str::to_string),
            images: product.images().to_vec(),
            status: product.status().as_str(),
            rejection_reason: product.rejection_reason().map(str::to_string),
            rating: RatingResponse {
                average: product.rating().average,
                count: product.rating().count,
            },
            flagged: product.flagged(),
            flag_count: product.flag_count(),
            flag_reason: product.flags().flag_reason().map(str::to_string),
            flagged_by: None,
            flags: None,
            created_at: product.created_at(),
            updated_at: product.updated_at(),
            version: product.version(),
        }
    }

    /// Full document including flag history.
    pub fn full(product: &Product, now: DateTime<Utc>) -> Self {
        let flags = product.flags();
        Self {
            flagged_by: flags.flagged_by().map(|u| u.to_string()),
            flags: Some(flags.history().iter().map(FlagResponse::from).collect()),
            ..Self::public(product, now)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqResponse {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Faq> for FaqResponse {
    fn from(faq: &Faq) -> Self {
        Self {
            id: faq.id_typed().to_string(),
            question: faq.question().to_string(),
            answer: faq.answer().to_string(),
            tags: faq.tags().to_vec(),
            created_at: faq.created_at(),
            updated_at: faq.updated_at(),
        }
    }
}
